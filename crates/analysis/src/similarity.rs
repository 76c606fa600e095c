//! Pairwise function similarity: signature shape plus callee overlap.
//!
//! The signature side compares token bags after type variables are renamed in
//! order of appearance, so `a -> b` and `x -> y` have the same shape. The call
//! side is the Jaccard index of the callee sets, with a function's own key
//! replaced by a marker so two recursive functions look alike.

use codefacts_facts::{signature, EntityId, NaturalKey};
use codefacts_store::FunctionFacts;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

pub const DEFAULT_THRESHOLD: f64 = 0.7;

static SIGNATURE_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z_][A-Za-z0-9_']*(?:\.[A-Za-z_][A-Za-z0-9_']*)*|->|=>|::|\(\)|[\[\](),]")
        .expect("signature token pattern is valid")
});

/// Bring a caller-supplied threshold into `[0, 1]`. `NaN` means the default.
pub fn clamp_threshold(threshold: f64) -> (f64, bool) {
    if threshold.is_nan() {
        return (DEFAULT_THRESHOLD, true);
    }
    let clamped = threshold.clamp(0.0, 1.0);
    (clamped, clamped != threshold)
}

/// What similarity looks at for one function.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionProfile {
    pub id: EntityId,
    pub key: NaturalKey,
    shape: BTreeMap<String, u32>,
    callees: BTreeSet<NaturalKey>,
}

impl FunctionProfile {
    pub fn from_facts(facts: &FunctionFacts) -> Self {
        let function = &facts.function;
        let shape = match function.signature.as_deref() {
            Some(sig) if !sig.trim().is_empty() => signature_shape(sig),
            _ => {
                let mut shape = BTreeMap::new();
                shape.insert("<untyped>".to_string(), 1);
                if function.arity > 0 {
                    shape.insert("->".to_string(), function.arity);
                }
                shape
            }
        };
        let self_marker = NaturalKey::new("", "<self>");
        let callees = facts
            .callees
            .iter()
            .map(|callee| {
                if *callee == function.key {
                    self_marker.clone()
                } else {
                    callee.clone()
                }
            })
            .collect();
        Self {
            id: function.id,
            key: function.key.clone(),
            shape,
            callees,
        }
    }
}

/// Token bag of a signature with constraints dropped and type variables renamed.
pub fn signature_shape(sig: &str) -> BTreeMap<String, u32> {
    let body = signature::strip_context(sig);
    let mut variables: HashMap<&str, String> = HashMap::new();
    let mut shape = BTreeMap::new();
    for token in SIGNATURE_TOKEN.find_iter(body).map(|m| m.as_str()) {
        let normalized = match token.chars().next() {
            Some(c) if c.is_lowercase() || c == '_' => {
                let next = variables.len();
                variables
                    .entry(token)
                    .or_insert_with(|| format!("'v{next}"))
                    .clone()
            }
            Some(c) if c.is_uppercase() => token.rsplit('.').next().unwrap_or(token).to_string(),
            _ => token.to_string(),
        };
        *shape.entry(normalized).or_insert(0) += 1;
    }
    shape
}

fn bag_jaccard(a: &BTreeMap<String, u32>, b: &BTreeMap<String, u32>) -> f64 {
    let mut shared = 0u64;
    let mut union = 0u64;
    for token in a.keys().chain(b.keys().filter(|k| !a.contains_key(*k))) {
        let x = a.get(token).copied().unwrap_or(0) as u64;
        let y = b.get(token).copied().unwrap_or(0) as u64;
        shared += x.min(y);
        union += x.max(y);
    }
    if union == 0 {
        1.0
    } else {
        shared as f64 / union as f64
    }
}

fn set_jaccard(a: &BTreeSet<NaturalKey>, b: &BTreeSet<NaturalKey>) -> Option<f64> {
    let union = a.union(b).count();
    if union == 0 {
        return None;
    }
    Some(a.intersection(b).count() as f64 / union as f64)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Similarity {
    pub score: f64,
    pub signature: f64,
    /// `None` when neither function calls anything.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callees: Option<f64>,
}

pub fn similarity(a: &FunctionProfile, b: &FunctionProfile) -> Similarity {
    let signature = bag_jaccard(&a.shape, &b.shape);
    let callees = set_jaccard(&a.callees, &b.callees);
    let score = match callees {
        Some(callees) => (signature + callees) / 2.0,
        None => signature,
    };
    Similarity {
        score,
        signature,
        callees,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityMatch {
    pub id: EntityId,
    pub key: NaturalKey,
    #[serde(flatten)]
    pub similarity: Similarity,
}

/// Score descending, then natural key.
pub fn rank(matches: &mut [SimilarityMatch]) {
    matches.sort_by(|a, b| {
        b.similarity
            .score
            .partial_cmp(&a.similarity.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.key.cmp(&b.key))
    });
}

/// Every candidate other than `target` scoring at least `threshold`.
pub fn matches_for(
    target: &FunctionProfile,
    candidates: &[FunctionProfile],
    threshold: f64,
) -> Vec<SimilarityMatch> {
    let mut matches: Vec<SimilarityMatch> = candidates
        .iter()
        .filter(|c| c.id != target.id)
        .filter_map(|c| {
            let similarity = similarity(target, c);
            (similarity.score >= threshold).then(|| SimilarityMatch {
                id: c.id,
                key: c.key.clone(),
                similarity,
            })
        })
        .collect();
    rank(&mut matches);
    matches
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupMember {
    pub id: EntityId,
    pub key: NaturalKey,
}

/// Functions connected through pairs scoring at least the threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityGroup {
    pub members: Vec<GroupMember>,
    /// Pairs inside the group that met the threshold.
    pub links: usize,
    pub best_score: f64,
}

struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
            rank: vec![0; len],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            Ordering::Less => self.parent[ra] = rb,
            Ordering::Greater => self.parent[rb] = ra,
            Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}

/// Single-link grouping over all pairs. Groups smaller than `min_group_size`
/// are dropped; the rest are ordered by size descending, then first member.
pub fn group(profiles: &[FunctionProfile], threshold: f64, min_group_size: usize) -> Vec<SimilarityGroup> {
    let mut sets = DisjointSet::new(profiles.len());
    let mut links: Vec<(usize, f64)> = Vec::new();
    for i in 0..profiles.len() {
        for j in (i + 1)..profiles.len() {
            let score = similarity(&profiles[i], &profiles[j]).score;
            if score >= threshold {
                sets.union(i, j);
                links.push((i, score));
            }
        }
    }

    let mut grouped: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for i in 0..profiles.len() {
        let root = sets.find(i);
        grouped.entry(root).or_default().push(i);
    }
    let mut stats: HashMap<usize, (usize, f64)> = HashMap::new();
    for (i, score) in links {
        let root = sets.find(i);
        let entry = stats.entry(root).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 = entry.1.max(score);
    }

    let mut groups: Vec<SimilarityGroup> = grouped
        .into_iter()
        .filter(|(_, members)| members.len() >= min_group_size.max(2))
        .map(|(root, indices)| {
            let mut members: Vec<GroupMember> = indices
                .into_iter()
                .map(|i| GroupMember {
                    id: profiles[i].id,
                    key: profiles[i].key.clone(),
                })
                .collect();
            members.sort_by(|a, b| a.key.cmp(&b.key));
            let (links, best_score) = stats.get(&root).copied().unwrap_or((0, 0.0));
            SimilarityGroup {
                members,
                links,
                best_score,
            }
        })
        .collect();
    groups.sort_by(|a, b| {
        b.members
            .len()
            .cmp(&a.members.len())
            .then_with(|| a.members[0].key.cmp(&b.members[0].key))
    });
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use codefacts_facts::Function;
    use pretty_assertions::assert_eq;

    fn facts(id: EntityId, name: &str, sig: Option<&str>, callees: &[(&str, &str)]) -> FunctionFacts {
        FunctionFacts {
            function: Function {
                id,
                module_id: 1,
                key: NaturalKey::new("M", name),
                signature: sig.map(String::from),
                span: None,
                arity: sig.map(signature::arity).unwrap_or(0),
                branches: 0,
                match_depth: 0,
                parent_id: None,
            },
            calls: callees.len() as u32,
            self_calls: 0,
            where_functions: 0,
            callees: callees.iter().map(|(m, n)| NaturalKey::new(*m, *n)).collect(),
        }
    }

    fn profile(id: EntityId, name: &str, sig: Option<&str>, callees: &[(&str, &str)]) -> FunctionProfile {
        FunctionProfile::from_facts(&facts(id, name, sig, callees))
    }

    #[test]
    fn type_variables_are_renamed_in_order() {
        assert_eq!(signature_shape("a -> b -> a"), signature_shape("x -> y -> x"));
        assert_ne!(signature_shape("a -> b -> a"), signature_shape("a -> b -> b"));
        assert_eq!(
            signature_shape("Ord k => k -> Data.Map.Map k v"),
            signature_shape("x -> Map x y")
        );
    }

    #[test]
    fn identical_shapes_without_calls_score_one() {
        let a = profile(1, "a", Some("Int -> Int"), &[]);
        let b = profile(2, "b", Some("Int -> Int"), &[]);
        let s = similarity(&a, &b);
        assert_eq!(s.score, 1.0);
        assert_eq!(s.callees, None);
    }

    #[test]
    fn callee_overlap_is_averaged_in() {
        let a = profile(1, "a", Some("Int -> Int"), &[("B", "g"), ("B", "h")]);
        let b = profile(2, "b", Some("Int -> Int"), &[("B", "g")]);
        let s = similarity(&a, &b);
        assert_eq!(s.callees, Some(0.5));
        assert_eq!(s.score, 0.75);
    }

    #[test]
    fn recursion_counts_as_the_same_callee() {
        let a = profile(1, "loopA", Some("Int -> Int"), &[("M", "loopA")]);
        let b = profile(2, "loopB", Some("Int -> Int"), &[("M", "loopB")]);
        assert_eq!(similarity(&a, &b).score, 1.0);
    }

    #[test]
    fn matches_exclude_self_and_respect_threshold() {
        let target = profile(1, "a", Some("Int -> Int"), &[]);
        let candidates = vec![
            target.clone(),
            profile(2, "c", Some("Int -> Int"), &[]),
            profile(3, "b", Some("Int -> Int"), &[]),
            profile(4, "d", Some("String"), &[]),
        ];
        let found = matches_for(&target, &candidates, 1.0);
        let keys: Vec<String> = found.iter().map(|m| m.key.to_string()).collect();
        assert_eq!(keys, vec!["M.b", "M.c"]);
    }

    #[test]
    fn threshold_is_clamped() {
        assert_eq!(clamp_threshold(1.7), (1.0, true));
        assert_eq!(clamp_threshold(-0.2), (0.0, true));
        assert_eq!(clamp_threshold(0.4), (0.4, false));
        assert_eq!(clamp_threshold(f64::NAN), (DEFAULT_THRESHOLD, true));
    }

    #[test]
    fn grouping_is_single_link() {
        let profiles = vec![
            profile(1, "a", Some("Int -> Int"), &[("X", "p"), ("X", "q")]),
            profile(2, "b", Some("Int -> Int"), &[("X", "q"), ("X", "r")]),
            profile(3, "c", Some("Int -> Int"), &[("X", "r"), ("X", "s")]),
            profile(4, "z", Some("Bool"), &[("Y", "t")]),
        ];
        // a~b and b~c score 2/3; a~c scores 1/2.
        let groups = group(&profiles, 0.6, 2);
        assert_eq!(groups.len(), 1);
        let keys: Vec<String> = groups[0].members.iter().map(|m| m.key.to_string()).collect();
        assert_eq!(keys, vec!["M.a", "M.b", "M.c"]);
        assert_eq!(groups[0].links, 2);

        assert!(group(&profiles, 0.6, 4).is_empty());
    }
}
