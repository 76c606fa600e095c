//! Complexity score of a function and a per-snapshot memo of it.

use codefacts_facts::{EntityId, NaturalKey};
use codefacts_store::FunctionFacts;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::RwLock;

const CALL_WEIGHT: u32 = 1;
const BRANCH_WEIGHT: u32 = 2;
const MATCH_DEPTH_WEIGHT: u32 = 2;
const WHERE_WEIGHT: u32 = 2;
const ARITY_WEIGHT: u32 = 1;

/// The inputs a score is computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ComplexityInputs {
    pub calls: u32,
    pub branches: u32,
    pub match_depth: u32,
    pub where_functions: u32,
    pub arity: u32,
}

impl ComplexityInputs {
    pub fn from_facts(facts: &FunctionFacts) -> Self {
        Self {
            calls: facts.calls,
            branches: facts.function.branches,
            match_depth: facts.function.match_depth,
            where_functions: facts.where_functions,
            arity: facts.function.arity,
        }
    }

    /// Weighted sum with non-negative weights, so growing any input never
    /// lowers the score.
    pub fn score(&self) -> u32 {
        CALL_WEIGHT
            .saturating_mul(self.calls)
            .saturating_add(BRANCH_WEIGHT.saturating_mul(self.branches))
            .saturating_add(MATCH_DEPTH_WEIGHT.saturating_mul(self.match_depth))
            .saturating_add(WHERE_WEIGHT.saturating_mul(self.where_functions))
            .saturating_add(ARITY_WEIGHT.saturating_mul(self.arity))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComplexityScore {
    pub id: EntityId,
    pub key: NaturalKey,
    pub score: u32,
    pub inputs: ComplexityInputs,
}

impl ComplexityScore {
    pub fn from_facts(facts: &FunctionFacts) -> Self {
        let inputs = ComplexityInputs::from_facts(facts);
        Self {
            id: facts.function.id,
            key: facts.function.key.clone(),
            score: inputs.score(),
            inputs,
        }
    }
}

#[derive(Debug, Default)]
struct CacheState {
    generation: i64,
    scores: HashMap<EntityId, ComplexityScore>,
}

/// Scores memoized for one snapshot generation.
///
/// Entries are pure functions of the snapshot, so two readers computing the
/// same entry concurrently store identical values. A session pinned to another
/// generation bypasses the memo instead of mixing entries.
#[derive(Debug, Default)]
pub struct ComplexityCache {
    state: RwLock<CacheState>,
}

impl ComplexityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, generation: i64, id: EntityId) -> Option<ComplexityScore> {
        let state = self.state.read().ok()?;
        if state.generation != generation {
            return None;
        }
        state.scores.get(&id).cloned()
    }

    pub fn insert(&self, generation: i64, score: &ComplexityScore) {
        let Ok(mut state) = self.state.write() else {
            return;
        };
        if generation > state.generation {
            log::debug!(
                "Complexity cache moved from generation {} to {generation}",
                state.generation
            );
            state.generation = generation;
            state.scores.clear();
        }
        if state.generation == generation {
            state.scores.insert(score.id, score.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.state.read().map(|s| s.scores.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn score(id: EntityId, value: u32) -> ComplexityScore {
        ComplexityScore {
            id,
            key: NaturalKey::new("M", format!("f{id}")),
            score: value,
            inputs: ComplexityInputs::default(),
        }
    }

    #[test]
    fn score_is_monotonic_in_every_input() {
        let base = ComplexityInputs {
            calls: 3,
            branches: 2,
            match_depth: 1,
            where_functions: 1,
            arity: 2,
        };
        let bumps = [
            ComplexityInputs { calls: 4, ..base },
            ComplexityInputs { branches: 3, ..base },
            ComplexityInputs { match_depth: 2, ..base },
            ComplexityInputs { where_functions: 2, ..base },
            ComplexityInputs { arity: 3, ..base },
        ];
        for bumped in bumps {
            assert!(bumped.score() > base.score(), "{bumped:?}");
        }
        assert_eq!(ComplexityInputs::default().score(), 0);
    }

    #[test]
    fn saturates_instead_of_overflowing() {
        let huge = ComplexityInputs {
            calls: u32::MAX,
            branches: u32::MAX,
            ..ComplexityInputs::default()
        };
        assert_eq!(huge.score(), u32::MAX);
    }

    #[test]
    fn cache_is_scoped_to_one_generation() {
        let cache = ComplexityCache::new();
        cache.insert(1, &score(7, 12));
        assert_eq!(cache.get(1, 7).map(|s| s.score), Some(12));
        assert_eq!(cache.get(2, 7), None);

        cache.insert(2, &score(8, 3));
        assert_eq!(cache.get(1, 7), None);
        assert_eq!(cache.len(), 1);

        // A session still pinned to an older snapshot never writes into the newer memo.
        cache.insert(1, &score(9, 1));
        assert_eq!(cache.get(2, 9), None);
        assert_eq!(cache.len(), 1);
    }
}
