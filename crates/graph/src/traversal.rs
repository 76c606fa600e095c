//! Depth-bounded breadth-first expansion shared by every graph operation.
//!
//! Termination does not depend on the input being acyclic: a node enters the
//! visited set once, only nodes popped below the depth bound are expanded, and
//! the node cap stops growth on very wide graphs.

use crate::error::Result;
use crate::types::{EdgeKind, GraphEdge, GraphNode, NodeRef, Subgraph};
use codefacts_facts::{EntityId, Location};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeMap, HashMap, VecDeque};

/// One neighbor produced by expanding a node.
#[derive(Debug, Clone)]
pub(crate) struct Step {
    pub node: NodeRef,
    pub id: Option<EntityId>,
    pub kind: EdgeKind,
    pub location: Option<Location>,
    /// `true` when the edge points from the expanded node to `node`.
    pub outgoing: bool,
}

#[derive(Debug)]
struct Visit {
    id: Option<EntityId>,
    depth: usize,
    revisited: bool,
}

#[derive(Debug, Default)]
struct EdgeAcc {
    locations: Vec<Location>,
    revisit: bool,
}

pub(crate) struct Traversal {
    pub depth: usize,
    pub depth_clamped: bool,
    pub max_nodes: usize,
}

impl Traversal {
    /// Expand from `root` up to `self.depth` hops. `expand` is only called for
    /// resolved nodes (`id.is_some()`), dangling ones stay leaves.
    pub(crate) fn run<F>(&self, root: NodeRef, root_id: EntityId, mut expand: F) -> Result<Subgraph>
    where
        F: FnMut(&NodeRef, EntityId) -> Result<Vec<Step>>,
    {
        let mut visited: BTreeMap<NodeRef, Visit> = BTreeMap::new();
        let mut edges: BTreeMap<(NodeRef, NodeRef, EdgeKind), EdgeAcc> = BTreeMap::new();
        let mut queue = VecDeque::new();
        let mut truncated = false;

        visited.insert(
            root.clone(),
            Visit {
                id: Some(root_id),
                depth: 0,
                revisited: false,
            },
        );
        queue.push_back((root.clone(), root_id, 0usize));

        while let Some((current, id, depth)) = queue.pop_front() {
            if depth >= self.depth {
                continue;
            }
            let steps = expand(&current, id)?;
            log::debug!("Expanded {current} at depth {depth}: {} neighbor(s)", steps.len());

            for step in steps {
                let revisit = match visited.get_mut(&step.node) {
                    Some(seen) => {
                        seen.revisited = true;
                        true
                    }
                    None => {
                        if visited.len() >= self.max_nodes {
                            truncated = true;
                            continue;
                        }
                        visited.insert(
                            step.node.clone(),
                            Visit {
                                id: step.id,
                                depth: depth + 1,
                                revisited: false,
                            },
                        );
                        if let Some(next_id) = step.id {
                            queue.push_back((step.node.clone(), next_id, depth + 1));
                        }
                        false
                    }
                };

                let (source, target) = if step.outgoing {
                    (current.clone(), step.node)
                } else {
                    (step.node, current.clone())
                };
                let acc = edges
                    .entry((source, target, step.kind))
                    .or_insert_with(|| EdgeAcc {
                        locations: Vec::new(),
                        revisit,
                    });
                if let Some(location) = step.location {
                    if !acc.locations.contains(&location) {
                        acc.locations.push(location);
                    }
                }
            }
        }

        let cycles = find_cycles(&visited, &edges);

        let mut nodes: Vec<(&NodeRef, &Visit)> = visited.iter().collect();
        nodes.sort_by(|a, b| a.1.depth.cmp(&b.1.depth).then_with(|| a.0.cmp(b.0)));

        Ok(Subgraph {
            root: root.label(),
            depth: self.depth,
            depth_clamped: self.depth_clamped,
            nodes: nodes
                .into_iter()
                .map(|(node, visit)| GraphNode {
                    key: node.label(),
                    kind: node.kind,
                    id: visit.id,
                    depth: visit.depth,
                    dangling: visit.id.is_none(),
                    revisited: visit.revisited,
                })
                .collect(),
            edges: edges
                .into_iter()
                .map(|((source, target, kind), mut acc)| {
                    acc.locations.sort_by_key(|l| (l.line, l.col));
                    GraphEdge {
                        source: source.label(),
                        target: target.label(),
                        kind,
                        locations: acc.locations,
                        revisit: acc.revisit,
                    }
                })
                .collect(),
            cycles,
            truncated,
            not_found: None,
        })
    }
}

/// Strongly connected components with more than one member, plus self loops,
/// each sorted by natural key.
fn find_cycles(
    visited: &BTreeMap<NodeRef, Visit>,
    edges: &BTreeMap<(NodeRef, NodeRef, EdgeKind), EdgeAcc>,
) -> Vec<Vec<String>> {
    let mut graph: DiGraph<&NodeRef, ()> = DiGraph::new();
    let mut index: HashMap<&NodeRef, NodeIndex> = HashMap::new();
    for node in visited.keys() {
        index.insert(node, graph.add_node(node));
    }
    for (source, target, _) in edges.keys() {
        if let (Some(&a), Some(&b)) = (index.get(source), index.get(target)) {
            graph.update_edge(a, b, ());
        }
    }

    let mut cycles: Vec<Vec<String>> = tarjan_scc(&graph)
        .into_iter()
        .filter(|component| {
            component.len() > 1 || graph.contains_edge(component[0], component[0])
        })
        .map(|component| {
            let mut members: Vec<&NodeRef> = component.iter().map(|idx| graph[*idx]).collect();
            members.sort();
            members.into_iter().map(NodeRef::label).collect()
        })
        .collect();
    cycles.sort();
    cycles
}

#[cfg(test)]
mod tests {
    use super::*;
    use codefacts_facts::NaturalKey;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn node(name: &str) -> NodeRef {
        NodeRef::function(NaturalKey::new("M", name))
    }

    /// Adjacency list over ids 1..=n where `names[id - 1]` is the local name.
    fn run(
        names: &[&str],
        adjacency: &[(EntityId, EntityId)],
        root: EntityId,
        depth: usize,
        max_nodes: usize,
    ) -> Subgraph {
        let mut out: HashMap<EntityId, Vec<EntityId>> = HashMap::new();
        for (a, b) in adjacency {
            out.entry(*a).or_default().push(*b);
        }
        let traversal = Traversal {
            depth,
            depth_clamped: false,
            max_nodes,
        };
        traversal
            .run(node(names[root as usize - 1]), root, |_, id| {
                Ok(out
                    .get(&id)
                    .into_iter()
                    .flatten()
                    .map(|next| Step {
                        node: node(names[*next as usize - 1]),
                        id: Some(*next),
                        kind: EdgeKind::Calls,
                        location: None,
                        outgoing: true,
                    })
                    .collect())
            })
            .unwrap()
    }

    #[test]
    fn depth_zero_returns_only_root() {
        let graph = run(&["a", "b"], &[(1, 2)], 1, 0, 100);
        assert_eq!(graph.nodes.len(), 1);
        assert_eq!(graph.nodes[0].key, "M.a");
        assert!(graph.edges.is_empty());
    }

    #[test]
    fn self_loop_terminates_and_is_a_cycle() {
        let graph = run(&["a"], &[(1, 1)], 1, 10, 100);
        assert_eq!(graph.nodes.len(), 1);
        assert_eq!(graph.edges.len(), 1);
        assert!(graph.edges[0].revisit);
        assert_eq!(graph.cycles, vec![vec!["M.a".to_string()]]);
    }

    #[test]
    fn mutual_recursion_has_no_duplicate_nodes() {
        let graph = run(&["a", "b", "c"], &[(1, 2), (2, 3), (3, 1)], 1, 50, 100);
        let keys: Vec<&str> = graph.nodes.iter().map(|n| n.key.as_str()).collect();
        assert_eq!(keys, vec!["M.a", "M.b", "M.c"]);
        assert_eq!(graph.edges.len(), 3);
        assert!(graph.node("M.a").unwrap().revisited);
        assert_eq!(
            graph.cycles,
            vec![vec!["M.a".to_string(), "M.b".to_string(), "M.c".to_string()]]
        );
    }

    #[test]
    fn depth_bound_limits_reach() {
        let graph = run(&["a", "b", "c", "d"], &[(1, 2), (2, 3), (3, 4)], 1, 2, 100);
        let keys: Vec<&str> = graph.nodes.iter().map(|n| n.key.as_str()).collect();
        assert_eq!(keys, vec!["M.a", "M.b", "M.c"]);
        assert_eq!(graph.nodes[2].depth, 2);
    }

    #[test]
    fn node_cap_truncates() {
        let graph = run(&["a", "b", "c", "d"], &[(1, 2), (1, 3), (1, 4)], 1, 3, 2);
        assert_eq!(graph.nodes.len(), 2);
        assert!(graph.truncated);
    }

    #[test]
    fn dangling_neighbors_are_leaves() {
        let traversal = Traversal {
            depth: 5,
            depth_clamped: false,
            max_nodes: 10,
        };
        let mut expanded = Vec::new();
        let graph = traversal
            .run(node("a"), 1, |current, _| {
                expanded.push(current.label());
                Ok(vec![Step {
                    node: NodeRef::function(NaturalKey::new("", "external")),
                    id: None,
                    kind: EdgeKind::Calls,
                    location: Some(Location::new(3, 4)),
                    outgoing: true,
                }])
            })
            .unwrap();

        assert_eq!(expanded, vec!["M.a".to_string()]);
        let dangling = graph.node("external").unwrap();
        assert!(dangling.dangling);
        assert_eq!(graph.edges[0].locations, vec![Location::new(3, 4)]);
    }
}
