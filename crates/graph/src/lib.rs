//! # Codefacts Graph
//!
//! Call, type-dependency and import graphs built on demand from a
//! [`ReadSession`](codefacts_store::ReadSession).
//!
//! ## Traversal discipline
//!
//! ```text
//! root ──> BFS (queue, visited set keyed by natural key)
//!            ├─ nodes at depth >= bound are not expanded
//!            ├─ already visited neighbor: edge kept, flagged `revisit`
//!            ├─ dangling neighbor: kept as a leaf
//!            └─ node cap reached: `truncated`
//!        ──> petgraph Tarjan SCC over the result for `cycles`
//! ```
//!
//! Results are ordered by depth, then natural key, so the same snapshot always
//! yields the same answer.

mod engine;
mod error;
mod traversal;
mod types;

pub use engine::{GraphEngine, DEFAULT_TYPE_DEPTH};
pub use error::{GraphError, Result};
pub use types::{
    ContextEntry, CrossModuleDependencies, CrossModuleEdges, Direction, EdgeKind, FunctionContext,
    GraphEdge, GraphNode, ModuleCoupling, ModuleDependencies, NodeKind, NodeRef, Subgraph,
};
