use crate::error::{GraphError, Result};
use codefacts_facts::{EntityId, Function, Import, Location, NaturalKey, TypeKind, TypeRelation};
use codefacts_protocol::{Listing, NotFound};
use codefacts_store::{CallSite, ModuleCallCount};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Function,
    Type,
    Module,
}

/// Identity of a node inside one traversal. Modules use an empty local name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeRef {
    pub key: NaturalKey,
    pub kind: NodeKind,
}

impl NodeRef {
    pub fn function(key: NaturalKey) -> Self {
        Self {
            key,
            kind: NodeKind::Function,
        }
    }

    pub fn type_def(key: NaturalKey) -> Self {
        Self {
            key,
            kind: NodeKind::Type,
        }
    }

    pub fn module(name: impl Into<String>) -> Self {
        Self {
            key: NaturalKey::new(name, ""),
            kind: NodeKind::Module,
        }
    }

    /// Display form used as the node key in results.
    pub fn label(&self) -> String {
        match self.kind {
            NodeKind::Module => self.key.module.clone(),
            _ => self.key.to_string(),
        }
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Calls,
    Imports,
    FieldOf,
    ConstructorArgOf,
    ArgumentOf,
    ReturnOf,
    Contains,
    Uses,
}

impl From<TypeRelation> for EdgeKind {
    fn from(relation: TypeRelation) -> Self {
        match relation {
            TypeRelation::FieldOf => EdgeKind::FieldOf,
            TypeRelation::ConstructorArgOf => EdgeKind::ConstructorArgOf,
            TypeRelation::ArgumentOf => EdgeKind::ArgumentOf,
            TypeRelation::ReturnOf => EdgeKind::ReturnOf,
            TypeRelation::Contains => EdgeKind::Contains,
            TypeRelation::Uses => EdgeKind::Uses,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Callers,
    #[default]
    Callees,
    Both,
}

impl Direction {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "callers" | "incoming" | "in" | "dependents" => Ok(Direction::Callers),
            "callees" | "outgoing" | "out" | "dependencies" => Ok(Direction::Callees),
            "both" | "all" => Ok(Direction::Both),
            other => Err(GraphError::InvalidTraversal(format!(
                "unknown direction {other:?} (expected callers, callees or both)"
            ))),
        }
    }

    pub fn forward(self) -> bool {
        matches!(self, Direction::Callees | Direction::Both)
    }

    pub fn backward(self) -> bool {
        matches!(self, Direction::Callers | Direction::Both)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphNode {
    pub key: String,
    pub kind: NodeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,
    pub depth: usize,
    /// Target of an unresolved reference; never expanded.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub dangling: bool,
    /// Reached again from another node after it was first visited.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub revisited: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub kind: EdgeKind,
    /// Every site of this relation, in source order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<Location>,
    /// Discovered while its far end was already in the visited set.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub revisit: bool,
}

/// Induced subgraph produced by one bounded traversal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subgraph {
    pub root: String,
    pub depth: usize,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub depth_clamped: bool,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    /// Strongly connected components (and self loops) inside the subgraph.
    pub cycles: Vec<Vec<String>>,
    /// The node cap stopped the traversal before the depth bound did.
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_found: Option<NotFound>,
}

impl Subgraph {
    pub fn not_found(root: String, depth: usize, marker: NotFound) -> Self {
        Self {
            root,
            depth,
            depth_clamped: false,
            nodes: Vec::new(),
            edges: Vec::new(),
            cycles: Vec::new(),
            truncated: false,
            not_found: Some(marker),
        }
    }

    pub fn node(&self, key: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.key == key)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleDependencies {
    pub module: String,
    pub imports: Vec<Import>,
    pub imported_by: Vec<Import>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_found: Option<NotFound>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossModuleEdges {
    pub source: String,
    pub target: String,
    pub edges: Listing<CallSite>,
}

/// Call volume in and out of one module, counted over cross-module call sites.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleCoupling {
    pub module: String,
    pub incoming: u64,
    pub outgoing: u64,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossModuleDependencies {
    pub threshold: u64,
    /// Modules on either end of a cross-module call, whole snapshot.
    pub module_count: usize,
    pub total_cross_module_calls: u64,
    /// Module pairs, most calls first.
    pub dependencies: Listing<ModuleCallCount>,
    /// Per-module metrics, highest total first.
    pub coupling: Listing<ModuleCoupling>,
}

/// A function or type one function refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextEntry {
    pub key: NaturalKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_kind: Option<TypeKind>,
    /// Reference sites inside the function body.
    pub sites: usize,
}

impl ContextEntry {
    pub fn is_dangling(&self) -> bool {
        self.id.is_none()
    }
}

/// Everything one function uses, split by whether it lives in the same module.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionContext {
    pub function: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition: Option<Function>,
    pub local_functions: Vec<ContextEntry>,
    pub external_functions: Vec<ContextEntry>,
    pub local_types: Vec<ContextEntry>,
    pub external_types: Vec<ContextEntry>,
    /// A section held more than `max_results` entries and was cut.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_found: Option<NotFound>,
}
