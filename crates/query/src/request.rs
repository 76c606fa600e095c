use crate::error::{QueryError, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;

/// A request as it arrives from the transport: an operation name and a payload.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    #[serde(alias = "action")]
    pub operation: Operation,
    #[serde(default = "empty_payload")]
    pub payload: Value,
}

fn empty_payload() -> Value {
    Value::Object(Default::default())
}

impl QueryRequest {
    pub fn new(operation: Operation, payload: Value) -> Self {
        Self { operation, payload }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Capabilities,
    SnapshotInfo,
    Ingest,
    Batch,

    FindModules,
    FindFunctions,
    FindTypes,
    FindClasses,
    FindImports,
    FindInstances,

    CallGraph,
    TypeDependencyGraph,
    CrossModuleClosure,
    ImportGraph,
    Callers,
    Callees,
    MostCalledFunctions,
    ModuleDependencies,
    CrossModuleDependencies,
    FunctionContext,

    Complexity,
    ComplexityReport,
    SimilarFunctions,
    GroupSimilarFunctions,
    FindPatterns,
    FindUnusedImports,
    MatchCallPattern,
    FindElementByLocation,
    FunctionImports,
    CodeStatistics,

    StructuredQuery,
    RawQuery,
}

impl Operation {
    pub const ALL: &'static [Operation] = &[
        Operation::Capabilities,
        Operation::SnapshotInfo,
        Operation::Ingest,
        Operation::Batch,
        Operation::FindModules,
        Operation::FindFunctions,
        Operation::FindTypes,
        Operation::FindClasses,
        Operation::FindImports,
        Operation::FindInstances,
        Operation::CallGraph,
        Operation::TypeDependencyGraph,
        Operation::CrossModuleClosure,
        Operation::ImportGraph,
        Operation::Callers,
        Operation::Callees,
        Operation::MostCalledFunctions,
        Operation::ModuleDependencies,
        Operation::CrossModuleDependencies,
        Operation::FunctionContext,
        Operation::Complexity,
        Operation::ComplexityReport,
        Operation::SimilarFunctions,
        Operation::GroupSimilarFunctions,
        Operation::FindPatterns,
        Operation::FindUnusedImports,
        Operation::MatchCallPattern,
        Operation::FindElementByLocation,
        Operation::FunctionImports,
        Operation::CodeStatistics,
        Operation::StructuredQuery,
        Operation::RawQuery,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Operation::Capabilities => "capabilities",
            Operation::SnapshotInfo => "snapshot_info",
            Operation::Ingest => "ingest",
            Operation::Batch => "batch",
            Operation::FindModules => "find_modules",
            Operation::FindFunctions => "find_functions",
            Operation::FindTypes => "find_types",
            Operation::FindClasses => "find_classes",
            Operation::FindImports => "find_imports",
            Operation::FindInstances => "find_instances",
            Operation::CallGraph => "call_graph",
            Operation::TypeDependencyGraph => "type_dependency_graph",
            Operation::CrossModuleClosure => "cross_module_closure",
            Operation::ImportGraph => "import_graph",
            Operation::Callers => "callers",
            Operation::Callees => "callees",
            Operation::MostCalledFunctions => "most_called_functions",
            Operation::ModuleDependencies => "module_dependencies",
            Operation::CrossModuleDependencies => "cross_module_dependencies",
            Operation::FunctionContext => "function_context",
            Operation::Complexity => "complexity",
            Operation::ComplexityReport => "complexity_report",
            Operation::SimilarFunctions => "similar_functions",
            Operation::GroupSimilarFunctions => "group_similar_functions",
            Operation::FindPatterns => "find_patterns",
            Operation::FindUnusedImports => "find_unused_imports",
            Operation::MatchCallPattern => "match_call_pattern",
            Operation::FindElementByLocation => "find_element_by_location",
            Operation::FunctionImports => "function_imports",
            Operation::CodeStatistics => "code_statistics",
            Operation::StructuredQuery => "structured_query",
            Operation::RawQuery => "raw_query",
        }
    }
}

pub(crate) fn parse_payload<T: DeserializeOwned>(operation: Operation, payload: Value) -> Result<T> {
    serde_json::from_value(payload)
        .map_err(|e| QueryError::invalid(format!("bad payload for {}: {e}", operation.as_str())))
}

#[derive(Debug, Default, Deserialize)]
pub struct PageArgs {
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct IngestPayload {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Up to [`MAX_BATCH_ITEMS`] read operations answered from one snapshot.
#[derive(Debug, Deserialize)]
pub struct BatchPayload {
    pub items: Vec<BatchItem>,
    #[serde(default)]
    pub stop_on_error: bool,
}

pub const MAX_BATCH_ITEMS: usize = 64;

#[derive(Debug, Deserialize)]
pub struct BatchItem {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(alias = "action")]
    pub operation: Operation,
    #[serde(default = "empty_payload")]
    pub payload: Value,
}

#[derive(Debug, Deserialize)]
pub struct LookupPayload {
    /// Name or `*` pattern. Absent means every entity.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub exact: bool,
    #[serde(flatten)]
    pub page: PageArgs,
}

#[derive(Debug, Deserialize)]
pub struct InstancesPayload {
    /// Qualified class name, e.g. `Data.Functor.Functor`.
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub module: Option<String>,
    #[serde(flatten)]
    pub page: PageArgs,
}

#[derive(Debug, Deserialize)]
pub struct CallGraphPayload {
    pub function: Value,
    #[serde(default = "default_depth")]
    pub depth: usize,
    #[serde(default)]
    pub direction: Option<String>,
}

fn default_depth() -> usize {
    1
}

#[derive(Debug, Deserialize)]
pub struct TypeGraphPayload {
    #[serde(rename = "type", alias = "type_ref")]
    pub ty: Value,
    #[serde(default)]
    pub include_dependents: bool,
    #[serde(default)]
    pub depth: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ClosurePayload {
    pub source: Value,
    pub target: Value,
    #[serde(flatten)]
    pub page: PageArgs,
}

#[derive(Debug, Deserialize)]
pub struct ImportGraphPayload {
    pub module: Value,
    #[serde(default = "default_depth")]
    pub depth: usize,
    #[serde(default)]
    pub direction: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FunctionPagePayload {
    pub function: Value,
    #[serde(flatten)]
    pub page: PageArgs,
}

#[derive(Debug, Deserialize)]
pub struct ScopePayload {
    #[serde(default)]
    pub module: Option<String>,
    #[serde(flatten)]
    pub page: PageArgs,
}

#[derive(Debug, Deserialize)]
pub struct ModulePayload {
    pub module: Value,
}

#[derive(Debug, Deserialize)]
pub struct FunctionPayload {
    pub function: Value,
}

#[derive(Debug, Deserialize)]
pub struct DependenciesPayload {
    #[serde(default, alias = "module_pattern")]
    pub module: Option<String>,
    #[serde(default = "default_min_calls")]
    pub threshold: u64,
    #[serde(flatten)]
    pub page: PageArgs,
}

fn default_min_calls() -> u64 {
    1
}

#[derive(Debug, Deserialize)]
pub struct ContextPayload {
    pub function: Value,
    #[serde(default = "default_include")]
    pub include_local: bool,
    #[serde(default = "default_include")]
    pub include_external: bool,
}

fn default_include() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct ComplexityReportPayload {
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub min_complexity: u32,
    #[serde(flatten)]
    pub page: PageArgs,
}

#[derive(Debug, Deserialize)]
pub struct SimilarPayload {
    pub function: Value,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(flatten)]
    pub page: PageArgs,
}

fn default_threshold() -> f64 {
    codefacts_analysis::DEFAULT_THRESHOLD
}

#[derive(Debug, Deserialize)]
pub struct GroupPayload {
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default = "default_group_size")]
    pub min_group_size: usize,
    #[serde(flatten)]
    pub page: PageArgs,
}

fn default_group_size() -> usize {
    2
}

#[derive(Debug, Deserialize)]
pub struct PatternsPayload {
    #[serde(default)]
    pub module: Option<String>,
    pub pattern: Value,
    #[serde(flatten)]
    pub page: PageArgs,
}

#[derive(Debug, Deserialize)]
pub struct CallPatternPayload {
    pub caller: String,
    pub callee: String,
    #[serde(flatten)]
    pub page: PageArgs,
}

#[derive(Debug, Deserialize)]
pub struct LocationPayload {
    pub module: Value,
    pub line: u32,
    #[serde(default)]
    pub col: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct RawQueryPayload {
    pub sql: String,
    #[serde(default)]
    pub params: Value,
    #[serde(flatten)]
    pub page: PageArgs,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn operation_names_round_trip_through_serde() {
        for op in Operation::ALL {
            let parsed: Operation = serde_json::from_value(json!(op.as_str())).unwrap();
            assert_eq!(parsed, *op);
        }
    }

    #[test]
    fn payload_defaults() {
        let request: QueryRequest =
            serde_json::from_value(json!({"operation": "call_graph", "payload": {"function": "A.f"}}))
                .unwrap();
        let payload: CallGraphPayload = parse_payload(request.operation, request.payload).unwrap();
        assert_eq!(payload.depth, 1);
        assert!(payload.direction.is_none());

        let bare: QueryRequest = serde_json::from_value(json!({"action": "code_statistics"})).unwrap();
        assert_eq!(bare.operation, Operation::CodeStatistics);
        assert!(bare.payload.is_object());

        let deps: DependenciesPayload =
            parse_payload(Operation::CrossModuleDependencies, json!({"module_pattern": "Data"})).unwrap();
        assert_eq!(deps.threshold, 1);
        assert_eq!(deps.module.as_deref(), Some("Data"));

        let context: ContextPayload =
            parse_payload(Operation::FunctionContext, json!({"function": "A.f"})).unwrap();
        assert!(context.include_local && context.include_external);
    }

    #[test]
    fn missing_required_fields_are_invalid_queries() {
        let err = parse_payload::<CallGraphPayload>(Operation::CallGraph, json!({})).unwrap_err();
        assert!(matches!(err, QueryError::InvalidQuery(_)));
    }
}
