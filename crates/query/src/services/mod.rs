mod analysis;
mod capabilities;
mod graph;
mod lookup;
mod statements;

pub(crate) use capabilities::capabilities;
pub use capabilities::{Capabilities, StructuredCapabilities};

use crate::error::{QueryError, Result};
use crate::request::Operation;
use codefacts_analysis::{AnalysisEngine, ComplexityCache};
use codefacts_graph::GraphEngine;
use codefacts_protocol::{Limits, NamePattern};
use codefacts_store::ReadSession;
use serde::Serialize;
use serde_json::Value;

/// Everything a read operation may touch.
pub(crate) struct ReadContext<'s> {
    pub session: &'s ReadSession,
    pub limits: Limits,
    pub cache: &'s ComplexityCache,
}

impl<'s> ReadContext<'s> {
    pub fn graph(&self) -> GraphEngine<'s> {
        GraphEngine::new(self.session, self.limits)
    }

    pub fn analysis(&self) -> AnalysisEngine<'s> {
        AnalysisEngine::new(self.session, self.limits, self.cache)
    }
}

/// Dispatch one read operation against a pinned session.
pub(crate) fn route(operation: Operation, payload: Value, ctx: &ReadContext<'_>) -> Result<Value> {
    match operation {
        Operation::SnapshotInfo => to_value(ctx.session.snapshot_info()),

        Operation::FindModules => lookup::modules(operation, payload, ctx),
        Operation::FindFunctions => lookup::functions(operation, payload, ctx),
        Operation::FindTypes => lookup::types(operation, payload, ctx),
        Operation::FindClasses => lookup::classes(operation, payload, ctx),
        Operation::FindImports => lookup::imports(operation, payload, ctx),
        Operation::FindInstances => lookup::instances(operation, payload, ctx),

        Operation::CallGraph => graph::call_graph(operation, payload, ctx),
        Operation::TypeDependencyGraph => graph::type_dependency_graph(operation, payload, ctx),
        Operation::CrossModuleClosure => graph::cross_module_closure(operation, payload, ctx),
        Operation::ImportGraph => graph::import_graph(operation, payload, ctx),
        Operation::Callers => graph::callers(operation, payload, ctx),
        Operation::Callees => graph::callees(operation, payload, ctx),
        Operation::MostCalledFunctions => graph::most_called(operation, payload, ctx),
        Operation::ModuleDependencies => graph::module_dependencies(operation, payload, ctx),
        Operation::CrossModuleDependencies => graph::cross_module_dependencies(operation, payload, ctx),
        Operation::FunctionContext => graph::function_context(operation, payload, ctx),

        Operation::Complexity => analysis::complexity(operation, payload, ctx),
        Operation::ComplexityReport => analysis::complexity_report(operation, payload, ctx),
        Operation::SimilarFunctions => analysis::similar_functions(operation, payload, ctx),
        Operation::GroupSimilarFunctions => analysis::group_similar(operation, payload, ctx),
        Operation::FindPatterns => analysis::find_patterns(operation, payload, ctx),
        Operation::FindUnusedImports => analysis::unused_imports(operation, payload, ctx),
        Operation::MatchCallPattern => analysis::match_call_pattern(operation, payload, ctx),
        Operation::FindElementByLocation => analysis::element_at(operation, payload, ctx),
        Operation::FunctionImports => analysis::function_imports(operation, payload, ctx),
        Operation::CodeStatistics => to_value(&ctx.analysis().code_statistics()?),

        Operation::StructuredQuery => statements::structured(payload, ctx),
        Operation::RawQuery => statements::raw(operation, payload, ctx),

        Operation::Capabilities | Operation::Ingest | Operation::Batch => Err(QueryError::invalid(
            format!("{} is not a read operation", operation.as_str()),
        )),
    }
}

pub(crate) fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

/// Optional module scope; blank means unscoped.
pub(crate) fn scope(raw: Option<String>) -> Option<NamePattern> {
    raw.map(NamePattern::new).filter(|p| !p.is_empty())
}
