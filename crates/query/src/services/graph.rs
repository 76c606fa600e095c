use super::{scope, to_value, ReadContext};
use crate::error::Result;
use crate::refs::{entity_ref, module_name};
use crate::request::{
    parse_payload, CallGraphPayload, ClosurePayload, ContextPayload, DependenciesPayload,
    FunctionPagePayload, ImportGraphPayload, ModulePayload, Operation, ScopePayload,
    TypeGraphPayload,
};
use codefacts_graph::Direction;
use codefacts_protocol::NamePattern;
use serde_json::Value;

fn direction(raw: Option<&str>) -> Result<Direction> {
    Ok(match raw {
        Some(raw) => Direction::parse(raw)?,
        None => Direction::default(),
    })
}

pub(super) fn call_graph(op: Operation, payload: Value, ctx: &ReadContext<'_>) -> Result<Value> {
    let payload: CallGraphPayload = parse_payload(op, payload)?;
    let root = entity_ref(&payload.function, "function")?;
    let direction = direction(payload.direction.as_deref())?;
    log::debug!("call_graph root={root} depth={} direction={direction:?}", payload.depth);
    to_value(&ctx.graph().call_graph(&root, payload.depth, direction)?)
}

pub(super) fn type_dependency_graph(
    op: Operation,
    payload: Value,
    ctx: &ReadContext<'_>,
) -> Result<Value> {
    let payload: TypeGraphPayload = parse_payload(op, payload)?;
    let root = entity_ref(&payload.ty, "type")?;
    to_value(&ctx.graph().type_dependency_graph(
        &root,
        payload.include_dependents,
        payload.depth,
    )?)
}

pub(super) fn cross_module_closure(
    op: Operation,
    payload: Value,
    ctx: &ReadContext<'_>,
) -> Result<Value> {
    let payload: ClosurePayload = parse_payload(op, payload)?;
    let source = NamePattern::new(module_name(&payload.source, "source")?);
    let target = NamePattern::new(module_name(&payload.target, "target")?);
    let page = ctx.limits.page(payload.page.limit, payload.page.offset);
    to_value(&ctx.graph().cross_module_closure(&source, &target, page)?)
}

pub(super) fn import_graph(op: Operation, payload: Value, ctx: &ReadContext<'_>) -> Result<Value> {
    let payload: ImportGraphPayload = parse_payload(op, payload)?;
    let module = module_name(&payload.module, "module")?;
    let direction = direction(payload.direction.as_deref())?;
    to_value(&ctx.graph().import_graph(&module, payload.depth, direction)?)
}

pub(super) fn callers(op: Operation, payload: Value, ctx: &ReadContext<'_>) -> Result<Value> {
    let payload: FunctionPagePayload = parse_payload(op, payload)?;
    let root = entity_ref(&payload.function, "function")?;
    let page = ctx.limits.page(payload.page.limit, payload.page.offset);
    to_value(&ctx.graph().callers(&root, page)?)
}

pub(super) fn callees(op: Operation, payload: Value, ctx: &ReadContext<'_>) -> Result<Value> {
    let payload: FunctionPagePayload = parse_payload(op, payload)?;
    let root = entity_ref(&payload.function, "function")?;
    let page = ctx.limits.page(payload.page.limit, payload.page.offset);
    to_value(&ctx.graph().callees(&root, page)?)
}

pub(super) fn most_called(op: Operation, payload: Value, ctx: &ReadContext<'_>) -> Result<Value> {
    let payload: ScopePayload = parse_payload(op, payload)?;
    let module = scope(payload.module);
    let page = ctx.limits.page(payload.page.limit, payload.page.offset);
    to_value(&ctx.graph().most_called(module.as_ref(), page)?)
}

pub(super) fn module_dependencies(
    op: Operation,
    payload: Value,
    ctx: &ReadContext<'_>,
) -> Result<Value> {
    let payload: ModulePayload = parse_payload(op, payload)?;
    let module = module_name(&payload.module, "module")?;
    to_value(&ctx.graph().module_dependencies(&module)?)
}

pub(super) fn cross_module_dependencies(
    op: Operation,
    payload: Value,
    ctx: &ReadContext<'_>,
) -> Result<Value> {
    let payload: DependenciesPayload = parse_payload(op, payload)?;
    let module = scope(payload.module);
    let page = ctx.limits.page(payload.page.limit, payload.page.offset);
    to_value(&ctx.graph().cross_module_dependencies(module.as_ref(), payload.threshold, page)?)
}

pub(super) fn function_context(op: Operation, payload: Value, ctx: &ReadContext<'_>) -> Result<Value> {
    let payload: ContextPayload = parse_payload(op, payload)?;
    let root = entity_ref(&payload.function, "function")?;
    to_value(&ctx.graph().function_context(
        &root,
        payload.include_local,
        payload.include_external,
    )?)
}
