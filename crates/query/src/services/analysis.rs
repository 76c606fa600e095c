use super::{scope, to_value, ReadContext};
use crate::error::Result;
use crate::refs::{entity_ref, module_name};
use crate::request::{
    parse_payload, CallPatternPayload, ComplexityReportPayload, FunctionPayload, GroupPayload,
    LocationPayload, Operation, PatternsPayload, ScopePayload, SimilarPayload,
};
use codefacts_analysis::PatternSpec;
use codefacts_protocol::NamePattern;
use serde_json::Value;

pub(super) fn complexity(op: Operation, payload: Value, ctx: &ReadContext<'_>) -> Result<Value> {
    let payload: FunctionPayload = parse_payload(op, payload)?;
    let function = entity_ref(&payload.function, "function")?;
    to_value(&ctx.analysis().complexity(&function)?)
}

pub(super) fn complexity_report(
    op: Operation,
    payload: Value,
    ctx: &ReadContext<'_>,
) -> Result<Value> {
    let payload: ComplexityReportPayload = parse_payload(op, payload)?;
    let module = scope(payload.module);
    let page = ctx.limits.page(payload.page.limit, payload.page.offset);
    to_value(&ctx.analysis().complexity_report(module.as_ref(), payload.min_complexity, page)?)
}

pub(super) fn similar_functions(
    op: Operation,
    payload: Value,
    ctx: &ReadContext<'_>,
) -> Result<Value> {
    let payload: SimilarPayload = parse_payload(op, payload)?;
    let function = entity_ref(&payload.function, "function")?;
    let page = ctx.limits.page(payload.page.limit, payload.page.offset);
    to_value(&ctx.analysis().similar_functions(&function, payload.threshold, page)?)
}

pub(super) fn group_similar(op: Operation, payload: Value, ctx: &ReadContext<'_>) -> Result<Value> {
    let payload: GroupPayload = parse_payload(op, payload)?;
    let module = scope(payload.module);
    let page = ctx.limits.page(payload.page.limit, payload.page.offset);
    to_value(&ctx.analysis().group_similar_functions(
        module.as_ref(),
        payload.threshold,
        payload.min_group_size,
        page,
    )?)
}

pub(super) fn find_patterns(op: Operation, payload: Value, ctx: &ReadContext<'_>) -> Result<Value> {
    let payload: PatternsPayload = parse_payload(op, payload)?;
    let spec = PatternSpec::from_json(payload.pattern)?;
    let module = scope(payload.module);
    let page = ctx.limits.page(payload.page.limit, payload.page.offset);
    to_value(&ctx.analysis().find_patterns(module.as_ref(), &spec, page)?)
}

pub(super) fn unused_imports(op: Operation, payload: Value, ctx: &ReadContext<'_>) -> Result<Value> {
    let payload: ScopePayload = parse_payload(op, payload)?;
    let module = scope(payload.module);
    let page = ctx.limits.page(payload.page.limit, payload.page.offset);
    to_value(&ctx.analysis().find_unused_imports(module.as_ref(), page)?)
}

pub(super) fn match_call_pattern(
    op: Operation,
    payload: Value,
    ctx: &ReadContext<'_>,
) -> Result<Value> {
    let payload: CallPatternPayload = parse_payload(op, payload)?;
    let caller = NamePattern::new(payload.caller);
    let callee = NamePattern::new(payload.callee);
    let page = ctx.limits.page(payload.page.limit, payload.page.offset);
    to_value(&ctx.analysis().match_call_pattern(&caller, &callee, page)?)
}

pub(super) fn element_at(op: Operation, payload: Value, ctx: &ReadContext<'_>) -> Result<Value> {
    let payload: LocationPayload = parse_payload(op, payload)?;
    let module = module_name(&payload.module, "module")?;
    to_value(&ctx.analysis().element_at(&module, payload.line, payload.col)?)
}

pub(super) fn function_imports(op: Operation, payload: Value, ctx: &ReadContext<'_>) -> Result<Value> {
    let payload: FunctionPayload = parse_payload(op, payload)?;
    let function = entity_ref(&payload.function, "function")?;
    to_value(&ctx.analysis().function_imports(&function)?)
}
