use super::{scope, to_value, ReadContext};
use crate::error::{QueryError, Result};
use crate::request::{parse_payload, InstancesPayload, LookupPayload, Operation};
use codefacts_facts::NaturalKey;
use codefacts_protocol::{NamePattern, Page};
use codefacts_store::NameFilter;
use serde_json::Value;

fn filter(payload: LookupPayload, ctx: &ReadContext<'_>) -> (NameFilter, Page) {
    let page = ctx.limits.page(payload.page.limit, payload.page.offset);
    let filter = NameFilter {
        name: payload.name.map(NamePattern::new).filter(|p| !p.is_empty()),
        module: scope(payload.module),
        exact: payload.exact,
    };
    (filter, page)
}

pub(super) fn modules(op: Operation, payload: Value, ctx: &ReadContext<'_>) -> Result<Value> {
    let (filter, page) = filter(parse_payload(op, payload)?, ctx);
    to_value(&ctx.session.modules(&filter, page)?)
}

pub(super) fn functions(op: Operation, payload: Value, ctx: &ReadContext<'_>) -> Result<Value> {
    let (filter, page) = filter(parse_payload(op, payload)?, ctx);
    to_value(&ctx.session.functions(&filter, page)?)
}

pub(super) fn types(op: Operation, payload: Value, ctx: &ReadContext<'_>) -> Result<Value> {
    let (filter, page) = filter(parse_payload(op, payload)?, ctx);
    to_value(&ctx.session.types(&filter, page)?)
}

pub(super) fn classes(op: Operation, payload: Value, ctx: &ReadContext<'_>) -> Result<Value> {
    let (filter, page) = filter(parse_payload(op, payload)?, ctx);
    to_value(&ctx.session.classes(&filter, page)?)
}

/// `name` matches the imported module, `module` the importing one.
pub(super) fn imports(op: Operation, payload: Value, ctx: &ReadContext<'_>) -> Result<Value> {
    let (filter, page) = filter(parse_payload(op, payload)?, ctx);
    to_value(&ctx.session.imports(&filter, page)?)
}

pub(super) fn instances(op: Operation, payload: Value, ctx: &ReadContext<'_>) -> Result<Value> {
    let payload: InstancesPayload = parse_payload(op, payload)?;
    let class = payload
        .class
        .as_deref()
        .map(|raw| {
            NaturalKey::parse(raw).ok_or_else(|| {
                QueryError::invalid(format!("class {raw:?} must be qualified as Module.Class"))
            })
        })
        .transpose()?;
    let page = ctx.limits.page(payload.page.limit, payload.page.offset);
    let module = scope(payload.module);
    to_value(&ctx.session.instances(class.as_ref(), module.as_ref(), page)?)
}
