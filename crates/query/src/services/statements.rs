use super::{to_value, ReadContext};
use crate::descriptor::StructuredQuery;
use crate::error::{QueryError, Result};
use crate::raw::{check_statement, params_from_json};
use crate::request::{parse_payload, Operation, RawQueryPayload};
use codefacts_store::{SqlParams, StoreError};
use serde_json::{json, Value};

pub(super) fn structured(payload: Value, ctx: &ReadContext<'_>) -> Result<Value> {
    let query = StructuredQuery::from_json(payload)?;
    let compiled = query.compile()?;
    let page = ctx.limits.page(query.limit, query.offset);
    log::debug!("structured query on {}: {}", query.target.as_str(), compiled.sql);

    let rows = ctx
        .session
        .query_rows(&compiled.sql, &SqlParams::Positional(compiled.args), page)?;
    let mut data = to_value(&rows)?;
    if let Value::Object(map) = &mut data {
        map.insert("target".to_string(), json!(query.target.as_str()));
    }
    Ok(data)
}

pub(super) fn raw(op: Operation, payload: Value, ctx: &ReadContext<'_>) -> Result<Value> {
    let payload: RawQueryPayload = parse_payload(op, payload)?;
    let statement = check_statement(&payload.sql)?;
    let params = params_from_json(&payload.params)?;
    let page = ctx.limits.page(payload.page.limit, payload.page.offset);

    let rows = ctx
        .session
        .query_rows(statement, &params, page)
        .map_err(|err| {
            // Syntax errors and unknown tables belong to the caller's statement.
            if matches!(err, StoreError::Sqlite(_)) && !err.is_unavailable() {
                QueryError::invalid(format!("statement failed: {err}"))
            } else {
                QueryError::Store(err)
            }
        })?;
    to_value(&rows)
}
