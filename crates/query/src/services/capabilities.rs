use crate::descriptor::{Target, OPERATORS};
use crate::raw::ALLOWED_VERBS;
use crate::request::{Operation, MAX_BATCH_ITEMS};
use codefacts_protocol::{response_schema, Limits, RESPONSE_SCHEMA_VERSION};
use codefacts_store::SCHEMA_VERSION;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Serialize)]
pub struct Capabilities {
    pub name: &'static str,
    pub version: &'static str,
    pub response_schema_version: u32,
    /// JSON Schema of every response envelope.
    pub response_schema: Value,
    pub store_schema_version: i64,
    pub operations: Vec<&'static str>,
    pub limits: Limits,
    pub max_batch_items: usize,
    pub structured_query: StructuredCapabilities,
    pub raw_query_verbs: &'static [&'static str],
}

#[derive(Debug, Serialize)]
pub struct StructuredCapabilities {
    /// Target → allowed fields.
    pub targets: BTreeMap<&'static str, Vec<&'static str>>,
    pub operators: &'static [&'static str],
}

pub(crate) fn capabilities(limits: Limits) -> Capabilities {
    Capabilities {
        name: "codefacts",
        version: env!("CARGO_PKG_VERSION"),
        response_schema_version: RESPONSE_SCHEMA_VERSION,
        response_schema: response_schema(),
        store_schema_version: SCHEMA_VERSION,
        operations: Operation::ALL.iter().map(|op| op.as_str()).collect(),
        limits,
        max_batch_items: MAX_BATCH_ITEMS,
        structured_query: StructuredCapabilities {
            targets: Target::ALL
                .iter()
                .map(|target| (target.as_str(), target.field_names()))
                .collect(),
            operators: OPERATORS,
        },
        raw_query_verbs: ALLOWED_VERBS,
    }
}
