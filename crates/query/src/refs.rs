//! Parsing of entity references out of request payloads.
//!
//! Accepted shapes: a non-negative integer id, a `"Module.name"` string (split
//! at the last dot), or an object `{"module": .., "name": ..}` / `{"id": ..}`.
//! Anything else fails the whole request.

use crate::error::{QueryError, Result};
use codefacts_facts::{EntityRef, NaturalKey};
use serde_json::Value;

pub fn entity_ref(value: &Value, what: &str) -> Result<EntityRef> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .filter(|id| *id >= 0)
            .map(EntityRef::Id)
            .ok_or_else(|| QueryError::invalid(format!("{what} id must be a non-negative integer, got {n}"))),
        Value::String(text) => NaturalKey::parse(text).map(EntityRef::Key).ok_or_else(|| {
            QueryError::invalid(format!(
                "{what} reference {text:?} must be qualified as Module.name"
            ))
        }),
        Value::Object(map) => {
            if let Some(id) = map.get("id") {
                return entity_ref(id, what);
            }
            let field = |key: &str| {
                map.get(key)
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
            };
            match (field("module"), field("name")) {
                (Some(module), Some(name)) => Ok(EntityRef::Key(NaturalKey::new(module, name))),
                _ => Err(QueryError::invalid(format!(
                    "{what} reference object needs non-empty `module` and `name`"
                ))),
            }
        }
        Value::Null => Err(QueryError::invalid(format!("missing {what} reference"))),
        other => Err(QueryError::invalid(format!(
            "{what} reference has the wrong shape: {other}"
        ))),
    }
}

/// A module name: a non-empty string.
pub fn module_name(value: &Value, what: &str) -> Result<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .ok_or_else(|| QueryError::invalid(format!("{what} must be a non-empty module name")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn accepts_ids_keys_and_objects() {
        assert_eq!(entity_ref(&json!(42), "function").unwrap(), EntityRef::Id(42));
        assert_eq!(
            entity_ref(&json!("Data.Map.insert"), "function").unwrap(),
            EntityRef::Key(NaturalKey::new("Data.Map", "insert"))
        );
        assert_eq!(
            entity_ref(&json!({"module": "A", "name": "f"}), "function").unwrap(),
            EntityRef::Key(NaturalKey::new("A", "f"))
        );
        assert_eq!(entity_ref(&json!({"id": 3}), "type").unwrap(), EntityRef::Id(3));
    }

    #[test]
    fn rejects_wrong_shapes() {
        for bad in [json!(-1), json!(1.5), json!("f"), json!(true), json!([1]), json!({"name": "f"}), json!(null)] {
            let err = entity_ref(&bad, "function").unwrap_err();
            assert!(matches!(err, QueryError::InvalidQuery(_)), "{bad}");
        }
    }

    #[test]
    fn module_names_must_be_strings() {
        assert_eq!(module_name(&json!(" A "), "module").unwrap(), "A");
        assert!(module_name(&json!(""), "module").is_err());
        assert!(module_name(&json!(7), "module").is_err());
    }
}
