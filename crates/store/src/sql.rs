//! Small helpers for building parameterized `WHERE` clauses and for turning
//! arbitrary result rows into JSON.

use codefacts_protocol::{Listing, NamePattern, Page};
use rusqlite::types::{Value, ValueRef};
use serde::Serialize;

/// Name and module constraints shared by every entity search.
#[derive(Debug, Clone, Default)]
pub struct NameFilter {
    /// Local name. Substring search unless `exact` is set; `*` is a wildcard.
    pub name: Option<NamePattern>,
    /// Owning module. Exact unless it contains `*`.
    pub module: Option<NamePattern>,
    pub exact: bool,
}

impl NameFilter {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(NamePattern::new(name)),
            ..Self::default()
        }
    }

    pub fn exact(name: impl Into<String>) -> Self {
        Self {
            name: Some(NamePattern::new(name)),
            exact: true,
            ..Self::default()
        }
    }

    pub fn in_module(mut self, module: Option<&NamePattern>) -> Self {
        self.module = module.cloned();
        self
    }
}

/// Accumulates `WHERE` conditions and their bound values.
#[derive(Debug, Default)]
pub(crate) struct Conditions {
    clauses: Vec<String>,
    pub(crate) args: Vec<Value>,
}

impl Conditions {
    pub(crate) fn push(&mut self, clause: impl Into<String>, args: impl IntoIterator<Item = Value>) {
        self.clauses.push(clause.into());
        self.args.extend(args);
    }

    /// `column` contains the pattern text, or matches it as a glob when it has `*`.
    pub(crate) fn search(&mut self, column: &str, pattern: &NamePattern) {
        if pattern.is_empty() {
            return;
        }
        self.push(
            format!("{column} LIKE ? ESCAPE '\\'"),
            [Value::Text(pattern.to_like())],
        );
    }

    /// `column` equals the pattern text, or matches it as a glob when it has `*`.
    pub(crate) fn scope(&mut self, column: &str, pattern: &NamePattern) {
        if pattern.is_empty() {
            return;
        }
        if pattern.has_wildcard() {
            self.search(column, pattern);
        } else {
            self.push(
                format!("{column} = ?"),
                [Value::Text(pattern.as_str().to_string())],
            );
        }
    }

    pub(crate) fn apply(&mut self, filter: &NameFilter, module_column: &str, name_column: &str) {
        if let Some(name) = &filter.name {
            if filter.exact {
                self.push(
                    format!("{name_column} = ?"),
                    [Value::Text(name.as_str().to_string())],
                );
            } else {
                self.search(name_column, name);
            }
        }
        if let Some(module) = &filter.module {
            self.scope(module_column, module);
        }
    }

    pub(crate) fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    /// Append `LIMIT probe OFFSET offset` arguments for `page`.
    pub(crate) fn paginate(&mut self, page: Page) -> &'static str {
        self.args.push(Value::Integer(page.probe_len() as i64));
        self.args.push(Value::Integer(page.offset as i64));
        " LIMIT ? OFFSET ?"
    }
}

/// Parameters for an ad-hoc statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SqlParams {
    #[default]
    None,
    Positional(Vec<Value>),
    /// Names include their prefix character, e.g. `:module`.
    Named(Vec<(String, Value)>),
}

/// Result of an ad-hoc statement: column names plus one JSON object per row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowSet {
    pub columns: Vec<String>,
    #[serde(flatten)]
    pub rows: Listing<serde_json::Value>,
}

pub(crate) fn value_to_json(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ValueRef::Text(bytes) => serde_json::Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => {
            serde_json::Value::String(bytes.iter().map(|b| format!("{b:02x}")).collect())
        }
    }
}

/// Convert a JSON scalar into a bindable value. Arrays and objects are rejected.
pub fn json_to_value(value: &serde_json::Value) -> Option<Value> {
    match value {
        serde_json::Value::Null => Some(Value::Null),
        serde_json::Value::Bool(b) => Some(Value::Integer(i64::from(*b))),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(Value::Integer)
            .or_else(|| n.as_f64().map(Value::Real)),
        serde_json::Value::String(s) => Some(Value::Text(s.clone())),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn scope_is_exact_without_wildcard() {
        let mut conditions = Conditions::default();
        conditions.scope("f.module", &NamePattern::new("A"));
        conditions.scope("f.name", &NamePattern::new("go*"));
        assert_eq!(
            conditions.where_sql(),
            " WHERE f.module = ? AND f.name LIKE ? ESCAPE '\\'"
        );
        assert_eq!(
            conditions.args,
            vec![Value::Text("A".into()), Value::Text("go%".into())]
        );
    }

    #[test]
    fn empty_patterns_add_nothing() {
        let mut conditions = Conditions::default();
        conditions.search("name", &NamePattern::new("*"));
        assert_eq!(conditions.where_sql(), "");
    }

    #[test]
    fn json_scalars_bind_and_containers_do_not() {
        assert_eq!(json_to_value(&serde_json::json!(3)), Some(Value::Integer(3)));
        assert_eq!(json_to_value(&serde_json::json!(true)), Some(Value::Integer(1)));
        assert_eq!(json_to_value(&serde_json::json!([1])), None);
    }
}
