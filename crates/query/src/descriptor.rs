//! Structured query descriptors compiled into parameterized `SELECT`s.
//!
//! Column expressions only ever come from the per-target tables below; every
//! caller-supplied value is bound. Validation happens completely before any
//! statement is prepared.

use crate::error::{QueryError, Result};
use codefacts_protocol::name_pattern::escape_like;
use codefacts_store::{json_to_value, SqlValue};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    Function,
    Module,
    Type,
    Class,
    Import,
    Instance,
}

struct TargetSpec {
    from: &'static str,
    fields: &'static [(&'static str, &'static str)],
    order_by: &'static str,
}

const FUNCTION_FIELDS: &[(&str, &str)] = &[
    ("id", "f.id"),
    ("module", "f.module"),
    ("name", "f.name"),
    ("signature", "f.signature"),
    ("arity", "f.arity"),
    ("branches", "f.branches"),
    ("match_depth", "f.match_depth"),
    ("start_line", "f.start_line"),
    ("end_line", "f.end_line"),
    ("parent_id", "f.parent_id"),
    ("calls", "(SELECT COUNT(*) FROM call_edges e WHERE e.caller_id = f.id)"),
    ("callers", "(SELECT COUNT(*) FROM call_edges e WHERE e.callee_id = f.id)"),
];

const MODULE_FIELDS: &[(&str, &str)] = &[
    ("id", "m.id"),
    ("name", "m.name"),
    ("path", "m.path"),
    ("functions", "(SELECT COUNT(*) FROM functions f WHERE f.module_id = m.id)"),
    ("types", "(SELECT COUNT(*) FROM types t WHERE t.module_id = m.id)"),
    ("imports", "(SELECT COUNT(*) FROM imports im WHERE im.module_id = m.id)"),
];

const TYPE_FIELDS: &[(&str, &str)] = &[
    ("id", "t.id"),
    ("module", "t.module"),
    ("name", "t.name"),
    ("kind", "t.kind"),
    ("start_line", "t.start_line"),
    ("end_line", "t.end_line"),
    ("constructors", "(SELECT COUNT(*) FROM constructors c WHERE c.type_id = t.id)"),
];

const CLASS_FIELDS: &[(&str, &str)] = &[
    ("id", "c.id"),
    ("module", "c.module"),
    ("name", "c.name"),
    ("start_line", "c.start_line"),
    ("end_line", "c.end_line"),
    ("methods", "(SELECT COUNT(*) FROM class_methods cm WHERE cm.class_id = c.id)"),
];

const IMPORT_FIELDS: &[(&str, &str)] = &[
    ("id", "im.id"),
    ("module", "im.module"),
    ("imported_module", "im.imported_module"),
    ("alias", "im.alias"),
    ("qualified", "im.qualified"),
    ("hiding", "im.hiding"),
    ("package", "im.package"),
    ("line", "im.line"),
];

const INSTANCE_FIELDS: &[(&str, &str)] = &[
    ("id", "i.id"),
    ("module", "i.module"),
    ("class_module", "i.class_module"),
    ("class_name", "i.class_name"),
    ("type_module", "i.type_module"),
    ("type_name", "i.type_name"),
];

impl Target {
    fn spec(self) -> TargetSpec {
        match self {
            Target::Function => TargetSpec {
                from: "functions f",
                fields: FUNCTION_FIELDS,
                order_by: "f.module, f.name",
            },
            Target::Module => TargetSpec {
                from: "modules m",
                fields: MODULE_FIELDS,
                order_by: "m.name",
            },
            Target::Type => TargetSpec {
                from: "types t",
                fields: TYPE_FIELDS,
                order_by: "t.module, t.name",
            },
            Target::Class => TargetSpec {
                from: "classes c",
                fields: CLASS_FIELDS,
                order_by: "c.module, c.name",
            },
            Target::Import => TargetSpec {
                from: "imports im",
                fields: IMPORT_FIELDS,
                order_by: "im.module, im.imported_module, im.line",
            },
            Target::Instance => TargetSpec {
                from: "instances i",
                fields: INSTANCE_FIELDS,
                order_by: "i.module, i.class_module, i.class_name, i.type_module, i.type_name",
            },
        }
    }

    pub const ALL: &'static [Target] = &[
        Target::Function,
        Target::Module,
        Target::Type,
        Target::Class,
        Target::Import,
        Target::Instance,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Target::Function => "function",
            Target::Module => "module",
            Target::Type => "type",
            Target::Class => "class",
            Target::Import => "import",
            Target::Instance => "instance",
        }
    }

    pub fn field_names(self) -> Vec<&'static str> {
        self.spec().fields.iter().map(|(name, _)| *name).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    Like,
    Ilike,
    Contains,
    Startswith,
    Endswith,
    In,
    NotIn,
    Between,
    IsNull,
    NotNull,
}

pub const OPERATORS: &[&str] = &[
    "eq", "ne", "gt", "lt", "ge", "le", "like", "ilike", "contains", "startswith", "endswith",
    "in", "not_in", "between", "is_null", "not_null",
];

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Condition {
    pub field: String,
    /// Kept as text so an unknown operator reports a clear message.
    #[serde(alias = "operator")]
    pub op: String,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderBy {
    pub field: String,
    #[serde(default)]
    pub desc: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StructuredQuery {
    pub target: Target,
    #[serde(default, alias = "where")]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub order_by: Vec<OrderBy>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

/// A validated statement ready to run.
#[derive(Debug, Clone, PartialEq)]
pub struct Compiled {
    pub sql: String,
    pub args: Vec<SqlValue>,
}

fn parse_operator(raw: &str) -> Result<Operator> {
    serde_json::from_value(Value::String(raw.trim().to_ascii_lowercase())).map_err(|_| {
        QueryError::invalid(format!(
            "unsupported operator {raw:?} (expected one of {})",
            OPERATORS.join(", ")
        ))
    })
}

fn scalar(value: &Value, field: &str) -> Result<SqlValue> {
    match value {
        Value::Null => Err(QueryError::invalid(format!("condition on `{field}` needs a value"))),
        other => json_to_value(other)
            .ok_or_else(|| QueryError::invalid(format!("value for `{field}` must be a scalar"))),
    }
}

fn text(value: &Value, field: &str) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(QueryError::invalid(format!("value for `{field}` must be a string"))),
    }
}

fn list(value: &Value, field: &str) -> Result<Vec<SqlValue>> {
    let items = value
        .as_array()
        .filter(|items| !items.is_empty())
        .ok_or_else(|| QueryError::invalid(format!("value for `{field}` must be a non-empty array")))?;
    items.iter().map(|item| scalar(item, field)).collect()
}

impl StructuredQuery {
    pub fn from_json(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| QueryError::invalid(format!("bad descriptor: {e}")))
    }

    /// Check every field and operator and build the statement.
    pub fn compile(&self) -> Result<Compiled> {
        let spec = self.target.spec();
        let column = |field: &str| -> Result<&'static str> {
            spec.fields
                .iter()
                .find(|(name, _)| *name == field)
                .map(|(_, column)| *column)
                .ok_or_else(|| {
                    QueryError::invalid(format!(
                        "unsupported field `{field}` for target {} (allowed: {})",
                        self.target.as_str(),
                        self.target.field_names().join(", ")
                    ))
                })
        };

        let mut clauses = Vec::new();
        let mut args = Vec::new();
        for condition in &self.conditions {
            let col = column(&condition.field)?;
            let field = condition.field.as_str();
            let value = &condition.value;
            let op = parse_operator(&condition.op)?;
            let clause = match op {
                Operator::Eq => binary(col, "=", scalar(value, field)?, &mut args),
                Operator::Ne => binary(col, "<>", scalar(value, field)?, &mut args),
                Operator::Gt => binary(col, ">", scalar(value, field)?, &mut args),
                Operator::Lt => binary(col, "<", scalar(value, field)?, &mut args),
                Operator::Ge => binary(col, ">=", scalar(value, field)?, &mut args),
                Operator::Le => binary(col, "<=", scalar(value, field)?, &mut args),
                Operator::Like => {
                    args.push(SqlValue::Text(text(value, field)?));
                    format!("{col} LIKE ?")
                }
                Operator::Ilike => {
                    args.push(SqlValue::Text(text(value, field)?));
                    format!("LOWER({col}) LIKE LOWER(?)")
                }
                Operator::Contains => {
                    args.push(SqlValue::Text(format!("%{}%", escape_like(&text(value, field)?))));
                    format!("{col} LIKE ? ESCAPE '\\'")
                }
                Operator::Startswith => {
                    args.push(SqlValue::Text(format!("{}%", escape_like(&text(value, field)?))));
                    format!("{col} LIKE ? ESCAPE '\\'")
                }
                Operator::Endswith => {
                    args.push(SqlValue::Text(format!("%{}", escape_like(&text(value, field)?))));
                    format!("{col} LIKE ? ESCAPE '\\'")
                }
                Operator::In | Operator::NotIn => {
                    let values = list(value, field)?;
                    let marks = vec!["?"; values.len()].join(", ");
                    args.extend(values);
                    let not = if op == Operator::NotIn { "NOT " } else { "" };
                    format!("{col} {not}IN ({marks})")
                }
                Operator::Between => {
                    let bounds = list(value, field)?;
                    if bounds.len() != 2 {
                        return Err(QueryError::invalid(format!(
                            "`between` on `{field}` needs exactly two bounds"
                        )));
                    }
                    args.extend(bounds);
                    format!("{col} BETWEEN ? AND ?")
                }
                Operator::IsNull => format!("{col} IS NULL"),
                Operator::NotNull => format!("{col} IS NOT NULL"),
            };
            clauses.push(clause);
        }

        let mut order = Vec::new();
        for key in &self.order_by {
            let col = column(&key.field)?;
            order.push(format!("{col}{}", if key.desc { " DESC" } else { "" }));
        }
        order.push(spec.order_by.to_string());

        let select = spec
            .fields
            .iter()
            .map(|(name, column)| format!("{column} AS {name}"))
            .collect::<Vec<_>>()
            .join(", ");
        let mut sql = format!("SELECT {select} FROM {}", spec.from);
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY ");
        sql.push_str(&order.join(", "));
        Ok(Compiled { sql, args })
    }
}

fn binary(column: &str, op: &str, value: SqlValue, args: &mut Vec<SqlValue>) -> String {
    args.push(value);
    format!("{column} {op} ?")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn compile(value: Value) -> Result<Compiled> {
        StructuredQuery::from_json(value)?.compile()
    }

    #[test]
    fn compiles_bound_conditions() {
        let compiled = compile(json!({
            "target": "function",
            "conditions": [
                {"field": "module", "op": "eq", "value": "A"},
                {"field": "arity", "op": "between", "value": [1, 3]},
                {"field": "name", "op": "startswith", "value": "get_"}
            ]
        }))
        .unwrap();
        assert!(compiled.sql.contains("f.module = ?"));
        assert!(compiled.sql.contains("f.arity BETWEEN ? AND ?"));
        assert!(compiled.sql.ends_with("ORDER BY f.module, f.name"));
        assert_eq!(
            compiled.args,
            vec![
                SqlValue::Text("A".into()),
                SqlValue::Integer(1),
                SqlValue::Integer(3),
                SqlValue::Text("get\\_%".into()),
            ]
        );
    }

    #[test]
    fn values_never_reach_the_sql_text() {
        let compiled = compile(json!({
            "target": "module",
            "conditions": [{"field": "name", "op": "eq", "value": "x'; DROP TABLE modules; --"}]
        }))
        .unwrap();
        assert!(!compiled.sql.contains("DROP"));
    }

    #[test]
    fn unsupported_operator_is_rejected() {
        let err = compile(json!({
            "target": "function",
            "conditions": [{"field": "name", "op": "regex", "value": ".*"}]
        }))
        .unwrap_err();
        assert!(err.to_string().contains("unsupported operator"));
    }

    #[test]
    fn unsupported_field_and_target_are_rejected() {
        assert!(compile(json!({
            "target": "type",
            "conditions": [{"field": "arity", "op": "eq", "value": 1}]
        }))
        .is_err());
        assert!(compile(json!({"target": "call_edge"})).is_err());
        assert!(compile(json!({
            "target": "function",
            "order_by": [{"field": "name; DROP TABLE functions"}]
        }))
        .is_err());
    }

    #[test]
    fn list_operators_need_arrays() {
        assert!(compile(json!({
            "target": "import",
            "conditions": [{"field": "imported_module", "op": "in", "value": "B"}]
        }))
        .is_err());
        let compiled = compile(json!({
            "target": "import",
            "conditions": [{"field": "imported_module", "op": "not_in", "value": ["B", "C"]}]
        }))
        .unwrap();
        assert!(compiled.sql.contains("im.imported_module NOT IN (?, ?)"));
    }

    #[test]
    fn null_checks_take_no_value() {
        let compiled = compile(json!({
            "target": "function",
            "conditions": [{"field": "parent_id", "op": "not_null"}]
        }))
        .unwrap();
        assert!(compiled.sql.contains("f.parent_id IS NOT NULL"));
        assert!(compiled.args.is_empty());
    }
}
