//! Ad-hoc read statements.
//!
//! A statement has to pass three gates before it runs: the leading verb must be
//! `SELECT` or `WITH`, the text must hold exactly one statement, and SQLite
//! must report the prepared statement as read-only. The session connection is
//! `query_only` on top of that.

use crate::error::{QueryError, Result};
use codefacts_store::{json_to_value, SqlParams};
use serde_json::Value;

pub const ALLOWED_VERBS: &[&str] = &["SELECT", "WITH"];

/// Skip whitespace, `-- line` and `/* block */` comments.
fn skip_trivia(sql: &str) -> &str {
    let mut rest = sql;
    loop {
        let trimmed = rest.trim_start();
        if let Some(after) = trimmed.strip_prefix("--") {
            rest = after.split_once('\n').map(|(_, tail)| tail).unwrap_or("");
        } else if let Some(after) = trimmed.strip_prefix("/*") {
            rest = after.split_once("*/").map(|(_, tail)| tail).unwrap_or("");
        } else {
            return trimmed;
        }
    }
}

/// Byte offset of the first `;` outside quotes and comments.
fn statement_end(sql: &str) -> Option<usize> {
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'\'' | b'"' | b'`') => {
                i += 1;
                while i < bytes.len() {
                    if bytes[i] == quote {
                        // Doubled quote is an escaped quote.
                        if bytes.get(i + 1) == Some(&quote) {
                            i += 2;
                            continue;
                        }
                        break;
                    }
                    i += 1;
                }
            }
            b'[' => {
                while i < bytes.len() && bytes[i] != b']' {
                    i += 1;
                }
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i += 2;
                while i + 1 < bytes.len() && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                    i += 1;
                }
                i += 1;
            }
            b';' => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}

/// Validate `sql` and return the single statement to prepare.
pub fn check_statement(sql: &str) -> Result<&str> {
    let body = skip_trivia(sql);
    if body.is_empty() {
        return Err(QueryError::invalid("empty statement"));
    }

    let verb: String = body
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_uppercase();
    if !ALLOWED_VERBS.contains(&verb.as_str()) {
        return Err(QueryError::invalid(format!(
            "only {} statements are allowed, got {}",
            ALLOWED_VERBS.join("/"),
            if verb.is_empty() { "nothing recognizable" } else { verb.as_str() }
        )));
    }

    match statement_end(body) {
        Some(end) => {
            if !skip_trivia(&body[end + 1..]).is_empty() {
                return Err(QueryError::invalid("only a single statement is allowed"));
            }
            Ok(body[..end].trim_end())
        }
        None => Ok(body.trim_end()),
    }
}

/// JSON array → positional, JSON object → named (`:` added when missing).
pub fn params_from_json(value: &Value) -> Result<SqlParams> {
    let convert = |v: &Value| {
        json_to_value(v).ok_or_else(|| QueryError::invalid("parameter values must be scalars"))
    };
    match value {
        Value::Null => Ok(SqlParams::None),
        Value::Array(items) if items.is_empty() => Ok(SqlParams::None),
        Value::Array(items) => Ok(SqlParams::Positional(
            items.iter().map(convert).collect::<Result<_>>()?,
        )),
        Value::Object(map) if map.is_empty() => Ok(SqlParams::None),
        Value::Object(map) => Ok(SqlParams::Named(
            map.iter()
                .map(|(name, v)| {
                    let name = if name.starts_with([':', '@', '$']) {
                        name.clone()
                    } else {
                        format!(":{name}")
                    };
                    Ok((name, convert(v)?))
                })
                .collect::<Result<_>>()?,
        )),
        _ => Err(QueryError::invalid("params must be an array or an object")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codefacts_store::SqlValue;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn accepts_select_and_with() {
        assert_eq!(check_statement("  select 1").unwrap(), "select 1");
        assert_eq!(
            check_statement("-- top callers\nWITH x AS (SELECT 1) SELECT * FROM x;  ").unwrap(),
            "WITH x AS (SELECT 1) SELECT * FROM x"
        );
        assert_eq!(check_statement("/* c */ SELECT ';' AS semi").unwrap(), "SELECT ';' AS semi");
    }

    #[test]
    fn rejects_write_verbs() {
        for sql in [
            "DELETE FROM functions",
            "insert into modules values (1, 'x', null)",
            "DROP TABLE modules",
            "PRAGMA query_only = OFF",
            "ATTACH 'x.db' AS x",
            "/* SELECT */ UPDATE functions SET name = 'x'",
        ] {
            let err = check_statement(sql).unwrap_err();
            assert!(matches!(err, QueryError::InvalidQuery(_)), "{sql}");
        }
    }

    #[test]
    fn rejects_stacked_statements() {
        assert!(check_statement("SELECT 1; DELETE FROM functions").is_err());
        assert!(check_statement("SELECT 1; -- trailing comment").is_ok());
        assert!(check_statement("SELECT 'a;b' FROM modules WHERE name = 'it''s; fine'").is_ok());
    }

    #[test]
    fn params_shapes() {
        assert_eq!(params_from_json(&json!(null)).unwrap(), SqlParams::None);
        assert_eq!(
            params_from_json(&json!([1, "A"])).unwrap(),
            SqlParams::Positional(vec![SqlValue::Integer(1), SqlValue::Text("A".into())])
        );
        assert_eq!(
            params_from_json(&json!({"module": "A"})).unwrap(),
            SqlParams::Named(vec![(":module".to_string(), SqlValue::Text("A".into()))])
        );
        assert!(params_from_json(&json!("A")).is_err());
        assert!(params_from_json(&json!([[1]])).is_err());
    }
}
