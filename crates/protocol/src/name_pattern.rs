use serde::{Deserialize, Serialize};

/// Escape character used in every generated `LIKE ... ESCAPE` clause.
pub const LIKE_ESCAPE: char = '\\';

/// Case-insensitive name pattern.
///
/// `*` is the only wildcard. A pattern without `*` is a substring match,
/// a pattern with `*` is anchored at both ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamePattern {
    raw: String,
}

impl NamePattern {
    pub fn new(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into().trim().to_string(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty() || self.raw.chars().all(|c| c == '*')
    }

    pub fn has_wildcard(&self) -> bool {
        self.raw.contains('*')
    }

    /// SQL `LIKE` operand, to be used with `ESCAPE '\'`.
    pub fn to_like(&self) -> String {
        let escaped = escape_like(&self.raw);
        if self.has_wildcard() {
            escaped.replace('*', "%")
        } else {
            format!("%{escaped}%")
        }
    }

    /// In-memory equivalent of `to_like` for filtering materialized rows.
    pub fn matches(&self, name: &str) -> bool {
        if self.is_empty() {
            return true;
        }
        if !self.has_wildcard() {
            return name.to_lowercase().contains(&self.raw.to_lowercase());
        }

        let glob_source = self
            .raw
            .split('*')
            .map(glob::Pattern::escape)
            .collect::<Vec<_>>()
            .join("*");
        let options = glob::MatchOptions {
            case_sensitive: false,
            require_literal_separator: false,
            require_literal_leading_dot: false,
        };
        glob::Pattern::new(&glob_source)
            .map(|p| p.matches_with(name, options))
            .unwrap_or(false)
    }
}

impl From<&str> for NamePattern {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Escape `%`, `_` and the escape character itself so user text is matched literally.
pub fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if ch == '%' || ch == '_' || ch == LIKE_ESCAPE {
            out.push(LIKE_ESCAPE);
        }
        out.push(ch);
    }
    out
}
