use anyhow::Result;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub mod name_pattern;

pub use name_pattern::NamePattern;

pub const RESPONSE_SCHEMA_VERSION: u32 = 1;

/// Default page size when the caller does not pass `limit`.
pub const DEFAULT_LIMIT: usize = 100;

/// Hard ceiling on rows returned by any operation, regardless of the caller's limit.
pub const MAX_RESULTS: usize = 1_000;

/// Hard ceiling on traversal depth for every graph operation.
pub const MAX_DEPTH: usize = 10;

/// Failure kinds surfaced to callers.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
pub enum ErrorKind {
    IngestionFormatError,
    IngestionPartialWarning,
    NotFoundError,
    InvalidQueryError,
    ResultTooLargeError,
    StoreUnavailableError,
    InternalError,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorKind::IngestionFormatError => "IngestionFormatError",
            ErrorKind::IngestionPartialWarning => "IngestionPartialWarning",
            ErrorKind::NotFoundError => "NotFoundError",
            ErrorKind::InvalidQueryError => "InvalidQueryError",
            ErrorKind::ResultTooLargeError => "ResultTooLargeError",
            ErrorKind::StoreUnavailableError => "StoreUnavailableError",
            ErrorKind::InternalError => "InternalError",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, JsonSchema)]
pub struct ErrorEnvelope {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorEnvelope {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Explicit marker attached to an otherwise empty result when the referenced entity is absent.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, JsonSchema)]
pub struct NotFound {
    pub kind: ErrorKind,
    pub entity: String,
    pub key: String,
}

impl NotFound {
    pub fn new(entity: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::NotFoundError,
            entity: entity.into(),
            key: key.into(),
        }
    }
}

/// Result-size bounds enforced by the engine.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
pub struct Limits {
    pub default_limit: usize,
    pub max_results: usize,
    pub max_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_LIMIT,
            max_results: MAX_RESULTS,
            max_depth: MAX_DEPTH,
        }
    }
}

impl Limits {
    /// Resolve caller-supplied pagination against these limits.
    ///
    /// A missing limit becomes `default_limit`; anything above `max_results`
    /// is clamped and the page remembers that it was.
    pub fn page(&self, limit: Option<usize>, offset: Option<usize>) -> Page {
        let requested = limit.unwrap_or(self.default_limit).max(1);
        let clamped = requested > self.max_results;
        Page {
            limit: requested.min(self.max_results),
            offset: offset.unwrap_or(0),
            limit_clamped: clamped,
        }
    }

    pub fn depth(&self, depth: usize) -> (usize, bool) {
        if depth > self.max_depth {
            (self.max_depth, true)
        } else {
            (depth, false)
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
    #[serde(default)]
    pub limit_clamped: bool,
}

impl Page {
    pub fn new(limit: usize, offset: usize) -> Self {
        Self {
            limit: limit.max(1),
            offset,
            limit_clamped: false,
        }
    }

    /// Rows to fetch so truncation can be detected without a count query.
    pub fn probe_len(&self) -> usize {
        self.limit + 1
    }
}

impl Default for Page {
    fn default() -> Self {
        Limits::default().page(None, None)
    }
}

/// A bounded list of entities.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub struct Listing<T> {
    pub items: Vec<T>,
    pub limit: usize,
    pub offset: usize,
    pub truncated: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub limit_clamped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_found: Option<NotFound>,
}

impl<T> Listing<T> {
    /// Build a listing from rows fetched with `Page::probe_len`.
    pub fn from_probe(mut items: Vec<T>, page: Page) -> Self {
        let truncated = items.len() > page.limit;
        items.truncate(page.limit);
        Self {
            items,
            limit: page.limit,
            offset: page.offset,
            truncated,
            limit_clamped: page.limit_clamped,
            not_found: None,
        }
    }

    /// Build a listing from an already materialized, already ordered result set.
    pub fn paginate(items: Vec<T>, page: Page) -> Self {
        let total = items.len();
        let items: Vec<T> = items
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .collect();
        let truncated = page.offset.saturating_add(items.len()) < total;
        Self {
            items,
            limit: page.limit,
            offset: page.offset,
            truncated,
            limit_clamped: page.limit_clamped,
            not_found: None,
        }
    }

    pub fn not_found(page: Page, marker: NotFound) -> Self {
        Self {
            items: Vec::new(),
            limit: page.limit,
            offset: page.offset,
            truncated: false,
            limit_clamped: page.limit_clamped,
            not_found: Some(marker),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Listing<U> {
        Listing {
            items: self.items.into_iter().map(f).collect(),
            limit: self.limit,
            offset: self.offset,
            truncated: self.truncated,
            limit_clamped: self.limit_clamped,
            not_found: self.not_found,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Ok,
    Error,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, JsonSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_generation: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Envelope every operation returns to the transport layer.
#[derive(Debug, Serialize, Deserialize, Clone, JsonSchema)]
pub struct Response {
    pub schema_version: u32,
    pub status: ResponseStatus,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorEnvelope>,
    #[serde(default)]
    pub meta: ResponseMeta,
}

impl Response {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            schema_version: RESPONSE_SCHEMA_VERSION,
            status: ResponseStatus::Ok,
            data,
            error: None,
            meta: ResponseMeta::default(),
        }
    }

    pub fn error(error: ErrorEnvelope) -> Self {
        Self {
            schema_version: RESPONSE_SCHEMA_VERSION,
            status: ResponseStatus::Error,
            data: serde_json::Value::Null,
            error: Some(error),
            meta: ResponseMeta::default(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.status, ResponseStatus::Error)
    }
}

pub fn serialize_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(Into::into)
}

/// JSON Schema of the response envelope, published through `capabilities`.
pub fn response_schema() -> serde_json::Value {
    serde_json::to_value(schemars::schema_for!(Response)).unwrap_or(serde_json::Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn page_clamps_to_hard_cap() {
        let limits = Limits::default();
        let page = limits.page(Some(50_000), None);
        assert_eq!(page.limit, MAX_RESULTS);
        assert!(page.limit_clamped);

        let page = limits.page(None, Some(7));
        assert_eq!(page.limit, DEFAULT_LIMIT);
        assert_eq!(page.offset, 7);
        assert!(!page.limit_clamped);
    }

    #[test]
    fn listing_from_probe_flags_truncation() {
        let page = Page::new(2, 0);
        let listing = Listing::from_probe(vec![1, 2, 3], page);
        assert_eq!(listing.items, vec![1, 2]);
        assert!(listing.truncated);

        let listing = Listing::from_probe(vec![1, 2], page);
        assert!(!listing.truncated);
    }

    #[test]
    fn paginate_skips_offset() {
        let listing = Listing::paginate(vec![1, 2, 3, 4, 5], Page::new(2, 2));
        assert_eq!(listing.items, vec![3, 4]);
        assert!(listing.truncated);

        let tail = Listing::paginate(vec![1, 2, 3, 4, 5], Page::new(2, 4));
        assert_eq!(tail.items, vec![5]);
        assert!(!tail.truncated);
    }

    #[test]
    fn depth_is_capped() {
        let limits = Limits::default();
        assert_eq!(limits.depth(3), (3, false));
        assert_eq!(limits.depth(10_000), (MAX_DEPTH, true));
    }

    #[test]
    fn response_schema_describes_the_envelope() {
        let schema = response_schema();
        let properties = schema["properties"].as_object().expect("object schema");
        for field in ["schema_version", "status", "data", "error", "meta"] {
            assert!(properties.contains_key(field), "missing {field}");
        }
    }

    #[test]
    fn error_kind_serializes_by_name() {
        let raw = serde_json::to_string(&ErrorKind::InvalidQueryError).unwrap();
        assert_eq!(raw, "\"InvalidQueryError\"");
        assert_eq!(ErrorKind::NotFoundError.as_str(), "NotFoundError");
    }
}
