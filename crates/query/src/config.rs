use crate::error::{QueryError, Result};
use codefacts_protocol::{Limits, DEFAULT_LIMIT, MAX_DEPTH, MAX_RESULTS};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_DB_FILE: &str = ".codefacts/facts.db";

/// Everything the engine needs, passed in explicitly at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub db_path: PathBuf,
    /// Default dump directory for `ingest` when the request names none.
    pub facts_path: Option<PathBuf>,
    pub default_limit: usize,
    pub max_results: usize,
    pub max_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_FILE),
            facts_path: None,
            default_limit: DEFAULT_LIMIT,
            max_results: MAX_RESULTS,
            max_depth: MAX_DEPTH,
        }
    }
}

impl EngineConfig {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            ..Self::default()
        }
    }

    pub fn with_facts_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.facts_path = Some(path.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.db_path.as_os_str().is_empty() {
            return Err(QueryError::Config("db_path must not be empty".to_string()));
        }
        if self.default_limit == 0 || self.max_results == 0 {
            return Err(QueryError::Config(
                "default_limit and max_results must be at least 1".to_string(),
            ));
        }
        if self.default_limit > self.max_results {
            return Err(QueryError::Config(format!(
                "default_limit ({}) exceeds max_results ({})",
                self.default_limit, self.max_results
            )));
        }
        if self.max_results > MAX_RESULTS {
            return Err(QueryError::Config(format!(
                "max_results ({}) exceeds the hard cap of {MAX_RESULTS}",
                self.max_results
            )));
        }
        if self.max_depth > MAX_DEPTH {
            return Err(QueryError::Config(format!(
                "max_depth ({}) exceeds the hard cap of {MAX_DEPTH}",
                self.max_depth
            )));
        }
        Ok(())
    }

    pub fn limits(&self) -> Limits {
        Limits {
            default_limit: self.default_limit,
            max_results: self.max_results,
            max_depth: self.max_depth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_inconsistent_limits() {
        let zero = EngineConfig {
            default_limit: 0,
            ..EngineConfig::default()
        };
        assert!(zero.validate().is_err());

        let inverted = EngineConfig {
            default_limit: 50,
            max_results: 10,
            ..EngineConfig::default()
        };
        assert!(inverted.validate().is_err());

        let deep = EngineConfig {
            max_depth: MAX_DEPTH + 1,
            ..EngineConfig::default()
        };
        assert!(deep.validate().is_err());
    }

    #[test]
    fn partial_toml_style_input_keeps_defaults() {
        let config: EngineConfig =
            serde_json::from_value(serde_json::json!({"db_path": "x.db", "max_depth": 4})).unwrap();
        assert_eq!(config.db_path, PathBuf::from("x.db"));
        assert_eq!(config.max_depth, 4);
        assert_eq!(config.default_limit, DEFAULT_LIMIT);
    }
}
