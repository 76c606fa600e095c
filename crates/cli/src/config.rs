//! Engine configuration for the binary: flags, then environment, then an
//! optional TOML file, then built-in defaults.

use anyhow::{Context, Result};
use codefacts_query::EngineConfig;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_DB: &str = "CODEFACTS_DB";
pub const ENV_FACTS_PATH: &str = "CODEFACTS_FACTS_PATH";
pub const ENV_MAX_RESULTS: &str = "CODEFACTS_MAX_RESULTS";
pub const ENV_MAX_DEPTH: &str = "CODEFACTS_MAX_DEPTH";

/// Keys accepted in `--config` files. Everything is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    #[serde(default)]
    pub facts_path: Option<PathBuf>,
    #[serde(default)]
    pub default_limit: Option<usize>,
    #[serde(default)]
    pub max_results: Option<usize>,
    #[serde(default)]
    pub max_depth: Option<usize>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("Invalid config file {}", path.display()))
    }
}

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct FlagConfig {
    pub db: Option<PathBuf>,
    pub facts: Option<PathBuf>,
    pub max_results: Option<usize>,
    pub max_depth: Option<usize>,
    pub config_file: Option<PathBuf>,
}

fn env_number(env: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<usize>> {
    match env(key).filter(|v| !v.trim().is_empty()) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{key} must be a non-negative integer, got {raw:?}")),
        None => Ok(None),
    }
}

/// Merge every source into one validated [`EngineConfig`].
pub fn resolve(flags: &FlagConfig, env: impl Fn(&str) -> Option<String>) -> Result<EngineConfig> {
    let file = match &flags.config_file {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let env_path = |key: &str| env(key).filter(|v| !v.trim().is_empty()).map(PathBuf::from);

    let defaults = EngineConfig::default();
    let config = EngineConfig {
        db_path: flags
            .db
            .clone()
            .or_else(|| env_path(ENV_DB))
            .or(file.db_path)
            .unwrap_or(defaults.db_path),
        facts_path: flags
            .facts
            .clone()
            .or_else(|| env_path(ENV_FACTS_PATH))
            .or(file.facts_path),
        default_limit: file.default_limit.unwrap_or(defaults.default_limit),
        max_results: match flags.max_results {
            Some(n) => n,
            None => env_number(&env, ENV_MAX_RESULTS)?
                .or(file.max_results)
                .unwrap_or(defaults.max_results),
        },
        max_depth: match flags.max_depth {
            Some(n) => n,
            None => env_number(&env, ENV_MAX_DEPTH)?
                .or(file.max_depth)
                .unwrap_or(defaults.max_depth),
        },
    };
    // A lowered max_results drags the default page size with it.
    let config = EngineConfig {
        default_limit: config.default_limit.min(config.max_results),
        ..config
    };
    config.validate().context("Invalid engine configuration")?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_without_any_source() {
        let config = resolve(&FlagConfig::default(), env_from(&[])).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn flags_beat_env_beat_file() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("codefacts.toml");
        fs::write(
            &file,
            "db_path = \"file.db\"\nfacts_path = \"file-dump\"\nmax_depth = 3\nmax_results = 200\n",
        )
        .unwrap();

        let flags = FlagConfig {
            db: Some(PathBuf::from("flag.db")),
            config_file: Some(file),
            ..FlagConfig::default()
        };
        let env = env_from(&[(ENV_FACTS_PATH, "env-dump"), (ENV_MAX_DEPTH, "5")]);
        let config = resolve(&flags, env).unwrap();

        assert_eq!(config.db_path, PathBuf::from("flag.db"));
        assert_eq!(config.facts_path, Some(PathBuf::from("env-dump")));
        assert_eq!(config.max_depth, 5);
        assert_eq!(config.max_results, 200);
        assert_eq!(config.default_limit, 100);
    }

    #[test]
    fn invalid_values_are_reported() {
        assert!(resolve(&FlagConfig::default(), env_from(&[(ENV_MAX_DEPTH, "deep")])).is_err());
        assert!(resolve(&FlagConfig::default(), env_from(&[(ENV_MAX_DEPTH, "99")])).is_err());

        let temp = TempDir::new().unwrap();
        let file = temp.path().join("bad.toml");
        fs::write(&file, "unknown_key = 1\n").unwrap();
        let flags = FlagConfig {
            config_file: Some(file),
            ..FlagConfig::default()
        };
        assert!(resolve(&flags, env_from(&[])).is_err());
    }
}
