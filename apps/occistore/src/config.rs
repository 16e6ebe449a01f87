//! # Configuration
//!
//! Layered settings: built-in defaults, then an optional TOML file, then
//! `OCCISTORE_*` environment variables. CLI flags are applied last by the
//! command layer.

use occistore_core::{CategoryId, GraphConfig, HookRegistry, LoggingHook};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

pub const ENV_HOST: &str = "OCCISTORE_HOST";
pub const ENV_PORT: &str = "OCCISTORE_PORT";
pub const ENV_SCHEMA: &str = "OCCISTORE_SCHEMA";
pub const ENV_VALIDATE_CATEGORIES: &str = "OCCISTORE_VALIDATE_CATEGORIES";

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Invalid config file: {0}")]
    Parse(String),

    #[error("Invalid value for {key}: {value:?}")]
    InvalidEnv { key: String, value: String },
}

/// Storage backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// In-memory store, loaded from and saved to a snapshot file by the CLI.
    #[default]
    Memory,
    /// redb database file.
    Redb,
}

impl Backend {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Redb => "redb",
        }
    }
}

/// Server and store settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub backend: Backend,
    pub database: PathBuf,
    /// Static document served as the `schema` property.
    pub schema: Option<PathBuf>,
    /// Refuse kinds without a registered handler.
    pub validate_categories: bool,
    /// Categories that get the logging action handler.
    pub handlers: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            backend: Backend::Memory,
            database: PathBuf::from("occistore.db"),
            schema: None,
            validate_categories: false,
            handlers: Vec::new(),
        }
    }
}

impl Config {
    /// Defaults, overlaid with `path` (if given) and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Overlay values found through `lookup` (normally `std::env::var`).
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(host) = lookup(ENV_HOST) {
            self.host = host;
        }
        if let Some(port) = lookup(ENV_PORT) {
            self.port = port.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                key: ENV_PORT.to_string(),
                value: port.clone(),
            })?;
        }
        if let Some(schema) = lookup(ENV_SCHEMA) {
            self.schema = Some(PathBuf::from(schema));
        }
        if let Some(flag) = lookup(ENV_VALIDATE_CATEGORIES) {
            self.validate_categories = parse_bool(&flag).ok_or_else(|| ConfigError::InvalidEnv {
                key: ENV_VALIDATE_CATEGORIES.to_string(),
                value: flag.clone(),
            })?;
        }
        Ok(())
    }

    /// Listen address as `host:port`.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    #[must_use]
    pub fn graph_config(&self) -> GraphConfig {
        GraphConfig {
            validate_categories: self.validate_categories,
        }
    }

    /// Registry with a `LoggingHook` for every configured category.
    #[must_use]
    pub fn hook_registry(&self) -> HookRegistry {
        self.handlers
            .iter()
            .fold(HookRegistry::default(), |registry, category| {
                registry.with(
                    CategoryId::new(category.as_str()),
                    Arc::new(LoggingHook::new(category.as_str())),
                )
            })
    }

    /// Read the schema document. A missing or unreadable file means no schema.
    #[must_use]
    pub fn load_schema(&self) -> Option<String> {
        let path = self.schema.as_ref()?;
        match std::fs::read_to_string(path) {
            Ok(text) => {
                tracing::info!(path = %path.display(), bytes = text.len(), "schema loaded");
                Some(text)
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), "schema unavailable: {}", e);
                None
            }
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.address(), "127.0.0.1:8080");
        assert_eq!(config.backend, Backend::Memory);
        assert!(!config.validate_categories);
    }

    #[test]
    fn toml_overrides_defaults() {
        let config = Config::from_toml_str(
            r#"
            port = 9090
            backend = "redb"
            database = "/tmp/occi.redb"
            validate_categories = true
            handlers = ["compute", "network"]
            "#,
        )
        .expect("parse");

        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 9090);
        assert_eq!(config.backend, Backend::Redb);
        assert!(config.validate_categories);
        assert!(config.hook_registry().is_registered(&CategoryId::new("network")));
        assert!(config.graph_config().validate_categories);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(matches!(
            Config::from_toml_str("colour = \"blue\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn environment_overrides_file() {
        let mut config = Config::from_toml_str("port = 9090").expect("parse");
        config
            .apply_env(env(&[
                (ENV_HOST, "0.0.0.0"),
                (ENV_PORT, "7000"),
                (ENV_VALIDATE_CATEGORIES, "yes"),
            ]))
            .expect("env");

        assert_eq!(config.address(), "0.0.0.0:7000");
        assert!(config.validate_categories);
    }

    #[test]
    fn bad_environment_value_is_reported() {
        let mut config = Config::default();
        let result = config.apply_env(env(&[(ENV_PORT, "eighty")]));
        assert!(matches!(result, Err(ConfigError::InvalidEnv { .. })));
    }

    #[test]
    fn missing_schema_file_is_no_schema() {
        let config = Config {
            schema: Some(PathBuf::from("/nonexistent/occi-schema.xml")),
            ..Config::default()
        };
        assert!(config.load_schema().is_none());
    }
}
