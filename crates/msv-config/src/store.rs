//! # Configuration Store
//!
//! A JSON-backed tree with dotted-path access. Views produced by `merge` and
//! `sub` are independent copies; nothing is shared between them.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::{ConfigError, ENV_SEPARATOR, KEY_SEPARATOR};

/// Hierarchical configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    root: Map<String, Value>,
}

impl Config {
    /// Create an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a configuration from a JSON value.
    ///
    /// `null` is accepted as an empty configuration.
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        match value {
            Value::Object(root) => Ok(Self { root }),
            Value::Null => Ok(Self::new()),
            other => Err(ConfigError::NotATable(kind_of(&other))),
        }
    }

    /// Minimal configuration selecting the in-process bridge.
    #[must_use]
    pub fn basic() -> Self {
        let mut config = Self::new();
        config.set("app.bridge", Value::from("local"));
        config
    }

    /// Parse configuration from a TOML string.
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let table: toml::Table =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let value = serde_json::to_value(table).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::from_value(value)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;

        let config = Self::parse_toml(&content)?;
        debug!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Look up a value by dotted path (`"service.users.log_level"`).
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        let mut parts = segments(key);
        let mut current = self.root.get(parts.next()?)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    /// Look up a scalar and render it as a string.
    ///
    /// Numbers and booleans are stringified; tables and arrays yield `None`.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Look up a value and deserialize it.
    ///
    /// Scalars stored as strings (`"4"`, `"true"`) are accepted for typed
    /// reads, since environment overrides and hand-written files often quote
    /// them.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        let Some(value) = self.get(key) else {
            return Ok(None);
        };

        match serde_json::from_value::<T>(value.clone()) {
            Ok(parsed) => Ok(Some(parsed)),
            Err(e) => {
                if let Value::String(raw) = value {
                    if let Ok(parsed) = serde_json::from_str::<T>(raw) {
                        return Ok(Some(parsed));
                    }
                }
                Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: e.to_string(),
                })
            }
        }
    }

    /// Look up a value, falling back to `default` when absent or invalid.
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        match self.get_as(key) {
            Ok(Some(value)) => value,
            Ok(None) => default,
            Err(e) => {
                warn!(error = %e, "Invalid configuration value, using default");
                default
            }
        }
    }

    /// Check whether a key is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Deep-merge `other` on top of `self`.
    ///
    /// Tables merge recursively; any other value in `other` replaces the one
    /// in `self`.
    #[must_use]
    pub fn merge(&self, other: &Config) -> Config {
        let mut root = self.root.clone();
        merge_maps(&mut root, &other.root);
        Self { root }
    }

    /// Project the table at `namespace` into a standalone configuration.
    ///
    /// Missing namespaces, or namespaces holding a non-table value, yield an
    /// empty configuration.
    #[must_use]
    pub fn sub(&self, namespace: &str) -> Config {
        match self.get(namespace) {
            Some(Value::Object(map)) => Self { root: map.clone() },
            _ => Self::new(),
        }
    }

    /// Set a value at a dotted path, creating intermediate tables.
    ///
    /// Intermediate scalars on the path are replaced by tables.
    pub fn set(&mut self, key: &str, value: Value) {
        let parts: Vec<&str> = segments(key).collect();
        let Some((last, parents)) = parts.split_last() else {
            return;
        };

        let mut current = &mut self.root;
        for part in parents {
            let slot = current
                .entry((*part).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            let Value::Object(next) = slot else {
                return;
            };
            current = next;
        }
        current.insert((*last).to_string(), value);
    }

    /// Apply overrides from process environment variables.
    ///
    /// `MSV__SERVICE__USERS__LOG_LEVEL=2` with prefix `MSV` sets
    /// `service.users.log_level = 2`.
    #[must_use]
    pub fn with_env_overrides(self, prefix: &str) -> Self {
        self.with_overrides(prefix, std::env::vars())
    }

    /// Apply overrides from `(name, value)` pairs using the environment
    /// variable naming scheme.
    #[must_use]
    pub fn with_overrides<I>(mut self, prefix: &str, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let marker = format!("{prefix}{ENV_SEPARATOR}");

        for (name, raw) in vars {
            let Some(path) = name.strip_prefix(&marker) else {
                continue;
            };
            let key = path
                .split(ENV_SEPARATOR)
                .filter(|s| !s.is_empty())
                .map(str::to_lowercase)
                .collect::<Vec<_>>()
                .join(".");
            if key.is_empty() {
                continue;
            }

            debug!(key = %key, "Configuration override from environment");
            self.set(&key, parse_scalar(&raw));
        }

        self
    }

    /// Whether the configuration holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Top-level keys.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.root.keys().map(String::as_str)
    }

    /// The whole tree as a JSON value.
    #[must_use]
    pub fn as_value(&self) -> Value {
        Value::Object(self.root.clone())
    }
}

fn segments(key: &str) -> impl Iterator<Item = &str> {
    key.split(KEY_SEPARATOR).filter(|s| !s.is_empty())
}

fn merge_maps(base: &mut Map<String, Value>, overlay: &Map<String, Value>) {
    for (key, value) in overlay {
        match (base.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_maps(existing, incoming);
            }
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

fn parse_scalar(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "table",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Config {
        Config::from_value(json!({
            "common": { "log_level": "4", "region": "eu" },
            "app": { "bridge": "local" },
            "service": {
                "users": { "log_level": 2, "pool": { "size": 8 } }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_get_nested_path() {
        let config = sample();
        assert_eq!(config.get("service.users.pool.size"), Some(&json!(8)));
        assert_eq!(config.get("service.users.missing"), None);
        assert_eq!(config.get(""), None);
    }

    #[test]
    fn test_get_str_stringifies_scalars() {
        let config = sample();
        assert_eq!(config.get_str("service.users.log_level").as_deref(), Some("2"));
        assert_eq!(config.get_str("app.bridge").as_deref(), Some("local"));
        assert_eq!(config.get_str("service.users"), None);
    }

    #[test]
    fn test_get_as_accepts_quoted_scalars() {
        let config = sample();
        let level: Option<u8> = config.get_as("common.log_level").unwrap();
        assert_eq!(level, Some(4));

        let bad: Result<Option<u8>, _> = config.get_as("common.region");
        assert!(matches!(bad, Err(ConfigError::InvalidValue { .. })));

        assert_eq!(config.get_or("common.region", 7u8), 7);
        assert_eq!(config.get_or("common.nothing", 9u8), 9);
    }

    #[test]
    fn test_merge_is_deep_and_right_biased() {
        let config = sample();
        let merged = config
            .sub("common")
            .merge(&config.sub("service.users"));

        assert_eq!(merged.get_str("log_level").as_deref(), Some("2"));
        assert_eq!(merged.get_str("region").as_deref(), Some("eu"));
        assert_eq!(merged.get("pool.size"), Some(&json!(8)));

        let overlay = Config::from_value(json!({ "pool": { "timeout": 3 } })).unwrap();
        let deep = merged.merge(&overlay);
        assert_eq!(deep.get("pool.size"), Some(&json!(8)));
        assert_eq!(deep.get("pool.timeout"), Some(&json!(3)));
    }

    #[test]
    fn test_sub_missing_namespace_is_empty() {
        let config = sample();
        assert!(config.sub("module.cache").is_empty());
        assert!(config.sub("app.bridge").is_empty());
    }

    #[test]
    fn test_set_replaces_intermediate_scalars() {
        let mut config = Config::basic();
        config.set("app.bridge.kind", json!("nats"));
        assert_eq!(config.get_str("app.bridge.kind").as_deref(), Some("nats"));
    }

    #[test]
    fn test_overrides_from_env_pairs() {
        let vars = vec![
            ("MSV__SERVICE__USERS__LOG_LEVEL".to_string(), "1".to_string()),
            ("MSV__APP__BRIDGE".to_string(), "remote".to_string()),
            ("OTHER__APP__BRIDGE".to_string(), "ignored".to_string()),
        ];
        let config = sample().with_overrides("MSV", vars);

        assert_eq!(config.get("service.users.log_level"), Some(&json!(1)));
        assert_eq!(config.get_str("app.bridge").as_deref(), Some("remote"));
    }

    #[test]
    fn test_parse_toml() {
        let config = Config::parse_toml(
            r#"
            [common]
            log_level = 3

            [bridge.local]
            buffer_capacity = 16
            "#,
        )
        .unwrap();

        assert_eq!(config.get_or("common.log_level", 0u8), 3);
        assert_eq!(config.sub("bridge.local").get_or("buffer_capacity", 0usize), 16);
        assert!(matches!(
            Config::parse_toml("not = [valid"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_from_value_rejects_scalars() {
        assert_eq!(
            Config::from_value(json!(3)),
            Err(ConfigError::NotATable("number"))
        );
        assert!(Config::from_value(Value::Null).unwrap().is_empty());
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load("/definitely/not/here.toml");
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
