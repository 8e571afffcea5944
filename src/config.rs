//! Hierarchical Configuration Store
//!
//! Read-only key lookup handed to loaders at initialize time. A child
//! store answers from its own keys first and defers to its parent
//! otherwise. Stores load from TOML files (polycall.toml).

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::value::Value;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file not found: {0}")]
    NotFound(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Parent-delegating configuration object
#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
    name: String,
    values: HashMap<String, Value>,
    parent: Option<Arc<ConfigStore>>,
}

impl ConfigStore {
    /// Create an empty root store
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: HashMap::new(),
            parent: None,
        }
    }

    /// Create an empty store inheriting lookups from a parent
    pub fn child_of(name: impl Into<String>, parent: Arc<ConfigStore>) -> Self {
        Self {
            name: name.into(),
            values: HashMap::new(),
            parent: Some(parent),
        }
    }

    /// Load a store from a TOML file; the store name is the file stem
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let name = path
            .file_stem()
            .and_then(|n| n.to_str())
            .unwrap_or("config")
            .to_string();
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(name, &content)
    }

    /// Parse a store from TOML text
    pub fn from_toml_str(name: impl Into<String>, content: &str) -> ConfigResult<Self> {
        let table: toml::Table = toml::from_str(content)?;
        let mut store = Self::new(name);
        for (key, value) in table {
            store.values.insert(key, toml_to_value(value));
        }
        Ok(store)
    }

    /// Store name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parent store, if any
    pub fn parent(&self) -> Option<&ConfigStore> {
        self.parent.as_deref()
    }

    /// Insert a value under a key
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// Look up a key, own keys first, then the parent chain
    pub fn get(&self, key: &str) -> Option<&Value> {
        if let Some(value) = self.values.get(key) {
            return Some(value);
        }
        self.parent.as_deref().and_then(|p| p.get(key))
    }

    /// Number of keys in this store (not counting inherited ones)
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if this store has no own keys
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn toml_to_value(value: toml::Value) -> Value {
    match value {
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Integer(n) => Value::Long(n),
        toml::Value::Float(x) => Value::Double(x),
        toml::Value::String(s) => Value::Str(s),
        toml::Value::Datetime(d) => Value::Str(d.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_value).collect()),
        toml::Value::Table(table) => Value::Map(
            table
                .into_iter()
                .map(|(k, v)| (Value::Str(k), toml_to_value(v)))
                .collect(),
        ),
    }
}
