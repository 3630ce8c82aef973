//! # Config Store
//!
//! Durable key-value settings backed by a single flat JSON document.
//! Every mutation re-reads the document, applies the change and writes the
//! whole document back. A missing or corrupt document reads as empty.

use crate::error::{self, Result};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Config key holding the completion service credential
pub const API_KEY: &str = "anthropic_api_key";

/// Config key overriding the completion model
pub const MODEL: &str = "model";

/// Config key overriding the completion endpoint base URL
pub const API_BASE_URL: &str = "api_base_url";

/// Config key overriding the capabilities directory
pub const CAPABILITIES_DIR: &str = "capabilities_dir";

/// File-backed configuration store
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// Open the store at `path`, creating the document as `{}` if absent
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| error::io_error("create config dir", parent, e))?;
        }
        let store = Self { path };
        if !store.path.exists() {
            store.save(&Map::new())?;
        }
        Ok(store)
    }

    /// Location of the backing document
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Map<String, Value> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                debug!("config {} unreadable ({}), using empty", self.path.display(), e);
                return Map::new();
            }
        };
        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => map,
            Ok(_) | Err(_) => {
                warn!("config {} is not a JSON object, using empty", self.path.display());
                Map::new()
            }
        }
    }

    fn save(&self, map: &Map<String, Value>) -> Result<()> {
        let content = serde_json::to_string_pretty(map)
            .map_err(|e| error::serialization_error("config", e))?;
        std::fs::write(&self.path, content)
            .map_err(|e| error::io_error("write", &self.path, e))
    }

    /// Get a value from the config
    pub fn get(&self, key: &str) -> Option<Value> {
        self.load().remove(key)
    }

    /// Get a value or return default
    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.get(key).unwrap_or(default)
    }

    /// Get a typed value from the config
    pub fn get_typed<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| serde_json::from_value(v).ok())
    }

    /// Get a string value, ignoring non-string and empty entries
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.get_typed::<String>(key).filter(|s| !s.is_empty())
    }

    /// Set a value in the config
    pub fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut map = self.load();
        map.insert(key.to_string(), value);
        self.save(&map)
    }

    /// Delete a key; returns whether it existed
    pub fn delete(&self, key: &str) -> Result<bool> {
        let mut map = self.load();
        if map.remove(key).is_none() {
            return Ok(false);
        }
        self.save(&map)?;
        Ok(true)
    }

    /// All entries
    pub fn list_all(&self) -> Map<String, Value> {
        self.load()
    }
}
