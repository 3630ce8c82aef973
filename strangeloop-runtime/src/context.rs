//! Process-wide state handed to the agent and the command handlers.

use crate::config::{self, ConfigStore};
use crate::error::Result;
use crate::paths;
use crate::provider::AnthropicProvider;
use crate::registry::Registry;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Config store plus capability registry, built once per process
pub struct Context {
    pub config: ConfigStore,
    pub registry: Registry,
}

impl Context {
    /// Build from the environment's configuration root
    pub fn load() -> Result<Self> {
        Self::at(paths::config_root())
    }

    /// Build under an explicit configuration root
    pub fn at(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let config = ConfigStore::open(paths::config_file(root))?;
        let capabilities_dir = config
            .get_str(config::CAPABILITIES_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|| paths::capabilities_dir(root));
        debug!(
            config = %config.path().display(),
            capabilities = %capabilities_dir.display(),
            "context loaded"
        );

        Ok(Self {
            config,
            registry: Registry::new(capabilities_dir).with_builtins(),
        })
    }

    /// Completion provider using the override, the config store, then the environment
    pub fn provider(&self, api_key_override: Option<&str>) -> Result<AnthropicProvider> {
        AnthropicProvider::from_config(&self.config, api_key_override)
    }
}
