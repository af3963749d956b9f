//! # Configuration
//!
//! One TOML document with a table per layer. Every key may be omitted:
//!
//! ```toml
//! [store.hnsw]
//! ef_search = 64
//!
//! [weaver]
//! workers = 4
//!
//! [logging]
//! format = "json"
//! ```

use loom_core::{ConfigError, StoreConfig};
use loom_weaver::WeaverConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Everything [`crate::Loom`] can be configured with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoomConfig {
    pub store: StoreConfig,
    pub weaver: WeaverConfig,
    pub logging: LoggingConfig,
}

impl LoomConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate the config file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        let config = Self::from_toml_str(&text)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.store.validate()?;
        self.weaver.validate()
    }
}

/// Log output encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directives used when `RUST_LOG` is unset.
    pub filter: String,
    /// Overridden by `LOOM_LOG_FORMAT`.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "loom=info,loom_core=info,loom_weaver=info".to_string(),
            format: LogFormat::Text,
        }
    }
}
