//! Application configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use wsmedia_core::StreamError;
use wsmedia_server::ServerConfig;

/// Errors raised while loading an [`AppConfig`]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("Failed to read config {}: {source}", .path.display())]
    Read {
        /// File that was read
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// The configuration is not valid JSON for [`AppConfig`]
    #[error("Failed to parse config: {source}")]
    Parse {
        /// Underlying JSON error
        #[from]
        source: serde_json::Error,
    },

    /// A value was rejected by validation
    #[error(transparent)]
    Invalid(#[from] StreamError),
}

/// Top-level configuration of a streaming process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// `tracing` filter used when `RUST_LOG` is not set
    pub log_filter: String,
    /// Listener, media and session settings
    pub server: ServerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            server: ServerConfig::default(),
        }
    }
}

impl AppConfig {
    /// Parse and validate a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.server.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }
}
