//! Configuration schema for Crosby
//!
//! Configuration is stored at `~/.config/crosby/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Cache backend settings
    pub backend: BackendConfig,

    /// Upload retry and fan-out settings
    pub upload: UploadConfig,

    /// Session gate settings
    pub session: SessionConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,

    /// Record one telemetry event per run
    pub telemetry: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
            telemetry: true,
        }
    }
}

/// Which backend implementation serves the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Directory on a local or shared filesystem
    Local,
    /// Remote cache server over HTTP
    Http,
}

/// Cache backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Backend implementation
    pub kind: BackendKind,

    /// Root directory for the local backend (defaults to the state dir)
    pub path: Option<PathBuf>,

    /// Base URL for the http backend
    pub url: String,

    /// Request timeout in seconds for the http backend
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Local,
            path: None,
            url: "http://io.crosby.io".to_string(),
            timeout_secs: 3600,
        }
    }
}

/// Blob upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Attempts per file before giving up
    pub max_attempts: u32,

    /// Delay before the first retry in milliseconds
    pub initial_delay_ms: u64,

    /// Upper bound on the delay between retries in milliseconds
    pub max_delay_ms: u64,

    /// Maximum number of uploads in flight
    pub concurrency: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 500,
            max_delay_ms: 60_000,
            concurrency: 8,
        }
    }
}

/// Session gate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Validate the user session before touching the cache
    pub enabled: bool,

    /// Base URL of the session API
    pub api_url: String,

    /// Where expired users are sent to register
    pub signup_url: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: "http://crosby.io".to_string(),
            signup_url: "http://crosby.io/signup".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[general]"));
        assert!(toml.contains("[backend]"));
        assert!(toml.contains("kind = \"local\""));
    }

    #[test]
    fn config_deserializes_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.backend.kind, BackendKind::Local);
        assert_eq!(config.upload.max_attempts, 5);
    }

    #[test]
    fn config_deserializes_partial() {
        let toml = r#"
            [backend]
            kind = "http"
            url = "http://localhost:3000"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.backend.kind, BackendKind::Http);
        assert_eq!(config.backend.url, "http://localhost:3000");
        assert_eq!(config.upload.concurrency, 8); // default preserved
    }
}
