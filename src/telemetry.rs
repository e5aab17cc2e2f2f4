//! Usage telemetry
//!
//! Appends one JSON line per completed run to the telemetry log in the
//! state directory. Failures are logged and never affect the run.

use crate::config::{schema::Config, ConfigManager};
use chrono::Utc;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// One completed run
#[derive(Debug, Clone, Serialize)]
pub struct RunEvent {
    pub command: String,
    pub args: Vec<String>,
    pub os: String,
    pub arch: String,
    pub cache_hit: bool,
    pub duration_ms: u64,
}

impl RunEvent {
    /// Describe a run of `invocation` on this machine
    pub fn new(invocation: &[String], cache_hit: bool, duration: Duration) -> Self {
        let (command, args) = match invocation.split_first() {
            Some((command, args)) => (command.clone(), args.to_vec()),
            None => (String::new(), vec![]),
        };
        Self {
            command,
            args,
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            cache_hit,
            duration_ms: duration.as_millis() as u64,
        }
    }
}

/// File-based telemetry sink
pub struct Telemetry {
    enabled: bool,
    path: PathBuf,
}

impl Telemetry {
    pub fn new(config: &Config) -> Self {
        Self {
            enabled: config.general.telemetry,
            path: ConfigManager::telemetry_log_path(),
        }
    }

    /// Record a run
    pub async fn record(&self, event: &RunEvent) {
        if !self.enabled {
            return;
        }

        let entry = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "event": "run",
            "data": event,
        });

        let mut line = match serde_json::to_string(&entry) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to serialize telemetry event: {}", e);
                return;
            }
        };
        line.push('\n');

        if let Err(e) = self.append(&line).await {
            warn!("Failed to write telemetry: {}", e);
        }
    }

    async fn append(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
