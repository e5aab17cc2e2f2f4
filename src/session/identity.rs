//! Persisted user identity (`~/.crosbyconf`)

use crate::error::{CrosbyError, CrosbyResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

/// User record as handed out by the session service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Account number assigned by the service
    #[serde(default)]
    pub id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,

    /// End of the trial period
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
}

/// The file holding the current user
#[derive(Debug, Clone)]
pub struct IdentityFile {
    path: PathBuf,
}

impl IdentityFile {
    /// `~/.crosbyconf`
    pub fn new() -> Self {
        Self::with_path(Self::default_path())
    }

    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".crosbyconf")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored user. A missing or empty file means nobody has
    /// registered on this machine yet.
    pub async fn load(&self) -> CrosbyResult<Option<User>> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CrosbyError::io(format!("reading {}", self.path.display()), e))
            }
        };
        if content.trim().is_empty() {
            return Ok(None);
        }

        let user: User = serde_json::from_str(&content)?;
        Ok(Some(user))
    }

    pub async fn save(&self, user: &User) -> CrosbyResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| CrosbyError::io(format!("creating {}", parent.display()), e))?;
        }

        let content = serde_json::to_string_pretty(user)?;
        fs::write(&self.path, content)
            .await
            .map_err(|e| CrosbyError::io(format!("writing {}", self.path.display()), e))
    }
}

impl Default for IdentityFile {
    fn default() -> Self {
        Self::new()
    }
}
