//! Error types for Crosby
//!
//! All modules use `CrosbyResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Crosby operations
pub type CrosbyResult<T> = Result<T, CrosbyError>;

/// All errors that can occur in Crosby
#[derive(Error, Debug)]
pub enum CrosbyError {
    // Fingerprint errors
    #[error("Could not fingerprint {path}: {source}")]
    FingerprintIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Backend errors
    #[error("Could not reach the cache: {0}")]
    Connectivity(String),

    #[error("Cache backend returned an invalid response: {0}")]
    BackendProtocol(String),

    #[error("Blob not found: {0}")]
    BlobNotFound(String),

    #[error("Failed to upload {path} to the cache after {attempts} attempts: {reason}")]
    BlobUpload {
        path: String,
        attempts: u32,
        reason: String,
    },

    #[error("Failed to register result in the cache: {0}")]
    ResultInsert(String),

    // Restore errors
    #[error("Failed to restore {path}: {reason}")]
    Restore { path: String, reason: String },

    #[error("{failed} of {total} cached files could not be restored")]
    RestoreFailed { failed: usize, total: usize },

    // Session errors
    #[error("Your free trial has expired. Register at {signup_url} (account number: {account})")]
    SessionExpired { signup_url: String, account: String },

    #[error("Session validation failed: {0}")]
    Session(String),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command execution error: {command}, stderr: {stderr}")]
    CommandExecution { command: String, stderr: String },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CrosbyError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error
    pub fn command_exec(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    /// Create a connectivity error
    pub fn connectivity(reason: impl std::fmt::Display) -> Self {
        Self::Connectivity(reason.to_string())
    }

    /// Check if error is a transient transport failure worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connectivity(_) | Self::Io { .. })
    }

    /// Whether the failure came from talking to the cache rather than the local build
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            Self::Connectivity(_)
                | Self::BackendProtocol(_)
                | Self::BlobUpload { .. }
                | Self::ResultInsert(_)
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Connectivity(_) => {
                Some("Make sure you are connected to the internet and try again")
            }
            Self::BlobUpload { .. } | Self::ResultInsert(_) => {
                Some("Your build succeeded and its outputs are on disk; only caching failed")
            }
            Self::BlobNotFound(_) => Some("The cache entry is incomplete, please contact support"),
            Self::FingerprintIo { .. } | Self::Restore { .. } | Self::RestoreFailed { .. } => {
                Some("Make sure this program has permission to read and write the project")
            }
            Self::CommandExecution { .. } | Self::CommandFailed { .. } => {
                Some("The command itself failed; nothing was cached")
            }
            Self::SessionExpired { .. } => Some("You must register to continue using Crosby"),
            _ => None,
        }
    }
}
