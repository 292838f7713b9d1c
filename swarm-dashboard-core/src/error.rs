//! Error types for swarm-dashboard-core

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the swarm-dashboard-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// An agent log file could not be opened, seeked or read
    #[error("cannot read {}: {message}", path.display())]
    FileAccess { path: PathBuf, message: String },

    /// Reading an agent log file took longer than the configured timeout
    #[error("timed out after {millis}ms reading {}", path.display())]
    Timeout { path: PathBuf, millis: u64 },

    /// Agent is not registered with the monitor
    #[error("agent not found: {0}")]
    UnknownAgent(String),

    /// Two agents were configured with the same log file
    #[error("log file {} is already tracked for agent {owner}", path.display())]
    DuplicateLogPath { path: PathBuf, owner: String },
}

impl Error {
    /// Wrap an I/O failure on an agent log file.
    pub fn file_access(path: impl Into<PathBuf>, source: &std::io::Error) -> Self {
        Self::FileAccess {
            path: path.into(),
            message: source.to_string(),
        }
    }

    /// Whether this error should degrade an agent rather than fail a query.
    pub fn is_file_access(&self) -> bool {
        matches!(
            self,
            Error::FileAccess { .. } | Error::Timeout { .. } | Error::Io(_)
        )
    }
}

/// Result type alias for swarm-dashboard-core
pub type Result<T> = std::result::Result<T, Error>;
