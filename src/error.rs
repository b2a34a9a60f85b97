use std::path::PathBuf;

use thiserror::Error;

/// Every error kind distinguishable at the netspot API boundary.
///
/// Internal plumbing (malformed packets, transient I/O inside a task loop)
/// uses `anyhow::Result` instead — these variants are reserved for errors a
/// caller (shell, config loader, monitor) needs to branch on.
#[derive(Debug, Error)]
pub enum NetSpotError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("invalid source: {0}")]
    InvalidSource(String),

    #[error("invalid path: {path:?} ({reason})")]
    InvalidPath { path: PathBuf, reason: String },

    #[error("already running")]
    AlreadyRunning,

    #[error("not running")]
    NotRunning,

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("detector error: {0}")]
    DetectorError(String),
}

pub type Result<T> = std::result::Result<T, NetSpotError>;
