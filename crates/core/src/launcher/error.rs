//! Error types for launch operations.

use crate::scope::ScopeError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for launch operations.
pub type LaunchResult<T> = Result<T, LaunchError>;

/// Errors returned by the launcher.
///
/// `Precondition`, `CapacityExceeded`, `AlreadyRunning` and an invalid scope
/// id are raised before any terminal is opened and leave launcher state
/// untouched.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// A required path is missing.
    #[error("{what} not found: {path:?}")]
    Precondition { what: &'static str, path: PathBuf },

    /// Every secondary slot is taken. Retry later.
    #[error("Too many analyses running ({running}/{limit}); wait for one to finish")]
    CapacityExceeded { running: usize, limit: usize },

    /// A primary launch is already running and the caller chose not to
    /// override it.
    #[error("A launch is already running for {project_path:?}")]
    AlreadyRunning { project_path: PathBuf },

    /// Setup failed after resources were allocated.
    #[error("Launch setup failed: {0}")]
    LaunchSetup(String),

    #[error("Failed to prepare {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Scope(#[from] ScopeError),
}

impl LaunchError {
    pub(crate) fn missing(what: &'static str, path: impl Into<PathBuf>) -> Self {
        LaunchError::Precondition {
            what,
            path: path.into(),
        }
    }

    pub(crate) fn setup(err: impl std::fmt::Display) -> Self {
        LaunchError::LaunchSetup(err.to_string())
    }
}
