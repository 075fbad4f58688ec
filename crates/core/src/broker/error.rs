//! Error types for the message broker.

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by broker operations.
///
/// Dispatch itself never returns these to a caller; failures inside the
/// watch loop are logged and the message is left where it is.
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("Failed to access message file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse message file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to serialize message: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to watch message directory: {0}")]
    Watch(#[from] notify::Error),

    #[error("Message watching requires a running tokio runtime")]
    NoRuntime,
}

pub type BrokerResult<T> = Result<T, BrokerError>;

/// Error returned by a message handler.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),

    #[error("handler panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HandlerError {
    pub fn msg(message: impl Into<String>) -> Self {
        HandlerError::Failed(message.into())
    }
}
