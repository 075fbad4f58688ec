//! Terminal host abstraction.
//!
//! The launcher never spawns the coding agent directly. It opens a terminal
//! through a [`TerminalHost`], types commands into it and learns about the end
//! of the session only through the terminal's close signal.

pub mod command;
pub mod mock;
pub mod process_host;

pub use command::{CommandBuilder, ShellKind};
pub use mock::MockTerminalHost;
pub use process_host::ProcessTerminalHost;

use async_trait::async_trait;
use lk_protocol::launch_models::TerminalId;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::oneshot;

/// Parameters for opening a terminal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TerminalSpec {
    /// Display name, e.g. `launchkit: login analysis`.
    pub name: String,
    /// Working directory of the shell.
    pub cwd: PathBuf,
    /// Extra environment for the shell.
    pub env: HashMap<String, String>,
}

impl TerminalSpec {
    pub fn new(name: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            cwd: cwd.into(),
            env: HashMap::new(),
        }
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env.extend(env);
        self
    }
}

/// A freshly opened terminal.
///
/// `closed` resolves once the terminal goes away, whether the user closed
/// it, the shell exited or the host disposed it.
#[derive(Debug)]
pub struct TerminalSession {
    pub id: TerminalId,
    pub closed: oneshot::Receiver<()>,
}

#[derive(Error, Debug)]
pub enum TerminalError {
    #[error("Failed to open terminal '{name}': {source}")]
    Spawn {
        name: String,
        source: std::io::Error,
    },

    #[error("Unknown or closed terminal: {0}")]
    UnknownTerminal(TerminalId),

    #[error("Failed to write to {id}: {source}")]
    Write {
        id: TerminalId,
        source: std::io::Error,
    },

    #[error("Terminal host unavailable: {0}")]
    Unavailable(String),
}

pub type TerminalResult<T> = Result<T, TerminalError>;

#[async_trait]
pub trait TerminalHost: Send + Sync {
    async fn open(&self, spec: TerminalSpec) -> TerminalResult<TerminalSession>;

    /// Type one line into the terminal. The host appends the newline.
    async fn send_text(&self, id: TerminalId, text: &str) -> TerminalResult<()>;

    /// Signal that no more input will follow. Interactive hosts ignore this;
    /// headless hosts close the shell's stdin so it exits after the last
    /// command.
    async fn finish_input(&self, _id: TerminalId) -> TerminalResult<()> {
        Ok(())
    }

    /// Close the terminal. Fires its close signal.
    async fn dispose(&self, id: TerminalId) -> TerminalResult<()>;
}
