//! Runtime launch state models.
//!
//! This module defines the structures for tracking the state of the coding
//! agent launches owned by the launcher: the single primary launch and the
//! bounded pool of secondary (mockup analysis) launches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use ts_rs::TS;

/// Lifecycle status shared by primary and secondary launches.
///
/// Normal progression is `Idle -> Running -> Completed | Failed`. Any state
/// may be forced back to `Idle` by an explicit reset.
///
/// `Paused` is reserved and never entered by the launcher itself.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default, TS)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// Nothing is running.
    #[default]
    #[serde(alias = "Idle", alias = "IDLE")]
    Idle,

    /// The external CLI has been started in a terminal.
    #[serde(alias = "Running", alias = "RUNNING")]
    Running,

    /// The launch finished normally.
    #[serde(alias = "Completed", alias = "COMPLETED")]
    Completed,

    /// The launch could not be set up or ended abnormally.
    #[serde(alias = "Failed", alias = "FAILED")]
    Failed,

    /// Reserved.
    #[serde(alias = "Paused", alias = "PAUSED")]
    Paused,
}

impl ExecutionStatus {
    /// Whether this status ends a launch.
    pub fn is_terminal(self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// Resetting to `Idle` is always allowed. `Idle` can never jump straight
    /// to a terminal status.
    pub fn can_transition_to(self, next: ExecutionStatus) -> bool {
        use ExecutionStatus::*;
        matches!(
            (self, next),
            (_, Idle)
                | (Idle, Running)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Paused)
                | (Paused, Running)
        )
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionStatus::Idle => "idle",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Paused => "paused",
        };
        f.write_str(s)
    }
}

/// Opaque handle of a terminal opened by a terminal host.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, TS)]
#[serde(transparent)]
pub struct TerminalId(pub u64);

impl fmt::Display for TerminalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "terminal-{}", self.0)
    }
}

/// Which launch path produced an event.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, TS)]
#[serde(rename_all = "camelCase")]
pub enum LaunchKind {
    /// Scope-driven primary launch.
    Primary,
    /// Mockup analysis launch from the bounded pool.
    Secondary,
    /// Launch against an arbitrary prompt file.
    Prompt,
}

/// State of the primary launch.
///
/// There is exactly one of these per launcher. It is replaced on every new
/// primary launch and mutated by the progress monitor and the terminal-close
/// handler.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
pub struct LaunchContext {
    /// Project directory the CLI runs in.
    pub project_path: PathBuf,

    /// The instruction document handed to the CLI.
    pub driver_file_path: PathBuf,

    /// Identifier of the unit of work, if the launch was scope-driven.
    pub scope_id: Option<String>,

    /// Canonical serialized scope document.
    pub scope_file_path: Option<PathBuf>,

    /// File the external process reports progress into.
    pub progress_file_path: Option<PathBuf>,

    /// Terminal the CLI was started in.
    pub terminal: Option<TerminalId>,

    /// Current lifecycle status.
    pub status: ExecutionStatus,

    /// Last `totalProgress` value read from the progress file.
    pub last_progress: Option<f64>,

    /// When the launch entered `Running`.
    pub started_at: Option<DateTime<Utc>>,
}

/// One secondary (mockup analysis) launch.
///
/// Entries live in the launcher's process table keyed by `id` and are kept
/// after they finish so they can still be queried.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
pub struct MockupProcess {
    /// Time and name derived identifier, e.g. `mockup-login-1718000000000`.
    pub id: String,

    /// File stem of the analysed artifact.
    pub mockup_name: String,

    /// Absolute path of the analysed artifact.
    pub source_path: PathBuf,

    /// Project directory the CLI runs in.
    pub project_path: PathBuf,

    /// Generated instruction document handed to the CLI.
    pub analysis_file_path: PathBuf,

    /// Terminal running the analysis; cleared once it closes.
    pub terminal: Option<TerminalId>,

    /// Current lifecycle status.
    pub status: ExecutionStatus,

    /// Where the launch was requested from (free-form).
    pub source: Option<String>,

    /// When the entry was admitted.
    pub start_time: DateTime<Utc>,
}
