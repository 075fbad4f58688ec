//! In-process event protocol.
//!
//! Events are published by the launcher (and its helpers) on the event bus
//! for any interested component: the host UI, the integration service,
//! loggers. This is distinct from the file-backed message broker.
//!
//! Uses tagged enum serialization for TypeScript compatibility:
//! ```json
//! {
//!   "type": "launchStarted",
//!   "payload": {
//!     "workId": "scope-1718000000000",
//!     "projectPath": "/home/me/app",
//!     "scopeFilePath": "/tmp/launchkit/scopes/scope-1718000000000.json",
//!     "progressFilePath": "/tmp/launchkit/progress/scope-1718000000000.json"
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use ts_rs::TS;

use crate::launch_models::{ExecutionStatus, LaunchKind};
use crate::progress_models::ProgressReport;

/// Events emitted by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Event {
    /// A launch request was accepted for processing (usage counter).
    #[serde(rename_all = "camelCase")]
    LaunchCounted {
        kind: LaunchKind,
        project_path: PathBuf,
        scope_id: Option<String>,
    },

    /// The primary launch is running in its terminal.
    #[serde(rename_all = "camelCase")]
    LaunchStarted {
        work_id: String,
        project_path: PathBuf,
        scope_file_path: PathBuf,
        progress_file_path: PathBuf,
    },

    /// A prompt-file launch is running in its terminal.
    #[serde(rename_all = "camelCase")]
    PromptLaunchStarted {
        project_path: PathBuf,
        prompt_file_path: PathBuf,
    },

    /// A launch could not be set up after resources were allocated.
    #[serde(rename_all = "camelCase")]
    LaunchFailed {
        kind: LaunchKind,
        work_id: Option<String>,
        error: String,
    },

    /// The progress file of the primary launch changed.
    #[serde(rename_all = "camelCase")]
    ProgressUpdated {
        work_id: Option<String>,
        report: ProgressReport,
    },

    /// The primary launch reached a terminal status.
    #[serde(rename_all = "camelCase")]
    PrimaryFinished {
        work_id: Option<String>,
        status: ExecutionStatus,
    },

    /// The primary state was reset by an operator.
    #[serde(rename_all = "camelCase")]
    LaunchStopped { project_path: PathBuf },

    /// A mockup analysis launch is running in its terminal.
    #[serde(rename_all = "camelCase")]
    SecondaryStarted {
        process_id: String,
        mockup_name: String,
        mockup_file_path: PathBuf,
        project_path: PathBuf,
        analysis_file_path: PathBuf,
    },

    /// A mockup analysis terminal closed.
    #[serde(rename_all = "camelCase")]
    SecondaryCompleted {
        process_id: String,
        status: ExecutionStatus,
    },
}
