//! Progress file model.
//!
//! The external process (or a companion watcher) writes
//! `progress/{workId}.json` with this shape.

use serde::{Deserialize, Deserializer, Serialize};
use ts_rs::TS;

use crate::launch_models::ExecutionStatus;

/// Contents of a progress file.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    /// Overall completion percentage.
    pub total_progress: f64,

    /// Item level detail; opaque to the launcher.
    pub items: Vec<serde_json::Value>,

    /// Optional lifecycle status reported by the external process.
    ///
    /// Spellings that are not an [`ExecutionStatus`] read as `None`.
    #[serde(
        default,
        deserialize_with = "lenient_status",
        skip_serializing_if = "Option::is_none"
    )]
    pub status: Option<ExecutionStatus>,
}

impl ProgressReport {
    /// Whether the report announces the end of the launch.
    pub fn is_terminal(&self) -> bool {
        self.status.is_some_and(ExecutionStatus::is_terminal)
    }
}

fn lenient_status<'de, D>(deserializer: D) -> Result<Option<ExecutionStatus>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| ExecutionStatus::deserialize(value).ok()))
}
