//! File-backed broker message models.
//!
//! Each message lives in its own file named `{id}.{status}.json`. The status
//! suffix in the file name is authoritative; the `status` field inside the
//! JSON body mirrors it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;
use uuid::Uuid;

/// Closed set of message kinds exchanged through the broker.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, TS)]
pub enum MessageType {
    #[serde(rename = "scope:create")]
    ScopeCreate,
    #[serde(rename = "scope:update")]
    ScopeUpdate,
    #[serde(rename = "progress:report")]
    ProgressReport,
    #[serde(rename = "command:execute")]
    CommandExecute,
    #[serde(rename = "result:submit")]
    ResultSubmit,
}

impl MessageType {
    /// Every message type, in declaration order.
    pub const ALL: [MessageType; 5] = [
        MessageType::ScopeCreate,
        MessageType::ScopeUpdate,
        MessageType::ProgressReport,
        MessageType::CommandExecute,
        MessageType::ResultSubmit,
    ];

    /// Wire name, e.g. `scope:create`.
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::ScopeCreate => "scope:create",
            MessageType::ScopeUpdate => "scope:update",
            MessageType::ProgressReport => "progress:report",
            MessageType::CommandExecute => "command:execute",
            MessageType::ResultSubmit => "result:submit",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = String;

    /// Accepts both the wire form (`scope:create`) and the dashed form
    /// (`scope-create`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', ":");
        MessageType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| format!("unknown message type: {s}"))
    }
}

/// Lifecycle of a message: `New -> Processing -> Completed | Failed`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, TS)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    New,
    Processing,
    Completed,
    Failed,
}

impl MessageStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [MessageStatus; 4] = [
        MessageStatus::New,
        MessageStatus::Processing,
        MessageStatus::Completed,
        MessageStatus::Failed,
    ];

    /// The file name segment that encodes this status.
    pub fn as_suffix(self) -> &'static str {
        match self {
            MessageStatus::New => "new",
            MessageStatus::Processing => "processing",
            MessageStatus::Completed => "completed",
            MessageStatus::Failed => "failed",
        }
    }

    /// Parse a file name segment back into a status.
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        MessageStatus::ALL
            .into_iter()
            .find(|s| s.as_suffix() == suffix)
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_suffix())
    }
}

/// A single broker message.
///
/// # Example
///
/// ```json
/// {
///   "id": "0b6f3c1e-3f3e-4c1c-9a53-5f1c2b8e9d10",
///   "type": "progress:report",
///   "status": "new",
///   "payload": { "totalProgress": 40 },
///   "timestamp": 1718000000000
/// }
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
pub struct Message {
    #[ts(type = "string")]
    pub id: Uuid,

    #[serde(rename = "type")]
    pub message_type: MessageType,

    /// Mirror of the file name suffix. Never used for decisions.
    pub status: MessageStatus,

    /// Opaque producer-defined body.
    pub payload: serde_json::Value,

    /// Creation time in milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl Message {
    /// File name for this message in the given status.
    pub fn file_name(id: Uuid, status: MessageStatus) -> String {
        format!("{id}.{}.json", status.as_suffix())
    }

    /// Split a message file name into its id and status.
    ///
    /// Returns `None` for anything that is not `{uuid}.{status}.json`.
    pub fn parse_file_name(name: &str) -> Option<(Uuid, MessageStatus)> {
        let stem = name.strip_suffix(".json")?;
        let (id, suffix) = stem.rsplit_once('.')?;
        let status = MessageStatus::from_suffix(suffix)?;
        let id = Uuid::parse_str(id).ok()?;
        Some((id, status))
    }
}
