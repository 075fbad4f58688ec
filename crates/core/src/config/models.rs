//! Configuration models.
//!
//! `LaunchKitConfig` mirrors `.launchkit/config.toml`; every field has a
//! default so a partial (or missing) file is always valid. `AppConfig`
//! bundles it with the prompt library from `.launchkit/prompts/*.md`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_CLI_COMMAND: &str = "claude";
pub const DEFAULT_DRIVER_FILE: &str = "CLAUDE.md";
pub const DEFAULT_MAX_CONCURRENT: usize = 3;
pub const DEFAULT_MAX_RETAINED_FINISHED: usize = 32;
pub const DEFAULT_AUTH_ENV_VAR: &str = "LAUNCHKIT_AUTH_FILE";
pub const DEFAULT_PROMPT_FILE_TTL_SECS: u64 = 30;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;
pub const DEFAULT_CHANNEL: &str = "default";
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 300;

/// Settings from `config.toml`.
///
/// # Example
///
/// ```toml
/// temp_root = "/var/tmp/launchkit"
///
/// [launcher]
/// cli_command = "claude"
/// max_concurrent = 2
///
/// [monitor]
/// poll_interval_ms = 2000
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchKitConfig {
    pub launcher: LauncherSettings,
    pub monitor: MonitorSettings,
    pub broker: BrokerSettings,
    pub integration: IntegrationSettings,

    /// Overrides the OS temp root for progress, scope and message files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_root: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherSettings {
    /// Executable of the coding agent.
    pub cli_command: String,
    /// Instruction document, relative to the project root.
    pub driver_file: String,
    /// Upper bound of concurrently running analyses.
    pub max_concurrent: usize,
    /// Finished analyses kept for queries.
    pub max_retained_finished: usize,
    /// Variable the auth artifact path is exported as.
    pub auth_env_var: String,
    /// Seconds before a one-shot prompt file is removed.
    pub prompt_file_ttl_secs: u64,
}

impl Default for LauncherSettings {
    fn default() -> Self {
        Self {
            cli_command: DEFAULT_CLI_COMMAND.to_string(),
            driver_file: DEFAULT_DRIVER_FILE.to_string(),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            max_retained_finished: DEFAULT_MAX_RETAINED_FINISHED,
            auth_env_var: DEFAULT_AUTH_ENV_VAR.to_string(),
            prompt_file_ttl_secs: DEFAULT_PROMPT_FILE_TTL_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub poll_interval_ms: u64,
    /// Skip the directory watch and rely on polling alone.
    pub poll_only: bool,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            poll_only: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerSettings {
    pub channel: String,
    pub fail_on_handler_error: bool,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            channel: DEFAULT_CHANNEL.to_string(),
            fail_on_handler_error: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationSettings {
    pub sync_interval_secs: u64,
}

impl Default for IntegrationSettings {
    fn default() -> Self {
        Self {
            sync_interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
        }
    }
}

/// A prompt library entry: Markdown with YAML front matter.
///
/// ```markdown
/// ---
/// id: review
/// title: Code review
/// type: review
/// category: quality
/// tags: [rust]
/// ---
///
/// Review the staged changes...
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptEntry {
    pub id: String,
    pub title: String,

    #[serde(rename = "type", default)]
    pub prompt_type: Option<String>,

    #[serde(default)]
    pub category: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Markdown body; not part of the front matter.
    #[serde(skip)]
    pub body: String,
}

/// Everything loaded from a project's `.launchkit/` directory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppConfig {
    /// Settings from `config.toml`.
    pub settings: LaunchKitConfig,

    /// Prompt library from `prompts/*.md`.
    pub prompts: Vec<PromptEntry>,
}

impl AppConfig {
    pub fn prompt(&self, id: &str) -> Option<&PromptEntry> {
        self.prompts.iter().find(|p| p.id == id)
    }
}
