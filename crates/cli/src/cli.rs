//! Command-line arguments.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "launchkit",
    version,
    about = "Launch and supervise a coding agent CLI in terminals.",
    long_about = None
)]
pub struct Cli {
    /// Project directory.
    #[arg(long, short = 'C', global = true, value_name = "DIR", default_value = ".")]
    pub project: PathBuf,

    /// Override the temp root (progress, scopes, messages).
    #[arg(long, global = true, value_name = "DIR")]
    pub temp_root: Option<PathBuf>,

    /// Logging level. If omitted, `LAUNCHKIT_LOG` or `info` is used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Write `.launchkit/`, the driver file and the analysis template.
    Init {
        /// Overwrite existing files.
        #[arg(long)]
        force: bool,

        /// Only write the config and the driver file.
        #[arg(long)]
        minimal: bool,
    },

    /// Launch the CLI against a scope and supervise it.
    Launch {
        /// Scope as inline JSON or a path to a JSON file.
        #[arg(long, value_name = "JSON|PATH")]
        scope: String,

        /// Reset a running launch instead of refusing.
        #[arg(long)]
        force: bool,

        #[command(flatten)]
        auth: AuthArgs,
    },

    /// Run one analysis per mockup file.
    Analyze {
        /// Mockup files, relative to the project or absolute.
        #[arg(required = true, value_name = "MOCKUP")]
        mockups: Vec<PathBuf>,

        /// Free-form origin recorded with each analysis.
        #[arg(long)]
        source: Option<String>,

        #[command(flatten)]
        auth: AuthArgs,
    },

    /// Send a message through the broker.
    Send {
        /// Message type, e.g. `scope:update` or `command-execute`.
        #[arg(value_name = "TYPE")]
        message_type: String,

        /// JSON payload.
        payload: String,

        /// Broker channel; defaults to `broker.channel` from the config.
        #[arg(long)]
        channel: Option<String>,
    },

    /// Print and complete broker messages until interrupted.
    Watch {
        #[arg(long)]
        channel: Option<String>,
    },

    /// Inspect stored scopes.
    Scopes {
        #[command(subcommand)]
        action: ScopesAction,
    },

    /// Show configuration, CLI availability and broker counts.
    Status,
}

#[derive(Debug, Clone, Subcommand)]
pub enum ScopesAction {
    List,
    Show { id: String },
    Delete { id: String },
}

#[derive(Debug, Clone, Args)]
pub struct AuthArgs {
    /// Credentials file synced into the config dir before each launch.
    #[arg(long, value_name = "PATH")]
    pub auth_file: Option<PathBuf>,
}

#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}
