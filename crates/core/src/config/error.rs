//! Errors raised while reading `.launchkit/`.
//!
//! Every variant names the file or directory at fault so the CLI can point
//! the user at it.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{path} is not valid TOML: {source}")]
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// A prompt file without usable front matter.
    #[error("Prompt {path} has bad front matter: {reason}")]
    MarkdownParse { path: PathBuf, reason: String },

    #[error("Cannot list prompts in {path}: {source}")]
    DirectoryWalk {
        path: PathBuf,
        source: walkdir::Error,
    },

    /// A setting that parses but cannot be used, e.g. a zero concurrency
    /// limit.
    #[error("{path}: `{key}` {reason}")]
    InvalidConfig {
        path: PathBuf,
        key: &'static str,
        reason: String,
    },
}

pub type ConfigResult<T> = Result<T, ConfigError>;
