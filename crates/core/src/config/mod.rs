//! Configuration loading and management.
//!
//! This module loads project settings and the prompt library from the
//! `.launchkit/` directory of a project.

pub mod error;
pub mod loader;
pub mod models;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_config, load_prompts, CONFIG_DIR};
pub use models::{AppConfig, LaunchKitConfig, PromptEntry};
