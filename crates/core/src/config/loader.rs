//! Configuration file loader for the `.launchkit/` directory.
//!
//! This module loads:
//! - `config.toml`: launcher, monitor, broker and integration settings
//! - `prompts/*.md`: prompt library entries with YAML front matter

use crate::config::error::{ConfigError, ConfigResult};
use crate::config::models::{AppConfig, LaunchKitConfig, PromptEntry};
use gray_matter::engine::YAML;
use gray_matter::Matter;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

/// Project-level configuration directory.
pub const CONFIG_DIR: &str = ".launchkit";

/// Loads all configuration from the `.launchkit/` directory under `root`.
///
/// Missing directories or files yield defaults rather than errors.
///
/// # Errors
///
/// Returns `ConfigError` if a file exists but cannot be read or parsed, or
/// if the settings are unusable (e.g. `max_concurrent = 0`).
///
/// # Example
///
/// ```rust,no_run
/// use lk_core::config::loader::load_config;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new(".")).await?;
/// println!("{} concurrent analyses", config.settings.launcher.max_concurrent);
/// # Ok(())
/// # }
/// ```
pub async fn load_config(root: &Path) -> ConfigResult<AppConfig> {
    let lk_dir = root.join(CONFIG_DIR);

    if !lk_dir.exists() {
        debug!(?root, "no .launchkit directory, using defaults");
        return Ok(AppConfig::default());
    }

    let settings = load_settings(&lk_dir)?;
    let prompts = load_prompts(&lk_dir.join("prompts"))?;

    Ok(AppConfig { settings, prompts })
}

fn load_settings(lk_dir: &Path) -> ConfigResult<LaunchKitConfig> {
    let config_path = lk_dir.join("config.toml");

    if !config_path.exists() {
        return Ok(LaunchKitConfig::default());
    }

    let content =
        std::fs::read_to_string(&config_path).map_err(|source| ConfigError::FileRead {
            path: config_path.clone(),
            source,
        })?;

    let config: LaunchKitConfig =
        toml::from_str(&content).map_err(|source| ConfigError::TomlParse {
            path: config_path.clone(),
            source,
        })?;

    if config.launcher.max_concurrent == 0 {
        return Err(ConfigError::InvalidConfig {
            path: config_path,
            key: "launcher.max_concurrent",
            reason: "must be at least 1".to_string(),
        });
    }

    Ok(config)
}

/// Loads prompt library entries from `*.md` files in `prompts_dir`.
///
/// Entries are sorted by id.
pub fn load_prompts(prompts_dir: &Path) -> ConfigResult<Vec<PromptEntry>> {
    if !prompts_dir.exists() {
        return Ok(Vec::new());
    }

    let mut prompts = Vec::new();

    for entry in WalkDir::new(prompts_dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|source| ConfigError::DirectoryWalk {
            path: prompts_dir.to_path_buf(),
            source,
        })?;

        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) != Some("md") {
            continue;
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;

        let matter = Matter::<YAML>::new();
        let result = matter.parse(&content);

        let mut prompt: PromptEntry = result
            .data
            .ok_or_else(|| ConfigError::MarkdownParse {
                path: path.to_path_buf(),
                reason: "no YAML block at the top of the file".to_string(),
            })?
            .deserialize()
            .map_err(|e| ConfigError::MarkdownParse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        prompt.body = result.content;
        prompts.push(prompt);
    }

    prompts.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(prompts)
}
