//! File generation for `launchkit init`.

use super::error::{InitError, InitResult};
use super::templates::{get_template, list_templates};
use crate::config::loader::CONFIG_DIR;
use crate::config::models::DEFAULT_DRIVER_FILE;
use crate::launcher::analysis::{DEFAULT_TEMPLATE, PROJECT_TEMPLATE_PATH};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Options for initializing a project.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// Project root.
    pub target_dir: PathBuf,

    /// Overwrite an existing `.launchkit/` directory and existing files.
    pub force: bool,

    /// Only write the config and the driver document.
    pub minimal: bool,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            target_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            force: false,
            minimal: false,
        }
    }
}

/// Generate the launchkit files of a project and return the paths written.
///
/// ```text
/// <project>/
/// ├── .launchkit/
/// │   ├── config.toml
/// │   └── prompts/*.md                  (unless minimal)
/// ├── CLAUDE.md                         (kept if present, unless force)
/// └── docs/mockup_analysis_template.md  (unless minimal; kept if present)
/// ```
///
/// # Errors
/// - `.launchkit/` already exists and `force` is not set
/// - a template is missing from the embedded assets
/// - a directory or file cannot be written
pub async fn generate_launchkit_structure(options: InitOptions) -> InitResult<Vec<PathBuf>> {
    let root = &options.target_dir;
    let lk_dir = root.join(CONFIG_DIR);

    if lk_dir.exists() && !options.force {
        return Err(InitError::DirectoryExists(lk_dir));
    }

    let mut written = Vec::new();
    written.push(write_template_file("config.toml", &lk_dir.join("config.toml"))?);

    let driver = root.join(DEFAULT_DRIVER_FILE);
    if options.force || !driver.exists() {
        written.push(write_template_file(DEFAULT_DRIVER_FILE, &driver)?);
    } else {
        debug!(path = ?driver, "keeping existing driver file");
    }

    if !options.minimal {
        for template in list_templates("prompts/") {
            written.push(write_template_file(&template, &lk_dir.join(&template))?);
        }

        let analysis = root.join(PROJECT_TEMPLATE_PATH);
        if options.force || !analysis.exists() {
            written.push(write_template_file(DEFAULT_TEMPLATE, &analysis)?);
        }
    }

    info!(root = ?root, files = written.len(), "launchkit initialized");
    Ok(written)
}

/// Write the embedded `template` to `target`, creating parent directories.
fn write_template_file(template: &str, target: &Path) -> InitResult<PathBuf> {
    let content =
        get_template(template).ok_or_else(|| InitError::TemplateNotFound(template.to_string()))?;

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|source| InitError::DirectoryCreate {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    fs::write(target, content).map_err(|source| InitError::FileWrite {
        path: target.to_path_buf(),
        source,
    })?;

    Ok(target.to_path_buf())
}
