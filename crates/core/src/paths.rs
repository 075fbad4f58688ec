//! Temp and config directory resolution.
//!
//! Every file launchkit shares with the external CLI lives under a single
//! temp root:
//!
//! ```text
//! <temp_root>/
//! ├── progress/{workId}.json
//! ├── scopes/{scopeId}.json
//! ├── messages/{channel}/{messageId}.{status}.json
//! ├── mockup-analysis/{name}-analysis-{millis}.md
//! ├── prompts/
//! └── projects/{projectId}/
//! ```

use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub const PROGRESS_DIR: &str = "progress";
pub const SCOPES_DIR: &str = "scopes";
pub const MESSAGES_DIR: &str = "messages";
pub const MOCKUP_ANALYSIS_DIR: &str = "mockup-analysis";
pub const PROMPTS_DIR: &str = "prompts";
pub const PROJECTS_DIR: &str = "projects";

const APP_DIR: &str = "launchkit";

/// Resolves the directories launchkit reads and writes.
///
/// Path helpers are pure; only [`TempLocator::temp_dir`] and
/// [`TempLocator::config_dir`] touch the filesystem, creating the directory
/// on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempLocator {
    root: PathBuf,
    config_root: PathBuf,
}

impl TempLocator {
    /// Locator rooted at an explicit directory. The config dir is
    /// `<root>/config`, which keeps tests fully sandboxed.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let config_root = root.join("config");
        Self { root, config_root }
    }

    /// Locator for the current user: `<os temp>/launchkit` and the platform
    /// config dir (`~/.config/launchkit` on Linux).
    pub fn system() -> Self {
        let root = std::env::temp_dir().join(APP_DIR);
        let config_root = dirs::config_dir()
            .map(|dir| dir.join(APP_DIR))
            .or_else(|| dirs::home_dir().map(|home| home.join(format!(".{APP_DIR}"))))
            .unwrap_or_else(|| root.join("config"));
        Self { root, config_root }
    }

    /// Replace the config directory.
    pub fn with_config_dir(mut self, config_root: impl Into<PathBuf>) -> Self {
        self.config_root = config_root.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<sub>`, created if missing.
    pub fn temp_dir(&self, sub: &str) -> io::Result<PathBuf> {
        let dir = self.root.join(sub);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Per-user config directory, created if missing.
    pub fn config_dir(&self) -> io::Result<PathBuf> {
        std::fs::create_dir_all(&self.config_root)?;
        Ok(self.config_root.clone())
    }

    pub fn progress_file(&self, work_id: &str) -> PathBuf {
        self.root.join(PROGRESS_DIR).join(format!("{work_id}.json"))
    }

    pub fn scope_file(&self, scope_id: &str) -> PathBuf {
        self.root.join(SCOPES_DIR).join(format!("{scope_id}.json"))
    }

    pub fn messages_dir(&self, channel: &str) -> PathBuf {
        self.root.join(MESSAGES_DIR).join(channel)
    }

    /// Directory shared between all launches of one project.
    pub fn project_shared_dir(&self, project_id: &str) -> io::Result<PathBuf> {
        let dir = self.root.join(PROJECTS_DIR).join(project_id);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

impl Default for TempLocator {
    fn default() -> Self {
        Self::system()
    }
}

/// Write `contents` to `path` through a temp file in the same directory so
/// readers never observe a partial file.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no parent"))?;
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|err| err.error)?;
    Ok(())
}
