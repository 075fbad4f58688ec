//! Mockup analysis instruction documents.

use super::error::{LaunchError, LaunchResult};
use crate::init::templates::get_template;
use crate::paths::{write_atomic, TempLocator, MOCKUP_ANALYSIS_DIR};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Project-local template overriding the embedded one.
pub const PROJECT_TEMPLATE_PATH: &str = "docs/mockup_analysis_template.md";

/// Embedded default template.
pub const DEFAULT_TEMPLATE: &str = "mockup_analysis.md";

/// Source recorded when the caller does not name one.
pub const UNKNOWN_SOURCE: &str = "unknown";

/// Values substituted into the analysis template.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisVars<'a> {
    pub mockup_path: &'a Path,
    pub project_path: &'a Path,
    pub mockup_name: &'a str,
    pub source: Option<&'a str>,
}

/// Replace every `{{MOCKUP_PATH}}`, `{{PROJECT_PATH}}`, `{{MOCKUP_NAME}}` and
/// `{{SOURCE}}` occurrence.
pub fn render(template: &str, vars: &AnalysisVars<'_>) -> String {
    template
        .replace("{{MOCKUP_PATH}}", &vars.mockup_path.to_string_lossy())
        .replace("{{PROJECT_PATH}}", &vars.project_path.to_string_lossy())
        .replace("{{MOCKUP_NAME}}", vars.mockup_name)
        .replace("{{SOURCE}}", vars.source.unwrap_or(UNKNOWN_SOURCE))
}

/// The project's template if it has one, else the embedded default.
pub fn load_template(project_path: &Path) -> LaunchResult<String> {
    let custom = project_path.join(PROJECT_TEMPLATE_PATH);
    match std::fs::read_to_string(&custom) {
        Ok(content) => return Ok(content),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = ?custom, "no project analysis template, using the default");
        }
        Err(source) => return Err(LaunchError::Io { path: custom, source }),
    }
    get_template(DEFAULT_TEMPLATE)
        .ok_or_else(|| LaunchError::setup(format!("embedded template {DEFAULT_TEMPLATE} missing")))
}

/// Render the analysis document into `mockup-analysis/` and return its path.
pub fn write_analysis_file(
    locator: &TempLocator,
    vars: &AnalysisVars<'_>,
    millis: i64,
) -> LaunchResult<PathBuf> {
    let template = load_template(vars.project_path)?;
    let content = render(&template, vars);

    let dir = locator
        .temp_dir(MOCKUP_ANALYSIS_DIR)
        .map_err(|source| LaunchError::Io {
            path: locator.root().join(MOCKUP_ANALYSIS_DIR),
            source,
        })?;
    let path = dir.join(format!("{}-analysis-{millis}.md", vars.mockup_name));
    write_atomic(&path, content.as_bytes()).map_err(|source| LaunchError::Io {
        path: path.clone(),
        source,
    })?;

    info!(?path, source = vars.source.unwrap_or(UNKNOWN_SOURCE), "analysis file written");
    Ok(path)
}
