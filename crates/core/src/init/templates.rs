//! Embedded template files for `launchkit init` and the default mockup
//! analysis document.
//!
//! Files under `crates/core/templates/` are compiled into the binary, debug
//! builds included (`debug-embed`).

use rust_embed::RustEmbed;

#[derive(RustEmbed)]
#[folder = "$CARGO_MANIFEST_DIR/templates"]
pub struct TemplateAssets;

/// Get template file content by path relative to the templates root, e.g.
/// `"config.toml"` or `"prompts/review.md"`.
///
/// # Example
/// ```
/// use lk_core::init::templates::get_template;
///
/// let config = get_template("config.toml").expect("config.toml should exist");
/// assert!(config.contains("[launcher]"));
/// ```
pub fn get_template(path: &str) -> Option<String> {
    TemplateAssets::get(path).map(|file| String::from_utf8_lossy(file.data.as_ref()).to_string())
}

/// List all template files under `prefix` (e.g. `"prompts/"`), sorted.
pub fn list_templates(prefix: &str) -> Vec<String> {
    let mut paths: Vec<String> = TemplateAssets::iter()
        .filter(|path| path.starts_with(prefix))
        .map(|path| path.to_string())
        .collect();
    paths.sort();
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::models::LaunchKitConfig;

    #[test]
    fn test_config_template_parses_to_defaults() {
        let content = get_template("config.toml").expect("config.toml should be embedded");
        let parsed: LaunchKitConfig = toml::from_str(&content).expect("template should parse");
        assert_eq!(parsed, LaunchKitConfig::default());
    }

    #[test]
    fn test_analysis_template_has_placeholders() {
        let content =
            get_template("mockup_analysis.md").expect("mockup_analysis.md should be embedded");
        for placeholder in ["{{MOCKUP_PATH}}", "{{PROJECT_PATH}}", "{{MOCKUP_NAME}}", "{{SOURCE}}"] {
            assert!(content.contains(placeholder), "missing {placeholder}");
        }
    }

    #[test]
    fn test_list_prompt_templates() {
        let prompts = list_templates("prompts/");
        assert_eq!(
            prompts,
            vec![
                "prompts/requirements.md".to_string(),
                "prompts/review.md".to_string()
            ]
        );
    }

    #[test]
    fn test_get_nonexistent_template() {
        assert!(get_template("nonexistent.txt").is_none());
    }
}
