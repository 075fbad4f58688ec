use color_eyre::eyre::Result;
use colored::Colorize;
use lk_core::init::{generate_launchkit_structure, InitOptions};
use std::path::Path;

pub async fn run(project: &Path, force: bool, minimal: bool) -> Result<()> {
    let written = generate_launchkit_structure(InitOptions {
        target_dir: project.to_path_buf(),
        force,
        minimal,
    })
    .await?;

    println!(
        "{} {}",
        "✓".green(),
        format!("Initialized launchkit in {}", project.display()).bold()
    );
    for path in &written {
        let shown = path.strip_prefix(project).unwrap_or(path);
        println!("  {} {}", "+".green(), shown.display());
    }
    println!(
        "\nEdit {} and start with {}",
        "CLAUDE.md".cyan(),
        "launchkit launch --scope <json>".cyan()
    );
    Ok(())
}
