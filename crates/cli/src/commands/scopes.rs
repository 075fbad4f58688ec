use crate::cli::ScopesAction;
use crate::commands::Context;
use color_eyre::eyre::{eyre, Result};
use colored::Colorize;
use lk_core::auth::StaticAuthProvider;
use lk_core::broker::{BrokerOptions, MessageBroker};
use lk_core::config::CONFIG_DIR;
use lk_core::events::EventBus;
use lk_core::launcher::{Launcher, LauncherOptions};
use lk_core::scope::ScopeSerializer;
use lk_core::terminal::ProcessTerminalHost;
use lk_protocol::message_models::MessageStatus;
use std::sync::Arc;

pub fn run(ctx: &Context, action: ScopesAction) -> Result<()> {
    let scopes = ScopeSerializer::new(ctx.locator.clone());

    match action {
        ScopesAction::List => {
            let documents = scopes.available_scopes()?;
            if documents.is_empty() {
                println!("{}", "No scopes stored".dimmed());
            }
            for scope in documents {
                println!(
                    "{}  {}  {:>5.1}%  {} items",
                    scope.id.bold(),
                    scope.name,
                    scope.total_progress,
                    scope.items.len()
                );
            }
        }
        ScopesAction::Show { id } => {
            let scope = scopes
                .import(&id)?
                .ok_or_else(|| eyre!("scope not found: {id}"))?;
            println!("{}", serde_json::to_string_pretty(&scope)?);
            if let Some(command) = scopes.cli_command(&id)? {
                println!("\n{} {command}", "run:".dimmed());
            }
        }
        ScopesAction::Delete { id } => {
            if !scopes.delete(&id)? {
                return Err(eyre!("scope not found: {id}"));
            }
            println!("{} deleted {id}", "✓".green());
        }
    }
    Ok(())
}

pub async fn status(ctx: &Context) -> Result<()> {
    let settings = &ctx.config.settings;
    let launcher = Launcher::new(
        ctx.locator.clone(),
        Arc::new(ProcessTerminalHost::new()),
        Arc::new(StaticAuthProvider::new(ctx.locator.root().join("auth.json"))),
        Arc::new(EventBus::default()),
        LauncherOptions::from(settings),
    );

    let config_file = ctx.project.join(CONFIG_DIR).join("config.toml");
    let driver_file = ctx.project.join(&settings.launcher.driver_file);
    let cli = if launcher.is_cli_available().await {
        "available".green()
    } else {
        "not found".red()
    };
    let found = |exists: bool| if exists { "present".green() } else { "missing".red() };

    println!("{}", "launchkit status".bold());
    println!("  project      {}", ctx.project.display());
    if config_file.is_file() {
        println!("  config       {}", config_file.display());
    } else {
        println!("  config       {}", "defaults".dimmed());
    }
    println!("  cli          {} ({cli})", settings.launcher.cli_command);
    println!(
        "  driver file  {} ({})",
        settings.launcher.driver_file,
        found(driver_file.is_file())
    );
    println!("  analyses     up to {} at once", settings.launcher.max_concurrent);
    println!("  prompts      {}", ctx.config.prompts.len());
    println!("  temp root    {}", ctx.locator.root().display());
    println!(
        "  scopes       {}",
        launcher.scopes().available_ids()?.len()
    );

    let channel = ctx.channel(None);
    let broker = MessageBroker::for_channel(&ctx.locator, &channel, BrokerOptions::default())?;
    let counts = MessageStatus::ALL
        .into_iter()
        .map(|status| Ok(format!("{} {}", status.as_suffix(), broker.list(status)?.len())))
        .collect::<Result<Vec<_>>>()?;
    println!("  messages     [{channel}] {}", counts.join(", "));

    Ok(())
}
