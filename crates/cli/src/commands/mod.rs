//! Subcommand implementations.

mod init;
mod launch;
mod messages;
mod scopes;

use crate::cli::{Cli, Command};
use color_eyre::eyre::{Result, WrapErr};
use lk_core::config::{load_config, AppConfig};
use lk_core::paths::TempLocator;
use std::path::{Path, PathBuf};

/// Project, configuration and temp root resolved for one invocation.
pub struct Context {
    pub project: PathBuf,
    pub config: AppConfig,
    pub locator: TempLocator,
}

impl Context {
    async fn load(project: &Path, temp_root: Option<&Path>) -> Result<Self> {
        let config = load_config(project)
            .await
            .wrap_err_with(|| format!("failed to load configuration of {}", project.display()))?;

        // The flag wins over the config file.
        let locator = match temp_root.or(config.settings.temp_root.as_deref()) {
            Some(root) => TempLocator::new(root),
            None => TempLocator::system(),
        };

        Ok(Self {
            project: project.to_path_buf(),
            config,
            locator,
        })
    }

    /// `channel`, or the configured default channel.
    pub fn channel(&self, channel: Option<String>) -> String {
        channel.unwrap_or_else(|| self.config.settings.broker.channel.clone())
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    let project = std::path::absolute(&cli.project)
        .wrap_err_with(|| format!("invalid project path {}", cli.project.display()))?;
    let temp_root = cli.temp_root.as_deref();

    match cli.command {
        Command::Init { force, minimal } => init::run(&project, force, minimal).await,
        Command::Launch { scope, force, auth } => {
            let ctx = Context::load(&project, temp_root).await?;
            launch::launch(&ctx, &scope, force, &auth).await
        }
        Command::Analyze {
            mockups,
            source,
            auth,
        } => {
            let ctx = Context::load(&project, temp_root).await?;
            launch::analyze(&ctx, &mockups, source, &auth).await
        }
        Command::Send {
            message_type,
            payload,
            channel,
        } => {
            let ctx = Context::load(&project, temp_root).await?;
            messages::send(&ctx, &message_type, &payload, channel)
        }
        Command::Watch { channel } => {
            let ctx = Context::load(&project, temp_root).await?;
            messages::watch(&ctx, channel).await
        }
        Command::Scopes { action } => {
            let ctx = Context::load(&project, temp_root).await?;
            scopes::run(&ctx, action)
        }
        Command::Status => {
            let ctx = Context::load(&project, temp_root).await?;
            scopes::status(&ctx).await
        }
    }
}
