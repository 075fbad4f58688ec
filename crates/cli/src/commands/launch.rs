//! `launch` and `analyze`: drive the launcher against shell terminals and
//! stay alive until they are done.

use crate::cli::AuthArgs;
use crate::commands::Context;
use color_eyre::eyre::{eyre, Result, WrapErr};
use colored::{ColoredString, Colorize};
use lk_core::auth::{AuthContextProvider, FileAuthProvider, StaticAuthProvider};
use lk_core::events::{EventBus, EventEnvelope};
use lk_core::launcher::{
    ConflictPolicy, Launcher, LauncherOptions, PrimaryLaunchRequest, SecondaryLaunchRequest,
};
use lk_core::scope::ScopeInput;
use lk_core::terminal::{ProcessTerminalHost, TerminalHost};
use lk_protocol::ipc::Event;
use lk_protocol::launch_models::ExecutionStatus;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

const IDLE_CHECK_INTERVAL: Duration = Duration::from_millis(500);

struct Session {
    host: Arc<ProcessTerminalHost>,
    events: broadcast::Receiver<EventEnvelope>,
    launcher: Launcher,
}

impl Session {
    fn new(ctx: &Context, auth: &AuthArgs) -> Result<Self> {
        let host = Arc::new(ProcessTerminalHost::new());
        let bus = EventBus::default();
        let events = bus.subscribe();

        let auth: Arc<dyn AuthContextProvider> = match &auth.auth_file {
            Some(source) => {
                let config_dir = ctx
                    .locator
                    .config_dir()
                    .wrap_err("failed to resolve the config directory")?;
                Arc::new(FileAuthProvider::in_config_dir(&config_dir).with_source(source))
            }
            None => Arc::new(StaticAuthProvider::new(
                ctx.locator.root().join(FileAuthProvider::ARTIFACT_FILE),
            )),
        };

        let terminals: Arc<dyn TerminalHost> = host.clone();
        let launcher = Launcher::new(
            ctx.locator.clone(),
            terminals,
            auth,
            Arc::new(bus),
            LauncherOptions::from(&ctx.config.settings),
        );

        Ok(Self {
            host,
            events,
            launcher,
        })
    }

    /// Print events until every terminal has closed and nothing is running,
    /// or until Ctrl-C disposes the launcher.
    async fn supervise(mut self) -> Result<()> {
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        let mut idle_check = tokio::time::interval(IDLE_CHECK_INTERVAL);

        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    println!("{} interrupted, closing terminals", "■".yellow());
                    self.launcher.dispose().await;
                    break;
                }
                received = self.events.recv() => match received {
                    Ok(envelope) => print_event(&envelope.event),
                    Err(RecvError::Lagged(skipped)) => warn!(skipped, "event output lagged"),
                    Err(RecvError::Closed) => break,
                },
                _ = idle_check.tick() => {
                    if self.host.open_count().await == 0
                        && self.launcher.overall_status() != ExecutionStatus::Running
                    {
                        debug!("all terminals closed");
                        break;
                    }
                }
            }
        }

        while let Ok(envelope) = self.events.try_recv() {
            print_event(&envelope.event);
        }
        Ok(())
    }
}

pub async fn launch(ctx: &Context, scope: &str, force: bool, auth: &AuthArgs) -> Result<()> {
    let input = read_scope_arg(scope)?;
    let session = Session::new(ctx, auth)?;

    let launch = session
        .launcher
        .launch_primary(PrimaryLaunchRequest {
            project_path: ctx.project.clone(),
            scope: input,
            on_conflict: if force {
                ConflictPolicy::ForceReset
            } else {
                ConflictPolicy::Abort
            },
        })
        .await?;
    println!("  scope     {}", launch.scope_file_path.display());

    session.supervise().await
}

pub async fn analyze(
    ctx: &Context,
    mockups: &[PathBuf],
    source: Option<String>,
    auth: &AuthArgs,
) -> Result<()> {
    let session = Session::new(ctx, auth)?;

    let mut admitted = 0;
    for mockup in mockups {
        let request = SecondaryLaunchRequest {
            source_path: mockup.clone(),
            project_path: ctx.project.clone(),
            source: source.clone(),
        };
        match session.launcher.launch_secondary(request).await {
            Ok(process) => {
                admitted += 1;
                debug!(id = %process.id, "analysis admitted");
            }
            Err(err) => println!("{} {}: {err}", "✗".red(), mockup.display()),
        }
    }

    if admitted == 0 {
        return Err(eyre!("no analysis could be started"));
    }
    session.supervise().await
}

/// Inline JSON when the argument starts with `{`, otherwise a file path.
fn read_scope_arg(arg: &str) -> Result<ScopeInput> {
    let json = if arg.trim_start().starts_with('{') {
        arg.to_string()
    } else {
        std::fs::read_to_string(arg).wrap_err_with(|| format!("failed to read scope file {arg}"))?
    };
    serde_json::from_str(&json).wrap_err("invalid scope JSON")
}

fn status_marker(status: ExecutionStatus) -> ColoredString {
    match status {
        ExecutionStatus::Completed => "✓".green(),
        ExecutionStatus::Failed => "✗".red(),
        _ => "•".yellow(),
    }
}

fn print_event(event: &Event) {
    match event {
        Event::LaunchCounted { .. } => {}
        Event::LaunchStarted {
            work_id,
            progress_file_path,
            ..
        } => println!(
            "{} {} running, progress in {}",
            "▶".green(),
            work_id.bold(),
            progress_file_path.display()
        ),
        Event::PromptLaunchStarted {
            prompt_file_path, ..
        } => println!("{} prompt {}", "▶".green(), prompt_file_path.display()),
        Event::LaunchFailed { kind, error, .. } => {
            println!("{} {kind:?} launch failed: {error}", "✗".red())
        }
        Event::ProgressUpdated { report, .. } => {
            println!("{} {:.0}%", "…".cyan(), report.total_progress)
        }
        Event::PrimaryFinished { work_id, status } => println!(
            "{} {} {status}",
            status_marker(*status),
            work_id.as_deref().unwrap_or("launch")
        ),
        Event::LaunchStopped { .. } => println!("{} launch reset", "■".yellow()),
        Event::SecondaryStarted {
            process_id,
            mockup_name,
            ..
        } => println!(
            "{} analysing {} ({})",
            "▶".green(),
            mockup_name.bold(),
            process_id.dimmed()
        ),
        Event::SecondaryCompleted { process_id, status } => {
            println!("{} {process_id} {status}", status_marker(*status))
        }
    }
}
