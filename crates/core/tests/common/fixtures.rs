//! Test fixtures: projects, launchers and scopes.

use lk_core::auth::StaticAuthProvider;
use lk_core::events::{EventBus, EventEnvelope};
use lk_core::launcher::{Launcher, LauncherOptions, SecondaryLaunchRequest};
use lk_core::monitor::{MonitorMode, MonitorOptions};
use lk_core::paths::TempLocator;
use lk_core::scope::{ScopeInput, ScopeItemInput};
use lk_core::terminal::MockTerminalHost;
use lk_protocol::ipc::Event;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;

/// Mockups created by [`create_test_project`].
#[allow(dead_code)]
pub const MOCKUPS: [&str; 4] = ["login", "signup", "profile", "settings"];

/// Create a project directory with a driver file and a few mockups.
///
/// Returns a TempDir that must be kept alive for the test duration.
#[allow(dead_code)]
pub fn create_test_project() -> std::io::Result<TempDir> {
    let temp_dir = tempfile::tempdir()?;
    let root = temp_dir.path();

    std::fs::write(root.join("CLAUDE.md"), "# Instructions\n")?;
    std::fs::create_dir_all(root.join("mockups"))?;
    for name in MOCKUPS {
        std::fs::write(
            root.join("mockups").join(format!("{name}.html")),
            format!("<html><body>{name}</body></html>"),
        )?;
    }

    Ok(temp_dir)
}

/// A launcher over a mock terminal host with everything kept alive.
#[allow(dead_code)]
pub struct TestEnv {
    pub temp_root: TempDir,
    pub project: TempDir,
    pub host: MockTerminalHost,
    pub bus: EventBus,
    pub launcher: Launcher,
}

/// Launcher options with a fast, poll-only monitor.
#[allow(dead_code)]
pub fn fast_options() -> LauncherOptions {
    LauncherOptions {
        monitor: MonitorOptions {
            poll_interval: Duration::from_millis(20),
            mode: MonitorMode::PollOnly,
        },
        ..LauncherOptions::default()
    }
}

#[allow(dead_code)]
pub fn test_env() -> TestEnv {
    test_env_with(fast_options())
}

#[allow(dead_code)]
pub fn test_env_with(options: LauncherOptions) -> TestEnv {
    let temp_root = tempfile::tempdir().expect("Failed to create temp root");
    let project = create_test_project().expect("Failed to create test project");
    let host = MockTerminalHost::new();
    let bus = EventBus::default();

    let launcher = Launcher::new(
        TempLocator::new(temp_root.path()),
        Arc::new(host.clone()),
        Arc::new(StaticAuthProvider::new(temp_root.path().join("auth.json"))),
        Arc::new(bus.clone()),
        options,
    );

    TestEnv {
        temp_root,
        project,
        host,
        bus,
        launcher,
    }
}

/// Request analysing `mockups/{name}.html` of `project`.
#[allow(dead_code)]
pub fn mockup_request(project: &Path, name: &str) -> SecondaryLaunchRequest {
    SecondaryLaunchRequest {
        source_path: project.join("mockups").join(format!("{name}.html")),
        project_path: project.to_path_buf(),
        source: Some("tests".to_string()),
    }
}

/// A scope with three items, two of them selected.
#[allow(dead_code)]
pub fn sample_scope(id: &str) -> ScopeInput {
    let item = |id: &str, title: &str, progress: f64| ScopeItemInput {
        id: Some(id.to_string()),
        title: Some(title.to_string()),
        progress: Some(progress),
        priority: Some("high".to_string()),
        dependencies: Some(Vec::new()),
        ..ScopeItemInput::default()
    };

    ScopeInput {
        id: Some(id.to_string()),
        name: Some("Authentication".to_string()),
        description: Some("Login and signup".to_string()),
        items: Some(vec![
            item("item-1", "Login form", 50.0),
            item("item-2", "Signup form", 0.0),
            item("item-3", "Password reset", 0.0),
        ]),
        selected_ids: Some(vec!["item-1".to_string(), "item-2".to_string()]),
        ..ScopeInput::default()
    }
}

/// Everything currently buffered on `rx`.
#[allow(dead_code)]
pub fn drain_events(rx: &mut broadcast::Receiver<EventEnvelope>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(envelope) = rx.try_recv() {
        events.push(envelope.event);
    }
    events
}
