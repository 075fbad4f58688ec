//! Process launcher.
//!
//! Owns the primary launch state machine and the bounded pool of secondary
//! (mockup analysis) launches. A launch opens a terminal through the
//! [`TerminalHost`], types the auth export and the driving command into it
//! and from then on only learns about the external process through its
//! progress file and the terminal's close signal.
//!
//! ```text
//! Idle -> Running -> Completed | Failed
//!   ^________|___________________|   (reset_primary / new launch)
//! ```

pub mod analysis;
pub mod error;

pub use error::{LaunchError, LaunchResult};

use crate::auth::AuthContextProvider;
use crate::broker::{BrokerOptions, MessageBroker};
use crate::config::models::LaunchKitConfig;
use crate::events::EventPublisher;
use crate::monitor::{read_progress_file, MonitorMode, MonitorOptions, ProgressMonitor};
use crate::paths::{TempLocator, PROGRESS_DIR};
use crate::scope::{
    generate_scope_id, is_valid_scope_id, ScopeError, ScopeInput, ScopeSerializer,
};
use crate::terminal::{CommandBuilder, TerminalHost, TerminalSpec};
use analysis::AnalysisVars;
use chrono::Utc;
use lk_protocol::ipc::Event;
use lk_protocol::launch_models::{
    ExecutionStatus, LaunchContext, LaunchKind, MockupProcess, TerminalId,
};
use lk_protocol::message_models::MessageType;
use lk_protocol::progress_models::ProgressReport;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

const EVENT_SOURCE: &str = "launcher";

/// Exported into the primary terminal so the CLI knows where to report.
pub const PROGRESS_FILE_ENV: &str = "LAUNCHKIT_PROGRESS_FILE";
pub const SCOPE_FILE_ENV: &str = "LAUNCHKIT_SCOPE_FILE";

/// Launcher settings, normally derived from [`LaunchKitConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct LauncherOptions {
    pub cli_command: String,
    pub driver_file: String,
    pub max_concurrent: usize,
    pub max_retained_finished: usize,
    pub auth_env_var: String,
    pub prompt_file_ttl: Duration,
    pub monitor: MonitorOptions,
}

impl From<&LaunchKitConfig> for LauncherOptions {
    fn from(config: &LaunchKitConfig) -> Self {
        let launcher = &config.launcher;
        Self {
            cli_command: launcher.cli_command.clone(),
            driver_file: launcher.driver_file.clone(),
            max_concurrent: launcher.max_concurrent,
            max_retained_finished: launcher.max_retained_finished,
            auth_env_var: launcher.auth_env_var.clone(),
            prompt_file_ttl: Duration::from_secs(launcher.prompt_file_ttl_secs),
            monitor: MonitorOptions {
                poll_interval: Duration::from_millis(config.monitor.poll_interval_ms),
                mode: if config.monitor.poll_only {
                    MonitorMode::PollOnly
                } else {
                    MonitorMode::WatchAndPoll
                },
            },
        }
    }
}

impl Default for LauncherOptions {
    fn default() -> Self {
        Self::from(&LaunchKitConfig::default())
    }
}

/// What to do when a primary launch is requested while one is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Refuse with [`LaunchError::AlreadyRunning`].
    #[default]
    Abort,
    /// Reset the running launch and continue.
    ForceReset,
}

#[derive(Debug, Clone, Default)]
pub struct PrimaryLaunchRequest {
    pub project_path: PathBuf,
    pub scope: ScopeInput,
    pub on_conflict: ConflictPolicy,
}

#[derive(Debug, Clone, Default)]
pub struct SecondaryLaunchRequest {
    /// Artifact to analyse. Relative paths are resolved against the project.
    pub source_path: PathBuf,
    pub project_path: PathBuf,
    /// Where the request came from, e.g. `mockupGallery`.
    pub source: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PromptLaunchRequest {
    pub project_path: PathBuf,
    pub prompt_file: PathBuf,
    pub extra_args: Vec<String>,
    pub on_conflict: ConflictPolicy,
    /// Remove the prompt file after the TTL and when the terminal closes.
    pub delete_after: bool,
}

/// An accepted primary launch.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryLaunch {
    pub work_id: String,
    pub scope_file_path: PathBuf,
    pub progress_file_path: PathBuf,
    pub terminal: TerminalId,
}

#[derive(Debug, Default)]
struct PrimaryState {
    context: LaunchContext,
    kind: Option<LaunchKind>,
    /// Bumped whenever the tracked launch is replaced or reset. Callbacks of
    /// an older launch compare against it and back off.
    generation: u64,
    /// A primary launch is between admission and `Running`.
    launching: bool,
    monitor: Option<ProgressMonitor>,
    cleanup_file: Option<PathBuf>,
}

#[derive(Debug, Default)]
struct SecondaryTable {
    entries: HashMap<String, MockupProcess>,
    /// Ids admitted but not yet inserted.
    reserved: HashSet<String>,
}

impl SecondaryTable {
    fn running(&self) -> usize {
        self.entries
            .values()
            .filter(|p| p.status == ExecutionStatus::Running)
            .count()
    }

    /// Drop the oldest finished entries beyond `keep`.
    fn evict_finished(&mut self, keep: usize) {
        let mut finished: Vec<_> = self
            .entries
            .values()
            .filter(|p| p.status.is_terminal())
            .map(|p| (p.start_time, p.id.clone()))
            .collect();
        if finished.len() <= keep {
            return;
        }
        finished.sort();
        let excess = finished.len() - keep;
        for (_, id) in finished.into_iter().take(excess) {
            debug!(%id, "evicting finished analysis");
            self.entries.remove(&id);
        }
    }
}

struct LauncherInner {
    locator: TempLocator,
    options: LauncherOptions,
    terminals: Arc<dyn TerminalHost>,
    auth: Arc<dyn AuthContextProvider>,
    events: Arc<dyn EventPublisher>,
    scopes: ScopeSerializer,
    commands: CommandBuilder,
    session_env: Mutex<HashMap<String, String>>,
    primary: Mutex<PrimaryState>,
    secondaries: Mutex<SecondaryTable>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Launches and tracks the coding agent. Clones share state.
#[derive(Clone)]
pub struct Launcher {
    inner: Arc<LauncherInner>,
}

impl std::fmt::Debug for Launcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Launcher")
            .field("options", &self.inner.options)
            .field("primary", &self.primary_context().status)
            .finish()
    }
}

impl Launcher {
    pub fn new(
        locator: TempLocator,
        terminals: Arc<dyn TerminalHost>,
        auth: Arc<dyn AuthContextProvider>,
        events: Arc<dyn EventPublisher>,
        options: LauncherOptions,
    ) -> Self {
        let scopes = ScopeSerializer::new(locator.clone());
        Self::with_scopes(locator, terminals, auth, events, scopes, options)
    }

    /// Like [`Launcher::new`] with a preconfigured serializer, e.g. one that
    /// announces exported scopes on a broker.
    pub fn with_scopes(
        locator: TempLocator,
        terminals: Arc<dyn TerminalHost>,
        auth: Arc<dyn AuthContextProvider>,
        events: Arc<dyn EventPublisher>,
        scopes: ScopeSerializer,
        options: LauncherOptions,
    ) -> Self {
        let commands = CommandBuilder::new(options.cli_command.clone());
        Self {
            inner: Arc::new(LauncherInner {
                locator,
                options,
                terminals,
                auth,
                events,
                scopes,
                commands,
                session_env: Mutex::new(HashMap::new()),
                primary: Mutex::new(PrimaryState::default()),
                secondaries: Mutex::new(SecondaryTable::default()),
            }),
        }
    }

    pub fn options(&self) -> &LauncherOptions {
        &self.inner.options
    }

    pub fn locator(&self) -> &TempLocator {
        &self.inner.locator
    }

    pub fn scopes(&self) -> &ScopeSerializer {
        &self.inner.scopes
    }

    /// Environment given to every terminal opened from now on.
    pub fn set_session_env(&self, env: HashMap<String, String>) {
        *lock(&self.inner.session_env) = env;
    }

    pub fn clear_session_env(&self) {
        lock(&self.inner.session_env).clear();
    }

    /// Launch the CLI against a scope.
    pub async fn launch_primary(&self, request: PrimaryLaunchRequest) -> LaunchResult<PrimaryLaunch> {
        let inner = &self.inner;
        let project_path = request.project_path;
        require_dir("project directory", &project_path)?;
        let driver_file = project_path.join(&inner.options.driver_file);
        require_file("driver file", &driver_file)?;

        let mut scope = request.scope;
        scope.id = scope.id.filter(|id| !id.is_empty());
        if let Some(id) = scope.id.as_deref().filter(|id| !is_valid_scope_id(id)) {
            return Err(ScopeError::InvalidId(id.to_string()).into());
        }

        let reservation = inner.reserve_primary(&project_path, request.on_conflict)?;

        let scope_id = scope.id.get_or_insert_with(generate_scope_id).clone();
        if scope.project_path.is_none() {
            scope.project_path = Some(project_path.to_string_lossy().into_owned());
        }
        inner.events.emit(
            Event::LaunchCounted {
                kind: LaunchKind::Primary,
                project_path: project_path.clone(),
                scope_id: Some(scope_id),
            },
            EVENT_SOURCE,
        );

        let exported = inner.scopes.export(&scope)?;
        let work_id = exported.document.id.clone();
        let progress_file = inner.locator.progress_file(&work_id);
        inner
            .locator
            .temp_dir(PROGRESS_DIR)
            .map_err(|source| LaunchError::Io {
                path: inner.locator.root().join(PROGRESS_DIR),
                source,
            })?;

        let terminal_name = format!("launchkit: {}", exported.document.name);
        let (terminal, closed) = inner
            .open_terminal(terminal_name, &project_path, LaunchKind::Primary, Some(&work_id))
            .await?;

        let generation = reservation.install(
            LaunchContext {
                project_path: project_path.clone(),
                driver_file_path: driver_file.clone(),
                scope_id: Some(work_id.clone()),
                scope_file_path: Some(exported.file_path.clone()),
                progress_file_path: Some(progress_file.clone()),
                terminal: Some(terminal),
                status: ExecutionStatus::Running,
                last_progress: None,
                started_at: Some(Utc::now()),
            },
            LaunchKind::Primary,
            None,
        );

        let env = [
            (SCOPE_FILE_ENV, exported.file_path.to_string_lossy().into_owned()),
            (PROGRESS_FILE_ENV, progress_file.to_string_lossy().into_owned()),
        ];
        let command = inner
            .commands
            .driving_command(Some(&work_id), &driver_file, &[]);
        if let Err(err) = inner.type_commands(terminal, &env, &command).await {
            inner.fail_primary(generation, terminal, &err).await;
            return Err(err);
        }

        inner.announce_scope_launch(&work_id);
        inner.start_primary_monitor(generation, progress_file.clone());
        inner.events.emit(
            Event::LaunchStarted {
                work_id: work_id.clone(),
                project_path,
                scope_file_path: exported.file_path.clone(),
                progress_file_path: progress_file.clone(),
            },
            EVENT_SOURCE,
        );
        inner.watch_primary_close(generation, closed);

        info!(%work_id, %terminal, "primary launch running");
        Ok(PrimaryLaunch {
            work_id,
            scope_file_path: exported.file_path,
            progress_file_path: progress_file,
            terminal,
        })
    }

    /// Launch the CLI against an arbitrary prompt file. Tracked as the
    /// primary launch.
    pub async fn launch_prompt(&self, request: PromptLaunchRequest) -> LaunchResult<TerminalId> {
        let inner = &self.inner;
        let project_path = request.project_path;
        let prompt_file = request.prompt_file;
        require_dir("project directory", &project_path)?;
        require_file("prompt file", &prompt_file)?;

        let reservation = inner.reserve_primary(&project_path, request.on_conflict)?;
        inner.events.emit(
            Event::LaunchCounted {
                kind: LaunchKind::Prompt,
                project_path: project_path.clone(),
                scope_id: None,
            },
            EVENT_SOURCE,
        );

        let (terminal, closed) = inner
            .open_terminal("launchkit: prompt".to_string(), &project_path, LaunchKind::Prompt, None)
            .await?;

        let cleanup = request.delete_after.then(|| prompt_file.clone());
        let generation = reservation.install(
            LaunchContext {
                project_path: project_path.clone(),
                driver_file_path: prompt_file.clone(),
                terminal: Some(terminal),
                status: ExecutionStatus::Running,
                started_at: Some(Utc::now()),
                ..LaunchContext::default()
            },
            LaunchKind::Prompt,
            cleanup,
        );

        let command = inner
            .commands
            .driving_command(None, &prompt_file, &request.extra_args);
        if let Err(err) = inner.type_commands(terminal, &[], &command).await {
            inner.fail_primary(generation, terminal, &err).await;
            return Err(err);
        }

        if request.delete_after {
            schedule_prompt_deletion(prompt_file.clone(), inner.options.prompt_file_ttl);
        }
        inner.events.emit(
            Event::PromptLaunchStarted {
                project_path,
                prompt_file_path: prompt_file,
            },
            EVENT_SOURCE,
        );
        inner.watch_primary_close(generation, closed);

        Ok(terminal)
    }

    /// Run a mockup analysis in its own terminal, if a slot is free.
    pub async fn launch_secondary(&self, request: SecondaryLaunchRequest) -> LaunchResult<MockupProcess> {
        let inner = &self.inner;
        let project_path = request.project_path;
        require_dir("project directory", &project_path)?;
        let source_path = if request.source_path.is_relative() {
            project_path.join(&request.source_path)
        } else {
            request.source_path
        };
        require_file("mockup file", &source_path)?;

        let mockup_name = source_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "mockup".to_string());
        let millis = Utc::now().timestamp_millis();
        let slot = inner.reserve_secondary(&mockup_name, millis)?;

        inner.events.emit(
            Event::LaunchCounted {
                kind: LaunchKind::Secondary,
                project_path: project_path.clone(),
                scope_id: None,
            },
            EVENT_SOURCE,
        );

        let analysis_file = analysis::write_analysis_file(
            &inner.locator,
            &AnalysisVars {
                mockup_path: &source_path,
                project_path: &project_path,
                mockup_name: &mockup_name,
                source: request.source.as_deref(),
            },
            millis,
        )?;

        let (terminal, closed) = inner
            .open_terminal(
                format!("launchkit: {mockup_name} analysis"),
                &project_path,
                LaunchKind::Secondary,
                Some(slot.id()),
            )
            .await?;

        let process = MockupProcess {
            id: slot.id().to_string(),
            mockup_name: mockup_name.clone(),
            source_path: source_path.clone(),
            project_path: project_path.clone(),
            analysis_file_path: analysis_file.clone(),
            terminal: Some(terminal),
            status: ExecutionStatus::Running,
            source: request.source,
            start_time: Utc::now(),
        };
        slot.commit(process.clone());

        let command = inner.commands.driving_command(None, &analysis_file, &[]);
        if let Err(err) = inner.type_commands(terminal, &[], &command).await {
            inner.fail_secondary(&process.id, terminal, &err).await;
            return Err(err);
        }

        let watcher_inner = Arc::clone(inner);
        let process_id = process.id.clone();
        tokio::spawn(async move {
            let _ = closed.await;
            watcher_inner.handle_secondary_terminal_closed(&process_id);
        });

        inner.events.emit(
            Event::SecondaryStarted {
                process_id: process.id.clone(),
                mockup_name,
                mockup_file_path: source_path,
                project_path,
                analysis_file_path: analysis_file,
            },
            EVENT_SOURCE,
        );
        info!(id = %process.id, %terminal, "mockup analysis running");
        Ok(process)
    }

    /// Finalize a secondary launch whose terminal closed. Returns `false`
    /// (and does nothing) if the entry is unknown or already finished.
    pub fn handle_secondary_terminal_closed(&self, process_id: &str) -> bool {
        self.inner.handle_secondary_terminal_closed(process_id)
    }

    /// Force the primary launch back to `Idle`. Does not touch the
    /// external process. Returns `false` if it was already idle.
    pub fn reset_primary(&self) -> bool {
        let mut state = lock(&self.inner.primary);
        self.inner.reset_locked(&mut state)
    }

    pub fn primary_context(&self) -> LaunchContext {
        lock(&self.inner.primary).context.clone()
    }

    /// `Running` if the primary or any secondary launch runs, otherwise the
    /// primary status. For observers that only know one status.
    pub fn overall_status(&self) -> ExecutionStatus {
        let primary = lock(&self.inner.primary).context.status;
        if primary == ExecutionStatus::Running || lock(&self.inner.secondaries).running() > 0 {
            ExecutionStatus::Running
        } else {
            primary
        }
    }

    /// Running secondary launches, oldest first.
    pub fn running_secondaries(&self) -> Vec<MockupProcess> {
        let table = lock(&self.inner.secondaries);
        let mut running: Vec<_> = table
            .entries
            .values()
            .filter(|p| p.status == ExecutionStatus::Running)
            .cloned()
            .collect();
        running.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.id.cmp(&b.id)));
        running
    }

    pub fn secondary_info(&self, process_id: &str) -> Option<MockupProcess> {
        lock(&self.inner.secondaries)
            .entries
            .get(process_id)
            .cloned()
    }

    /// Whether `<cli> --version` runs successfully.
    pub async fn is_cli_available(&self) -> bool {
        let cli = &self.inner.options.cli_command;
        let Ok(resolved) = which::which(cli) else {
            debug!(%cli, "CLI not found on PATH");
            return false;
        };
        match tokio::process::Command::new(resolved)
            .arg("--version")
            .output()
            .await
        {
            Ok(output) => output.status.success(),
            Err(err) => {
                warn!(%cli, error = %err, "CLI version check failed");
                false
            }
        }
    }

    /// Stop the monitor and close every running analysis terminal.
    pub async fn dispose(&self) {
        let monitor = lock(&self.inner.primary).monitor.take();
        if let Some(monitor) = monitor {
            monitor.shutdown().await;
        }

        let terminals: Vec<TerminalId> = lock(&self.inner.secondaries)
            .entries
            .values()
            .filter(|p| p.status == ExecutionStatus::Running)
            .filter_map(|p| p.terminal)
            .collect();
        for terminal in terminals {
            if let Err(err) = self.inner.terminals.dispose(terminal).await {
                debug!(%terminal, error = %err, "terminal already gone");
            }
        }
        debug!("launcher disposed");
    }
}

fn require_dir(what: &'static str, path: &Path) -> LaunchResult<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(LaunchError::missing(what, path))
    }
}

fn require_file(what: &'static str, path: &Path) -> LaunchResult<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(LaunchError::missing(what, path))
    }
}

fn remove_prompt_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => info!(?path, "prompt file removed"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!(?path, error = %err, "failed to remove prompt file"),
    }
}

fn schedule_prompt_deletion(path: PathBuf, ttl: Duration) {
    // Windows refuses to delete files the CLI still has open.
    if cfg!(windows) {
        return;
    }
    tokio::spawn(async move {
        tokio::time::sleep(ttl).await;
        remove_prompt_file(&path);
    });
}

/// Admission to the primary slot. Dropping it without
/// [`PrimaryReservation::install`] releases the slot.
struct PrimaryReservation<'a> {
    inner: &'a LauncherInner,
    armed: bool,
}

impl PrimaryReservation<'_> {
    fn install(mut self, context: LaunchContext, kind: LaunchKind, cleanup: Option<PathBuf>) -> u64 {
        let mut state = lock(&self.inner.primary);
        state.generation += 1;
        state.context = context;
        state.kind = Some(kind);
        state.monitor = None;
        state.cleanup_file = cleanup;
        state.launching = false;
        self.armed = false;
        state.generation
    }
}

impl Drop for PrimaryReservation<'_> {
    fn drop(&mut self) {
        if self.armed {
            lock(&self.inner.primary).launching = false;
        }
    }
}

/// An admitted secondary slot holding its process id.
struct SecondarySlot<'a> {
    inner: &'a LauncherInner,
    id: String,
    armed: bool,
}

impl SecondarySlot<'_> {
    fn id(&self) -> &str {
        &self.id
    }

    fn commit(mut self, process: MockupProcess) {
        let mut table = lock(&self.inner.secondaries);
        table.reserved.remove(&self.id);
        table.entries.insert(process.id.clone(), process);
        self.armed = false;
    }
}

impl Drop for SecondarySlot<'_> {
    fn drop(&mut self) {
        if self.armed {
            lock(&self.inner.secondaries).reserved.remove(&self.id);
        }
    }
}

impl LauncherInner {
    fn reserve_primary(
        &self,
        project_path: &Path,
        on_conflict: ConflictPolicy,
    ) -> LaunchResult<PrimaryReservation<'_>> {
        let mut state = lock(&self.primary);
        if state.launching {
            return Err(LaunchError::AlreadyRunning {
                project_path: project_path.to_path_buf(),
            });
        }
        if state.context.status == ExecutionStatus::Running {
            match on_conflict {
                ConflictPolicy::Abort => {
                    return Err(LaunchError::AlreadyRunning {
                        project_path: state.context.project_path.clone(),
                    })
                }
                ConflictPolicy::ForceReset => {
                    warn!(project = ?state.context.project_path, "overriding running launch");
                    self.reset_locked(&mut state);
                }
            }
        }
        state.launching = true;
        Ok(PrimaryReservation {
            inner: self,
            armed: true,
        })
    }

    fn reserve_secondary(&self, mockup_name: &str, millis: i64) -> LaunchResult<SecondarySlot<'_>> {
        let mut table = lock(&self.secondaries);
        let running = table.running() + table.reserved.len();
        let limit = self.options.max_concurrent;
        if running >= limit {
            warn!(running, limit, "analysis capacity exceeded");
            return Err(LaunchError::CapacityExceeded { running, limit });
        }

        let base = format!("mockup-{mockup_name}-{millis}");
        let mut id = base.clone();
        let mut suffix = 1;
        while table.entries.contains_key(&id) || table.reserved.contains(&id) {
            suffix += 1;
            id = format!("{base}-{suffix}");
        }
        table.reserved.insert(id.clone());

        Ok(SecondarySlot {
            inner: self,
            id,
            armed: true,
        })
    }

    fn reset_locked(&self, state: &mut PrimaryState) -> bool {
        if state.context.status == ExecutionStatus::Idle {
            return false;
        }
        state.monitor.take();
        state.generation += 1;
        state.context.status = ExecutionStatus::Idle;
        info!(project = ?state.context.project_path, "primary launch reset");
        self.events.emit(
            Event::LaunchStopped {
                project_path: state.context.project_path.clone(),
            },
            EVENT_SOURCE,
        );
        true
    }

    async fn open_terminal(
        &self,
        name: String,
        cwd: &Path,
        kind: LaunchKind,
        work_id: Option<&str>,
    ) -> LaunchResult<(TerminalId, oneshot::Receiver<()>)> {
        let env = lock(&self.session_env).clone();
        match self.terminals.open(TerminalSpec::new(name, cwd).with_env(env)).await {
            Ok(session) => Ok((session.id, session.closed)),
            Err(err) => {
                error!(?kind, error = %err, "failed to open terminal");
                self.events.emit(
                    Event::LaunchFailed {
                        kind,
                        work_id: work_id.map(str::to_string),
                        error: err.to_string(),
                    },
                    EVENT_SOURCE,
                );
                Err(LaunchError::setup(err))
            }
        }
    }

    /// Sync auth, export it and the launch variables, then type `command`.
    async fn type_commands(
        &self,
        terminal: TerminalId,
        env: &[(&str, String)],
        command: &str,
    ) -> LaunchResult<()> {
        self.auth
            .sync_auth_artifacts()
            .await
            .map_err(LaunchError::setup)?;
        let artifact = self.auth.auth_artifact_path();

        let mut lines = vec![self
            .commands
            .export_env(&self.options.auth_env_var, &artifact.to_string_lossy())];
        lines.extend(env.iter().map(|(key, value)| self.commands.export_env(key, value)));
        lines.push(command.to_string());

        for line in &lines {
            debug!(%terminal, %line, "sending to terminal");
            self.terminals
                .send_text(terminal, line)
                .await
                .map_err(LaunchError::setup)?;
        }
        self.terminals
            .finish_input(terminal)
            .await
            .map_err(LaunchError::setup)
    }

    async fn fail_primary(&self, generation: u64, terminal: TerminalId, err: &LaunchError) {
        error!(%terminal, error = %err, "primary launch setup failed");
        if let Err(dispose_err) = self.terminals.dispose(terminal).await {
            debug!(%terminal, error = %dispose_err, "terminal already gone");
        }

        let (kind, work_id, cleanup) = {
            let mut state = lock(&self.primary);
            if state.generation != generation {
                return;
            }
            state.context.status = ExecutionStatus::Failed;
            state.context.terminal = None;
            state.monitor.take();
            (
                state.kind.unwrap_or(LaunchKind::Primary),
                state.context.scope_id.clone(),
                state.cleanup_file.take(),
            )
        };
        if let Some(path) = cleanup {
            remove_prompt_file(&path);
        }
        self.events.emit(
            Event::LaunchFailed {
                kind,
                work_id,
                error: err.to_string(),
            },
            EVENT_SOURCE,
        );
    }

    async fn fail_secondary(&self, process_id: &str, terminal: TerminalId, err: &LaunchError) {
        error!(id = process_id, error = %err, "analysis setup failed");
        if let Err(dispose_err) = self.terminals.dispose(terminal).await {
            debug!(%terminal, error = %dispose_err, "terminal already gone");
        }
        {
            let mut table = lock(&self.secondaries);
            if let Some(process) = table.entries.get_mut(process_id) {
                process.status = ExecutionStatus::Failed;
                process.terminal = None;
            }
            table.evict_finished(self.options.max_retained_finished);
        }
        self.events.emit(
            Event::LaunchFailed {
                kind: LaunchKind::Secondary,
                work_id: Some(process_id.to_string()),
                error: err.to_string(),
            },
            EVENT_SOURCE,
        );
    }

    /// Tell scope watchers on the scope's own channel that the CLI started.
    fn announce_scope_launch(&self, scope_id: &str) {
        let sent = MessageBroker::for_channel(&self.locator, scope_id, BrokerOptions::default())
            .and_then(|broker| {
                broker.send(
                    MessageType::ScopeUpdate,
                    json!({
                        "scopeId": scope_id,
                        "action": "claude_code_launched",
                        "timestamp": Utc::now().timestamp_millis(),
                    }),
                )
            });
        if let Err(err) = sent {
            warn!(scope_id, error = %err, "failed to announce launch");
        }
    }

    fn start_primary_monitor(self: &Arc<Self>, generation: u64, progress_file: PathBuf) {
        let (tx, mut rx) = mpsc::unbounded_channel::<ProgressReport>();
        let monitor = match ProgressMonitor::start(&progress_file, &self.options.monitor, tx) {
            Ok(monitor) => monitor,
            Err(err) => {
                warn!(path = ?progress_file, error = %err, "progress monitoring unavailable");
                return;
            }
        };

        {
            let mut state = lock(&self.primary);
            if state.generation != generation {
                return;
            }
            state.monitor = Some(monitor);
        }

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(report) = rx.recv().await {
                if !inner.apply_progress(generation, report) {
                    break;
                }
            }
        });
    }

    /// Returns `false` once the launch no longer accepts reports.
    fn apply_progress(&self, generation: u64, report: ProgressReport) -> bool {
        let (work_id, finished) = {
            let mut state = lock(&self.primary);
            if state.generation != generation
                || state.context.status != ExecutionStatus::Running
            {
                return false;
            }
            state.context.last_progress = Some(report.total_progress);
            let finished = report
                .status
                .filter(|status| status.is_terminal())
                .or_else(|| {
                    (report.total_progress >= 100.0).then_some(ExecutionStatus::Completed)
                });
            if let Some(status) = finished {
                state.context.status = status;
                state.monitor.take();
            }
            (state.context.scope_id.clone(), finished)
        };

        info!(total = report.total_progress, "progress updated");
        self.events.emit(
            Event::ProgressUpdated {
                work_id: work_id.clone(),
                report,
            },
            EVENT_SOURCE,
        );
        match finished {
            Some(status) => {
                self.events
                    .emit(Event::PrimaryFinished { work_id, status }, EVENT_SOURCE);
                false
            }
            None => true,
        }
    }

    fn watch_primary_close(self: &Arc<Self>, generation: u64, closed: oneshot::Receiver<()>) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let _ = closed.await;
            inner.handle_primary_terminal_closed(generation).await;
        });
    }

    async fn handle_primary_terminal_closed(&self, generation: u64) {
        let (monitor, progress_file) = {
            let mut state = lock(&self.primary);
            if state.generation != generation {
                return;
            }
            (
                state.monitor.take(),
                state.context.progress_file_path.clone(),
            )
        };
        if let Some(monitor) = monitor {
            monitor.shutdown().await;
        }

        let last_report = progress_file.as_deref().and_then(|path| {
            read_progress_file(path).unwrap_or_else(|err| {
                warn!(error = %err, "final progress read failed");
                None
            })
        });

        let (finished, cleanup) = {
            let mut state = lock(&self.primary);
            if state.generation != generation {
                return;
            }
            state.context.terminal = None;
            let cleanup = state.cleanup_file.take();

            let mut finished = None;
            if state.context.status == ExecutionStatus::Running {
                if let Some(report) = &last_report {
                    state.context.last_progress = Some(report.total_progress);
                }
                let status = if state.kind == Some(LaunchKind::Prompt) {
                    ExecutionStatus::Completed
                } else {
                    final_status(last_report.as_ref(), state.context.last_progress)
                };
                state.context.status = status;
                finished = Some((state.context.scope_id.clone(), status));
            }
            (finished, cleanup)
        };

        if let Some((work_id, status)) = finished {
            info!(?work_id, %status, "primary terminal closed");
            self.events
                .emit(Event::PrimaryFinished { work_id, status }, EVENT_SOURCE);
        }
        if let Some(path) = cleanup {
            remove_prompt_file(&path);
        }
    }

    fn handle_secondary_terminal_closed(&self, process_id: &str) -> bool {
        {
            let mut table = lock(&self.secondaries);
            let Some(process) = table.entries.get_mut(process_id) else {
                return false;
            };
            if process.status != ExecutionStatus::Running {
                return false;
            }
            process.status = ExecutionStatus::Completed;
            process.terminal = None;
            table.evict_finished(self.options.max_retained_finished);
            if table.running() == 0 {
                debug!("no analyses running");
            }
        }

        info!(id = process_id, "analysis terminal closed");
        self.events.emit(
            Event::SecondaryCompleted {
                process_id: process_id.to_string(),
                status: ExecutionStatus::Completed,
            },
            EVENT_SOURCE,
        );
        true
    }
}

/// Status of a primary launch whose terminal closed while still running.
fn final_status(report: Option<&ProgressReport>, last_progress: Option<f64>) -> ExecutionStatus {
    if let Some(status) = report.and_then(|r| r.status).filter(|s| s.is_terminal()) {
        return status;
    }
    if last_progress.is_some_and(|p| p >= 100.0) {
        ExecutionStatus::Completed
    } else {
        ExecutionStatus::Failed
    }
}
