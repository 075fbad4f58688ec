//! Progress file monitor.
//!
//! Watches one progress file through a set of [`ChangeNotifier`]s and
//! forwards every new, valid [`ProgressReport`] to a channel. A report with
//! a terminal status is forwarded and then the monitor stops itself,
//! releasing its watch and poll timer.

pub mod notifier;

pub use notifier::{ChangeNotifier, ChangeTrigger, FsWatchNotifier, NotifierGuard, PollNotifier};

use lk_protocol::progress_models::ProgressReport;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Failed to read progress file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse progress file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid progress file {path}: {reason}")]
    InvalidShape { path: PathBuf, reason: String },

    #[error("Progress target has no parent directory: {0}")]
    InvalidTarget(PathBuf),

    #[error("Failed to watch progress directory: {0}")]
    Watch(#[from] notify::Error),

    #[error("Progress monitoring requires a running tokio runtime")]
    NoRuntime,

    #[error("No change notifier could be started for {0}")]
    NoNotifier(PathBuf),
}

pub type MonitorResult<T> = Result<T, MonitorError>;

/// Which notifiers a monitor runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MonitorMode {
    /// Directory watch plus the poll fallback.
    #[default]
    WatchAndPoll,
    /// Poll only. For network filesystems without change events.
    PollOnly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorOptions {
    pub poll_interval: Duration,
    pub mode: MonitorMode,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            poll_interval: PollNotifier::DEFAULT_INTERVAL,
            mode: MonitorMode::default(),
        }
    }
}

impl MonitorOptions {
    pub fn notifiers(&self) -> Vec<Box<dyn ChangeNotifier>> {
        let poll: Box<dyn ChangeNotifier> = Box::new(PollNotifier::new(self.poll_interval));
        match self.mode {
            MonitorMode::WatchAndPoll => vec![Box::new(FsWatchNotifier), poll],
            MonitorMode::PollOnly => vec![poll],
        }
    }
}

/// Read and validate a progress file.
///
/// A missing file is `Ok(None)`: the external process may not have written
/// it yet.
pub fn read_progress_file(path: &Path) -> MonitorResult<Option<ProgressReport>> {
    match read_raw(path)? {
        Some(content) => parse_progress(path, &content).map(Some),
        None => Ok(None),
    }
}

fn read_raw(path: &Path) -> MonitorResult<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(MonitorError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn parse_progress(path: &Path, content: &str) -> MonitorResult<ProgressReport> {
    let parse_err = |source| MonitorError::Parse {
        path: path.to_path_buf(),
        source,
    };
    let value: Value = serde_json::from_str(content).map_err(parse_err)?;

    let invalid = |reason: &str| MonitorError::InvalidShape {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };
    if !value.get("totalProgress").is_some_and(Value::is_number) {
        return Err(invalid("totalProgress must be a number"));
    }
    if !value.get("items").is_some_and(Value::is_array) {
        return Err(invalid("items must be an array"));
    }

    serde_json::from_value(value).map_err(parse_err)
}

/// A running monitor over one progress file.
///
/// Dropping the monitor stops it.
pub struct ProgressMonitor {
    path: PathBuf,
    running: Arc<AtomicBool>,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ProgressMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressMonitor")
            .field("path", &self.path)
            .field("running", &self.is_running())
            .finish()
    }
}

impl ProgressMonitor {
    /// Start monitoring `path` with the notifiers selected by `options`.
    pub fn start(
        path: impl Into<PathBuf>,
        options: &MonitorOptions,
        reports: mpsc::UnboundedSender<ProgressReport>,
    ) -> MonitorResult<Self> {
        Self::with_notifiers(path, options.notifiers(), reports)
    }

    /// Start monitoring `path` with explicit notifiers.
    ///
    /// A notifier that fails to start is logged and skipped; only when none
    /// starts is this an error.
    pub fn with_notifiers(
        path: impl Into<PathBuf>,
        notifiers: Vec<Box<dyn ChangeNotifier>>,
        reports: mpsc::UnboundedSender<ProgressReport>,
    ) -> MonitorResult<Self> {
        let path = path.into();
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| MonitorError::NoRuntime)?;

        let (trigger_tx, mut trigger_rx) = mpsc::unbounded_channel();
        let mut guards = Vec::with_capacity(notifiers.len());
        for notifier in &notifiers {
            match notifier.start(&path, trigger_tx.clone()) {
                Ok(guard) => guards.push(guard),
                Err(err) => {
                    warn!(notifier = notifier.name(), ?path, error = %err, "notifier failed to start")
                }
            }
        }
        drop(trigger_tx);
        if guards.is_empty() {
            return Err(MonitorError::NoNotifier(path));
        }

        let running = Arc::new(AtomicBool::new(true));
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let task_path = path.clone();
        let task_running = Arc::clone(&running);
        let task = runtime.spawn(async move {
            // Notifiers live exactly as long as this loop.
            let _guards = guards;
            let mut state = CheckState::default();

            let mut finished = state.check(&task_path, ChangeTrigger::Initial, &reports);
            while !finished {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    trigger = trigger_rx.recv() => match trigger {
                        Some(trigger) => {
                            finished = state.check(&task_path, trigger, &reports);
                        }
                        None => break,
                    },
                }
            }

            task_running.store(false, Ordering::SeqCst);
            debug!(path = ?task_path, "progress monitor stopped");
        });

        info!(?path, "progress monitor started");
        Ok(Self {
            path,
            running,
            stop_tx: Some(stop_tx),
            task: Some(task),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the monitor. Safe to call more than once.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        self.running.store(false, Ordering::SeqCst);
    }

    /// Stop and wait until the monitor loop has exited.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ProgressMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Default)]
struct CheckState {
    last_content: Option<String>,
}

impl CheckState {
    /// Returns `true` once a terminal report has been forwarded.
    fn check(
        &mut self,
        path: &Path,
        trigger: ChangeTrigger,
        reports: &mpsc::UnboundedSender<ProgressReport>,
    ) -> bool {
        let content = match read_raw(path) {
            Ok(Some(content)) => content,
            Ok(None) => return false,
            Err(err) => {
                warn!(error = %err, "progress file unreadable");
                return false;
            }
        };
        if self.last_content.as_deref() == Some(content.as_str()) {
            return false;
        }

        let report = match parse_progress(path, &content) {
            Ok(report) => report,
            Err(err) => {
                warn!(?trigger, error = %err, "skipping invalid progress file");
                self.last_content = Some(content);
                return false;
            }
        };
        self.last_content = Some(content);

        debug!(?trigger, total = report.total_progress, "progress update");
        let terminal = report.is_terminal();
        if reports.send(report).is_err() {
            // Nobody is listening any more.
            return true;
        }
        terminal
    }
}
