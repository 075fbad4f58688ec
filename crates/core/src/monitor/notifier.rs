//! Change notifiers feeding the progress monitor.
//!
//! Both backends push [`ChangeTrigger`]s into the same channel, so the
//! monitor loop never cares which one fired.

use super::{MonitorError, MonitorResult};
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Why the monitor is looking at the file again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeTrigger {
    Initial,
    FsEvent,
    Poll,
}

/// Keeps a running notifier alive. Dropping it stops the notifier.
#[derive(Default)]
pub struct NotifierGuard {
    watcher: Option<RecommendedWatcher>,
    task: Option<JoinHandle<()>>,
}

impl NotifierGuard {
    pub fn from_watcher(watcher: RecommendedWatcher) -> Self {
        Self {
            watcher: Some(watcher),
            task: None,
        }
    }

    pub fn from_task(task: JoinHandle<()>) -> Self {
        Self {
            watcher: None,
            task: Some(task),
        }
    }
}

impl Drop for NotifierGuard {
    fn drop(&mut self) {
        self.watcher.take();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// A source of "the file may have changed" signals.
pub trait ChangeNotifier: Send + Sync {
    fn name(&self) -> &'static str;

    /// Begin sending triggers for `target` into `tx`.
    fn start(&self, target: &Path, tx: UnboundedSender<ChangeTrigger>)
        -> MonitorResult<NotifierGuard>;
}

/// Native filesystem watch on the directory holding the target.
///
/// The file itself may not exist yet, so the parent directory is watched
/// (and created) and events are filtered by file name.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsWatchNotifier;

impl ChangeNotifier for FsWatchNotifier {
    fn name(&self) -> &'static str {
        "fs-watch"
    }

    fn start(
        &self,
        target: &Path,
        tx: UnboundedSender<ChangeTrigger>,
    ) -> MonitorResult<NotifierGuard> {
        let (Some(dir), Some(file_name)) = (target.parent(), target.file_name()) else {
            return Err(MonitorError::InvalidTarget(target.to_path_buf()));
        };
        std::fs::create_dir_all(dir).map_err(|source| MonitorError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let file_name: OsString = file_name.to_os_string();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    let touches_target = event
                        .paths
                        .iter()
                        .any(|path| path.file_name() == Some(file_name.as_os_str()));
                    if touches_target {
                        let _ = tx.send(ChangeTrigger::FsEvent);
                    }
                }
                Err(err) => warn!(error = %err, "progress watch error"),
            },
            Config::default(),
        )?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        debug!(?dir, "progress directory watch started");

        Ok(NotifierGuard::from_watcher(watcher))
    }
}

/// Fixed interval poll, for filesystems where change events are lost or
/// debounced.
#[derive(Debug, Clone, Copy)]
pub struct PollNotifier {
    interval: Duration,
}

impl PollNotifier {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Default for PollNotifier {
    fn default() -> Self {
        Self::new(Self::DEFAULT_INTERVAL)
    }
}

impl ChangeNotifier for PollNotifier {
    fn name(&self) -> &'static str {
        "poll"
    }

    fn start(
        &self,
        _target: &Path,
        tx: UnboundedSender<ChangeTrigger>,
    ) -> MonitorResult<NotifierGuard> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| MonitorError::NoRuntime)?;
        let period = self.interval;

        let task = runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if tx.send(ChangeTrigger::Poll).is_err() {
                    break;
                }
            }
        });

        Ok(NotifierGuard::from_task(task))
    }
}
