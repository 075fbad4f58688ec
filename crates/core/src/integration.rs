//! Session-level glue around the launcher.
//!
//! While the user is authenticated the integration service keeps an API
//! proxy running, mirrors the remote prompt library into the local prompt
//! directory and hands the proxy settings to every terminal the launcher
//! opens. It also reacts to launches (resync, make sure the proxy is up)
//! and, when attached to a broker, to `command-execute` messages asking for
//! a prompt launch:
//!
//! ```json
//! { "command": "launchPrompt", "promptId": "review", "projectPath": "/work/app" }
//! ```

use crate::broker::{BrokerResult, HandlerError, MessageBroker};
use crate::config::models::{IntegrationSettings, PromptEntry};
use crate::events::EventBus;
use crate::launcher::{ConflictPolicy, LaunchError, Launcher, PromptLaunchRequest};
use crate::paths::{write_atomic, PROMPTS_DIR};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lk_protocol::ipc::Event;
use lk_protocol::launch_models::TerminalId;
use lk_protocol::message_models::MessageType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

const SYNC_FILE: &str = "prompt-sync.json";

#[derive(Error, Debug)]
pub enum IntegrationError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to encode sync state: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Prompt source failed: {0}")]
    Source(anyhow::Error),

    #[error("Proxy failed to start: {0}")]
    Proxy(anyhow::Error),

    #[error("Prompt not found: {0}")]
    PromptNotFound(String),

    #[error(transparent)]
    Launch(#[from] LaunchError),
}

pub type IntegrationResult<T> = Result<T, IntegrationError>;

/// Local API proxy the CLI talks through.
#[async_trait]
pub trait ProxyManager: Send + Sync {
    /// Start the proxy. Must be harmless when already running.
    async fn start(&self) -> anyhow::Result<()>;

    /// `PORTAL_API_PROXY_URL`, once running.
    fn api_proxy_url(&self) -> Option<String>;

    /// `CLAUDE_API_PROXY_URL`, if the proxy also fronts the model API.
    fn claude_proxy_url(&self) -> Option<String>;
}

/// A prompt as served by the remote library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemotePrompt {
    pub id: String,
    pub title: String,
    #[serde(rename = "type", default)]
    pub prompt_type: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub content: String,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<RemotePrompt> for PromptEntry {
    fn from(prompt: RemotePrompt) -> Self {
        PromptEntry {
            id: prompt.id,
            title: prompt.title,
            prompt_type: prompt.prompt_type,
            category: prompt.category,
            tags: prompt.tags,
            body: prompt.content,
        }
    }
}

/// Prompts changed since a point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptUpdates {
    /// Cursor to pass on the next call (millis).
    pub timestamp: i64,
    pub prompts: Vec<RemotePrompt>,
}

/// Remote prompt library.
#[async_trait]
pub trait PromptSyncSource: Send + Sync {
    async fn updates_since(&self, timestamp: i64) -> anyhow::Result<PromptUpdates>;

    async fn prompt(&self, id: &str) -> anyhow::Result<Option<RemotePrompt>>;

    async fn record_usage(&self, _id: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Persisted in `prompt-sync.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCursor {
    pub last_sync_timestamp: i64,
    #[serde(default)]
    pub prompts: Vec<String>,
}

/// File name a prompt id is stored under.
pub fn prompt_file_name(id: &str) -> String {
    let safe: String = id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{safe}.md")
}

/// Render a prompt as Markdown with YAML front matter, readable by
/// [`crate::config::loader::load_prompts`].
pub fn render_prompt(prompt: &PromptEntry) -> IntegrationResult<String> {
    // JSON strings and arrays are valid YAML flow scalars.
    let mut out = String::from("---\n");
    out.push_str(&format!("id: {}\n", serde_json::to_string(&prompt.id)?));
    out.push_str(&format!("title: {}\n", serde_json::to_string(&prompt.title)?));
    if let Some(kind) = &prompt.prompt_type {
        out.push_str(&format!("type: {}\n", serde_json::to_string(kind)?));
    }
    if let Some(category) = &prompt.category {
        out.push_str(&format!("category: {}\n", serde_json::to_string(category)?));
    }
    out.push_str(&format!("tags: {}\n", serde_json::to_string(&prompt.tags)?));
    out.push_str("---\n\n");
    out.push_str(&prompt.body);
    Ok(out)
}

struct IntegrationInner {
    launcher: Launcher,
    proxy: Arc<dyn ProxyManager>,
    source: Arc<dyn PromptSyncSource>,
    config_dir: PathBuf,
    sync_interval: Duration,
    sync_lock: tokio::sync::Mutex<()>,
    resync: Mutex<Option<JoinHandle<()>>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Composes the launcher with the proxy and the prompt library. Clones
/// share state.
#[derive(Clone)]
pub struct IntegrationService {
    inner: Arc<IntegrationInner>,
}

impl IntegrationService {
    pub fn new(
        launcher: Launcher,
        proxy: Arc<dyn ProxyManager>,
        source: Arc<dyn PromptSyncSource>,
        settings: &IntegrationSettings,
    ) -> IntegrationResult<Self> {
        let config_dir = launcher
            .locator()
            .config_dir()
            .map_err(|source| IntegrationError::Io {
                path: launcher.locator().root().to_path_buf(),
                source,
            })?;
        Ok(Self {
            inner: Arc::new(IntegrationInner {
                launcher,
                proxy,
                source,
                config_dir,
                sync_interval: Duration::from_secs(settings.sync_interval_secs.max(1)),
                sync_lock: tokio::sync::Mutex::new(()),
                resync: Mutex::new(None),
                listener: Mutex::new(None),
            }),
        })
    }

    pub fn prompt_dir(&self) -> PathBuf {
        self.inner.prompt_dir()
    }

    /// Environment the CLI needs to use the proxy and prompt library.
    pub fn environment_variables(&self) -> HashMap<String, String> {
        self.inner.environment_variables()
    }

    /// Start the proxy, sync prompts now and keep resyncing.
    pub async fn start_integration(&self) -> IntegrationResult<()> {
        let proxy_result = self.inner.ensure_proxy().await;
        self.inner
            .launcher
            .set_session_env(self.inner.environment_variables());

        if let Err(err) = self.inner.sync_prompts().await {
            error!(error = %err, "initial prompt sync failed");
        }
        self.start_resync();
        info!("integration started");
        proxy_result
    }

    /// Stop resyncing. The proxy is left running for other users.
    pub fn stop_integration(&self) {
        if let Some(task) = lock(&self.inner.resync).take() {
            task.abort();
        }
        self.inner.launcher.clear_session_env();
        info!("integration stopped");
    }

    pub async fn handle_auth_change(&self, authenticated: bool) -> IntegrationResult<()> {
        if authenticated {
            self.start_integration().await
        } else {
            self.stop_integration();
            Ok(())
        }
    }

    pub fn is_syncing(&self) -> bool {
        lock(&self.inner.resync).is_some()
    }

    /// Pull prompt updates into the prompt dir. Returns how many were
    /// written.
    pub async fn sync_prompts(&self) -> IntegrationResult<usize> {
        self.inner.sync_prompts().await
    }

    pub fn load_cursor(&self) -> SyncCursor {
        self.inner.load_cursor()
    }

    /// React to launches published on `bus`: resync and make sure the
    /// proxy is up.
    pub fn listen(&self, bus: &EventBus) {
        let mut stream = BroadcastStream::new(bus.subscribe());
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(envelope) => {
                        if let Event::LaunchStarted { work_id, .. } = envelope.event {
                            debug!(%work_id, "launch observed, resyncing");
                            if let Err(err) = inner.sync_prompts().await {
                                error!(error = %err, "prompt sync after launch failed");
                            }
                            if let Err(err) = inner.ensure_proxy().await {
                                error!(error = %err, "proxy start after launch failed");
                            }
                        }
                    }
                    Err(BroadcastStreamRecvError::Lagged(missed)) => {
                        warn!(missed, "integration listener lagged");
                    }
                }
            }
        });
        if let Some(previous) = lock(&self.inner.listener).replace(task) {
            previous.abort();
        }
    }

    /// Serve `command-execute` messages of `broker` asking for prompt
    /// launches.
    pub fn attach_broker(&self, broker: &MessageBroker) -> BrokerResult<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| crate::broker::BrokerError::NoRuntime)?;
        let service = self.clone();
        broker.on_message(MessageType::CommandExecute, move |message| {
            let payload = &message.payload;
            if payload.get("command").and_then(|c| c.as_str()) != Some("launchPrompt") {
                return Ok(());
            }
            let prompt_id = payload
                .get("promptId")
                .and_then(|v| v.as_str())
                .ok_or_else(|| HandlerError::msg("launchPrompt without promptId"))?
                .to_string();
            let project = payload
                .get("projectPath")
                .and_then(|v| v.as_str())
                .ok_or_else(|| HandlerError::msg("launchPrompt without projectPath"))?
                .to_string();

            let service = service.clone();
            runtime.spawn(async move {
                if let Err(err) = service.launch_with_prompt(&prompt_id, Path::new(&project)).await {
                    error!(%prompt_id, error = %err, "prompt launch from message failed");
                }
            });
            Ok(())
        })
    }

    /// Launch the CLI with a library prompt, writing the prompt file first
    /// if it is not synced yet.
    pub async fn launch_with_prompt(
        &self,
        prompt_id: &str,
        project_path: &Path,
    ) -> IntegrationResult<TerminalId> {
        let prompt_file = self.inner.prompt_dir().join(prompt_file_name(prompt_id));
        if !prompt_file.exists() {
            let prompt = self
                .inner
                .source
                .prompt(prompt_id)
                .await
                .map_err(IntegrationError::Source)?
                .ok_or_else(|| IntegrationError::PromptNotFound(prompt_id.to_string()))?;
            self.inner.write_prompt(&prompt.into())?;
        }

        if let Err(err) = self.inner.source.record_usage(prompt_id).await {
            warn!(prompt_id, error = %err, "failed to record prompt usage");
        }

        let terminal = self
            .inner
            .launcher
            .launch_prompt(PromptLaunchRequest {
                project_path: project_path.to_path_buf(),
                prompt_file,
                extra_args: Vec::new(),
                on_conflict: ConflictPolicy::Abort,
                delete_after: false,
            })
            .await?;
        Ok(terminal)
    }

    fn start_resync(&self) {
        let inner = Arc::clone(&self.inner);
        let period = self.inner.sync_interval;
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(err) = inner.sync_prompts().await {
                    error!(error = %err, "periodic prompt sync failed");
                }
            }
        });
        if let Some(previous) = lock(&self.inner.resync).replace(task) {
            previous.abort();
        }
    }

    /// Stop every background task.
    pub fn dispose(&self) {
        self.stop_integration();
        if let Some(task) = lock(&self.inner.listener).take() {
            task.abort();
        }
    }
}

impl IntegrationInner {
    fn prompt_dir(&self) -> PathBuf {
        self.config_dir.join(PROMPTS_DIR)
    }

    fn cursor_path(&self) -> PathBuf {
        self.config_dir.join(SYNC_FILE)
    }

    fn environment_variables(&self) -> HashMap<String, String> {
        let mut env = HashMap::new();
        if let Some(url) = self.proxy.api_proxy_url() {
            env.insert("PORTAL_API_PROXY_URL".to_string(), url);
        }
        if let Some(url) = self.proxy.claude_proxy_url() {
            env.insert("CLAUDE_API_PROXY_URL".to_string(), url);
        }
        env.insert("CLAUDE_INTEGRATION_ENABLED".to_string(), "true".to_string());
        env.insert(
            "CLAUDE_PROMPT_DIR".to_string(),
            self.prompt_dir().to_string_lossy().into_owned(),
        );
        env
    }

    async fn ensure_proxy(&self) -> IntegrationResult<()> {
        if self.proxy.api_proxy_url().is_some() {
            return Ok(());
        }
        self.proxy.start().await.map_err(IntegrationError::Proxy)
    }

    fn load_cursor(&self) -> SyncCursor {
        let path = self.cursor_path();
        match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|err| {
                warn!(?path, error = %err, "unreadable sync cursor, starting over");
                SyncCursor::default()
            }),
            Err(_) => SyncCursor::default(),
        }
    }

    fn save_cursor(&self, cursor: &SyncCursor) -> IntegrationResult<()> {
        let path = self.cursor_path();
        let body = serde_json::to_vec_pretty(cursor)?;
        write_atomic(&path, &body).map_err(|source| IntegrationError::Io { path, source })
    }

    fn write_prompt(&self, prompt: &PromptEntry) -> IntegrationResult<PathBuf> {
        let path = self.prompt_dir().join(prompt_file_name(&prompt.id));
        let content = render_prompt(prompt)?;
        write_atomic(&path, content.as_bytes()).map_err(|source| IntegrationError::Io {
            path: path.clone(),
            source,
        })?;
        debug!(?path, "prompt written");
        Ok(path)
    }

    async fn sync_prompts(&self) -> IntegrationResult<usize> {
        let _guard = self.sync_lock.lock().await;

        let mut cursor = self.load_cursor();
        let updates = self
            .source
            .updates_since(cursor.last_sync_timestamp)
            .await
            .map_err(IntegrationError::Source)?;
        if updates.prompts.is_empty() {
            debug!("no prompt updates");
            return Ok(0);
        }

        let count = updates.prompts.len();
        for prompt in updates.prompts {
            let id = prompt.id.clone();
            self.write_prompt(&prompt.into())?;
            if !cursor.prompts.contains(&id) {
                cursor.prompts.push(id);
            }
        }
        cursor.last_sync_timestamp = updates.timestamp;
        self.save_cursor(&cursor)?;

        info!(count, "prompts synced");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticAuthProvider;
    use crate::config::loader::load_prompts;
    use crate::launcher::LauncherOptions;
    use crate::paths::TempLocator;
    use crate::terminal::MockTerminalHost;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::{tempdir, TempDir};

    #[derive(Default)]
    struct FakeProxy {
        started: AtomicUsize,
    }

    #[async_trait]
    impl ProxyManager for FakeProxy {
        async fn start(&self) -> anyhow::Result<()> {
            self.started.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn api_proxy_url(&self) -> Option<String> {
            (self.started.load(Ordering::SeqCst) > 0).then(|| "http://127.0.0.1:8123".to_string())
        }

        fn claude_proxy_url(&self) -> Option<String> {
            None
        }
    }

    #[derive(Default)]
    struct FakeSource {
        calls: AtomicUsize,
    }

    fn remote(id: &str, title: &str) -> RemotePrompt {
        RemotePrompt {
            id: id.to_string(),
            title: title.to_string(),
            prompt_type: Some("review".to_string()),
            category: None,
            tags: vec!["rust".to_string()],
            content: format!("Body of {id}"),
            updated_at: None,
        }
    }

    #[async_trait]
    impl PromptSyncSource for FakeSource {
        async fn updates_since(&self, timestamp: i64) -> anyhow::Result<PromptUpdates> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if timestamp == 0 {
                Ok(PromptUpdates {
                    timestamp: 1_700_000_000_000,
                    prompts: vec![remote("review", "Code: review"), remote("a/b", "Slashes")],
                })
            } else {
                Ok(PromptUpdates {
                    timestamp,
                    prompts: Vec::new(),
                })
            }
        }

        async fn prompt(&self, id: &str) -> anyhow::Result<Option<RemotePrompt>> {
            Ok((id == "fresh").then(|| remote("fresh", "Fresh")))
        }
    }

    struct Fixture {
        _temp: TempDir,
        project: TempDir,
        host: MockTerminalHost,
        proxy: Arc<FakeProxy>,
        source: Arc<FakeSource>,
        bus: EventBus,
        service: IntegrationService,
    }

    fn fixture() -> Fixture {
        let temp = tempdir().expect("Failed to create temp dir");
        let project = tempdir().expect("Failed to create project dir");
        let host = MockTerminalHost::new();
        let bus = EventBus::default();
        let launcher = Launcher::new(
            TempLocator::new(temp.path()),
            Arc::new(host.clone()),
            Arc::new(StaticAuthProvider::new("/tmp/auth.json")),
            Arc::new(bus.clone()),
            LauncherOptions::default(),
        );
        let proxy = Arc::new(FakeProxy::default());
        let source = Arc::new(FakeSource::default());
        let service = IntegrationService::new(
            launcher,
            proxy.clone(),
            source.clone(),
            &IntegrationSettings::default(),
        )
        .expect("Failed to create service");
        Fixture {
            _temp: temp,
            project,
            host,
            proxy,
            source,
            bus,
            service,
        }
    }

    #[test]
    fn test_prompt_file_name_sanitizes() {
        assert_eq!(prompt_file_name("a/b c"), "a_b_c.md");
        assert_eq!(prompt_file_name("review"), "review.md");
    }

    #[tokio::test]
    async fn test_sync_writes_loadable_prompts_and_cursor() {
        let f = fixture();

        assert_eq!(f.service.sync_prompts().await.expect("sync failed"), 2);
        let cursor = f.service.load_cursor();
        assert_eq!(cursor.last_sync_timestamp, 1_700_000_000_000);
        assert_eq!(cursor.prompts, vec!["review".to_string(), "a/b".to_string()]);

        let prompts = load_prompts(&f.service.prompt_dir()).expect("prompts unreadable");
        assert_eq!(prompts.len(), 2);
        let review = prompts.iter().find(|p| p.id == "review").expect("missing");
        assert_eq!(review.title, "Code: review");
        assert_eq!(review.tags, vec!["rust".to_string()]);
        assert!(review.body.contains("Body of review"));

        // Nothing new the second time.
        assert_eq!(f.service.sync_prompts().await.expect("sync failed"), 0);
    }

    #[tokio::test]
    async fn test_start_and_stop_integration() {
        let f = fixture();

        f.service.handle_auth_change(true).await.expect("start failed");
        assert!(f.service.is_syncing());
        assert_eq!(f.proxy.started.load(Ordering::SeqCst), 1);

        let env = f.service.environment_variables();
        assert_eq!(
            env.get("PORTAL_API_PROXY_URL").map(String::as_str),
            Some("http://127.0.0.1:8123")
        );
        assert_eq!(
            env.get("CLAUDE_INTEGRATION_ENABLED").map(String::as_str),
            Some("true")
        );
        assert!(!env.contains_key("CLAUDE_API_PROXY_URL"));

        f.service.handle_auth_change(false).await.expect("stop failed");
        assert!(!f.service.is_syncing());
    }

    #[tokio::test]
    async fn test_launch_with_prompt_fetches_missing_file() {
        let f = fixture();
        f.service.start_integration().await.expect("start failed");

        let terminal = f
            .service
            .launch_with_prompt("fresh", f.project.path())
            .await
            .expect("launch failed");

        assert!(f.service.prompt_dir().join("fresh.md").is_file());
        let spec = f.host.spec(terminal).await.expect("terminal missing");
        assert_eq!(
            spec.env.get("CLAUDE_INTEGRATION_ENABLED").map(String::as_str),
            Some("true")
        );

        let missing = f.service.launch_with_prompt("nope", f.project.path()).await;
        assert!(matches!(missing, Err(IntegrationError::PromptNotFound(_))));
    }

    #[tokio::test]
    async fn test_launch_event_triggers_resync() {
        let f = fixture();
        f.service.listen(&f.bus);

        crate::events::EventPublisher::emit(
            &f.bus,
            Event::LaunchStarted {
                work_id: "scope-1".to_string(),
                project_path: PathBuf::from("/work/app"),
                scope_file_path: PathBuf::from("/tmp/s.json"),
                progress_file_path: PathBuf::from("/tmp/p.json"),
            },
            "test",
        );

        tokio::time::timeout(Duration::from_secs(5), async {
            while f.source.calls.load(Ordering::SeqCst) == 0
                || f.proxy.started.load(Ordering::SeqCst) == 0
            {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("launch event was not handled");
        f.service.dispose();
    }
}
