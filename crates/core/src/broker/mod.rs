//! File-backed message broker.
//!
//! Every message is one file in the broker directory named
//! `{id}.{status}.json`. A rename is the only state transition primitive:
//!
//! ```text
//! {id}.new.json -> {id}.processing.json -> {id}.completed.json
//!                                       \-> {id}.failed.json
//! ```
//!
//! The `status` field inside the JSON body is rewritten after each rename to
//! mirror the file name, but it is never consulted for decisions.
//!
//! Registering the first handler starts a single directory watcher (one per
//! broker, shared by all handlers). Only one broker should watch a given
//! directory; two watchers would race on the claiming rename.

pub mod error;

pub use error::{BrokerError, BrokerResult, HandlerError};

use crate::paths::{write_atomic, TempLocator};
use chrono::Utc;
use lk_protocol::message_models::{Message, MessageStatus, MessageType};
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Callback invoked for a claimed message.
pub type MessageHandler = Arc<dyn Fn(&Message) -> Result<(), HandlerError> + Send + Sync>;

/// Broker behaviour switches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrokerOptions {
    /// Move a message to `failed` when any handler errors or panics. By
    /// default handler failures are logged and the message still completes.
    pub fail_on_handler_error: bool,
}

#[derive(Default)]
struct Handlers {
    by_type: HashMap<MessageType, Vec<MessageHandler>>,
    any: Vec<MessageHandler>,
}

impl Handlers {
    fn for_type(&self, message_type: MessageType) -> Vec<MessageHandler> {
        let mut handlers = self
            .by_type
            .get(&message_type)
            .cloned()
            .unwrap_or_default();
        handlers.extend(self.any.iter().cloned());
        handlers
    }

    fn clear(&mut self) {
        self.by_type.clear();
        self.any.clear();
    }
}

struct BrokerInner {
    dir: PathBuf,
    options: BrokerOptions,
    handlers: Mutex<Handlers>,
    watcher: Mutex<Option<RecommendedWatcher>>,
}

/// Handle to a message directory. Clones share handlers and the watcher.
///
/// Handlers that capture a clone of their own broker keep it alive until
/// [`MessageBroker::dispose`] is called.
#[derive(Clone)]
pub struct MessageBroker {
    inner: Arc<BrokerInner>,
}

impl fmt::Debug for MessageBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBroker")
            .field("dir", &self.inner.dir)
            .field("options", &self.inner.options)
            .field("watching", &self.is_watching())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MessageBroker {
    /// Broker over `dir`, created if missing.
    pub fn new(dir: impl Into<PathBuf>, options: BrokerOptions) -> BrokerResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| BrokerError::Io {
            path: dir.clone(),
            source,
        })?;
        debug!(?dir, "message broker initialised");

        Ok(Self {
            inner: Arc::new(BrokerInner {
                dir,
                options,
                handlers: Mutex::new(Handlers::default()),
                watcher: Mutex::new(None),
            }),
        })
    }

    /// Broker over `messages/{channel}` under the temp root.
    pub fn for_channel(
        locator: &TempLocator,
        channel: &str,
        options: BrokerOptions,
    ) -> BrokerResult<Self> {
        Self::new(locator.messages_dir(channel), options)
    }

    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    /// Write a new message and return its id. Fire-and-forget: nothing
    /// reports whether it was consumed.
    pub fn send(&self, message_type: MessageType, payload: Value) -> BrokerResult<Uuid> {
        let message = Message {
            id: Uuid::new_v4(),
            message_type,
            status: MessageStatus::New,
            payload,
            timestamp: Utc::now().timestamp_millis(),
        };
        let path = self.inner.path_for(message.id, MessageStatus::New);
        self.inner.write_message(&path, &message)?;
        debug!(id = %message.id, %message_type, "message sent");
        Ok(message.id)
    }

    /// Register a handler for one message type and start watching.
    pub fn on_message<F>(&self, message_type: MessageType, handler: F) -> BrokerResult<()>
    where
        F: Fn(&Message) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        lock(&self.inner.handlers)
            .by_type
            .entry(message_type)
            .or_default()
            .push(Arc::new(handler));
        debug!(%message_type, "message handler registered");
        self.ensure_watcher()
    }

    /// Register a handler for every message type and start watching.
    pub fn on_any<F>(&self, handler: F) -> BrokerResult<()>
    where
        F: Fn(&Message) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        lock(&self.inner.handlers).any.push(Arc::new(handler));
        debug!("catch-all message handler registered");
        self.ensure_watcher()
    }

    /// Move a `processing` message to `completed`.
    ///
    /// Returns `false` if the message is not currently processing.
    pub fn mark_completed(&self, id: Uuid) -> BrokerResult<bool> {
        self.inner.finish(id, MessageStatus::Completed, None)
    }

    /// Move a `processing` message to `failed`, embedding
    /// `{"error": {"message": ...}}` in its payload.
    ///
    /// Returns `false` if the message is not currently processing.
    pub fn mark_failed(&self, id: Uuid, error: &str) -> BrokerResult<bool> {
        self.inner.finish(id, MessageStatus::Failed, Some(error))
    }

    /// Current status, derived from which file exists.
    pub fn status_of(&self, id: Uuid) -> Option<MessageStatus> {
        MessageStatus::ALL
            .into_iter()
            .find(|status| self.inner.path_for(id, *status).exists())
    }

    /// Read a message in whatever status it currently is.
    pub fn read(&self, id: Uuid) -> BrokerResult<Option<Message>> {
        match self.status_of(id) {
            Some(status) => self.inner.read_message(&self.inner.path_for(id, status)),
            None => Ok(None),
        }
    }

    /// Ids of all messages currently in `status`, sorted.
    pub fn list(&self, status: MessageStatus) -> BrokerResult<Vec<Uuid>> {
        let entries = std::fs::read_dir(&self.inner.dir).map_err(|source| BrokerError::Io {
            path: self.inner.dir.clone(),
            source,
        })?;

        let mut ids: Vec<Uuid> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| entry.file_name().to_str().and_then(Message::parse_file_name))
            .filter(|(_, s)| *s == status)
            .map(|(id, _)| id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// Dispatch every `new` message already on disk. Returns how many were
    /// claimed by this call.
    pub fn process_pending(&self) -> BrokerResult<usize> {
        let pending = self.list(MessageStatus::New)?;
        Ok(pending
            .into_iter()
            .filter(|id| self.inner.dispatch(*id))
            .count())
    }

    pub fn is_watching(&self) -> bool {
        lock(&self.inner.watcher).is_some()
    }

    /// Stop watching and drop every handler. Message files stay on disk.
    pub fn dispose(&self) {
        lock(&self.inner.watcher).take();
        lock(&self.inner.handlers).clear();
        debug!(dir = ?self.inner.dir, "message broker disposed");
    }

    fn ensure_watcher(&self) -> BrokerResult<()> {
        let mut slot = lock(&self.inner.watcher);
        if slot.is_some() {
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| BrokerError::NoRuntime)?;

        // notify calls back on its own thread; hand events to the runtime.
        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<notify::Event>();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    let _ = event_tx.send(event);
                }
                Err(err) => warn!(error = %err, "message watch error"),
            },
            Config::default(),
        )?;
        watcher.watch(&self.inner.dir, RecursiveMode::NonRecursive)?;

        let weak = Arc::downgrade(&self.inner);
        runtime.spawn(async move {
            while let Some(event) = event_rx.recv().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                for path in &event.paths {
                    inner.dispatch_path(path);
                }
            }
            debug!("message watch loop finished");
        });

        info!(dir = ?self.inner.dir, "message watcher started");
        *slot = Some(watcher);
        Ok(())
    }
}

impl BrokerInner {
    fn path_for(&self, id: Uuid, status: MessageStatus) -> PathBuf {
        self.dir.join(Message::file_name(id, status))
    }

    fn write_message(&self, path: &Path, message: &Message) -> BrokerResult<()> {
        let body = serde_json::to_vec_pretty(message)?;
        write_atomic(path, &body).map_err(|source| BrokerError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    fn read_message(&self, path: &Path) -> BrokerResult<Option<Message>> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(BrokerError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| BrokerError::Parse {
                path: path.to_path_buf(),
                source,
            })
    }

    fn dispatch_path(&self, path: &Path) {
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            return;
        };
        if let Some((id, MessageStatus::New)) = Message::parse_file_name(name) {
            self.dispatch(id);
        }
    }

    /// Claim and handle one `new` message. Returns `true` if this call
    /// claimed it.
    fn dispatch(&self, id: Uuid) -> bool {
        let new_path = self.path_for(id, MessageStatus::New);
        let mut message = match self.read_message(&new_path) {
            Ok(Some(message)) => message,
            Ok(None) => return false,
            Err(err) => {
                warn!(%id, error = %err, "skipping unreadable message");
                return false;
            }
        };

        let processing_path = self.path_for(id, MessageStatus::Processing);
        match std::fs::rename(&new_path, &processing_path) {
            Ok(()) => {}
            // Someone else claimed it between our read and the rename.
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return false,
            Err(err) => {
                error!(%id, error = %err, "failed to claim message");
                return false;
            }
        }

        message.id = id;
        message.status = MessageStatus::Processing;
        if let Err(err) = self.write_message(&processing_path, &message) {
            warn!(%id, error = %err, "failed to rewrite claimed message");
        }
        debug!(%id, message_type = %message.message_type, "processing message");

        let handlers = lock(&self.handlers).for_type(message.message_type);
        let mut first_error: Option<HandlerError> = None;
        for handler in handlers {
            let err = match panic::catch_unwind(AssertUnwindSafe(|| handler(&message))) {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err,
                Err(payload) => HandlerError::Panicked(panic_message(payload.as_ref())),
            };
            error!(%id, message_type = %message.message_type, error = %err, "message handler failed");
            first_error.get_or_insert(err);
        }

        // A handler may already have moved the message on; finish() then
        // reports false and nothing changes.
        let outcome = match first_error {
            Some(err) if self.options.fail_on_handler_error => {
                self.finish(id, MessageStatus::Failed, Some(&err.to_string()))
            }
            _ => self.finish(id, MessageStatus::Completed, None),
        };
        if let Err(err) = outcome {
            error!(%id, error = %err, "failed to finish message");
        }
        true
    }

    fn finish(&self, id: Uuid, to: MessageStatus, error: Option<&str>) -> BrokerResult<bool> {
        let from_path = self.path_for(id, MessageStatus::Processing);
        let Some(mut message) = self.read_message(&from_path)? else {
            return Ok(false);
        };

        let to_path = self.path_for(id, to);
        match std::fs::rename(&from_path, &to_path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(source) => {
                return Err(BrokerError::Io {
                    path: from_path,
                    source,
                })
            }
        }

        message.status = to;
        if let Some(error) = error {
            embed_error(&mut message.payload, error);
        }
        self.write_message(&to_path, &message)?;
        debug!(%id, status = %to, "message finished");
        Ok(true)
    }
}

fn embed_error(payload: &mut Value, error: &str) {
    let error = json!({ "message": error });
    match payload {
        Value::Object(map) => {
            map.insert("error".to_string(), error);
        }
        other => {
            let original = other.take();
            *other = json!({ "value": original, "error": error });
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
