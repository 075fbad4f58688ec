//! Scope serializer.
//!
//! Hosts describe a unit of work in whatever shape they have at hand. The
//! serializer normalises it into a [`ScopeDocument`] and stores it as
//! `scopes/{id}.json`, which is what the launcher and the external CLI read.

use crate::broker::MessageBroker;
use crate::config::models::{DEFAULT_CLI_COMMAND, DEFAULT_DRIVER_FILE};
use crate::paths::{write_atomic, TempLocator, SCOPES_DIR};
use chrono::Utc;
use lk_protocol::message_models::MessageType;
use lk_protocol::scope_models::{ScopeDocument, ScopeItem, ScopeItemStatus};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ScopeError {
    #[error("Failed to access scope file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse scope file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to serialize scope: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Invalid scope id {0:?}: ids must be a single file name")]
    InvalidId(String),
}

pub type ScopeResult<T> = Result<T, ScopeError>;

/// Loosely-typed unit of work as handed over by a host.
///
/// Items may come as `items` or, from older hosts, `selectedItems`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeInput {
    pub id: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub project_path: Option<String>,
    #[serde(default)]
    pub requirements: Vec<String>,
    pub items: Option<Vec<ScopeItemInput>>,
    pub selected_items: Option<Vec<ScopeItemInput>>,
    pub selected_ids: Option<Vec<String>>,
    /// Hours as a number or free text.
    pub estimated_time: Option<Value>,
    pub total_progress: Option<f64>,
    pub start_date: Option<String>,
    pub target_date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeItemInput {
    pub id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub completed: Option<bool>,
    pub status: Option<String>,
    pub progress: Option<f64>,
    pub priority: Option<String>,
    pub complexity: Option<String>,
    pub dependencies: Option<Vec<String>>,
    pub estimated_hours: Option<f64>,
    pub related_files: Option<Vec<String>>,
}

/// A scope that has been written to disk.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedScope {
    pub document: ScopeDocument,
    pub file_path: PathBuf,
}

/// `scope-{millis}-{8 hex chars}`
pub fn generate_scope_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("scope-{}-{}", Utc::now().timestamp_millis(), &suffix[..8])
}

/// Whether `id` can name a file directly under the scopes directory.
pub fn is_valid_scope_id(id: &str) -> bool {
    !id.is_empty() && !id.contains("..") && !id.contains(['/', '\\', '\0'])
}

fn parse_item_status(raw: &str) -> Option<ScopeItemStatus> {
    match raw.trim().to_lowercase().replace(['_', ' '], "-").as_str() {
        "pending" => Some(ScopeItemStatus::Pending),
        "in-progress" => Some(ScopeItemStatus::InProgress),
        "completed" => Some(ScopeItemStatus::Completed),
        "blocked" => Some(ScopeItemStatus::Blocked),
        _ => None,
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

fn normalize_item(item: &ScopeItemInput, legacy: bool) -> ScopeItem {
    let completed = item.completed.unwrap_or(false);
    let fallback_status = if completed {
        ScopeItemStatus::Completed
    } else {
        ScopeItemStatus::Pending
    };
    let fallback_progress = if completed { 100.0 } else { 0.0 };

    // Legacy selections carry no reliable status or progress.
    let (status, progress) = if legacy {
        (fallback_status, fallback_progress)
    } else {
        (
            item.status
                .as_deref()
                .and_then(parse_item_status)
                .unwrap_or(fallback_status),
            item.progress
                .filter(|p| *p != 0.0)
                .unwrap_or(fallback_progress),
        )
    };

    ScopeItem {
        id: non_empty(&item.id)
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        title: non_empty(&item.title).unwrap_or("Untitled").to_string(),
        description: item.description.clone().unwrap_or_default(),
        completed,
        status,
        progress: progress.clamp(0.0, 100.0),
        priority: non_empty(&item.priority).unwrap_or("medium").to_string(),
        complexity: non_empty(&item.complexity).unwrap_or("medium").to_string(),
        dependencies: item.dependencies.clone().unwrap_or_default(),
        estimated_hours: item.estimated_hours.unwrap_or(0.0),
        related_files: item.related_files.clone().unwrap_or_default(),
    }
}

/// Build the canonical document for `input`. Generates an id if absent.
pub fn normalize(input: &ScopeInput) -> ScopeDocument {
    let id = non_empty(&input.id)
        .map(str::to_string)
        .unwrap_or_else(generate_scope_id);

    let items: Vec<ScopeItem> = match (&input.items, &input.selected_items) {
        (Some(items), _) => items.iter().map(|item| normalize_item(item, false)).collect(),
        (None, Some(items)) => items.iter().map(|item| normalize_item(item, true)).collect(),
        (None, None) => Vec::new(),
    };

    let selected_ids: Vec<String> = input
        .selected_ids
        .iter()
        .flatten()
        .filter(|id| items.iter().any(|item| &item.id == *id))
        .cloned()
        .collect();

    let estimated_time = match &input.estimated_time {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => "0".to_string(),
    };

    let now = Utc::now();
    ScopeDocument {
        name: non_empty(&input.name)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Scope {}", id.chars().take(8).collect::<String>())),
        description: input.description.clone().unwrap_or_default(),
        project_path: input.project_path.clone().unwrap_or_default(),
        requirements: input.requirements.clone(),
        items,
        selected_ids,
        estimated_time,
        total_progress: input.total_progress.unwrap_or(0.0).clamp(0.0, 100.0),
        start_date: non_empty(&input.start_date)
            .map(str::to_string)
            .unwrap_or_else(|| now.format("%Y-%m-%d").to_string()),
        target_date: input.target_date.clone().unwrap_or_default(),
        created: now.timestamp_millis(),
        updated: now.timestamp_millis(),
        id,
    }
}

/// Stores and loads scope documents under `scopes/`.
#[derive(Debug, Clone)]
pub struct ScopeSerializer {
    locator: TempLocator,
    broker: Option<MessageBroker>,
}

impl ScopeSerializer {
    pub fn new(locator: TempLocator) -> Self {
        Self {
            locator,
            broker: None,
        }
    }

    /// Announce every export as a `scope:create` message on `broker`.
    pub fn with_broker(mut self, broker: MessageBroker) -> Self {
        self.broker = Some(broker);
        self
    }

    pub fn scopes_dir(&self) -> ScopeResult<PathBuf> {
        self.locator
            .temp_dir(SCOPES_DIR)
            .map_err(|source| ScopeError::Io {
                path: self.locator.root().join(SCOPES_DIR),
                source,
            })
    }

    pub fn file_path(&self, scope_id: &str) -> PathBuf {
        self.locator.scope_file(scope_id)
    }

    /// Normalise and write `input`.
    pub fn export(&self, input: &ScopeInput) -> ScopeResult<ExportedScope> {
        self.write(normalize(input))
    }

    /// Write an already canonical document.
    pub fn write(&self, document: ScopeDocument) -> ScopeResult<ExportedScope> {
        if !is_valid_scope_id(&document.id) {
            return Err(ScopeError::InvalidId(document.id));
        }
        self.scopes_dir()?;
        let file_path = self.file_path(&document.id);
        let body = serde_json::to_vec_pretty(&document)?;
        write_atomic(&file_path, &body).map_err(|source| ScopeError::Io {
            path: file_path.clone(),
            source,
        })?;
        debug!(scope_id = %document.id, path = ?file_path, "scope exported");

        if let Some(broker) = &self.broker {
            let payload = json!({ "scopeId": document.id, "scopeFilePath": file_path });
            if let Err(err) = broker.send(MessageType::ScopeCreate, payload) {
                warn!(scope_id = %document.id, error = %err, "failed to announce scope");
            }
        }

        Ok(ExportedScope {
            document,
            file_path,
        })
    }

    /// Load a scope by id, or by path when the argument ends in `.json`.
    /// A missing file is `Ok(None)`.
    pub fn import(&self, id_or_path: &str) -> ScopeResult<Option<ScopeDocument>> {
        let path = if id_or_path.ends_with(".json") {
            PathBuf::from(id_or_path)
        } else if is_valid_scope_id(id_or_path) {
            self.file_path(id_or_path)
        } else {
            return Err(ScopeError::InvalidId(id_or_path.to_string()));
        };

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                warn!(?path, "scope file not found");
                return Ok(None);
            }
            Err(source) => return Err(ScopeError::Io { path, source }),
        };

        let document: ScopeDocument =
            serde_json::from_str(&content).map_err(|source| ScopeError::Parse {
                path: path.clone(),
                source,
            })?;
        debug!(scope_id = %document.id, "scope imported");
        Ok(Some(document))
    }

    /// Ids of every stored scope, sorted.
    pub fn available_ids(&self) -> ScopeResult<Vec<String>> {
        let dir = self.scopes_dir()?;
        let entries = std::fs::read_dir(&dir).map_err(|source| ScopeError::Io {
            path: dir.clone(),
            source,
        })?;

        let mut ids: Vec<String> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .and_then(|name| name.strip_suffix(".json"))
                    .map(str::to_string)
            })
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// Every stored scope that can be read. Broken files are logged and
    /// skipped.
    pub fn available_scopes(&self) -> ScopeResult<Vec<ScopeDocument>> {
        let mut scopes = Vec::new();
        for id in self.available_ids()? {
            match self.import(&id) {
                Ok(Some(scope)) => scopes.push(scope),
                Ok(None) => {}
                Err(err) => warn!(scope_id = %id, error = %err, "skipping unreadable scope"),
            }
        }
        Ok(scopes)
    }

    /// Remove a stored scope. Returns `false` if it did not exist.
    pub fn delete(&self, scope_id: &str) -> ScopeResult<bool> {
        if !is_valid_scope_id(scope_id) {
            return Err(ScopeError::InvalidId(scope_id.to_string()));
        }
        let path = self.file_path(scope_id);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(%scope_id, "scope deleted");
                Ok(true)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(ScopeError::Io { path, source }),
        }
    }

    pub fn is_valid_project_path(path: &Path) -> bool {
        path.is_dir()
    }

    /// The command a user would type to resume a stored scope by hand.
    pub fn cli_command(&self, scope_id: &str) -> ScopeResult<Option<String>> {
        Ok(self.import(scope_id)?.map(|scope| {
            let driver = Path::new(&scope.project_path).join(DEFAULT_DRIVER_FILE);
            format!(
                "{DEFAULT_CLI_COMMAND} --scope={scope_id} \"{}\"",
                driver.display()
            )
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::BrokerOptions;
    use lk_protocol::message_models::MessageStatus;
    use tempfile::tempdir;

    fn input_from(value: Value) -> ScopeInput {
        serde_json::from_value(value).expect("invalid scope input")
    }

    #[test]
    fn test_normalize_fills_defaults() {
        let input = input_from(json!({
            "projectPath": "/work/app",
            "items": [
                { "id": "a", "completed": true },
                { "id": "b", "title": "Login", "status": "in_progress", "progress": 40 },
                { "title": "No id" }
            ],
            "selectedIds": ["a", "b", "ghost"],
            "estimatedTime": 12,
            "totalProgress": 140
        }));

        let doc = normalize(&input);

        assert!(doc.id.starts_with("scope-"));
        assert!(doc.name.starts_with("Scope "));
        assert_eq!(doc.items.len(), 3);

        assert_eq!(doc.items[0].title, "Untitled");
        assert_eq!(doc.items[0].status, ScopeItemStatus::Completed);
        assert_eq!(doc.items[0].progress, 100.0);
        assert_eq!(doc.items[0].priority, "medium");

        assert_eq!(doc.items[1].status, ScopeItemStatus::InProgress);
        assert_eq!(doc.items[1].progress, 40.0);
        assert!(!doc.items[2].id.is_empty());

        assert_eq!(doc.selected_ids, vec!["a".to_string(), "b".to_string()]);
        assert!(doc.selection_is_consistent());
        assert_eq!(doc.estimated_time, "12");
        assert_eq!(doc.total_progress, 100.0);
    }

    #[test]
    fn test_normalize_legacy_selected_items() {
        let input = input_from(json!({
            "id": "scope-legacy",
            "selectedItems": [
                { "id": "x", "completed": true, "status": "blocked", "progress": 5 },
                { "id": "y" }
            ]
        }));

        let doc = normalize(&input);

        assert_eq!(doc.id, "scope-legacy");
        assert_eq!(doc.items[0].status, ScopeItemStatus::Completed);
        assert_eq!(doc.items[0].progress, 100.0);
        assert_eq!(doc.items[1].status, ScopeItemStatus::Pending);
        assert_eq!(doc.items[1].progress, 0.0);
    }

    #[test]
    fn test_generated_id_shape() {
        let id = generate_scope_id();
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "scope");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 8);
    }

    #[tokio::test]
    async fn test_export_announces_scope() {
        let dir = tempdir().expect("Failed to create temp dir");
        let locator = TempLocator::new(dir.path());
        let broker =
            MessageBroker::for_channel(&locator, "default", BrokerOptions::default())
                .expect("broker");
        let serializer = ScopeSerializer::new(locator).with_broker(broker.clone());

        let exported = serializer
            .export(&input_from(json!({ "id": "scope-1", "name": "First" })))
            .expect("export failed");

        let pending = broker.list(MessageStatus::New).expect("list");
        assert_eq!(pending.len(), 1);
        let message = broker.read(pending[0]).expect("read").expect("missing");
        assert_eq!(message.message_type, MessageType::ScopeCreate);
        assert_eq!(message.payload["scopeId"], "scope-1");
        assert_eq!(
            message.payload["scopeFilePath"],
            &*exported.file_path.to_string_lossy()
        );
    }

    #[test]
    fn test_list_delete_and_cli_command() {
        let dir = tempdir().expect("Failed to create temp dir");
        let serializer = ScopeSerializer::new(TempLocator::new(dir.path()));

        serializer
            .export(&input_from(json!({ "id": "scope-b", "projectPath": "/work/app" })))
            .expect("export b");
        serializer
            .export(&input_from(json!({ "id": "scope-a", "projectPath": "/work/app" })))
            .expect("export a");

        assert_eq!(
            serializer.available_ids().expect("ids"),
            vec!["scope-a".to_string(), "scope-b".to_string()]
        );
        assert_eq!(serializer.available_scopes().expect("scopes").len(), 2);

        assert_eq!(
            serializer.cli_command("scope-a").expect("command"),
            Some("claude --scope=scope-a \"/work/app/CLAUDE.md\"".to_string())
        );

        assert!(serializer.delete("scope-a").expect("delete"));
        assert!(!serializer.delete("scope-a").expect("delete twice"));
        assert_eq!(serializer.import("scope-a").expect("import"), None);
        assert_eq!(serializer.cli_command("scope-a").expect("command"), None);
    }

    #[test]
    fn test_import_by_path_and_parse_error() {
        let dir = tempdir().expect("Failed to create temp dir");
        let serializer = ScopeSerializer::new(TempLocator::new(dir.path()));

        let exported = serializer
            .export(&input_from(json!({ "id": "scope-path" })))
            .expect("export");
        let by_path = serializer
            .import(&exported.file_path.to_string_lossy())
            .expect("import")
            .expect("missing");
        assert_eq!(by_path, exported.document);

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{").expect("write");
        assert!(matches!(
            serializer.import(&broken.to_string_lossy()),
            Err(ScopeError::Parse { .. })
        ));
    }

    #[test]
    fn test_rejects_ids_that_leave_scopes_dir() {
        let dir = tempdir().expect("Failed to create temp dir");
        let root = dir.path().join("root");
        let serializer = ScopeSerializer::new(TempLocator::new(&root));

        for id in ["../../escaped", "nested/scope", "win\\scope", ".."] {
            assert!(!is_valid_scope_id(id), "{id} should be rejected");
            assert!(matches!(
                serializer.export(&input_from(json!({ "id": id }))),
                Err(ScopeError::InvalidId(_))
            ));
            assert!(matches!(serializer.import(id), Err(ScopeError::InvalidId(_))));
            assert!(matches!(serializer.delete(id), Err(ScopeError::InvalidId(_))));
        }
        assert!(!dir.path().join("escaped.json").exists());
        assert!(is_valid_scope_id("scope-1700000000000-abcd1234"));
    }

    #[test]
    fn test_is_valid_project_path() {
        let dir = tempdir().expect("Failed to create temp dir");
        let file = dir.path().join("file.txt");
        std::fs::write(&file, "x").expect("write");

        assert!(ScopeSerializer::is_valid_project_path(dir.path()));
        assert!(!ScopeSerializer::is_valid_project_path(&file));
        assert!(!ScopeSerializer::is_valid_project_path(&dir.path().join("missing")));
    }
}
