//! Serialized unit-of-work ("scope") models.
//!
//! A scope is written to `scopes/{id}.json` by the scope serializer and read
//! back by the launcher and the external CLI.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Status of a single scope item.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, TS)]
#[serde(rename_all = "kebab-case")]
pub enum ScopeItemStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Blocked,
}

/// One task inside a scope.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
pub struct ScopeItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub status: ScopeItemStatus,
    /// Percentage in `[0, 100]`.
    #[serde(default)]
    pub progress: f64,
    #[serde(default = "default_level")]
    pub priority: String,
    #[serde(default = "default_level")]
    pub complexity: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub estimated_hours: f64,
    #[serde(default)]
    pub related_files: Vec<String>,
}

fn default_level() -> String {
    "medium".to_string()
}

/// Canonical on-disk representation of a unit of work.
///
/// Invariants maintained by the serializer:
/// - every entry of `selected_ids` is the id of an item in `items`
/// - `total_progress` lies in `[0, 100]`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
pub struct ScopeDocument {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub project_path: String,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub items: Vec<ScopeItem>,
    #[serde(default)]
    pub selected_ids: Vec<String>,
    #[serde(default)]
    pub estimated_time: String,
    #[serde(default)]
    pub total_progress: f64,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub target_date: String,
    /// Milliseconds since the Unix epoch.
    pub created: i64,
    /// Milliseconds since the Unix epoch.
    pub updated: i64,
}

impl ScopeDocument {
    /// Mean progress of the selected items, clamped to `[0, 100]`.
    ///
    /// Falls back to all items when nothing is selected, and to `0` for an
    /// empty scope.
    pub fn recompute_total_progress(&self) -> f64 {
        let selected: Vec<&ScopeItem> = if self.selected_ids.is_empty() {
            self.items.iter().collect()
        } else {
            self.items
                .iter()
                .filter(|item| self.selected_ids.contains(&item.id))
                .collect()
        };

        if selected.is_empty() {
            return 0.0;
        }

        let sum: f64 = selected.iter().map(|item| item.progress).sum();
        (sum / selected.len() as f64).clamp(0.0, 100.0)
    }

    /// Whether every selected id refers to an existing item.
    pub fn selection_is_consistent(&self) -> bool {
        self.selected_ids
            .iter()
            .all(|id| self.items.iter().any(|item| &item.id == id))
    }
}
