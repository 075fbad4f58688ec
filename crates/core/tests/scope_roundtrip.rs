//! Scope storage through the public API.

mod common;

use common::sample_scope;
use lk_core::paths::TempLocator;
use lk_core::scope::{ScopeInput, ScopeItemInput, ScopeSerializer};
use lk_protocol::scope_models::ScopeItemStatus;
use tempfile::tempdir;

#[test]
fn test_export_import_roundtrip() {
    let dir = tempdir().expect("Failed to create temp dir");
    let serializer = ScopeSerializer::new(TempLocator::new(dir.path()));

    let exported = serializer
        .export(&sample_scope("scope-roundtrip"))
        .expect("Failed to export scope");
    assert!(exported.file_path.ends_with("scope-roundtrip.json"));

    let by_id = serializer
        .import("scope-roundtrip")
        .expect("Failed to import scope")
        .expect("scope missing");
    let by_path = serializer
        .import(&exported.file_path.to_string_lossy())
        .expect("Failed to import scope")
        .expect("scope missing");

    assert_eq!(by_id, exported.document);
    assert_eq!(by_path, exported.document);
    assert_eq!(by_id.items.len(), 3);
    assert_eq!(
        by_id.selected_ids,
        vec!["item-1".to_string(), "item-2".to_string()]
    );

    assert_eq!(
        serializer.available_ids().expect("Failed to list scopes"),
        vec!["scope-roundtrip".to_string()]
    );
    assert!(serializer.delete("scope-roundtrip").expect("Failed to delete"));
    assert!(serializer
        .import("scope-roundtrip")
        .expect("Failed to import scope")
        .is_none());
}

/// Older hosts send `selectedItems` without status; those items start
/// pending regardless of what they claim.
#[test]
fn test_legacy_selection_is_normalized() {
    let dir = tempdir().expect("Failed to create temp dir");
    let serializer = ScopeSerializer::new(TempLocator::new(dir.path()));

    let input = ScopeInput {
        id: Some("scope-legacy".to_string()),
        selected_items: Some(vec![ScopeItemInput {
            id: Some("a".to_string()),
            status: Some("in-progress".to_string()),
            progress: Some(40.0),
            ..ScopeItemInput::default()
        }]),
        ..ScopeInput::default()
    };

    let exported = serializer.export(&input).expect("Failed to export scope");
    let item = &exported.document.items[0];
    assert_eq!(item.status, ScopeItemStatus::Pending);
    assert_eq!(item.progress, 0.0);
    assert_eq!(item.title, "Untitled");
}
