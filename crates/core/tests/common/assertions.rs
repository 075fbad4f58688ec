//! Custom assertion helpers for integration tests.

use lk_protocol::ipc::Event;
use lk_protocol::launch_models::ExecutionStatus;
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

/// Poll `condition` every 10ms for up to five seconds.
#[allow(dead_code)]
pub async fn wait_until<F: FnMut() -> bool>(what: &str, mut condition: F) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "Timed out waiting for {what}");
}

/// Names of the files in `dir` that belong to message `id`.
#[allow(dead_code)]
pub fn message_files(dir: &Path, id: Uuid) -> Vec<String> {
    let prefix = format!("{id}.");
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("Failed to read message dir")
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with(&prefix))
        .collect();
    names.sort();
    names
}

/// Assert that message `id` exists under at most one status suffix.
#[allow(dead_code)]
pub fn assert_single_status_file(dir: &Path, id: Uuid) {
    let files = message_files(dir, id);
    assert!(
        files.len() <= 1,
        "message {id} has several status files: {files:?}"
    );
}

#[allow(dead_code)]
pub fn count_events<F: Fn(&Event) -> bool>(events: &[Event], predicate: F) -> usize {
    events.iter().filter(|event| predicate(event)).count()
}

/// Assert that every change between consecutive observed statuses is a
/// legal transition. Repeated observations of one status are not changes.
#[allow(dead_code)]
pub fn assert_legal_transitions(statuses: &[ExecutionStatus]) {
    for pair in statuses.windows(2).filter(|pair| pair[0] != pair[1]) {
        assert!(
            pair[0].can_transition_to(pair[1]),
            "illegal transition {} -> {}",
            pair[0],
            pair[1]
        );
    }
}
