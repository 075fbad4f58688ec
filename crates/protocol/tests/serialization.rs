use lk_protocol::*;
use serde_json::json;
use std::path::PathBuf;
use uuid::Uuid;

fn sample_scope() -> ScopeDocument {
    ScopeDocument {
        id: "scope-1".to_string(),
        name: "Checkout flow".to_string(),
        description: "Implement checkout".to_string(),
        project_path: "/work/shop".to_string(),
        requirements: vec![],
        items: vec![
            ScopeItem {
                id: "item-1".to_string(),
                title: "Cart page".to_string(),
                description: String::new(),
                completed: true,
                status: ScopeItemStatus::Completed,
                progress: 100.0,
                priority: "high".to_string(),
                complexity: "medium".to_string(),
                dependencies: vec![],
                estimated_hours: 4.0,
                related_files: vec!["src/cart.rs".to_string()],
            },
            ScopeItem {
                id: "item-2".to_string(),
                title: "Payment".to_string(),
                description: String::new(),
                completed: false,
                status: ScopeItemStatus::InProgress,
                progress: 50.0,
                priority: "medium".to_string(),
                complexity: "high".to_string(),
                dependencies: vec!["item-1".to_string()],
                estimated_hours: 8.0,
                related_files: vec![],
            },
        ],
        selected_ids: vec!["item-1".to_string(), "item-2".to_string()],
        estimated_time: "12".to_string(),
        total_progress: 75.0,
        start_date: "2024-06-01".to_string(),
        target_date: String::new(),
        created: 1_718_000_000_000,
        updated: 1_718_000_000_000,
    }
}

#[test]
fn test_execution_status_serialization() {
    let json = serde_json::to_value(ExecutionStatus::Running).expect("Failed to serialize status");
    assert_eq!(json, "running");

    let deserialized: ExecutionStatus =
        serde_json::from_value(json).expect("Failed to deserialize status");
    assert_eq!(deserialized, ExecutionStatus::Running);

    // External writers are not consistent about casing.
    let completed: ExecutionStatus =
        serde_json::from_str("\"Completed\"").expect("Failed to deserialize capitalised status");
    assert_eq!(completed, ExecutionStatus::Completed);
    let failed: ExecutionStatus =
        serde_json::from_str("\"FAILED\"").expect("Failed to deserialize upper-case status");
    assert_eq!(failed, ExecutionStatus::Failed);
}

#[test]
fn test_execution_status_transitions() {
    use ExecutionStatus::*;

    assert!(Idle.can_transition_to(Running));
    assert!(Running.can_transition_to(Completed));
    assert!(Running.can_transition_to(Failed));
    assert!(Completed.can_transition_to(Idle));
    assert!(Running.can_transition_to(Idle));

    assert!(!Idle.can_transition_to(Completed));
    assert!(!Idle.can_transition_to(Failed));
    assert!(!Completed.can_transition_to(Running));
    assert!(!Failed.can_transition_to(Completed));
}

#[test]
fn test_message_serialization_uses_wire_names() {
    let id = Uuid::new_v4();
    let message = Message {
        id,
        message_type: MessageType::ProgressReport,
        status: MessageStatus::New,
        payload: json!({ "totalProgress": 10 }),
        timestamp: 1_718_000_000_000,
    };

    let json = serde_json::to_value(&message).expect("Failed to serialize Message");
    assert_eq!(json["type"], "progress:report");
    assert_eq!(json["status"], "new");
    assert_eq!(json["id"], id.to_string());

    let deserialized: Message = serde_json::from_value(json).expect("Failed to deserialize Message");
    assert_eq!(deserialized, message);
}

#[test]
fn test_message_type_from_str_accepts_both_forms() {
    assert_eq!("scope:create".parse::<MessageType>(), Ok(MessageType::ScopeCreate));
    assert_eq!("scope-update".parse::<MessageType>(), Ok(MessageType::ScopeUpdate));
    assert_eq!("Result-Submit".parse::<MessageType>(), Ok(MessageType::ResultSubmit));
    assert!("scope".parse::<MessageType>().is_err());
}

#[test]
fn test_message_file_name_round_trip() {
    let id = Uuid::new_v4();
    let name = Message::file_name(id, MessageStatus::Processing);
    assert_eq!(name, format!("{id}.processing.json"));
    assert_eq!(
        Message::parse_file_name(&name),
        Some((id, MessageStatus::Processing))
    );

    assert_eq!(Message::parse_file_name("notes.json"), None);
    assert_eq!(Message::parse_file_name(&format!("{id}.archived.json")), None);
    assert_eq!(Message::parse_file_name(&format!("{id}.new.json.tmp")), None);
}

#[test]
fn test_scope_document_camel_case() {
    let scope = sample_scope();
    let json = serde_json::to_value(&scope).expect("Failed to serialize ScopeDocument");

    assert_eq!(json["projectPath"], "/work/shop");
    assert_eq!(json["selectedIds"][1], "item-2");
    assert_eq!(json["items"][1]["status"], "in-progress");
    assert_eq!(json["items"][0]["relatedFiles"][0], "src/cart.rs");

    let deserialized: ScopeDocument =
        serde_json::from_value(json).expect("Failed to deserialize ScopeDocument");
    assert_eq!(deserialized, scope);
}

#[test]
fn test_scope_recompute_total_progress() {
    let mut scope = sample_scope();
    assert_eq!(scope.recompute_total_progress(), 75.0);

    scope.selected_ids = vec!["item-2".to_string()];
    assert_eq!(scope.recompute_total_progress(), 50.0);

    scope.items.clear();
    scope.selected_ids.clear();
    assert_eq!(scope.recompute_total_progress(), 0.0);
}

#[test]
fn test_scope_selection_consistency() {
    let mut scope = sample_scope();
    assert!(scope.selection_is_consistent());

    scope.selected_ids.push("missing".to_string());
    assert!(!scope.selection_is_consistent());
}

#[test]
fn test_progress_report_optional_status() {
    let report: ProgressReport =
        serde_json::from_value(json!({ "totalProgress": 57, "items": [{}, {}] }))
            .expect("Failed to deserialize ProgressReport");
    assert_eq!(report.total_progress, 57.0);
    assert_eq!(report.items.len(), 2);
    assert!(report.status.is_none());
    assert!(!report.is_terminal());

    let done: ProgressReport = serde_json::from_value(
        json!({ "totalProgress": 100, "items": [], "status": "Completed" }),
    )
    .expect("Failed to deserialize ProgressReport");
    assert!(done.is_terminal());
}

#[test]
fn test_progress_report_unknown_status_reads_as_none() {
    let report: ProgressReport = serde_json::from_value(
        json!({ "totalProgress": 30, "items": [], "status": "in_progress" }),
    )
    .expect("Failed to deserialize ProgressReport");
    assert_eq!(report.total_progress, 30.0);
    assert!(report.status.is_none());

    let report: ProgressReport = serde_json::from_value(
        json!({ "totalProgress": 30, "items": [], "status": null }),
    )
    .expect("Failed to deserialize ProgressReport");
    assert!(report.status.is_none());

    let report: ProgressReport = serde_json::from_value(
        json!({ "totalProgress": 40, "items": [], "status": "FAILED" }),
    )
    .expect("Failed to deserialize ProgressReport");
    assert_eq!(report.status, Some(ExecutionStatus::Failed));
}

#[test]
fn test_event_enum_serialization() {
    let event = Event::LaunchStarted {
        work_id: "scope-1".to_string(),
        project_path: PathBuf::from("/work/shop"),
        scope_file_path: PathBuf::from("/tmp/launchkit/scopes/scope-1.json"),
        progress_file_path: PathBuf::from("/tmp/launchkit/progress/scope-1.json"),
    };

    let json = serde_json::to_value(&event).expect("Failed to serialize Event");
    assert_eq!(json["type"], "launchStarted");
    assert_eq!(json["payload"]["workId"], "scope-1");
    assert_eq!(json["payload"]["progressFilePath"], "/tmp/launchkit/progress/scope-1.json");

    let deserialized: Event = serde_json::from_value(json).expect("Failed to deserialize Event");
    assert_eq!(deserialized, event);

    let completed = Event::SecondaryCompleted {
        process_id: "mockup-login-1".to_string(),
        status: ExecutionStatus::Completed,
    };
    let json = serde_json::to_value(&completed).expect("Failed to serialize Event");
    assert_eq!(json["type"], "secondaryCompleted");
    assert_eq!(json["payload"]["status"], "completed");
}

#[test]
fn test_mockup_process_serialization() {
    let process = MockupProcess {
        id: "mockup-login-1".to_string(),
        mockup_name: "login".to_string(),
        source_path: PathBuf::from("/work/shop/mockups/login.html"),
        project_path: PathBuf::from("/work/shop"),
        analysis_file_path: PathBuf::from("/tmp/launchkit/mockup-analysis/login-analysis-1.md"),
        terminal: Some(TerminalId(7)),
        status: ExecutionStatus::Running,
        source: Some("gallery".to_string()),
        start_time: chrono::Utc::now(),
    };

    let json = serde_json::to_value(&process).expect("Failed to serialize MockupProcess");
    assert_eq!(json["terminal"], 7);
    assert_eq!(json["mockupName"], "login");

    let deserialized: MockupProcess =
        serde_json::from_value(json).expect("Failed to deserialize MockupProcess");
    assert_eq!(deserialized, process);
}
