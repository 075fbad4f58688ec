//! Binary-level tests for `launchkit`.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn launchkit(project: &TempDir, temp_root: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("launchkit").expect("binary not built");
    cmd.env_remove("LAUNCHKIT_LOG")
        .arg("--project")
        .arg(project.path())
        .arg("--temp-root")
        .arg(temp_root.path());
    cmd
}

fn dirs() -> (TempDir, TempDir) {
    (
        tempfile::tempdir().expect("Failed to create project dir"),
        tempfile::tempdir().expect("Failed to create temp root"),
    )
}

#[test]
fn test_help_lists_subcommands() {
    Command::cargo_bin("launchkit")
        .expect("binary not built")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("launch"))
        .stdout(predicate::str::contains("analyze"))
        .stdout(predicate::str::contains("scopes"));
}

#[test]
fn test_init_then_refuse_second_init() {
    let (project, temp_root) = dirs();

    launchkit(&project, &temp_root)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized launchkit"));

    assert!(project.path().join(".launchkit/config.toml").is_file());
    assert!(project.path().join("CLAUDE.md").is_file());
    assert!(project
        .path()
        .join("docs/mockup_analysis_template.md")
        .is_file());

    launchkit(&project, &temp_root)
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    launchkit(&project, &temp_root)
        .args(["init", "--force", "--minimal"])
        .assert()
        .success();
}

#[test]
fn test_send_writes_new_message() {
    let (project, temp_root) = dirs();

    let output = launchkit(&project, &temp_root)
        .args(["send", "scope:update", r#"{"scopeId": "scope-1"}"#])
        .output()
        .expect("Failed to run send");
    assert!(output.status.success());

    let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let file = temp_root
        .path()
        .join("messages/default")
        .join(format!("{id}.new.json"));
    assert!(file.is_file(), "missing {}", file.display());

    let body = std::fs::read_to_string(file).expect("Failed to read message");
    assert!(body.contains("scope:update"));
    assert!(body.contains("scope-1"));
}

#[test]
fn test_send_rejects_unknown_type_and_bad_json() {
    let (project, temp_root) = dirs();

    launchkit(&project, &temp_root)
        .args(["send", "scope:explode", "{}"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown message type"));

    launchkit(&project, &temp_root)
        .args(["send", "scope-update", "{oops"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not valid JSON"));
}

#[test]
fn test_scopes_on_empty_root() {
    let (project, temp_root) = dirs();

    launchkit(&project, &temp_root)
        .args(["scopes", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No scopes stored"));

    launchkit(&project, &temp_root)
        .args(["scopes", "show", "scope-missing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("scope not found"));
}

#[test]
fn test_status_reports_temp_root() {
    let (project, temp_root) = dirs();

    launchkit(&project, &temp_root)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("temp root"))
        .stdout(predicate::str::contains("defaults"))
        .stdout(predicate::str::contains("new 0"));
}
