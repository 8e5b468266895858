// tests/cli_tests.rs
// CLI integration tests using assert_cmd against the chatsweep binary.
mod common;

use assert_cmd::Command;
use chatsweep::message::RemoteMessage;
use common::{FakeDiscord, FAKE_TOKEN};
use predicates::prelude::*;
use std::fs;
use std::path::Path;

fn cmd() -> Command {
    #[allow(deprecated)]
    Command::cargo_bin("chatsweep").unwrap()
}

fn history() -> Vec<RemoteMessage> {
    vec![
        RemoteMessage::new("30", "42", Some("three")),
        RemoteMessage::new("20", "7", Some("two")),
        RemoteMessage::new("10", "42", None),
    ]
}

// --- Help and argument errors ---

#[test]
fn test_help_lists_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_run_requires_ids_and_token() {
    cmd()
        .arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--user-id"));
}

// --- Config ---

#[test]
fn test_config_prints_defaults() {
    let dir = tempfile::tempdir().unwrap();
    cmd()
        .arg("config")
        .current_dir(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("page_size = 50"))
        .stdout(predicate::str::contains("pace_ms = 1500"))
        .stdout(predicate::str::contains("https://discord.com/api/v9"));
}

#[test]
fn test_config_reads_local_file() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("chatsweep.toml"), "page_size = 20\n").unwrap();
    cmd()
        .arg("config")
        .current_dir(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("page_size = 20"));
}

#[test]
fn test_config_explicit_path_must_exist() {
    let dir = tempfile::tempdir().unwrap();
    cmd()
        .args(["config", "--config", "missing.toml"])
        .current_dir(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Config file not found"));
}

#[test]
fn test_config_rejects_bad_page_size() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("chatsweep.toml"), "page_size = 0\n").unwrap();
    cmd()
        .arg("config")
        .current_dir(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("page_size must be between 1 and 100"));
}

// --- Run ---

fn run_cmd(dir: &Path, server: &FakeDiscord, token: &str, user_id: &str) -> Command {
    let mut cmd = cmd();
    cmd.args([
        "run",
        "--user-id",
        user_id,
        "--channel-id",
        "900",
        "--token",
        token,
        "--api-base",
        server.base_url.as_str(),
        "--pace-ms",
        "0",
    ])
    .current_dir(dir);
    cmd
}

#[test]
fn test_run_deletes_own_messages() {
    let dir = tempfile::tempdir().unwrap();
    let server = FakeDiscord::start(history());
    run_cmd(dir.path(), &server, FAKE_TOKEN, "42")
        .assert()
        .success()
        .stdout(predicate::str::contains("deleted: three"))
        .stdout(predicate::str::contains("deleted: [no content]"))
        .stdout(predicate::str::contains("Deleted 2 message(s)."));

    assert_eq!(server.remaining_ids(), vec!["20"]);
}

#[test]
fn test_run_reports_skipped_messages() {
    let dir = tempfile::tempdir().unwrap();
    let server = FakeDiscord::start(history());
    server
        .state
        .forbidden_deletes
        .lock()
        .unwrap()
        .insert("10".to_string());
    run_cmd(dir.path(), &server, FAKE_TOKEN, "42")
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted 1 message(s)."))
        .stdout(predicate::str::contains("Skipped 1 message(s)"));
}

#[test]
fn test_run_with_bad_token_fails() {
    let dir = tempfile::tempdir().unwrap();
    let server = FakeDiscord::start(history());
    run_cmd(dir.path(), &server, "wrong-token", "42")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unauthorized"));

    assert_eq!(server.remaining_ids().len(), 3);
}

#[test]
fn test_run_with_blank_user_id_fails() {
    let dir = tempfile::tempdir().unwrap();
    let server = FakeDiscord::start(history());
    run_cmd(dir.path(), &server, FAKE_TOKEN, " ")
        .assert()
        .failure()
        .stderr(predicate::str::contains("user_id is required"));

    assert!(server.requests().is_empty());
}
