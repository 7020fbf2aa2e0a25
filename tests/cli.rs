use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::path::Path;
use tempfile::{TempDir, tempdir};

/// A `cardsync` command isolated to `dir`: own database, config and backups.
fn cardsync(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("cardsync").unwrap();
    cmd.env("CARDSYNC_DB", dir.join("cardsync.db"))
        .env("CARDSYNC_CONFIG", dir.join("config.json"))
        .env_remove("CARDSYNC_BACKUP_DIR")
        .env_remove("CARDSYNC_TEST_DB")
        .env_remove("MOCHI_API_KEY")
        .env_remove("MOCHI_DECK_ID")
        .env_remove("MOCHI_BASE_URL")
        .env_remove("RUST_LOG");
    cmd
}

fn json_of(cmd: &mut Command) -> Value {
    let output = cmd.output().unwrap();
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

fn initialized() -> TempDir {
    let dir = tempdir().unwrap();
    cardsync(dir.path()).arg("init").assert().success();
    dir
}

#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("cardsync").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"));
}

#[test]
fn test_cli_version_json() {
    let dir = tempdir().unwrap();
    let json = json_of(cardsync(dir.path()).args(["--json", "version"]));
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(json["schema_version"], 1);
}

#[test]
fn test_init_twice_needs_force() {
    let dir = initialized();
    assert!(dir.path().join("cardsync.db").exists());
    assert!(dir.path().join("backups").is_dir());

    cardsync(dir.path()).arg("init").assert().code(2);
    cardsync(dir.path())
        .args(["init", "--force"])
        .assert()
        .success();
}

#[test]
fn test_commands_require_init() {
    let dir = tempdir().unwrap();
    cardsync(dir.path())
        .args(["note", "list"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("cardsync init"));
}

#[test]
fn test_add_and_list_notes() {
    let dir = initialized();
    let created = json_of(cardsync(dir.path()).args([
        "--json",
        "note",
        "add-basic",
        "Capital of France?",
        "Paris",
        "--tag",
        "geo",
    ]));
    assert_eq!(created["type"], "basic");
    assert_eq!(created["origin"], "manual");

    cardsync(dir.path())
        .args(["note", "add-cloze", "The {{c1::Seine}} flows through Paris"])
        .assert()
        .success();

    let listed = json_of(cardsync(dir.path()).args(["--json", "note", "list"]));
    assert_eq!(listed["count"], 2);
    assert_eq!(listed["notes"][0]["front"], "Capital of France?");
    assert_eq!(listed["notes"][0]["tags"][0], "geo");

    let clozes = json_of(cardsync(dir.path()).args(["--json", "note", "list", "--type", "cloze"]));
    assert_eq!(clozes["count"], 1);
}

#[test]
fn test_invalid_notes_are_rejected() {
    let dir = initialized();
    cardsync(dir.path())
        .args(["note", "add-cloze", "no deletions here"])
        .assert()
        .code(4);
    cardsync(dir.path())
        .args(["note", "show", "42"])
        .assert()
        .code(3);
}

#[test]
fn test_edit_note() {
    let dir = initialized();
    cardsync(dir.path())
        .args(["note", "add-basic", "Q", "A"])
        .assert()
        .success();

    let edited = json_of(cardsync(dir.path()).args(["--json", "note", "edit", "1", "--back", "B"]));
    assert_eq!(edited["back"], "B");

    cardsync(dir.path())
        .args(["note", "edit", "1"])
        .assert()
        .code(4);
}

#[test]
fn test_sync_status_is_local() {
    let dir = initialized();
    cardsync(dir.path())
        .args(["note", "add-basic", "Q", "A"])
        .assert()
        .success();

    let status = json_of(cardsync(dir.path()).args(["--json", "sync", "status"]));
    assert_eq!(status["total_notes"], 1);
    assert_eq!(status["unlinked_notes"], 1);
    assert_eq!(status["changed_since_push"], 0);
    assert!(status.get("deck_id").is_none());
}

#[test]
fn test_sync_without_deck_is_config_error() {
    let dir = initialized();
    cardsync(dir.path())
        .args(["--json", "sync", "push"])
        .assert()
        .code(7)
        .stderr(predicate::str::contains("CONFIG_ERROR"));
}

#[test]
fn test_repair_needs_confirmation() {
    let dir = initialized();
    cardsync(dir.path())
        .args(["sync", "repair"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("--yes"));
}

#[test]
fn test_backup_create_and_list() {
    let dir = initialized();
    let created = json_of(cardsync(dir.path()).args([
        "--json",
        "backup",
        "create",
        "--reason",
        "before cleanup",
    ]));
    assert_eq!(created["trigger"], "manual");
    assert_eq!(created["reason"], "before cleanup");
    let path = created["path"].as_str().unwrap();
    assert!(Path::new(path).exists());

    let listed = json_of(cardsync(dir.path()).args(["--json", "backup", "list"]));
    assert_eq!(listed["count"], 1);
}

#[test]
fn test_config_set_and_show() {
    let dir = tempdir().unwrap();
    cardsync(dir.path())
        .args(["config", "set-deck", "deck-123"])
        .assert()
        .success();
    cardsync(dir.path())
        .args(["config", "set-key", "secret-key-abcd"])
        .assert()
        .success();

    let shown = json_of(
        cardsync(dir.path())
            .env("MOCHI_DECK_ID", "from-env")
            .args(["--json", "config", "show"]),
    );
    assert_eq!(shown["deck_id"]["value"], "deck-123");
    assert_eq!(shown["deck_id"]["source"], "config");
    assert_eq!(shown["api_key"]["value"], "****abcd");
    assert_eq!(shown["base_url"]["source"], "default");

    cardsync(dir.path())
        .args(["config", "set-url", "ftp://nope"])
        .assert()
        .code(4);
}
