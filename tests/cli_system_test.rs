//! Integration tests for system and config commands via CLI.

mod common;

use common::TestEnv;
use predicates::prelude::*;

#[test]
fn test_init_creates_storage() {
    let env = TestEnv::new();

    env.rota()
        .args(["system", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"initialized\":true"));

    assert!(env.data_path().join("cache.db").exists());
}

#[test]
fn test_init_human_readable() {
    let env = TestEnv::new();

    env.rota()
        .args(["system", "init", "-H"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized rota"));
}

#[test]
fn test_init_already_initialized() {
    let env = TestEnv::init();

    env.rota()
        .args(["system", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"initialized\":false"));
}

#[test]
fn test_status_uninitialized() {
    let env = TestEnv::new();

    env.rota()
        .args(["system", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"initialized\":false"));
}

#[test]
fn test_status_reports_counts() {
    let env = TestEnv::init();
    env.add_user("Alice", true);
    env.add_site("Plant A");

    let status = env.run_json(&["system", "status"]);
    assert_eq!(status["initialized"], true);
    assert_eq!(status["users"], 1);
    assert_eq!(status["sites"], 1);
    assert!(status.get("active_period").is_none());
}

#[test]
fn test_rebuild_preserves_data() {
    let env = TestEnv::init();
    let coordinator = env.add_user("Coord", true);

    // Drop the cache and rebuild from the JSONL history
    std::fs::remove_file(env.data_path().join("cache.db")).unwrap();
    env.rota()
        .args(["system", "rebuild"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"rebuilt\":true"));

    let user = env.run_json(&["user", "show", &coordinator]);
    assert_eq!(user["user"]["name"], "Coord");
}

#[test]
fn test_config_set_get_list() {
    let env = TestEnv::init();

    env.rota()
        .args(["config", "set", "action_log_enabled", "false"])
        .assert()
        .success();

    let got = env.run_json(&["config", "get", "action_log_enabled"]);
    assert_eq!(got["value"], "false");

    let listed = env.run_json(&["config", "list"]);
    assert_eq!(listed["count"], 1);
}

#[test]
fn test_config_get_unset_key() {
    let env = TestEnv::init();

    env.rota()
        .args(["config", "get", "missing_key", "-H"])
        .assert()
        .success()
        .stdout(predicate::str::contains("is not set"));
}

#[test]
fn test_errors_are_json_on_stderr() {
    let env = TestEnv::init();

    env.rota()
        .args(["user", "show", "ru-zzzz"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("\"error\""));
}

#[test]
fn test_errors_are_plain_with_human_flag() {
    let env = TestEnv::init();

    env.rota()
        .args(["-H", "user", "show", "ru-zzzz"])
        .assert()
        .failure()
        .stderr(predicate::str::starts_with("Error:"));
}
