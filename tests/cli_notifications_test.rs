//! Integration tests for the notifications read contract via CLI.

mod common;

use common::TestEnv;
use predicates::prelude::*;

#[test]
fn test_notifications_require_acting_user() {
    let env = TestEnv::init();

    env.rota()
        .args(["notifications"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No acting user"));
}

#[test]
fn test_notifications_aggregate_outstanding_work() {
    let env = TestEnv::init();
    let coordinator = env.add_user("Coord", true);
    let engineer = env.add_user("Eng", false);
    let site = env.add_site("Plant A");
    env.assign(&engineer, &site, &coordinator);
    env.run_json(&["--user", &coordinator, "period", "activate", "2026-Q3"]);

    let created = env.run_json(&[
        "--user",
        &coordinator,
        "call",
        "create",
        &site,
        "--issue",
        "Pump fault",
        "--engineer",
        &engineer,
    ]);
    let call_id = created["call"]["id"].as_str().unwrap().to_string();

    // One pending job plus one unviewed call
    let result = env.run_json(&["--user", &engineer, "notifications"]);
    assert_eq!(result["total"], 2);
    assert_eq!(result["pending_jobs"].as_array().unwrap().len(), 1);
    assert_eq!(result["unviewed_calls"].as_array().unwrap().len(), 1);

    // Viewing the call clears that notification
    env.run_json(&["--user", &engineer, "call", "view", &call_id]);
    let result = env.run_json(&["--user", &engineer, "notifications"]);
    assert_eq!(result["total"], 1);
    assert_eq!(result["unviewed_calls"].as_array().unwrap().len(), 0);
}

#[test]
fn test_reassignment_alerts_reach_coordinators_only() {
    let env = TestEnv::init();
    let coordinator = env.add_user("Coord", true);
    let engineer = env.add_user("Eng", false);
    let site = env.add_site("Plant A");

    let created = env.run_json(&[
        "--user",
        &coordinator,
        "call",
        "create",
        &site,
        "--issue",
        "Pump fault",
        "--engineer",
        &engineer,
    ]);
    let call_id = created["call"]["id"].as_str().unwrap().to_string();
    env.run_json(&[
        "--user", &engineer, "call", "accept", &call_id, "--lat", "0", "--lon", "0",
    ]);
    env.run_json(&["--user", &engineer, "call", "escalate", &call_id]);

    let coord_view = env.run_json(&["--user", &coordinator, "notifications"]);
    assert_eq!(coord_view["awaiting_reassignment"].as_array().unwrap().len(), 1);

    let eng_view = env.run_json(&["--user", &engineer, "notifications"]);
    assert_eq!(eng_view["awaiting_reassignment"].as_array().unwrap().len(), 0);
}

#[test]
fn test_human_output_lists_items() {
    let env = TestEnv::init();
    let coordinator = env.add_user("Coord", true);
    let engineer = env.add_user("Eng", false);
    let site = env.add_site("Plant A");
    env.assign(&engineer, &site, &coordinator);
    env.run_json(&["--user", &coordinator, "period", "activate", "2026-Q3"]);

    env.rota()
        .args(["-H", "--user", &engineer, "notifications"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 notification(s)"))
        .stdout(predicate::str::contains("pending"));
}
