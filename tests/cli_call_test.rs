//! Integration tests for call-log dispatch, escalation, and resolution via CLI.

mod common;

use common::TestEnv;
use predicates::prelude::*;

struct Fixture {
    env: TestEnv,
    coordinator: String,
    e1: String,
    e2: String,
    call_id: String,
}

/// A pending call assigned to two engineers.
fn fixture() -> Fixture {
    let env = TestEnv::init();
    let coordinator = env.add_user("Coord", true);
    let e1 = env.add_user("E1", false);
    let e2 = env.add_user("E2", false);
    let site = env.add_site("Plant A");

    let created = env.run_json(&[
        "--user",
        &coordinator,
        "call",
        "create",
        &site,
        "--issue",
        "Compressor down",
        "--engineer",
        &e1,
        "--engineer",
        &e2,
    ]);
    let call_id = created["call"]["id"].as_str().unwrap().to_string();
    Fixture {
        env,
        coordinator,
        e1,
        e2,
        call_id,
    }
}

#[test]
fn test_create_requires_coordinator() {
    let f = fixture();
    let site = f.env.add_site("Plant B");

    f.env
        .rota()
        .args([
            "--user", &f.e1, "call", "create", &site, "--issue", "Leak", "--engineer", &f.e1,
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Coordinator privileges required"));
}

#[test]
fn test_first_acceptance_starts_work() {
    let f = fixture();

    // E2 accepts first: the call starts
    let first = f.env.run_json(&[
        "--user", &f.e2, "call", "accept", &f.call_id, "--lat", "51.5", "--lon", "-0.1",
    ]);
    assert_eq!(first["first_acceptance"], true);
    assert_eq!(first["call"]["status"], "in_progress");
    assert_eq!(first["call"]["started_by"], f.e2.as_str());
    let start_time = first["call"]["job_start_time"].clone();

    // E1 accepts after: joins accepted_by, timeline unchanged
    let second = f.env.run_json(&[
        "--user", &f.e1, "call", "accept", &f.call_id, "--lat", "51.5", "--lon", "-0.1",
    ]);
    assert_eq!(second["first_acceptance"], false);
    assert_eq!(second["call"]["job_start_time"], start_time);
    assert_eq!(
        second["call"]["accepted_by"],
        serde_json::json!([f.e2, f.e1])
    );
}

#[test]
fn test_accept_requires_assignment() {
    let f = fixture();
    let outsider = f.env.add_user("Outsider", false);

    f.env
        .rota()
        .args([
            "--user", &outsider, "call", "accept", &f.call_id, "--lat", "0", "--lon", "0",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not assigned"));
}

#[test]
fn test_escalate_reassign_resolve_flow() {
    let f = fixture();
    f.env.run_json(&[
        "--user", &f.e1, "call", "accept", &f.call_id, "--lat", "0", "--lon", "0",
    ]);

    let escalated = f
        .env
        .run_json(&["--user", &f.e1, "call", "escalate", &f.call_id]);
    assert_eq!(escalated["call"]["status"], "escalated");
    assert_eq!(escalated["call"]["engineers_at_escalation"], 2);
    assert_eq!(escalated["call"]["needs_reassignment"], true);

    // Only a coordinator may reassign
    let e3 = f.env.add_user("E3", false);
    f.env
        .rota()
        .args(["--user", &f.e1, "call", "reassign", &f.call_id, &e3])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Coordinator privileges required"));

    let reassigned = f
        .env
        .run_json(&["--user", &f.coordinator, "call", "reassign", &f.call_id, &e3]);
    assert_eq!(reassigned["call"]["needs_reassignment"], false);

    // The fresh engineer's acceptance stamps the escalated leg only
    let accepted = f.env.run_json(&[
        "--user", &e3, "call", "accept", &f.call_id, "--lat", "48.8", "--lon", "2.3",
    ]);
    assert_eq!(accepted["first_acceptance"], false);
    assert_eq!(accepted["call"]["escalated_started_by"], e3.as_str());
    assert!(!accepted["call"]["escalated_job_start_time"].is_null());

    // The fresh engineer resolves the call
    let resolved = f.env.run_json(&[
        "--user", &e3, "call", "resolve", &f.call_id, "--lat", "48.8", "--lon", "2.3", "--notes",
        "Replaced controller",
    ]);
    assert_eq!(resolved["call"]["status"], "resolved");
    assert_eq!(resolved["call"]["completed_by"], e3.as_str());
}

#[test]
fn test_resolve_requires_prior_acceptance() {
    let f = fixture();
    f.env.run_json(&[
        "--user", &f.e1, "call", "accept", &f.call_id, "--lat", "0", "--lon", "0",
    ]);

    f.env
        .rota()
        .args([
            "--user", &f.e2, "call", "resolve", &f.call_id, "--lat", "0", "--lon", "0",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("has not accepted"));
}

#[test]
fn test_escalate_requires_in_progress() {
    let f = fixture();

    f.env
        .rota()
        .args(["--user", &f.e1, "call", "escalate", &f.call_id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid state"));
}

#[test]
fn test_view_tracking() {
    let f = fixture();

    let viewed = f
        .env
        .run_json(&["--user", &f.e1, "call", "view", &f.call_id]);
    assert_eq!(viewed["viewed_by"], serde_json::json!([f.e1]));

    // Idempotent
    let again = f
        .env
        .run_json(&["--user", &f.e1, "call", "view", &f.call_id]);
    assert_eq!(again["viewed_by"], serde_json::json!([f.e1]));
}

#[test]
fn test_list_with_filters() {
    let f = fixture();
    f.env.run_json(&[
        "--user", &f.e1, "call", "accept", &f.call_id, "--lat", "0", "--lon", "0",
    ]);
    f.env
        .run_json(&["--user", &f.e1, "call", "escalate", &f.call_id]);

    let escalated = f.env.run_json(&["call", "list", "--status", "escalated"]);
    assert_eq!(escalated["count"], 1);

    let pending = f.env.run_json(&["call", "list", "--status", "pending"]);
    assert_eq!(pending["count"], 0);

    let needing = f.env.run_json(&["call", "list", "--needs-reassignment"]);
    assert_eq!(needing["count"], 1);

    f.env
        .rota()
        .args(["call", "list", "--status", "bogus"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid input"));
}
