//! Call-log acceptance, escalation, and resolution.
//!
//! Call logs reuse the start/finish shape of the service-log state machine
//! with two differences: any listed engineer may accept (the Pending ->
//! InProgress transition happens only on the first acceptance), and an
//! escalation branch opens a second start timeline alongside the original.

use super::{json, location_from, require_admin, Output};
use crate::models::{CallLog, CallStatus};
use crate::storage::{generate_id, Storage};
use crate::{Error, Result};
use chrono::Utc;
use serde::Serialize;
use std::path::Path;

/// A call log together with its derived reassignment state.
#[derive(Debug, Serialize)]
pub struct CallView {
    #[serde(flatten)]
    pub call: CallLog,
    /// Derived on read: escalated and no engineer added since escalation.
    pub needs_reassignment: bool,
}

impl CallView {
    fn new(call: CallLog) -> Self {
        let needs_reassignment = call.needs_reassignment();
        Self {
            call,
            needs_reassignment,
        }
    }
}

/// Result of `call create`.
#[derive(Debug, Serialize)]
pub struct CallCreateResult {
    pub call: CallLog,
}

impl Output for CallCreateResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!(
            "Created call log {} at site {} for {} engineer(s)",
            self.call.id,
            self.call.site_id,
            self.call.engineer_ids.len()
        )
    }
}

/// Create a new call log assigning one or more engineers.
pub fn call_create(
    data_dir: &Path,
    site_id: &str,
    issue: &str,
    engineer_ids: &[String],
    acting_user_id: &str,
) -> Result<CallCreateResult> {
    let mut storage = Storage::open(data_dir)?;
    let actor = storage.get_user(acting_user_id)?;
    require_admin(&actor)?;

    if issue.trim().is_empty() {
        return Err(Error::InvalidInput("Issue must not be empty".to_string()));
    }
    if engineer_ids.is_empty() {
        return Err(Error::InvalidInput(
            "At least one engineer must be assigned".to_string(),
        ));
    }

    storage.get_site(site_id)?;
    let mut unique = std::collections::HashSet::new();
    for engineer_id in engineer_ids {
        storage.get_user(engineer_id)?;
        if !unique.insert(engineer_id) {
            return Err(Error::InvalidInput(format!(
                "Engineer {} listed more than once",
                engineer_id
            )));
        }
    }

    let call = CallLog::new(
        generate_id("rc", &format!("{}:{}", site_id, issue)),
        site_id.to_string(),
        issue.to_string(),
        engineer_ids.to_vec(),
    );
    storage.create_call_log(&call)?;
    Ok(CallCreateResult { call })
}

/// Result of `call accept`.
#[derive(Debug, Serialize)]
pub struct CallAcceptResult {
    pub call: CallLog,
    /// Whether this acceptance performed the Pending -> InProgress transition
    pub first_acceptance: bool,
}

impl Output for CallAcceptResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.first_acceptance {
            format!("Accepted call {} (work started)", self.call.id)
        } else {
            format!("Accepted call {}", self.call.id)
        }
    }
}

/// Accept a call log.
///
/// Only the first acceptance transitions the call to InProgress and stamps
/// the start timeline; later acceptances just join `accepted_by`. On an
/// escalated call, the first acceptance by an engineer added after the
/// escalation stamps the escalated leg instead.
pub fn call_accept(
    data_dir: &Path,
    call_id: &str,
    acting_user_id: &str,
    lat: Option<f64>,
    lon: Option<f64>,
) -> Result<CallAcceptResult> {
    let mut storage = Storage::open(data_dir)?;
    let mut call = storage.get_call_log(call_id)?;
    let actor = storage.get_user(acting_user_id)?;

    if !call.engineer_ids.iter().any(|e| e == &actor.id) {
        return Err(Error::NotTeamMember(format!(
            "{} is not assigned to call {}",
            actor.id, call.id
        )));
    }

    if call.status == CallStatus::Resolved {
        return Err(Error::InvalidState(format!(
            "Call {} is already resolved",
            call.id
        )));
    }

    // Re-acceptance is a no-op, not an error
    if call.accepted_by.iter().any(|e| e == &actor.id) {
        return Ok(CallAcceptResult {
            call,
            first_acceptance: false,
        });
    }

    let location = location_from(lat, lon, &actor.id)?;
    let first_acceptance = call.status == CallStatus::Pending;

    if first_acceptance {
        call.status = CallStatus::InProgress;
        call.job_start_time = Some(Utc::now());
        call.started_by = Some(actor.id.clone());
        call.start_location = Some(location);
    } else if call.is_escalated
        && call.escalated_job_start_time.is_none()
        && added_after_escalation(&call, &actor.id)
    {
        // The fresh engineer opens the escalated leg; the original
        // timeline stays untouched.
        call.escalated_job_start_time = Some(Utc::now());
        call.escalated_started_by = Some(actor.id.clone());
        call.escalated_start_location = Some(location);
    }

    call.accepted_by.push(actor.id.clone());
    storage.update_call_log(&call)?;

    Ok(CallAcceptResult {
        call,
        first_acceptance,
    })
}

/// Whether `engineer_id` was appended after the escalation snapshot.
fn added_after_escalation(call: &CallLog, engineer_id: &str) -> bool {
    let Some(snapshot) = call.engineers_at_escalation else {
        return false;
    };
    call.engineer_ids
        .iter()
        .skip(snapshot)
        .any(|e| e == engineer_id)
}

/// Result of `call escalate`.
#[derive(Debug, Serialize)]
pub struct CallEscalateResult {
    pub call: CallView,
}

impl Output for CallEscalateResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!(
            "Escalated call {} ({} engineer(s) at escalation); awaiting reassignment",
            self.call.call.id,
            self.call.call.engineers_at_escalation.unwrap_or(0)
        )
    }
}

/// Escalate an in-progress call.
///
/// Snapshots the current assignee count; the call needs reassignment until
/// a fresh engineer is appended.
pub fn call_escalate(
    data_dir: &Path,
    call_id: &str,
    acting_user_id: &str,
) -> Result<CallEscalateResult> {
    let mut storage = Storage::open(data_dir)?;
    let mut call = storage.get_call_log(call_id)?;
    let actor = storage.get_user(acting_user_id)?;

    if call.status != CallStatus::InProgress {
        return Err(Error::InvalidState(format!(
            "Call {} is {}; only in-progress calls can be escalated",
            call.id, call.status
        )));
    }

    if !actor.is_admin && !call.accepted_by.iter().any(|e| e == &actor.id) {
        return Err(Error::NotJobOwner(format!(
            "Only an engineer who accepted call {} or a coordinator may escalate it",
            call.id
        )));
    }

    call.status = CallStatus::Escalated;
    call.is_escalated = true;
    call.engineers_at_escalation = Some(call.engineer_ids.len());
    storage.update_call_log(&call)?;

    Ok(CallEscalateResult {
        call: CallView::new(call),
    })
}

/// Result of `call reassign`.
#[derive(Debug, Serialize)]
pub struct CallReassignResult {
    pub call: CallView,
}

impl Output for CallReassignResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!(
            "Reassigned call {}: added {}",
            self.call.call.id,
            self.call
                .call
                .engineer_ids
                .last()
                .map(String::as_str)
                .unwrap_or("?")
        )
    }
}

/// Append a fresh engineer to an escalated call.
pub fn call_reassign(
    data_dir: &Path,
    call_id: &str,
    new_engineer_id: &str,
    acting_user_id: &str,
) -> Result<CallReassignResult> {
    let mut storage = Storage::open(data_dir)?;
    let mut call = storage.get_call_log(call_id)?;
    let actor = storage.get_user(acting_user_id)?;
    require_admin(&actor)?;

    if !call.is_escalated {
        return Err(Error::InvalidState(format!(
            "Call {} has not been escalated",
            call.id
        )));
    }
    if call.status == CallStatus::Resolved {
        return Err(Error::InvalidState(format!(
            "Call {} is already resolved",
            call.id
        )));
    }

    storage.get_user(new_engineer_id)?;
    if call.engineer_ids.iter().any(|e| e == new_engineer_id) {
        return Err(Error::AlreadyAssigned(format!(
            "{} is already assigned to call {}",
            new_engineer_id, call.id
        )));
    }

    call.engineer_ids.push(new_engineer_id.to_string());
    storage.update_call_log(&call)?;

    Ok(CallReassignResult {
        call: CallView::new(call),
    })
}

/// Result of `call resolve`.
#[derive(Debug, Serialize)]
pub struct CallResolveResult {
    pub call: CallLog,
}

impl Output for CallResolveResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!(
            "Resolved call {} (completed by {})",
            self.call.id,
            self.call.completed_by.as_deref().unwrap_or("?")
        )
    }
}

/// Resolve a call log.
///
/// Mirrors the finish rule: only an engineer who personally accepted the
/// call may resolve it.
pub fn call_resolve(
    data_dir: &Path,
    call_id: &str,
    acting_user_id: &str,
    lat: Option<f64>,
    lon: Option<f64>,
    notes: Option<String>,
) -> Result<CallResolveResult> {
    let mut storage = Storage::open(data_dir)?;
    let mut call = storage.get_call_log(call_id)?;
    let actor = storage.get_user(acting_user_id)?;

    if call.status != CallStatus::InProgress && call.status != CallStatus::Escalated {
        return Err(Error::InvalidState(format!(
            "Call {} is {}; only in-progress or escalated calls can be resolved",
            call.id, call.status
        )));
    }

    if !call.accepted_by.iter().any(|e| e == &actor.id) {
        return Err(Error::NotJobOwner(format!(
            "{} has not accepted call {}",
            actor.id, call.id
        )));
    }

    let location = location_from(lat, lon, &actor.id)?;

    call.status = CallStatus::Resolved;
    call.job_end_time = Some(Utc::now());
    call.completed_by = Some(actor.id.clone());
    call.end_location = Some(location);
    call.completion_notes = notes;
    storage.update_call_log(&call)?;

    Ok(CallResolveResult { call })
}

/// Result of `call view`.
#[derive(Debug, Serialize)]
pub struct CallViewResult {
    pub call_id: String,
    pub viewed_by: Vec<String>,
}

impl Output for CallViewResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!("Marked call {} as viewed", self.call_id)
    }
}

/// Record that an assigned engineer has viewed the call (idempotent).
pub fn call_view(data_dir: &Path, call_id: &str, acting_user_id: &str) -> Result<CallViewResult> {
    let mut storage = Storage::open(data_dir)?;
    let mut call = storage.get_call_log(call_id)?;
    let actor = storage.get_user(acting_user_id)?;

    if !call.engineer_ids.iter().any(|e| e == &actor.id) {
        return Err(Error::NotTeamMember(format!(
            "{} is not assigned to call {}",
            actor.id, call.id
        )));
    }

    if !call.viewed_by.iter().any(|e| e == &actor.id) {
        call.viewed_by.push(actor.id.clone());
        storage.update_call_log(&call)?;
    }

    Ok(CallViewResult {
        call_id: call.id,
        viewed_by: call.viewed_by,
    })
}

/// Result of `call list`.
#[derive(Debug, Serialize)]
pub struct CallListResult {
    pub count: usize,
    pub calls: Vec<CallView>,
}

impl Output for CallListResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.calls.is_empty() {
            return "No call logs".to_string();
        }
        self.calls
            .iter()
            .map(|v| {
                format!(
                    "{}  {}  site={}  engineers={}{}",
                    v.call.id,
                    v.call.status,
                    v.call.site_id,
                    v.call.engineer_ids.join(","),
                    if v.needs_reassignment {
                        "  [needs reassignment]"
                    } else {
                        ""
                    }
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// List call logs, optionally only those needing reassignment.
pub fn call_list(
    data_dir: &Path,
    status: Option<CallStatus>,
    needs_reassignment: bool,
) -> Result<CallListResult> {
    let storage = Storage::open(data_dir)?;
    let calls: Vec<CallView> = storage
        .list_call_logs(status)?
        .into_iter()
        .map(CallView::new)
        .filter(|v| !needs_reassignment || v.needs_reassignment)
        .collect();

    Ok(CallListResult {
        count: calls.len(),
        calls,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::admin::{site_add, user_add};
    use crate::test_utils::TestEnv;

    struct Fixture {
        env: TestEnv,
        coordinator: String,
        e1: String,
        e2: String,
        call_id: String,
    }

    /// A pending call assigned to two engineers.
    fn fixture() -> Fixture {
        let env = TestEnv::new();
        env.init_storage();
        let coordinator = user_add(env.path(), "Coordinator", "coord@example.com", true)
            .unwrap()
            .user
            .id;
        let e1 = user_add(env.path(), "E1", "e1@example.com", false)
            .unwrap()
            .user
            .id;
        let e2 = user_add(env.path(), "E2", "e2@example.com", false)
            .unwrap()
            .user
            .id;
        let site = site_add(env.path(), "Plant A", "Acme").unwrap().site.id;
        let call_id = call_create(
            env.path(),
            &site,
            "Compressor down",
            &[e1.clone(), e2.clone()],
            &coordinator,
        )
        .unwrap()
        .call
        .id;
        Fixture {
            env,
            coordinator,
            e1,
            e2,
            call_id,
        }
    }

    #[test]
    fn test_create_requires_admin_and_engineers() {
        let f = fixture();
        let site = site_add(f.env.path(), "Plant B", "Acme").unwrap().site.id;

        assert!(matches!(
            call_create(f.env.path(), &site, "Leak", &[f.e1.clone()], &f.e1),
            Err(crate::Error::NotCoordinator(_))
        ));
        assert!(matches!(
            call_create(f.env.path(), &site, "Leak", &[], &f.coordinator),
            Err(crate::Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_first_acceptance_starts_the_call() {
        // Scenario: E2 accepts first, then E1; only the first acceptance
        // stamps the timeline.
        let f = fixture();

        let first = call_accept(f.env.path(), &f.call_id, &f.e2, Some(51.5), Some(-0.1)).unwrap();
        assert!(first.first_acceptance);
        assert_eq!(first.call.status, CallStatus::InProgress);
        assert_eq!(first.call.started_by.as_deref(), Some(f.e2.as_str()));
        let start_time = first.call.job_start_time.unwrap();
        assert_eq!(first.call.accepted_by, vec![f.e2.clone()]);

        let second = call_accept(f.env.path(), &f.call_id, &f.e1, Some(51.5), Some(-0.1)).unwrap();
        assert!(!second.first_acceptance);
        assert_eq!(second.call.status, CallStatus::InProgress);
        assert_eq!(second.call.job_start_time.unwrap(), start_time);
        assert_eq!(second.call.accepted_by, vec![f.e2.clone(), f.e1.clone()]);
    }

    #[test]
    fn test_accept_rejects_unlisted_engineer() {
        let f = fixture();
        let outsider = user_add(f.env.path(), "Outsider", "out@example.com", false)
            .unwrap()
            .user
            .id;
        let result = call_accept(f.env.path(), &f.call_id, &outsider, Some(0.0), Some(0.0));
        assert!(matches!(result, Err(crate::Error::NotTeamMember(_))));
    }

    #[test]
    fn test_repeat_acceptance_is_noop() {
        let f = fixture();
        call_accept(f.env.path(), &f.call_id, &f.e1, Some(0.0), Some(0.0)).unwrap();
        let again = call_accept(f.env.path(), &f.call_id, &f.e1, Some(0.0), Some(0.0)).unwrap();
        assert!(!again.first_acceptance);
        assert_eq!(again.call.accepted_by, vec![f.e1.clone()]);
    }

    #[test]
    fn test_escalation_and_reassignment_flow() {
        let f = fixture();
        call_accept(f.env.path(), &f.call_id, &f.e1, Some(0.0), Some(0.0)).unwrap();

        let escalated = call_escalate(f.env.path(), &f.call_id, &f.e1).unwrap();
        assert_eq!(escalated.call.call.status, CallStatus::Escalated);
        assert!(escalated.call.call.is_escalated);
        assert_eq!(escalated.call.call.engineers_at_escalation, Some(2));
        assert!(escalated.call.needs_reassignment);

        // A fresh engineer clears the derived flag
        let e3 = user_add(f.env.path(), "E3", "e3@example.com", false)
            .unwrap()
            .user
            .id;
        let reassigned =
            call_reassign(f.env.path(), &f.call_id, &e3, &f.coordinator).unwrap();
        assert!(!reassigned.call.needs_reassignment);
        assert_eq!(reassigned.call.call.engineer_ids.len(), 3);

        // The fresh engineer's acceptance opens the escalated leg and
        // leaves the original timeline alone
        let original_start = reassigned.call.call.job_start_time.unwrap();
        let accepted = call_accept(f.env.path(), &f.call_id, &e3, Some(48.8), Some(2.3)).unwrap();
        assert!(!accepted.first_acceptance);
        assert_eq!(accepted.call.job_start_time.unwrap(), original_start);
        assert!(accepted.call.escalated_job_start_time.is_some());
        assert_eq!(
            accepted.call.escalated_started_by.as_deref(),
            Some(e3.as_str())
        );
        assert_eq!(
            accepted.call.escalated_start_location.as_ref().unwrap().captured_by,
            e3
        );
    }

    #[test]
    fn test_escalate_guards() {
        let f = fixture();

        // Pending calls cannot be escalated
        assert!(matches!(
            call_escalate(f.env.path(), &f.call_id, &f.coordinator),
            Err(crate::Error::InvalidState(_))
        ));

        call_accept(f.env.path(), &f.call_id, &f.e1, Some(0.0), Some(0.0)).unwrap();

        // An assignee who has not accepted cannot escalate
        assert!(matches!(
            call_escalate(f.env.path(), &f.call_id, &f.e2),
            Err(crate::Error::NotJobOwner(_))
        ));

        call_escalate(f.env.path(), &f.call_id, &f.e1).unwrap();

        // Double escalation is a guarded failure
        assert!(matches!(
            call_escalate(f.env.path(), &f.call_id, &f.e1),
            Err(crate::Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_reassign_guards() {
        let f = fixture();
        let e3 = user_add(f.env.path(), "E3", "e3@example.com", false)
            .unwrap()
            .user
            .id;

        // Only escalated calls can be reassigned
        assert!(matches!(
            call_reassign(f.env.path(), &f.call_id, &e3, &f.coordinator),
            Err(crate::Error::InvalidState(_))
        ));

        call_accept(f.env.path(), &f.call_id, &f.e1, Some(0.0), Some(0.0)).unwrap();
        call_escalate(f.env.path(), &f.call_id, &f.e1).unwrap();

        // An already-listed engineer is not a fresh engineer
        assert!(matches!(
            call_reassign(f.env.path(), &f.call_id, &f.e2, &f.coordinator),
            Err(crate::Error::AlreadyAssigned(_))
        ));
    }

    #[test]
    fn test_resolve_requires_acceptance() {
        let f = fixture();
        call_accept(f.env.path(), &f.call_id, &f.e1, Some(0.0), Some(0.0)).unwrap();

        let denied = call_resolve(f.env.path(), &f.call_id, &f.e2, Some(0.0), Some(0.0), None);
        assert!(matches!(denied, Err(crate::Error::NotJobOwner(_))));

        let resolved = call_resolve(
            f.env.path(),
            &f.call_id,
            &f.e1,
            Some(0.0),
            Some(0.0),
            Some("Replaced fuse".to_string()),
        )
        .unwrap();
        assert_eq!(resolved.call.status, CallStatus::Resolved);
        assert_eq!(resolved.call.completed_by.as_deref(), Some(f.e1.as_str()));

        // Terminal: no further acceptance or resolution
        assert!(matches!(
            call_accept(f.env.path(), &f.call_id, &f.e2, Some(0.0), Some(0.0)),
            Err(crate::Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_view_is_idempotent_and_guarded() {
        let f = fixture();
        let outsider = user_add(f.env.path(), "Outsider", "out@example.com", false)
            .unwrap()
            .user
            .id;

        assert!(matches!(
            call_view(f.env.path(), &f.call_id, &outsider),
            Err(crate::Error::NotTeamMember(_))
        ));

        call_view(f.env.path(), &f.call_id, &f.e1).unwrap();
        let again = call_view(f.env.path(), &f.call_id, &f.e1).unwrap();
        assert_eq!(again.viewed_by, vec![f.e1.clone()]);
    }

    #[test]
    fn test_list_filters_needs_reassignment() {
        let f = fixture();
        call_accept(f.env.path(), &f.call_id, &f.e1, Some(0.0), Some(0.0)).unwrap();
        call_escalate(f.env.path(), &f.call_id, &f.e1).unwrap();

        let all = call_list(f.env.path(), None, false).unwrap();
        assert_eq!(all.count, 1);

        let needing = call_list(f.env.path(), None, true).unwrap();
        assert_eq!(needing.count, 1);

        let e3 = user_add(f.env.path(), "E3", "e3@example.com", false)
            .unwrap()
            .user
            .id;
        call_reassign(f.env.path(), &f.call_id, &e3, &f.coordinator).unwrap();

        let needing = call_list(f.env.path(), None, true).unwrap();
        assert_eq!(needing.count, 0);
    }
}
