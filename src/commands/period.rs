//! Service period activation and deactivation.
//!
//! Activation snapshots the current engineer-to-site assignments into a
//! batch of pending service logs owned by the new period; later assignment
//! changes never retroactively touch the batch. Deactivation is two-phase:
//! with in-flight work it returns a needs-confirmation result instead of
//! mutating, and a second call with `force` closes the period.

use super::{json, require_admin, Output};
use crate::models::{JobStatus, ServiceLog, ServicePeriod};
use crate::storage::{generate_id, Storage};
use crate::{Error, Result};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;

/// Result of `period activate`.
#[derive(Debug, Serialize)]
pub struct ActivateResult {
    pub period: ServicePeriod,
    pub logs_created: u64,
}

impl Output for ActivateResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!(
            "Activated period {} ({}): {} service logs created",
            self.period.id, self.period.name, self.logs_created
        )
    }
}

/// Activate a new service period.
///
/// Fails with `AlreadyActive` if a period is active and `NoAssignments` if
/// no engineer currently has a site. On success every (engineer, site)
/// assignment pair becomes one pending service log bound to the new period,
/// and `logs_created` records the exact count produced in this pass.
pub fn period_activate(data_dir: &Path, name: &str, acting_user_id: &str) -> Result<ActivateResult> {
    if name.trim().is_empty() {
        return Err(Error::InvalidInput(
            "Period name must not be empty".to_string(),
        ));
    }

    let mut storage = Storage::open(data_dir)?;
    let actor = storage.get_user(acting_user_id)?;
    require_admin(&actor)?;

    if let Some(active) = storage.active_period()? {
        return Err(Error::AlreadyActive(active.name));
    }

    let pairs = storage.assignment_pairs()?;
    if pairs.is_empty() {
        return Err(Error::NoAssignments);
    }

    let mut period = ServicePeriod::new(
        generate_id("rp", name),
        name.to_string(),
        actor.id.clone(),
    );

    // Fan out one log per assignment pair; IDs must be unique within the batch.
    let mut used_ids: HashSet<String> = HashSet::new();
    let mut logs = Vec::with_capacity(pairs.len());
    for (user_id, site_id) in &pairs {
        let seed = format!("{}:{}:{}", period.id, user_id, site_id);
        let mut id = generate_id("rj", &seed);
        let mut nonce = 0u32;
        while !used_ids.insert(id.clone()) {
            nonce += 1;
            id = generate_id("rj", &format!("{}:{}", seed, nonce));
        }
        logs.push(ServiceLog::new(
            id,
            user_id.clone(),
            site_id.clone(),
            period.id.clone(),
        ));
    }

    period.logs_created = logs.len() as u64;
    storage.activate_period(&period, &logs)?;

    Ok(ActivateResult {
        logs_created: period.logs_created,
        period,
    })
}

/// Result of `period deactivate`.
#[derive(Debug, Serialize)]
pub struct DeactivateResult {
    pub deactivated: bool,
    /// In-progress count when confirmation is required; the caller retries
    /// with `force` to proceed. This is a valid result, not an error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub needs_confirmation: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<ServicePeriod>,
    pub message: String,
}

impl Output for DeactivateResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        self.message.clone()
    }
}

/// Deactivate the active service period.
///
/// In-flight service logs are left untouched; they simply stop being
/// reachable from the per-engineer task view once the period closes.
pub fn period_deactivate(data_dir: &Path, force: bool, acting_user_id: &str) -> Result<DeactivateResult> {
    let mut storage = Storage::open(data_dir)?;
    let actor = storage.get_user(acting_user_id)?;
    require_admin(&actor)?;

    let Some(mut period) = storage.active_period()? else {
        return Ok(DeactivateResult {
            deactivated: false,
            needs_confirmation: None,
            period: None,
            message: "No service period is active".to_string(),
        });
    };

    let in_progress = storage.count_in_progress(&period.id)?;
    if in_progress > 0 && !force {
        return Ok(DeactivateResult {
            deactivated: false,
            needs_confirmation: Some(in_progress),
            period: Some(period),
            message: format!(
                "{} job(s) still in progress; rerun with --force to deactivate anyway",
                in_progress
            ),
        });
    }

    period.is_active = false;
    period.end_time = Some(Utc::now());
    storage.close_period(&period)?;

    Ok(DeactivateResult {
        deactivated: true,
        needs_confirmation: None,
        message: format!("Deactivated period {} ({})", period.id, period.name),
        period: Some(period),
    })
}

/// Result of `period status`.
#[derive(Debug, Serialize)]
pub struct PeriodStatusResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<ServicePeriod>,
    pub pending: u64,
    pub in_progress: u64,
    pub finished: u64,
}

impl Output for PeriodStatusResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        match &self.active {
            Some(period) => format!(
                "Active period: {} ({})\nPending: {}, In progress: {}, Finished: {}",
                period.name, period.id, self.pending, self.in_progress, self.finished
            ),
            None => "No service period is active".to_string(),
        }
    }
}

/// Report the active period and its job counts.
pub fn period_status(data_dir: &Path) -> Result<PeriodStatusResult> {
    let storage = Storage::open(data_dir)?;

    let Some(period) = storage.active_period()? else {
        return Ok(PeriodStatusResult {
            active: None,
            pending: 0,
            in_progress: 0,
            finished: 0,
        });
    };

    Ok(PeriodStatusResult {
        pending: storage.count_by_status(&period.id, JobStatus::Pending)?,
        in_progress: storage.count_by_status(&period.id, JobStatus::InProgress)?,
        finished: storage.count_by_status(&period.id, JobStatus::Finished)?,
        active: Some(period),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::admin::{assign, site_add, user_add};
    use crate::test_utils::TestEnv;

    fn setup() -> (TestEnv, String) {
        let env = TestEnv::new();
        env.init_storage();
        let coordinator = user_add(env.path(), "Coordinator", "coord@example.com", true)
            .unwrap()
            .user
            .id;
        (env, coordinator)
    }

    fn engineer(env: &TestEnv, n: u32) -> String {
        user_add(
            env.path(),
            &format!("Engineer {}", n),
            &format!("e{}@example.com", n),
            false,
        )
        .unwrap()
        .user
        .id
    }

    fn site(env: &TestEnv, n: u32) -> String {
        site_add(env.path(), &format!("Plant {}", n), "Acme")
            .unwrap()
            .site
            .id
    }

    #[test]
    fn test_activate_fans_out_one_log_per_pair() {
        let (env, coordinator) = setup();
        let e1 = engineer(&env, 1);
        let e2 = engineer(&env, 2);
        let s1 = site(&env, 1);
        let s2 = site(&env, 2);
        assign(env.path(), &e1, &s1, &coordinator).unwrap();
        assign(env.path(), &e1, &s2, &coordinator).unwrap();
        assign(env.path(), &e2, &s1, &coordinator).unwrap();

        let result = period_activate(env.path(), "Q1", &coordinator).unwrap();
        assert_eq!(result.logs_created, 3);
        assert_eq!(result.period.logs_created, 3);
        assert!(result.period.is_active);

        let storage = env.open_storage();
        let logs = storage
            .list_service_logs(Some(&result.period.id), None, None)
            .unwrap();
        assert_eq!(logs.len(), 3);
        assert!(logs.iter().all(|l| l.status == JobStatus::Pending));
    }

    #[test]
    fn test_activate_snapshot_ignores_later_assignments() {
        let (env, coordinator) = setup();
        let e1 = engineer(&env, 1);
        let s1 = site(&env, 1);
        let s2 = site(&env, 2);
        assign(env.path(), &e1, &s1, &coordinator).unwrap();

        let result = period_activate(env.path(), "Q1", &coordinator).unwrap();
        assert_eq!(result.logs_created, 1);

        // Assignments made after activation do not grow the batch
        assign(env.path(), &e1, &s2, &coordinator).unwrap();
        let storage = env.open_storage();
        let logs = storage
            .list_service_logs(Some(&result.period.id), None, None)
            .unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(
            storage.get_period(&result.period.id).unwrap().logs_created,
            1
        );
    }

    #[test]
    fn test_activate_fails_when_already_active() {
        let (env, coordinator) = setup();
        let e1 = engineer(&env, 1);
        let s1 = site(&env, 1);
        assign(env.path(), &e1, &s1, &coordinator).unwrap();

        period_activate(env.path(), "Q1", &coordinator).unwrap();
        let before = env
            .open_storage()
            .list_service_logs(None, None, None)
            .unwrap()
            .len();

        let result = period_activate(env.path(), "Q2", &coordinator);
        assert!(matches!(result, Err(crate::Error::AlreadyActive(_))));

        // Zero new records
        let after = env
            .open_storage()
            .list_service_logs(None, None, None)
            .unwrap()
            .len();
        assert_eq!(before, after);
    }

    #[test]
    fn test_activate_fails_without_assignments() {
        let (env, coordinator) = setup();
        let result = period_activate(env.path(), "Q1", &coordinator);
        assert!(matches!(result, Err(crate::Error::NoAssignments)));
    }

    #[test]
    fn test_activate_requires_admin() {
        let (env, coordinator) = setup();
        let e1 = engineer(&env, 1);
        let s1 = site(&env, 1);
        assign(env.path(), &e1, &s1, &coordinator).unwrap();

        let result = period_activate(env.path(), "Q1", &e1);
        assert!(matches!(result, Err(crate::Error::NotCoordinator(_))));
    }

    #[test]
    fn test_deactivate_without_active_period_is_noop() {
        let (env, coordinator) = setup();
        let result = period_deactivate(env.path(), false, &coordinator).unwrap();
        assert!(!result.deactivated);
        assert!(result.needs_confirmation.is_none());
    }

    #[test]
    fn test_deactivate_clean_period() {
        let (env, coordinator) = setup();
        let e1 = engineer(&env, 1);
        let s1 = site(&env, 1);
        assign(env.path(), &e1, &s1, &coordinator).unwrap();
        period_activate(env.path(), "Q1", &coordinator).unwrap();

        let result = period_deactivate(env.path(), false, &coordinator).unwrap();
        assert!(result.deactivated);

        let storage = env.open_storage();
        assert!(storage.active_period().unwrap().is_none());
        let period = result.period.unwrap();
        let stored = storage.get_period(&period.id).unwrap();
        assert!(!stored.is_active);
        assert!(stored.end_time.is_some());
    }

    #[test]
    fn test_deactivate_with_in_flight_needs_confirmation() {
        let (env, coordinator) = setup();
        let e1 = engineer(&env, 1);
        let s1 = site(&env, 1);
        assign(env.path(), &e1, &s1, &coordinator).unwrap();
        let activated = period_activate(env.path(), "Q1", &coordinator).unwrap();

        let storage = env.open_storage();
        let job = &storage
            .list_service_logs(Some(&activated.period.id), None, None)
            .unwrap()[0];
        crate::commands::job::start_job(env.path(), &job.id, &e1, Some(51.5), Some(-0.1)).unwrap();

        let result = period_deactivate(env.path(), false, &coordinator).unwrap();
        assert!(!result.deactivated);
        assert_eq!(result.needs_confirmation, Some(1));

        // No mutation happened
        let storage = env.open_storage();
        assert!(storage.active_period().unwrap().is_some());
        assert_eq!(
            storage.get_service_log(&job.id).unwrap().status,
            JobStatus::InProgress
        );

        // Forced deactivation leaves the in-flight log as-is
        let forced = period_deactivate(env.path(), true, &coordinator).unwrap();
        assert!(forced.deactivated);
        let storage = env.open_storage();
        assert!(storage.active_period().unwrap().is_none());
        assert_eq!(
            storage.get_service_log(&job.id).unwrap().status,
            JobStatus::InProgress
        );
    }

    #[test]
    fn test_period_status_counts() {
        let (env, coordinator) = setup();
        let e1 = engineer(&env, 1);
        let s1 = site(&env, 1);
        let s2 = site(&env, 2);
        assign(env.path(), &e1, &s1, &coordinator).unwrap();
        assign(env.path(), &e1, &s2, &coordinator).unwrap();
        let activated = period_activate(env.path(), "Q1", &coordinator).unwrap();

        let storage = env.open_storage();
        let job = &storage
            .list_service_logs(Some(&activated.period.id), None, None)
            .unwrap()[0];
        crate::commands::job::start_job(env.path(), &job.id, &e1, Some(51.5), Some(-0.1)).unwrap();

        let status = period_status(env.path()).unwrap();
        assert!(status.active.is_some());
        assert_eq!(status.pending, 1);
        assert_eq!(status.in_progress, 1);
        assert_eq!(status.finished, 0);
    }
}
