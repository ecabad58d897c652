//! The service-log state machine: start, finish, and coordinator override.
//!
//! Transitions are Pending -> InProgress -> Finished, with a privileged
//! Pending -> Finished override. Start is gated by team membership and the
//! single-active-job rule; finish is owner-only - team membership never
//! grants finish rights. Every transition either applies all of its effect
//! fields or none of them.

use super::{json, location_from, require_admin, Output};
use crate::models::team;
use crate::models::{CompletionMethod, JobStatus, ServiceLog};
use crate::storage::Storage;
use crate::{Error, Result};
use chrono::Utc;
use serde::Serialize;
use std::path::Path;

/// Result of `job list`.
#[derive(Debug, Serialize)]
pub struct MyJobsResult {
    pub user_id: String,
    pub team_leader: String,
    pub team_members: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period_id: Option<String>,
    pub count: usize,
    pub jobs: Vec<ServiceLog>,
}

impl Output for MyJobsResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let Some(period) = &self.period_id else {
            return "No service period is active".to_string();
        };
        if self.jobs.is_empty() {
            return format!("No jobs for team of {} in period {}", self.user_id, period);
        }
        self.jobs
            .iter()
            .map(|j| {
                format!(
                    "{}  {}  engineer={}  site={}",
                    j.id, j.status, j.engineer_id, j.site_id
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// List the active-period jobs for every member of the caller's team.
///
/// The team is resolved fresh on every call; tagging changes show up
/// immediately.
pub fn my_jobs(data_dir: &Path, user_id: &str) -> Result<MyJobsResult> {
    let storage = Storage::open(data_dir)?;
    storage.get_user(user_id)?;
    let users = storage.list_users()?;
    let resolved = team::team_of(&users, user_id);

    let Some(period) = storage.active_period()? else {
        return Ok(MyJobsResult {
            user_id: user_id.to_string(),
            team_leader: resolved.leader,
            team_members: resolved.members,
            period_id: None,
            count: 0,
            jobs: Vec::new(),
        });
    };

    let mut jobs = Vec::new();
    for member in &resolved.members {
        jobs.extend(storage.list_service_logs(Some(&period.id), Some(member), None)?);
    }
    jobs.sort_by(|a, b| a.id.cmp(&b.id));

    Ok(MyJobsResult {
        user_id: user_id.to_string(),
        team_leader: resolved.leader,
        team_members: resolved.members,
        period_id: Some(period.id),
        count: jobs.len(),
        jobs,
    })
}

/// Result of `job start`.
#[derive(Debug, Serialize)]
pub struct StartResult {
    pub job: ServiceLog,
}

impl Output for StartResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!(
            "Started job {} at site {} (started by {})",
            self.job.id,
            self.job.site_id,
            self.job.started_by.as_deref().unwrap_or("?")
        )
    }
}

/// Start a pending service log.
///
/// The assignee field never changes; `started_by` records who actually did
/// the work, and any member of the assignee's team may be that person.
pub fn start_job(
    data_dir: &Path,
    job_id: &str,
    acting_user_id: &str,
    lat: Option<f64>,
    lon: Option<f64>,
) -> Result<StartResult> {
    let mut storage = Storage::open(data_dir)?;
    let mut job = storage.get_service_log(job_id)?;
    let actor = storage.get_user(acting_user_id)?;

    if job.status != JobStatus::Pending {
        return Err(Error::InvalidState(format!(
            "Job {} is {}; only pending jobs can be started",
            job.id, job.status
        )));
    }

    // Team authorization: the actor must share a team with the assignee,
    // resolved against the relation as it stands right now.
    let users = storage.list_users()?;
    let assignee_team = team::team_of(&users, &job.engineer_id);
    if !assignee_team.contains(&actor.id) {
        return Err(Error::NotTeamMember(format!(
            "{} is not on the team of {}",
            actor.id, job.engineer_id
        )));
    }

    let Some(period) = storage.active_period()? else {
        return Err(Error::InvalidState(format!(
            "Period {} is not active; jobs can only be started in the active period",
            job.service_period_id
        )));
    };
    if period.id != job.service_period_id {
        return Err(Error::InvalidState(format!(
            "Job {} belongs to period {}, which is not the active period",
            job.id, job.service_period_id
        )));
    }

    // Single-active-job rule: one in-progress job per starter per period.
    // Fast-path check here; the authoritative guard re-runs inside the
    // storage transaction that applies the transition.
    if storage.count_in_progress_started_by(&period.id, &actor.id)? > 0 {
        return Err(Error::ConcurrentJobLimitExceeded(format!(
            "{} already has a job in progress in period {}",
            actor.id, period.name
        )));
    }

    let location = location_from(lat, lon, &actor.id)?;

    job.status = JobStatus::InProgress;
    job.job_start_time = Some(Utc::now());
    job.started_by = Some(actor.id.clone());
    job.start_location = Some(location);
    storage.start_service_log(&job, &period.name)?;

    Ok(StartResult { job })
}

/// Result of `job finish`.
#[derive(Debug, Serialize)]
pub struct FinishResult {
    pub job: ServiceLog,
}

impl Output for FinishResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!(
            "Finished job {} (completed by {})",
            self.job.id,
            self.job.completed_by.as_deref().unwrap_or("?")
        )
    }
}

/// Finish an in-progress service log.
///
/// Only the engineer who started the job may finish it - team membership
/// does not grant finish rights.
pub fn finish_job(
    data_dir: &Path,
    job_id: &str,
    acting_user_id: &str,
    lat: Option<f64>,
    lon: Option<f64>,
    notes: Option<String>,
) -> Result<FinishResult> {
    let mut storage = Storage::open(data_dir)?;
    let mut job = storage.get_service_log(job_id)?;
    let actor = storage.get_user(acting_user_id)?;

    if job.status != JobStatus::InProgress {
        return Err(Error::InvalidState(format!(
            "Job {} is {}; only in-progress jobs can be finished",
            job.id, job.status
        )));
    }

    if job.started_by.as_deref() != Some(actor.id.as_str()) {
        return Err(Error::NotJobOwner(format!(
            "Job {} was started by {}, not {}",
            job.id,
            job.started_by.as_deref().unwrap_or("?"),
            actor.id
        )));
    }

    let location = location_from(lat, lon, &actor.id)?;

    job.status = JobStatus::Finished;
    job.job_end_time = Some(Utc::now());
    job.completed_by = Some(actor.id.clone());
    job.end_location = Some(location);
    job.completion_method = Some(CompletionMethod::PlannedService);
    job.completion_notes = notes;
    storage.update_service_log(&job)?;

    Ok(FinishResult { job })
}

/// Result of `job force-finish`.
#[derive(Debug, Serialize)]
pub struct ForceFinishResult {
    pub job: ServiceLog,
}

impl Output for ForceFinishResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!(
            "Force-finished job {} (coordinator override by {})",
            self.job.id,
            self.job.completed_by.as_deref().unwrap_or("?")
        )
    }
}

/// Coordinator override: close a never-started job directly.
///
/// Notes are mandatory because there is no engineer-supplied start/finish
/// narrative to fall back on. No location is captured.
pub fn force_finish_job(
    data_dir: &Path,
    job_id: &str,
    coordinator_id: &str,
    notes: &str,
) -> Result<ForceFinishResult> {
    let mut storage = Storage::open(data_dir)?;
    let mut job = storage.get_service_log(job_id)?;
    let coordinator = storage.get_user(coordinator_id)?;
    require_admin(&coordinator)?;

    if job.status != JobStatus::Pending {
        return Err(Error::InvalidState(format!(
            "Job {} is {}; only pending jobs can be force-finished",
            job.id, job.status
        )));
    }

    if notes.trim().is_empty() {
        return Err(Error::InvalidInput(
            "Override notes are mandatory".to_string(),
        ));
    }

    job.status = JobStatus::Finished;
    job.completed_by = Some(coordinator.id.clone());
    job.completion_method = Some(CompletionMethod::CoordinatorOverride);
    job.completion_notes = Some(notes.to_string());
    storage.update_service_log(&job)?;

    Ok(ForceFinishResult { job })
}
