//! Notification aggregation.
//!
//! Notifications are derived on read; nothing is stored or marked
//! delivered. Each call recomputes the user's outstanding work from the
//! current dataset, so team changes and call reassignments show up
//! immediately.

use super::{json, Output};
use crate::models::{team, CallLog, JobStatus, ServiceLog};
use crate::storage::Storage;
use crate::Result;
use serde::Serialize;
use std::path::Path;

/// Result of `notifications`.
#[derive(Debug, Serialize)]
pub struct NotificationsResult {
    pub user_id: String,
    pub total: usize,
    /// Pending service logs in the active period for the user's team.
    pub pending_jobs: Vec<ServiceLog>,
    /// Call logs assigned to the user that the user has not yet viewed.
    pub unviewed_calls: Vec<CallLog>,
    /// Escalated calls awaiting a fresh engineer (coordinators only).
    pub awaiting_reassignment: Vec<CallLog>,
}

impl Output for NotificationsResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.total == 0 {
            return "No notifications".to_string();
        }
        let mut lines = vec![format!("{} notification(s)", self.total)];
        for job in &self.pending_jobs {
            lines.push(format!(
                "  job {}  site={}  engineer={}  pending",
                job.id, job.site_id, job.engineer_id
            ));
        }
        for call in &self.unviewed_calls {
            lines.push(format!(
                "  call {}  site={}  unviewed: {}",
                call.id, call.site_id, call.issue
            ));
        }
        for call in &self.awaiting_reassignment {
            lines.push(format!(
                "  call {}  site={}  awaiting reassignment",
                call.id, call.site_id
            ));
        }
        lines.join("\n")
    }
}

/// Aggregate a user's outstanding work.
pub fn notifications(data_dir: &Path, user_id: &str) -> Result<NotificationsResult> {
    let storage = Storage::open(data_dir)?;
    let user = storage.get_user(user_id)?;
    let users = storage.list_users()?;
    let team = team::team_of(&users, &user.id);

    // Pending planned work is visible team-wide, same as `job list`
    let mut pending_jobs = Vec::new();
    if let Some(period) = storage.active_period()? {
        for member in &team.members {
            pending_jobs.extend(storage.list_service_logs(
                Some(&period.id),
                Some(member),
                Some(JobStatus::Pending),
            )?);
        }
        pending_jobs.sort_by(|a, b| a.id.cmp(&b.id));
    }

    let unviewed_calls: Vec<CallLog> = storage
        .call_logs_for_engineer(&user.id)?
        .into_iter()
        .filter(|c| !c.viewed_by.iter().any(|v| v == &user.id))
        .collect();

    let awaiting_reassignment: Vec<CallLog> = if user.is_admin {
        storage
            .list_call_logs(None)?
            .into_iter()
            .filter(CallLog::needs_reassignment)
            .collect()
    } else {
        Vec::new()
    };

    let total = pending_jobs.len() + unviewed_calls.len() + awaiting_reassignment.len();
    Ok(NotificationsResult {
        user_id: user.id,
        total,
        pending_jobs,
        unviewed_calls,
        awaiting_reassignment,
    })
}
