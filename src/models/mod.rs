//! Data models for rota entities.
//!
//! This module defines the core data structures:
//! - `User` - Engineers and coordinators, including the flat team-member relation
//! - `Site` - Client equipment locations
//! - `ServicePeriod` - A bounded window owning a batch of service logs
//! - `ServiceLog` - One unit of planned work at one site, for one engineer
//! - `CallLog` - An ad-hoc, multi-engineer support ticket with an escalation branch
//! - `LocationStamp` - A captured position attached to job start/finish

pub mod team;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Service log status in the job lifecycle.
///
/// The only legal transitions are Pending -> InProgress -> Finished, plus the
/// coordinator override Pending -> Finished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    InProgress,
    Finished,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in_progress",
            JobStatus::Finished => "finished",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "in_progress" | "in-progress" | "inprogress" => Ok(JobStatus::InProgress),
            "finished" => Ok(JobStatus::Finished),
            _ => Err(format!("Unknown job status: {}", s)),
        }
    }
}

/// Call log status.
///
/// Escalated is a branch off InProgress; Resolved is terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    #[default]
    Pending,
    InProgress,
    Resolved,
    Escalated,
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CallStatus::Pending => "pending",
            CallStatus::InProgress => "in_progress",
            CallStatus::Resolved => "resolved",
            CallStatus::Escalated => "escalated",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for CallStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CallStatus::Pending),
            "in_progress" | "in-progress" | "inprogress" => Ok(CallStatus::InProgress),
            "resolved" => Ok(CallStatus::Resolved),
            "escalated" => Ok(CallStatus::Escalated),
            _ => Err(format!("Unknown call status: {}", s)),
        }
    }
}

/// How a job reached its Finished state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionMethod {
    /// Normal start/finish flow on a planned service log
    PlannedService,
    /// Closed through call-log resolution.
    ///
    /// Reserved in the wire form: no command records it yet, pending
    /// call-driven closure of planned visits at the same site.
    CallLog,
    /// Privileged direct Pending -> Finished transition
    CoordinatorOverride,
}

impl fmt::Display for CompletionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompletionMethod::PlannedService => "planned_service",
            CompletionMethod::CallLog => "call_log",
            CompletionMethod::CoordinatorOverride => "coordinator_override",
        };
        write!(f, "{}", s)
    }
}

/// A position captured at job start or finish.
///
/// Produced by the client-side capture collaborator; treated here as an
/// opaque, already-validated value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationStamp {
    /// Latitude in decimal degrees
    pub lat: f64,

    /// Longitude in decimal degrees
    pub lon: f64,

    /// User whose device captured the position
    pub captured_by: String,

    /// Capture timestamp
    pub captured_at: DateTime<Utc>,
}

impl LocationStamp {
    /// Create a stamp for the given position, captured now by `user_id`.
    pub fn new(lat: f64, lon: f64, user_id: &str) -> Self {
        Self {
            lat,
            lon,
            captured_by: user_id.to_string(),
            captured_at: Utc::now(),
        }
    }
}

/// An engineer or coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier (e.g., "ru-a1b2")
    pub id: String,

    /// Entity type marker
    #[serde(rename = "type")]
    pub entity_type: String,

    /// Display name
    pub name: String,

    /// Contact email
    pub email: String,

    /// Coordinator/admin authority (period activation, call creation, overrides)
    #[serde(default)]
    pub is_admin: bool,

    /// Sites this engineer is assigned to
    #[serde(default)]
    pub assigned_site_ids: Vec<String>,

    /// Team members tagged by this user. Present only on a leader; a user
    /// tagged by nobody and tagging nobody is a one-person team.
    #[serde(default)]
    pub team_member_ids: Vec<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new user with the given ID, name, and email.
    pub fn new(id: String, name: String, email: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            entity_type: "user".to_string(),
            name,
            email,
            is_admin: false,
            assigned_site_ids: Vec::new(),
            team_member_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// A client equipment location.
///
/// Immutable once referenced by a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Site {
    /// Unique identifier (e.g., "rs-a1b2")
    pub id: String,

    /// Entity type marker
    #[serde(rename = "type")]
    pub entity_type: String,

    /// Display name
    pub name: String,

    /// Owning client's display name
    pub client: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Site {
    /// Create a new site with the given ID, name, and client.
    pub fn new(id: String, name: String, client: String) -> Self {
        Self {
            id,
            entity_type: "site".to_string(),
            name,
            client,
            created_at: Utc::now(),
        }
    }
}

/// A named, time-bounded service window.
///
/// At most one period is active at any time; the active pointer lives in the
/// storage config table and is flipped transactionally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicePeriod {
    /// Unique identifier (e.g., "rp-a1b2")
    pub id: String,

    /// Entity type marker
    #[serde(rename = "type")]
    pub entity_type: String,

    /// Display name (e.g., "2026-Q3")
    pub name: String,

    /// When the period was activated
    pub start_time: DateTime<Utc>,

    /// When the period was deactivated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,

    /// Whether this period is the active one
    pub is_active: bool,

    /// Admin who activated the period
    pub created_by: String,

    /// Number of service logs created at activation. Snapshot taken in the
    /// activation pass, never recomputed.
    pub logs_created: u64,
}

impl ServicePeriod {
    /// Create a new active period.
    pub fn new(id: String, name: String, created_by: String) -> Self {
        Self {
            id,
            entity_type: "service_period".to_string(),
            name,
            start_time: Utc::now(),
            end_time: None,
            is_active: true,
            created_by,
            logs_created: 0,
        }
    }
}

/// One unit of planned work at one site, for one engineer, within one period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceLog {
    /// Unique identifier (e.g., "rj-a1b2")
    pub id: String,

    /// Entity type marker
    #[serde(rename = "type")]
    pub entity_type: String,

    /// Assigned engineer. Never changes after creation; the "who actually
    /// did it" pointer is `started_by`.
    pub engineer_id: String,

    /// Site where the work happens
    pub site_id: String,

    /// Owning service period
    pub service_period_id: String,

    /// Current lifecycle status
    #[serde(default)]
    pub status: JobStatus,

    /// Engineer who actually started the job (may be a team member of the assignee)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_by: Option<String>,

    /// User who closed the job
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_by: Option<String>,

    /// When work started
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_start_time: Option<DateTime<Utc>>,

    /// When work finished
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_end_time: Option<DateTime<Utc>>,

    /// Position captured at start
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_location: Option<LocationStamp>,

    /// Position captured at finish
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_location: Option<LocationStamp>,

    /// How the job was closed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_method: Option<CompletionMethod>,

    /// Engineer- or coordinator-supplied closing notes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_notes: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl ServiceLog {
    /// Create a new pending service log for the given assignment pair.
    pub fn new(id: String, engineer_id: String, site_id: String, period_id: String) -> Self {
        Self {
            id,
            entity_type: "service_log".to_string(),
            engineer_id,
            site_id,
            service_period_id: period_id,
            status: JobStatus::default(),
            started_by: None,
            completed_by: None,
            job_start_time: None,
            job_end_time: None,
            start_location: None,
            end_location: None,
            completion_method: None,
            completion_notes: None,
            created_at: Utc::now(),
        }
    }
}

/// An ad-hoc, multi-engineer support ticket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallLog {
    /// Unique identifier (e.g., "rc-a1b2")
    pub id: String,

    /// Entity type marker
    #[serde(rename = "type")]
    pub entity_type: String,

    /// Site the call concerns
    pub site_id: String,

    /// Reported issue
    pub issue: String,

    /// Assigned engineers, in assignment order. Escalation reassignment
    /// appends; nothing is ever removed.
    #[serde(default)]
    pub engineer_ids: Vec<String>,

    /// Current lifecycle status
    #[serde(default)]
    pub status: CallStatus,

    /// Engineers who have accepted the call
    #[serde(default)]
    pub accepted_by: Vec<String>,

    /// Engineers who have viewed the call
    #[serde(default)]
    pub viewed_by: Vec<String>,

    /// First acceptor; owns the initial timeline
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_by: Option<String>,

    /// When the first engineer accepted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_start_time: Option<DateTime<Utc>>,

    /// When the call was resolved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_end_time: Option<DateTime<Utc>>,

    /// Position captured at first acceptance
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_location: Option<LocationStamp>,

    /// Position captured at resolution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_location: Option<LocationStamp>,

    /// User who resolved the call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_by: Option<String>,

    /// Resolution notes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_notes: Option<String>,

    /// Whether the call has been escalated
    #[serde(default)]
    pub is_escalated: bool,

    /// Assignee count snapshot at the moment of escalation. The call needs
    /// reassignment while this still equals `engineer_ids.len()`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engineers_at_escalation: Option<usize>,

    /// When the escalated leg started
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalated_job_start_time: Option<DateTime<Utc>>,

    /// Position captured at the escalated leg's start
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalated_start_location: Option<LocationStamp>,

    /// Engineer who started the escalated leg
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalated_started_by: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl CallLog {
    /// Create a new pending call log.
    pub fn new(id: String, site_id: String, issue: String, engineer_ids: Vec<String>) -> Self {
        Self {
            id,
            entity_type: "call_log".to_string(),
            site_id,
            issue,
            engineer_ids,
            status: CallStatus::default(),
            accepted_by: Vec::new(),
            viewed_by: Vec::new(),
            started_by: None,
            job_start_time: None,
            job_end_time: None,
            start_location: None,
            end_location: None,
            completed_by: None,
            completion_notes: None,
            is_escalated: false,
            engineers_at_escalation: None,
            escalated_job_start_time: None,
            escalated_start_location: None,
            escalated_started_by: None,
            created_at: Utc::now(),
        }
    }

    /// Whether the call still needs a fresh engineer after escalation.
    ///
    /// Derived on every read, never stored: the call was escalated and no
    /// engineer has been added since the escalation snapshot.
    pub fn needs_reassignment(&self) -> bool {
        self.is_escalated
            && self
                .engineers_at_escalation
                .is_some_and(|n| n == self.engineer_ids.len())
    }
}
