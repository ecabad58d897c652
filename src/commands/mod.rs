//! Command implementations for the rota CLI.
//!
//! This module contains the business logic for each CLI command, organized
//! by area:
//! - `admin` - user, site, and assignment administration
//! - `period` - service period activation and deactivation
//! - `job` - the service-log state machine (start/finish/override)
//! - `call` - call-log acceptance, escalation, and resolution
//! - `notify` - the notification read contract
//!
//! Every command opens storage, applies its guards, and returns a typed
//! result struct implementing [`Output`]. Guard failures come back as typed
//! `Error` variants; no command partially applies a transition.

pub mod admin;
pub mod call;
pub mod job;
pub mod notify;
pub mod period;

pub use admin::{
    assign, assignments, site_add, site_list, site_remove, unassign, user_add, user_list,
    user_set_team, user_show, AssignResult, AssignmentsResult, SetTeamResult, SiteAddResult,
    SiteListResult, SiteRemoveResult, UnassignResult, UserAddResult, UserListResult,
    UserShowResult,
};
pub use call::{
    call_accept, call_create, call_escalate, call_list, call_reassign, call_resolve, call_view,
    CallAcceptResult, CallCreateResult, CallEscalateResult, CallListResult, CallReassignResult,
    CallResolveResult, CallViewResult,
};
pub use job::{
    force_finish_job, finish_job, my_jobs, start_job, FinishResult, ForceFinishResult,
    MyJobsResult, StartResult,
};
pub use notify::{notifications, NotificationsResult};
pub use period::{
    period_activate, period_deactivate, period_status, ActivateResult, DeactivateResult,
    PeriodStatusResult,
};

use crate::models::{LocationStamp, User};
use crate::storage::Storage;
use crate::{Error, Result};
use serde::Serialize;
use std::path::Path;

/// Command results that can be serialized to JSON or formatted for humans.
pub trait Output {
    /// Serialize to JSON string.
    fn to_json(&self) -> String;

    /// Format for human-readable output.
    fn to_human(&self) -> String;
}

/// Serialize any result struct to its JSON wire form.
pub(crate) fn json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
}

/// Require coordinator/admin authority for the acting user.
pub(crate) fn require_admin(user: &User) -> Result<()> {
    if user.is_admin {
        Ok(())
    } else {
        Err(Error::NotCoordinator(format!(
            "{} is not a coordinator",
            user.id
        )))
    }
}

/// Build a location stamp from optional capture output.
///
/// The capture collaborator reports a timed-out fix as an absent position;
/// that surfaces here as the retryable `LocationUnavailable`.
pub(crate) fn location_from(
    lat: Option<f64>,
    lon: Option<f64>,
    user_id: &str,
) -> Result<LocationStamp> {
    match (lat, lon) {
        (Some(lat), Some(lon)) => Ok(LocationStamp::new(lat, lon, user_id)),
        _ => Err(Error::LocationUnavailable),
    }
}

/// Result of `system init`.
#[derive(Debug, Serialize)]
pub struct InitResult {
    pub initialized: bool,
    pub path: String,
}

impl Output for InitResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.initialized {
            format!("Initialized rota data directory at {}", self.path)
        } else {
            format!("Already initialized at {}", self.path)
        }
    }
}

/// Initialize the rota data directory.
pub fn system_init(data_dir: &Path) -> Result<InitResult> {
    if Storage::exists(data_dir) {
        return Ok(InitResult {
            initialized: false,
            path: data_dir.display().to_string(),
        });
    }

    Storage::init(data_dir)?;
    Ok(InitResult {
        initialized: true,
        path: data_dir.display().to_string(),
    })
}

/// Result of `system status`.
#[derive(Debug, Serialize)]
pub struct SystemStatusResult {
    pub version: String,
    pub commit: String,
    pub built_at: String,
    pub initialized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_period: Option<String>,
    pub users: usize,
    pub sites: usize,
}

impl Output for SystemStatusResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let mut out = format!(
            "rota {} ({}, built {})\n",
            self.version, self.commit, self.built_at
        );
        if !self.initialized {
            out.push_str("Not initialized: run `rota system init` first");
            return out;
        }
        match &self.active_period {
            Some(name) => out.push_str(&format!("Active period: {}\n", name)),
            None => out.push_str("Active period: none\n"),
        }
        out.push_str(&format!("Users: {}, Sites: {}", self.users, self.sites));
        out
    }
}

/// Report tool version and dataset summary.
pub fn system_status(data_dir: &Path) -> Result<SystemStatusResult> {
    let version = env!("CARGO_PKG_VERSION").to_string();
    let commit = env!("ROTA_GIT_COMMIT").to_string();
    let built_at = env!("ROTA_BUILD_TIMESTAMP").to_string();

    if !Storage::exists(data_dir) {
        return Ok(SystemStatusResult {
            version,
            commit,
            built_at,
            initialized: false,
            active_period: None,
            users: 0,
            sites: 0,
        });
    }

    let storage = Storage::open(data_dir)?;
    let active_period = storage.active_period()?.map(|p| p.name);
    Ok(SystemStatusResult {
        version,
        commit,
        built_at,
        initialized: true,
        active_period,
        users: storage.list_users()?.len(),
        sites: storage.list_sites()?.len(),
    })
}

/// Rebuild the SQLite cache from the JSONL history.
#[derive(Debug, Serialize)]
pub struct RebuildResult {
    pub rebuilt: bool,
}

impl Output for RebuildResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        "Rebuilt query cache from history".to_string()
    }
}

/// Rebuild the query cache from the append-only history.
pub fn system_rebuild(data_dir: &Path) -> Result<RebuildResult> {
    let mut storage = Storage::open(data_dir)?;
    storage.rebuild_cache()?;
    Ok(RebuildResult { rebuilt: true })
}

/// Result of `config get`.
#[derive(Debug, Serialize)]
pub struct ConfigGetResult {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl Output for ConfigGetResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        match &self.value {
            Some(v) => format!("{} = {}", self.key, v),
            None => format!("{} is not set", self.key),
        }
    }
}

/// Get a configuration value.
pub fn config_get(data_dir: &Path, key: &str) -> Result<ConfigGetResult> {
    let storage = Storage::open(data_dir)?;
    let value = storage.get_config(key)?;
    Ok(ConfigGetResult {
        key: key.to_string(),
        value,
    })
}

/// Result of `config set`.
#[derive(Debug, Serialize)]
pub struct ConfigSetResult {
    pub key: String,
    pub value: String,
}

impl Output for ConfigSetResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!("Set {} = {}", self.key, self.value)
    }
}

/// Set a configuration value.
pub fn config_set(data_dir: &Path, key: &str, value: &str) -> Result<ConfigSetResult> {
    let mut storage = Storage::open(data_dir)?;
    storage.set_config(key, value)?;
    Ok(ConfigSetResult {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Result of `config list`.
#[derive(Debug, Serialize)]
pub struct ConfigListResult {
    pub count: usize,
    pub configs: Vec<(String, String)>,
}

impl Output for ConfigListResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.configs.is_empty() {
            return "No configuration set".to_string();
        }
        self.configs
            .iter()
            .map(|(k, v)| format!("{} = {}", k, v))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// List all configuration values.
pub fn config_list(data_dir: &Path) -> Result<ConfigListResult> {
    let storage = Storage::open(data_dir)?;
    let configs = storage.list_configs()?;
    Ok(ConfigListResult {
        count: configs.len(),
        configs,
    })
}
