//! Storage layer for rota data.
//!
//! This module handles persistence of users, sites, service periods,
//! service logs, and call logs.
//!
//! All entity history is kept in append-only JSONL files (latest record for
//! an ID wins), with a SQLite cache for indexed queries. Multi-document
//! guards (the single-active-job rule, the active-period pointer) re-check
//! their condition inside an immediate transaction, so concurrent
//! invocations, including ones from separate processes, serialize on the
//! cache's write lock.

use crate::models::{
    CallLog, CallStatus, JobStatus, ServiceLog, ServicePeriod, Site, User,
};
use crate::{Error, Result};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config key holding the ID of the active service period.
const ACTIVE_PERIOD_KEY: &str = "active_period_id";

/// Storage manager for a single organization's dataset.
pub struct Storage {
    /// Root directory for the organization's data
    pub root: PathBuf,
    /// SQLite connection for indexed queries
    conn: Connection,
}

impl Storage {
    /// Open existing storage rooted at the given data directory.
    pub fn open(data_dir: &Path) -> Result<Self> {
        let root = data_dir.to_path_buf();

        if !root.exists() || !root.join("cache.db").exists() {
            return Err(Error::NotInitialized);
        }

        let conn = Connection::open(root.join("cache.db"))?;
        // Concurrent invocations queue on the write lock instead of failing
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::init_schema(&conn)?;

        Ok(Self { root, conn })
    }

    /// Initialize storage at the given data directory.
    pub fn init(data_dir: &Path) -> Result<Self> {
        let root = data_dir.to_path_buf();

        fs::create_dir_all(&root)?;

        // Create empty JSONL files
        let files = [
            "users.jsonl",
            "sites.jsonl",
            "periods.jsonl",
            "service-logs.jsonl",
            "call-logs.jsonl",
        ];
        for file in files {
            let path = root.join(file);
            if !path.exists() {
                File::create(&path)?;
            }
        }

        let conn = Connection::open(root.join("cache.db"))?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::init_schema(&conn)?;

        Ok(Self { root, conn })
    }

    /// Check if storage exists at the given data directory.
    pub fn exists(data_dir: &Path) -> bool {
        data_dir.exists() && data_dir.join("cache.db").exists()
    }

    /// Initialize the SQLite schema.
    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT NOT NULL,
                is_admin INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS user_team_members (
                leader_id TEXT NOT NULL,
                member_id TEXT NOT NULL,
                PRIMARY KEY (leader_id, member_id),
                FOREIGN KEY (leader_id) REFERENCES users(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS sites (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                client TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS site_assignments (
                user_id TEXT NOT NULL,
                site_id TEXT NOT NULL,
                PRIMARY KEY (user_id, site_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS service_periods (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT,
                is_active INTEGER NOT NULL DEFAULT 0,
                created_by TEXT NOT NULL,
                logs_created INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS service_logs (
                id TEXT PRIMARY KEY,
                engineer_id TEXT NOT NULL,
                site_id TEXT NOT NULL,
                service_period_id TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                started_by TEXT,
                completed_by TEXT,
                job_start_time TEXT,
                job_end_time TEXT,
                completion_method TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS call_logs (
                id TEXT PRIMARY KEY,
                site_id TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                is_escalated INTEGER NOT NULL DEFAULT 0,
                engineers_at_escalation INTEGER,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS call_log_engineers (
                call_id TEXT NOT NULL,
                engineer_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                PRIMARY KEY (call_id, engineer_id),
                FOREIGN KEY (call_id) REFERENCES call_logs(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_assignments_site ON site_assignments(site_id);
            CREATE INDEX IF NOT EXISTS idx_team_members_member ON user_team_members(member_id);

            CREATE INDEX IF NOT EXISTS idx_service_logs_period ON service_logs(service_period_id);
            CREATE INDEX IF NOT EXISTS idx_service_logs_status ON service_logs(status);
            CREATE INDEX IF NOT EXISTS idx_service_logs_engineer ON service_logs(engineer_id);
            CREATE INDEX IF NOT EXISTS idx_service_logs_started_by ON service_logs(started_by);
            CREATE INDEX IF NOT EXISTS idx_service_logs_site ON service_logs(site_id);

            CREATE INDEX IF NOT EXISTS idx_call_logs_status ON call_logs(status);
            CREATE INDEX IF NOT EXISTS idx_call_logs_site ON call_logs(site_id);
            CREATE INDEX IF NOT EXISTS idx_call_engineers_engineer ON call_log_engineers(engineer_id);

            CREATE TABLE IF NOT EXISTS config (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;

        Ok(())
    }

    /// Rebuild the SQLite cache from the JSONL files.
    pub fn rebuild_cache(&mut self) -> Result<()> {
        self.conn.execute("PRAGMA foreign_keys = OFF", [])?;

        self.conn.execute_batch(
            r#"
            DELETE FROM user_team_members;
            DELETE FROM site_assignments;
            DELETE FROM users;
            DELETE FROM sites;
            DELETE FROM service_periods;
            DELETE FROM service_logs;
            DELETE FROM call_log_engineers;
            DELETE FROM call_logs;
            "#,
        )?;

        for user in read_jsonl::<User>(&self.root.join("users.jsonl"))? {
            self.cache_user(&user)?;
        }
        for site in read_jsonl::<Site>(&self.root.join("sites.jsonl"))? {
            self.cache_site(&site)?;
        }
        for period in read_jsonl::<ServicePeriod>(&self.root.join("periods.jsonl"))? {
            self.cache_period(&period)?;
        }
        for log in read_jsonl::<ServiceLog>(&self.root.join("service-logs.jsonl"))? {
            self.cache_service_log(&log)?;
        }
        for call in read_jsonl::<CallLog>(&self.root.join("call-logs.jsonl"))? {
            self.cache_call_log(&call)?;
        }

        self.conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(())
    }

    /// Append a serialized record to a JSONL file.
    fn append_record<T: serde::Serialize>(&self, filename: &str, record: &T) -> Result<()> {
        append_jsonl(&self.root.join(filename), record)
    }

    // === Cache Operations ===

    fn cache_user(&self, user: &User) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO users (id, name, email, is_admin, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user.id,
                user.name,
                user.email,
                user.is_admin,
                user.created_at.to_rfc3339(),
                user.updated_at.to_rfc3339(),
            ],
        )?;

        // Mirror the team and assignment relations
        self.conn.execute(
            "DELETE FROM user_team_members WHERE leader_id = ?1",
            [&user.id],
        )?;
        for member in &user.team_member_ids {
            self.conn.execute(
                "INSERT OR REPLACE INTO user_team_members (leader_id, member_id) VALUES (?1, ?2)",
                params![user.id, member],
            )?;
        }

        self.conn.execute(
            "DELETE FROM site_assignments WHERE user_id = ?1",
            [&user.id],
        )?;
        for site_id in &user.assigned_site_ids {
            self.conn.execute(
                "INSERT OR REPLACE INTO site_assignments (user_id, site_id) VALUES (?1, ?2)",
                params![user.id, site_id],
            )?;
        }

        Ok(())
    }

    fn cache_site(&self, site: &Site) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO sites (id, name, client, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![site.id, site.name, site.client, site.created_at.to_rfc3339()],
        )?;
        Ok(())
    }

    fn cache_period(&self, period: &ServicePeriod) -> Result<()> {
        upsert_period(&self.conn, period)
    }

    fn cache_service_log(&self, log: &ServiceLog) -> Result<()> {
        upsert_service_log(&self.conn, log)
    }

    fn cache_call_log(&self, call: &CallLog) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO call_logs
             (id, site_id, status, is_escalated, engineers_at_escalation, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                call.id,
                call.site_id,
                call.status.to_string(),
                call.is_escalated,
                call.engineers_at_escalation.map(|n| n as i64),
                call.created_at.to_rfc3339(),
            ],
        )?;

        self.conn
            .execute("DELETE FROM call_log_engineers WHERE call_id = ?1", [&call.id])?;
        for (position, engineer_id) in call.engineer_ids.iter().enumerate() {
            self.conn.execute(
                "INSERT OR REPLACE INTO call_log_engineers (call_id, engineer_id, position)
                 VALUES (?1, ?2, ?3)",
                params![call.id, engineer_id, position as i64],
            )?;
        }

        Ok(())
    }

    // === User Operations ===

    /// Add a new user.
    pub fn add_user(&mut self, user: &User) -> Result<()> {
        self.append_record("users.jsonl", user)?;
        self.cache_user(user)?;
        Ok(())
    }

    /// Get a user by ID.
    pub fn get_user(&self, id: &str) -> Result<User> {
        validate_id(id, "ru")?;
        read_latest::<User>(&self.root.join("users.jsonl"), id)
            .ok_or_else(|| Error::NotFound(format!("User not found: {}", id)))
    }

    /// List all users, ordered by creation time.
    pub fn list_users(&self) -> Result<Vec<User>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM users ORDER BY created_at ASC, id ASC")?;
        let ids: Vec<String> = stmt
            .query_map([], |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();

        let mut users = Vec::new();
        for id in ids {
            if let Ok(user) = self.get_user(&id) {
                users.push(user);
            }
        }
        Ok(users)
    }

    /// Update a user.
    pub fn update_user(&mut self, user: &User) -> Result<()> {
        self.get_user(&user.id)?;
        self.append_record("users.jsonl", user)?;
        self.cache_user(user)?;
        Ok(())
    }

    // === Site Operations ===

    /// Add a new site.
    pub fn add_site(&mut self, site: &Site) -> Result<()> {
        self.append_record("sites.jsonl", site)?;
        self.cache_site(site)?;
        Ok(())
    }

    /// Get a site by ID.
    ///
    /// A removed site stays in the JSONL history but is no longer resolvable.
    pub fn get_site(&self, id: &str) -> Result<Site> {
        validate_id(id, "rs")?;
        let exists: bool = self
            .conn
            .query_row("SELECT 1 FROM sites WHERE id = ?1", [id], |_| Ok(true))
            .optional()?
            .unwrap_or(false);
        if !exists {
            return Err(Error::NotFound(format!("Site not found: {}", id)));
        }

        read_latest::<Site>(&self.root.join("sites.jsonl"), id)
            .ok_or_else(|| Error::NotFound(format!("Site not found: {}", id)))
    }

    /// List all sites, ordered by creation time.
    pub fn list_sites(&self) -> Result<Vec<Site>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM sites ORDER BY created_at ASC, id ASC")?;
        let ids: Vec<String> = stmt
            .query_map([], |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();

        let mut sites = Vec::new();
        for id in ids {
            if let Ok(site) = self.get_site(&id) {
                sites.push(site);
            }
        }
        Ok(sites)
    }

    /// Remove a site, cascading removal of every assignment edge that
    /// references it. Sites referenced by any job are immutable and cannot
    /// be removed.
    pub fn remove_site(&mut self, id: &str) -> Result<()> {
        self.get_site(id)?;

        if self.jobs_reference_site(id)? {
            return Err(Error::InvalidInput(format!(
                "Site {} is referenced by existing jobs and cannot be removed",
                id
            )));
        }

        // Cascade: drop the edge from every assigned user's record so no
        // assignment is left dangling.
        let assigned: Vec<String> = {
            let mut stmt = self
                .conn
                .prepare("SELECT user_id FROM site_assignments WHERE site_id = ?1")?;
            stmt.query_map([id], |row| row.get(0))?
                .filter_map(|r| r.ok())
                .collect()
        };
        for user_id in assigned {
            let mut user = self.get_user(&user_id)?;
            user.assigned_site_ids.retain(|s| s != id);
            user.updated_at = chrono::Utc::now();
            self.update_user(&user)?;
        }

        self.conn.execute("DELETE FROM sites WHERE id = ?1", [id])?;
        self.conn
            .execute("DELETE FROM site_assignments WHERE site_id = ?1", [id])?;

        Ok(())
    }

    /// Whether any service log or call log references the site.
    pub fn jobs_reference_site(&self, site_id: &str) -> Result<bool> {
        let in_service: bool = self
            .conn
            .query_row(
                "SELECT 1 FROM service_logs WHERE site_id = ?1 LIMIT 1",
                [site_id],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        if in_service {
            return Ok(true);
        }

        let in_calls: bool = self
            .conn
            .query_row(
                "SELECT 1 FROM call_logs WHERE site_id = ?1 LIMIT 1",
                [site_id],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        Ok(in_calls)
    }

    // === Assignment Operations ===

    /// Assign a user to a site. Fails if the edge already exists.
    pub fn assign_site(&mut self, user_id: &str, site_id: &str) -> Result<()> {
        let mut user = self.get_user(user_id)?;
        self.get_site(site_id)?;

        if user.assigned_site_ids.iter().any(|s| s == site_id) {
            return Err(Error::AlreadyAssigned(format!(
                "{} is already assigned to {}",
                user_id, site_id
            )));
        }

        user.assigned_site_ids.push(site_id.to_string());
        user.updated_at = chrono::Utc::now();
        self.update_user(&user)
    }

    /// Unassign a user from a site. No-op if the edge is absent.
    pub fn unassign_site(&mut self, user_id: &str, site_id: &str) -> Result<()> {
        let mut user = self.get_user(user_id)?;

        if !user.assigned_site_ids.iter().any(|s| s == site_id) {
            return Ok(());
        }

        user.assigned_site_ids.retain(|s| s != site_id);
        user.updated_at = chrono::Utc::now();
        self.update_user(&user)
    }

    /// Sites assigned to a user.
    pub fn assignments_for(&self, user_id: &str) -> Result<Vec<Site>> {
        let user = self.get_user(user_id)?;
        let mut sites = Vec::new();
        for site_id in &user.assigned_site_ids {
            sites.push(self.get_site(site_id)?);
        }
        Ok(sites)
    }

    /// Every (user, site) assignment pair, in deterministic order.
    pub fn assignment_pairs(&self) -> Result<Vec<(String, String)>> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, site_id FROM site_assignments ORDER BY user_id ASC, site_id ASC",
        )?;
        let pairs = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(pairs)
    }

    // === Service Period Operations ===

    /// Get a period by ID.
    pub fn get_period(&self, id: &str) -> Result<ServicePeriod> {
        validate_id(id, "rp")?;
        read_latest::<ServicePeriod>(&self.root.join("periods.jsonl"), id)
            .ok_or_else(|| Error::NotFound(format!("Service period not found: {}", id)))
    }

    /// List all periods, newest first.
    pub fn list_periods(&self) -> Result<Vec<ServicePeriod>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM service_periods ORDER BY start_time DESC, id ASC")?;
        let ids: Vec<String> = stmt
            .query_map([], |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();

        let mut periods = Vec::new();
        for id in ids {
            if let Ok(period) = self.get_period(&id) {
                periods.push(period);
            }
        }
        Ok(periods)
    }

    /// The currently active period, if any.
    pub fn active_period(&self) -> Result<Option<ServicePeriod>> {
        match self.get_config(ACTIVE_PERIOD_KEY)? {
            Some(id) => Ok(Some(self.get_period(&id)?)),
            None => Ok(None),
        }
    }

    /// Activate a period: persist the period record, the whole batch of
    /// pending service logs, and the active pointer as one logical
    /// operation. Fails with `AlreadyActive` if a period is already active.
    pub fn activate_period(
        &mut self,
        period: &ServicePeriod,
        logs: &[ServiceLog],
    ) -> Result<()> {
        if let Some(active) = self.active_period()? {
            return Err(Error::AlreadyActive(active.name));
        }

        // Logs first, the active-flagged period record last: a failed append
        // leaves history with no period claiming to be active, so a retry
        // starts clean. The orphaned logs belong to a period that never
        // existed and are invisible to every period-scoped query.
        for log in logs {
            self.append_record("service-logs.jsonl", log)?;
        }
        self.append_record("periods.jsonl", period)?;

        if let Err(e) = Self::commit_activation(&mut self.conn, period, logs) {
            // History already claims an active period; retract the claim so
            // a rebuild or a retry sees the activation as never applied.
            let mut retracted = period.clone();
            retracted.is_active = false;
            let _ = self.append_record("periods.jsonl", &retracted);
            return Err(e);
        }

        Ok(())
    }

    /// Cache the activation batch and flip the active pointer in one
    /// immediate transaction, re-checking the pointer under the write lock
    /// so two concurrent activations cannot both win.
    fn commit_activation(
        conn: &mut Connection,
        period: &ServicePeriod,
        logs: &[ServiceLog],
    ) -> Result<()> {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let active: Option<String> = tx
            .query_row(
                "SELECT value FROM config WHERE key = ?1",
                [ACTIVE_PERIOD_KEY],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = active {
            return Err(Error::AlreadyActive(id));
        }

        upsert_period(&tx, period)?;
        for log in logs {
            upsert_service_log(&tx, log)?;
        }
        tx.execute(
            "INSERT OR REPLACE INTO config (key, value) VALUES (?1, ?2)",
            params![ACTIVE_PERIOD_KEY, period.id],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Close a period and clear the active pointer in one transaction.
    /// The caller sets `is_active = false` and `end_time` beforehand.
    pub fn close_period(&mut self, period: &ServicePeriod) -> Result<()> {
        self.append_record("periods.jsonl", period)?;

        let tx = self.conn.transaction()?;
        tx.execute(
            "UPDATE service_periods SET is_active = ?1, end_time = ?2 WHERE id = ?3",
            params![
                period.is_active,
                period.end_time.map(|t| t.to_rfc3339()),
                period.id,
            ],
        )?;
        tx.execute("DELETE FROM config WHERE key = ?1", [ACTIVE_PERIOD_KEY])?;
        tx.commit()?;

        Ok(())
    }

    // === Service Log Operations ===

    /// Create a single service log (period activation uses the bulk path).
    pub fn create_service_log(&mut self, log: &ServiceLog) -> Result<()> {
        self.append_record("service-logs.jsonl", log)?;
        self.cache_service_log(log)?;
        Ok(())
    }

    /// Get a service log by ID.
    pub fn get_service_log(&self, id: &str) -> Result<ServiceLog> {
        validate_id(id, "rj")?;
        read_latest::<ServiceLog>(&self.root.join("service-logs.jsonl"), id)
            .ok_or_else(|| Error::NotFound(format!("Service log not found: {}", id)))
    }

    /// Update a service log.
    pub fn update_service_log(&mut self, log: &ServiceLog) -> Result<()> {
        self.get_service_log(&log.id)?;
        self.append_record("service-logs.jsonl", log)?;
        self.cache_service_log(log)?;
        Ok(())
    }

    /// Apply a pending-to-in-progress transition under the single-active-job
    /// rule.
    ///
    /// The guard count, the history append, and the cache write run in one
    /// immediate transaction, so two starters racing from separate
    /// connections cannot both pass the guard: the loser waits on the write
    /// lock and then observes the winner's committed transition. `log` must
    /// already carry the in-progress fields, including `started_by`.
    pub fn start_service_log(&mut self, log: &ServiceLog, period_name: &str) -> Result<()> {
        let started_by = log
            .started_by
            .clone()
            .ok_or_else(|| Error::InvalidInput("started_by is required".to_string()))?;
        let path = self.root.join("service-logs.jsonl");

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let in_progress: i64 = tx.query_row(
            "SELECT COUNT(*) FROM service_logs
             WHERE service_period_id = ?1 AND status = 'in_progress' AND started_by = ?2",
            params![log.service_period_id, started_by],
            |row| row.get(0),
        )?;
        if in_progress > 0 {
            return Err(Error::ConcurrentJobLimitExceeded(format!(
                "{} already has a job in progress in period {}",
                started_by, period_name
            )));
        }

        append_jsonl(&path, log)?;
        upsert_service_log(&tx, log)?;
        tx.commit()?;
        Ok(())
    }

    /// List service logs, optionally filtered.
    pub fn list_service_logs(
        &self,
        period_id: Option<&str>,
        engineer_id: Option<&str>,
        status: Option<JobStatus>,
    ) -> Result<Vec<ServiceLog>> {
        let mut sql = String::from("SELECT id FROM service_logs WHERE 1=1");
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(p) = period_id {
            sql.push_str(" AND service_period_id = ?");
            params_vec.push(Box::new(p.to_string()));
        }
        if let Some(e) = engineer_id {
            sql.push_str(" AND engineer_id = ?");
            params_vec.push(Box::new(e.to_string()));
        }
        if let Some(s) = status {
            sql.push_str(" AND status = ?");
            params_vec.push(Box::new(s.to_string()));
        }

        sql.push_str(" ORDER BY created_at ASC, id ASC");

        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let ids: Vec<String> = stmt
            .query_map(params_refs.as_slice(), |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();

        let mut logs = Vec::new();
        for id in ids {
            if let Ok(log) = self.get_service_log(&id) {
                logs.push(log);
            }
        }
        Ok(logs)
    }

    /// Count in-progress service logs in a period.
    pub fn count_in_progress(&self, period_id: &str) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM service_logs
             WHERE service_period_id = ?1 AND status = 'in_progress'",
            [period_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Count in-progress service logs in a period that `user_id` started.
    ///
    /// Fast-path read for the single-active-job guard; the authoritative
    /// re-check runs inside [`Storage::start_service_log`]'s transaction.
    pub fn count_in_progress_started_by(&self, period_id: &str, user_id: &str) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM service_logs
             WHERE service_period_id = ?1 AND status = 'in_progress' AND started_by = ?2",
            params![period_id, user_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Count service logs in a period by status.
    pub fn count_by_status(&self, period_id: &str, status: JobStatus) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM service_logs
             WHERE service_period_id = ?1 AND status = ?2",
            params![period_id, status.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // === Call Log Operations ===

    /// Create a new call log.
    pub fn create_call_log(&mut self, call: &CallLog) -> Result<()> {
        self.append_record("call-logs.jsonl", call)?;
        self.cache_call_log(call)?;
        Ok(())
    }

    /// Get a call log by ID.
    pub fn get_call_log(&self, id: &str) -> Result<CallLog> {
        validate_id(id, "rc")?;
        read_latest::<CallLog>(&self.root.join("call-logs.jsonl"), id)
            .ok_or_else(|| Error::NotFound(format!("Call log not found: {}", id)))
    }

    /// Update a call log.
    pub fn update_call_log(&mut self, call: &CallLog) -> Result<()> {
        self.get_call_log(&call.id)?;
        self.append_record("call-logs.jsonl", call)?;
        self.cache_call_log(call)?;
        Ok(())
    }

    /// List call logs, optionally filtered by status.
    pub fn list_call_logs(&self, status: Option<CallStatus>) -> Result<Vec<CallLog>> {
        let mut sql = String::from("SELECT id FROM call_logs WHERE 1=1");
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(s) = status {
            sql.push_str(" AND status = ?");
            params_vec.push(Box::new(s.to_string()));
        }

        sql.push_str(" ORDER BY created_at ASC, id ASC");

        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let ids: Vec<String> = stmt
            .query_map(params_refs.as_slice(), |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();

        let mut calls = Vec::new();
        for id in ids {
            if let Ok(call) = self.get_call_log(&id) {
                calls.push(call);
            }
        }
        Ok(calls)
    }

    /// Call logs that list the given engineer as an assignee.
    pub fn call_logs_for_engineer(&self, engineer_id: &str) -> Result<Vec<CallLog>> {
        let ids: Vec<String> = {
            let mut stmt = self.conn.prepare(
                "SELECT c.id FROM call_logs c
                 JOIN call_log_engineers e ON c.id = e.call_id
                 WHERE e.engineer_id = ?1
                 ORDER BY c.created_at ASC, c.id ASC",
            )?;
            stmt.query_map([engineer_id], |row| row.get(0))?
                .filter_map(|r| r.ok())
                .collect()
        };

        let mut calls = Vec::new();
        for id in ids {
            if let Ok(call) = self.get_call_log(&id) {
                calls.push(call);
            }
        }
        Ok(calls)
    }

    // === Config Operations ===

    /// Get a configuration value.
    pub fn get_config(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM config WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Set a configuration value.
    pub fn set_config(&mut self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO config (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// List all configuration key/value pairs.
    pub fn list_configs(&self) -> Result<Vec<(String, String)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, value FROM config ORDER BY key ASC")?;
        let configs = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(configs)
    }
}

/// Read every record from a JSONL file, keeping only the latest record per
/// ID (records are append-only; later lines supersede earlier ones).
fn read_jsonl<T: serde::de::DeserializeOwned + HasId>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let mut latest: Vec<T> = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if let Ok(record) = serde_json::from_str::<T>(&line) {
            if let Some(existing) = latest.iter_mut().find(|r| r.record_id() == record.record_id())
            {
                *existing = record;
            } else {
                latest.push(record);
            }
        }
    }
    Ok(latest)
}

/// Read the latest record with the given ID from a JSONL file.
fn read_latest<T: serde::de::DeserializeOwned + HasId>(path: &Path, id: &str) -> Option<T> {
    let file = File::open(path).ok()?;
    let reader = BufReader::new(file);

    let mut latest: Option<T> = None;
    for line in reader.lines() {
        let line = line.ok()?;
        if line.trim().is_empty() {
            continue;
        }
        if let Ok(record) = serde_json::from_str::<T>(&line) {
            if record.record_id() == id {
                latest = Some(record);
            }
        }
    }
    latest
}

/// Access to a record's ID for latest-wins JSONL reads.
trait HasId {
    fn record_id(&self) -> &str;
}

impl HasId for User {
    fn record_id(&self) -> &str {
        &self.id
    }
}
impl HasId for Site {
    fn record_id(&self) -> &str {
        &self.id
    }
}
impl HasId for ServicePeriod {
    fn record_id(&self) -> &str {
        &self.id
    }
}
impl HasId for ServiceLog {
    fn record_id(&self) -> &str {
        &self.id
    }
}
impl HasId for CallLog {
    fn record_id(&self) -> &str {
        &self.id
    }
}

/// Append a serialized record to the JSONL file at `path`.
fn append_jsonl<T: serde::Serialize>(path: &Path, record: &T) -> Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let json = serde_json::to_string(record)?;
    writeln!(file, "{}", json)?;
    Ok(())
}

/// Cache upsert for a period, shared between the live connection and
/// activation transactions.
fn upsert_period(conn: &Connection, period: &ServicePeriod) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO service_periods
         (id, name, start_time, end_time, is_active, created_by, logs_created)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            period.id,
            period.name,
            period.start_time.to_rfc3339(),
            period.end_time.map(|t| t.to_rfc3339()),
            period.is_active,
            period.created_by,
            period.logs_created as i64,
        ],
    )?;
    Ok(())
}

/// Cache upsert for a service log, shared between the live connection and
/// guarded transition transactions.
fn upsert_service_log(conn: &Connection, log: &ServiceLog) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO service_logs
         (id, engineer_id, site_id, service_period_id, status, started_by, completed_by,
          job_start_time, job_end_time, completion_method, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            log.id,
            log.engineer_id,
            log.site_id,
            log.service_period_id,
            log.status.to_string(),
            log.started_by,
            log.completed_by,
            log.job_start_time.map(|t| t.to_rfc3339()),
            log.job_end_time.map(|t| t.to_rfc3339()),
            log.completion_method.map(|m| m.to_string()),
            log.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Get the default data directory: `$ROTA_DATA_DIR` if set, otherwise
/// `<platform data dir>/rota`.
pub fn default_data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("ROTA_DATA_DIR") {
        if !dir.is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }

    let data_dir = dirs::data_dir()
        .ok_or_else(|| Error::Other("Could not determine data directory".to_string()))?;
    Ok(data_dir.join("rota"))
}

/// Generate a unique ID for an entity.
///
/// Format: `<prefix>-<4 hex chars>`
/// - User prefix: "ru", Site: "rs", Period: "rp", Service log: "rj", Call log: "rc"
pub fn generate_id(prefix: &str, seed: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    hasher.update(
        chrono::Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or(0)
            .to_le_bytes(),
    );
    let hash = hasher.finalize();
    let hash_hex = format!("{:x}", hash);
    format!("{}-{}", prefix, &hash_hex[..4])
}

/// Validate that an ID matches the expected format.
///
/// Every entity lookup runs the requested ID through this, so a malformed
/// ID fails as `InvalidId` before the history scan rather than as a
/// generic not-found.
pub fn validate_id(id: &str, prefix: &str) -> Result<()> {
    if !id.starts_with(&format!("{}-", prefix)) {
        return Err(Error::InvalidId(format!(
            "ID must start with '{}-', got: {}",
            prefix, id
        )));
    }

    let suffix = &id[prefix.len() + 1..];
    if suffix.len() != 4 || !suffix.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::InvalidId(format!(
            "ID suffix must be 4 hex characters, got: {}",
            suffix
        )));
    }

    Ok(())
}
