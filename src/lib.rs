//! Rota - field-service coordination for equipment-maintenance teams.
//!
//! This library provides the core functionality for the `rota` CLI tool:
//! engineer and site administration, service-period activation, the job
//! lifecycle for planned service logs, and ad-hoc call-log handling.

pub mod action_log;
pub mod cli;
pub mod commands;
pub mod models;
pub mod storage;


/// Library-level error type for rota operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Not initialized: run `rota system init` first")]
    NotInitialized,

    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Invalid ID format: {0}")]
    InvalidId(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Only the engineer who started this job may finish it: {0}")]
    NotJobOwner(String),

    #[error("Not a member of the assignee's team: {0}")]
    NotTeamMember(String),

    #[error("Coordinator privileges required: {0}")]
    NotCoordinator(String),

    #[error("Another job is already in progress: {0}")]
    ConcurrentJobLimitExceeded(String),

    #[error("A service period is already active: {0}")]
    AlreadyActive(String),

    #[error("No site assignments exist; assign engineers to sites first")]
    NoAssignments,

    #[error("Already assigned: {0}")]
    AlreadyAssigned(String),

    #[error("Location unavailable: no accurate position fix was captured (retry)")]
    LocationUnavailable,

    #[error("{0}")]
    Other(String),
}

/// Result type alias for rota operations.
pub type Result<T> = std::result::Result<T, Error>;
