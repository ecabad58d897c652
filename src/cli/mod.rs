//! CLI argument definitions for rota.

use clap::{Parser, Subcommand};

/// Rota - field-service coordination for engineering teams.
///
/// Coordinators plan service periods and dispatch call logs; engineers
/// start and finish the resulting jobs from the field.
#[derive(Parser, Debug)]
#[command(name = "rota")]
#[command(author, version, about = "Field-service job and call-log coordination", long_about = None)]
pub struct Cli {
    /// Output in human-readable format instead of JSON
    #[arg(short = 'H', long = "human", global = true)]
    pub human_readable: bool,

    /// Data directory to operate on instead of the default location.
    /// Can also be set via the ROTA_DATA_DIR environment variable.
    #[arg(short = 'D', long = "data-dir", global = true, env = "ROTA_DATA_DIR")]
    pub data_dir: Option<std::path::PathBuf>,

    /// User ID to act as (most commands are authorized per user).
    /// Can also be set via the ROTA_USER environment variable.
    #[arg(short = 'u', long = "user", global = true, env = "ROTA_USER")]
    pub acting_user: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// System administration commands
    System {
        #[command(subcommand)]
        command: SystemCommands,
    },

    /// User and team administration
    User {
        #[command(subcommand)]
        command: UserCommands,
    },

    /// Site administration
    Site {
        #[command(subcommand)]
        command: SiteCommands,
    },

    /// Assign an engineer to a site
    Assign {
        /// Engineer user ID
        user_id: String,

        /// Site ID
        site_id: String,
    },

    /// Remove an engineer's site assignment
    Unassign {
        /// Engineer user ID
        user_id: String,

        /// Site ID
        site_id: String,
    },

    /// List an engineer's site assignments
    Assignments {
        /// Engineer user ID
        user_id: String,
    },

    /// Service period activation and deactivation
    Period {
        #[command(subcommand)]
        command: PeriodCommands,
    },

    /// Planned service jobs
    Job {
        #[command(subcommand)]
        command: JobCommands,
    },

    /// Unplanned call logs
    Call {
        #[command(subcommand)]
        command: CallCommands,
    },

    /// Show outstanding work for the acting user
    Notifications,

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// System subcommands
#[derive(Subcommand, Debug)]
pub enum SystemCommands {
    /// Initialize the rota data directory
    Init,

    /// Show tool version and dataset summary
    Status,

    /// Rebuild the query cache from the append-only history
    Rebuild,
}

/// User subcommands
#[derive(Subcommand, Debug)]
pub enum UserCommands {
    /// Add a new user
    Add {
        /// Display name
        name: String,

        /// Email address
        #[arg(short, long)]
        email: String,

        /// Grant coordinator (admin) authority
        #[arg(long)]
        admin: bool,
    },

    /// List all users
    List,

    /// Show a user with their resolved team
    Show {
        /// User ID (e.g., ru-a1b2)
        id: String,
    },

    /// Replace a leader's tagged team members
    SetTeam {
        /// Leader user ID
        leader_id: String,

        /// Member user IDs
        member_ids: Vec<String>,
    },
}

/// Site subcommands
#[derive(Subcommand, Debug)]
pub enum SiteCommands {
    /// Add a new site
    Add {
        /// Site name
        name: String,

        /// Client the site belongs to
        #[arg(short, long)]
        client: String,
    },

    /// List all sites
    List,

    /// Remove a site (fails while jobs reference it)
    Remove {
        /// Site ID (e.g., rs-a1b2)
        id: String,
    },
}

/// Period subcommands
#[derive(Subcommand, Debug)]
pub enum PeriodCommands {
    /// Activate a new service period, creating one job per assignment
    Activate {
        /// Period name (e.g., "2026-Q3")
        name: String,
    },

    /// Deactivate the active service period
    Deactivate {
        /// Deactivate even if jobs are still in progress
        #[arg(long)]
        force: bool,
    },

    /// Show the active period and its job counts
    Status,
}

/// Job subcommands
#[derive(Subcommand, Debug)]
pub enum JobCommands {
    /// List the acting user's team jobs in the active period
    List,

    /// Start a pending job
    Start {
        /// Job ID (e.g., rj-a1b2)
        id: String,

        /// Captured latitude
        #[arg(long, allow_negative_numbers = true)]
        lat: Option<f64>,

        /// Captured longitude
        #[arg(long, allow_negative_numbers = true)]
        lon: Option<f64>,
    },

    /// Finish a job you started
    Finish {
        /// Job ID
        id: String,

        /// Captured latitude
        #[arg(long, allow_negative_numbers = true)]
        lat: Option<f64>,

        /// Captured longitude
        #[arg(long, allow_negative_numbers = true)]
        lon: Option<f64>,

        /// Completion notes
        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Close a pending job without a field visit (coordinator only)
    ForceFinish {
        /// Job ID
        id: String,

        /// Completion notes (required)
        #[arg(short, long)]
        notes: String,
    },
}

/// Call subcommands
#[derive(Subcommand, Debug)]
pub enum CallCommands {
    /// Create a call log (coordinator only)
    Create {
        /// Site ID
        site_id: String,

        /// Issue description
        #[arg(short, long)]
        issue: String,

        /// Assigned engineer IDs (repeatable)
        #[arg(short, long = "engineer")]
        engineers: Vec<String>,
    },

    /// Accept a call you are assigned to
    Accept {
        /// Call ID (e.g., rc-a1b2)
        id: String,

        /// Captured latitude
        #[arg(long, allow_negative_numbers = true)]
        lat: Option<f64>,

        /// Captured longitude
        #[arg(long, allow_negative_numbers = true)]
        lon: Option<f64>,
    },

    /// Escalate an in-progress call
    Escalate {
        /// Call ID
        id: String,
    },

    /// Add a fresh engineer to an escalated call (coordinator only)
    Reassign {
        /// Call ID
        id: String,

        /// Engineer to add
        engineer_id: String,
    },

    /// Resolve a call you accepted
    Resolve {
        /// Call ID
        id: String,

        /// Captured latitude
        #[arg(long, allow_negative_numbers = true)]
        lat: Option<f64>,

        /// Captured longitude
        #[arg(long, allow_negative_numbers = true)]
        lon: Option<f64>,

        /// Completion notes
        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Mark a call as viewed
    View {
        /// Call ID
        id: String,
    },

    /// List call logs
    List {
        /// Filter by status (pending, in_progress, resolved, escalated)
        #[arg(long)]
        status: Option<String>,

        /// Only calls escalated and still awaiting a fresh engineer
        #[arg(long)]
        needs_reassignment: bool,
    },
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Get a configuration value
    Get {
        /// Configuration key
        key: String,
    },

    /// Set a configuration value
    Set {
        /// Configuration key
        key: String,

        /// Value to set
        value: String,
    },

    /// List all configuration values
    List,
}
