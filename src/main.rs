//! Rota CLI - field-service coordination for engineering teams.

use clap::Parser;
use rota::cli::{
    CallCommands, Cli, Commands, ConfigCommands, JobCommands, PeriodCommands, SiteCommands,
    SystemCommands, UserCommands,
};
use rota::commands::{self, Output};
use rota::models::CallStatus;
use rota::storage::default_data_dir;
use rota::{action_log, Error};
use std::path::{Path, PathBuf};
use std::process;
use std::str::FromStr;
use std::time::Instant;

fn main() {
    let cli = Cli::parse();
    let human = cli.human_readable;

    // Data dir: --data-dir flag > ROTA_DATA_DIR env > platform data dir
    let data_dir = resolve_data_dir(cli.data_dir, human);

    // Serialize command for logging
    let (cmd_name, args_json) = serialize_command(&cli.command);

    let start = Instant::now();
    let result = run_command(cli.command, &data_dir, cli.acting_user, human);
    let duration = start.elapsed().as_millis() as u64;

    let (success, error) = match &result {
        Ok(_) => (true, None),
        Err(e) => (false, Some(e.to_string())),
    };

    // Logging never blocks the command result
    action_log::log_action(&data_dir, &cmd_name, args_json, success, error, duration);

    if let Err(e) = result {
        if human {
            eprintln!("Error: {}", e);
        } else {
            let err = serde_json::json!({ "error": e.to_string() });
            eprintln!("{}", err);
        }
        process::exit(1);
    }
}

fn resolve_data_dir(explicit_path: Option<PathBuf>, human: bool) -> PathBuf {
    match explicit_path {
        Some(path) => path,
        None => match default_data_dir() {
            Ok(path) => path,
            Err(e) => {
                if human {
                    eprintln!("Error: {}; set ROTA_DATA_DIR", e);
                } else {
                    let err = serde_json::json!({
                        "error": format!("{}; set ROTA_DATA_DIR", e)
                    });
                    eprintln!("{}", err);
                }
                process::exit(1);
            }
        },
    }
}

/// Resolve the acting user or fail with a hint.
fn acting_user(user: Option<String>) -> Result<String, Error> {
    user.ok_or_else(|| {
        Error::InvalidInput("No acting user; pass --user <ID> or set ROTA_USER".to_string())
    })
}

fn run_command(
    command: Option<Commands>,
    data_dir: &Path,
    user: Option<String>,
    human: bool,
) -> Result<(), Error> {
    match command {
        Some(Commands::System { command }) => match command {
            SystemCommands::Init => {
                let result = commands::system_init(data_dir)?;
                output(&result, human);
            }
            SystemCommands::Status => {
                let result = commands::system_status(data_dir)?;
                output(&result, human);
            }
            SystemCommands::Rebuild => {
                let result = commands::system_rebuild(data_dir)?;
                output(&result, human);
            }
        },

        Some(Commands::User { command }) => match command {
            UserCommands::Add { name, email, admin } => {
                let result = commands::user_add(data_dir, &name, &email, admin)?;
                output(&result, human);
            }
            UserCommands::List => {
                let result = commands::user_list(data_dir)?;
                output(&result, human);
            }
            UserCommands::Show { id } => {
                let result = commands::user_show(data_dir, &id)?;
                output(&result, human);
            }
            UserCommands::SetTeam {
                leader_id,
                member_ids,
            } => {
                let result = commands::user_set_team(data_dir, &leader_id, &member_ids)?;
                output(&result, human);
            }
        },

        Some(Commands::Site { command }) => match command {
            SiteCommands::Add { name, client } => {
                let result = commands::site_add(data_dir, &name, &client)?;
                output(&result, human);
            }
            SiteCommands::List => {
                let result = commands::site_list(data_dir)?;
                output(&result, human);
            }
            SiteCommands::Remove { id } => {
                let actor = acting_user(user)?;
                let result = commands::site_remove(data_dir, &id, &actor)?;
                output(&result, human);
            }
        },

        Some(Commands::Assign { user_id, site_id }) => {
            let actor = acting_user(user)?;
            let result = commands::assign(data_dir, &user_id, &site_id, &actor)?;
            output(&result, human);
        }

        Some(Commands::Unassign { user_id, site_id }) => {
            let actor = acting_user(user)?;
            let result = commands::unassign(data_dir, &user_id, &site_id, &actor)?;
            output(&result, human);
        }

        Some(Commands::Assignments { user_id }) => {
            let result = commands::assignments(data_dir, &user_id)?;
            output(&result, human);
        }

        Some(Commands::Period { command }) => match command {
            PeriodCommands::Activate { name } => {
                let actor = acting_user(user)?;
                let result = commands::period_activate(data_dir, &name, &actor)?;
                output(&result, human);
            }
            PeriodCommands::Deactivate { force } => {
                let actor = acting_user(user)?;
                let result = commands::period_deactivate(data_dir, force, &actor)?;
                output(&result, human);
            }
            PeriodCommands::Status => {
                let result = commands::period_status(data_dir)?;
                output(&result, human);
            }
        },

        Some(Commands::Job { command }) => match command {
            JobCommands::List => {
                let actor = acting_user(user)?;
                let result = commands::my_jobs(data_dir, &actor)?;
                output(&result, human);
            }
            JobCommands::Start { id, lat, lon } => {
                let actor = acting_user(user)?;
                let result = commands::start_job(data_dir, &id, &actor, lat, lon)?;
                output(&result, human);
            }
            JobCommands::Finish {
                id,
                lat,
                lon,
                notes,
            } => {
                let actor = acting_user(user)?;
                let result = commands::finish_job(data_dir, &id, &actor, lat, lon, notes)?;
                output(&result, human);
            }
            JobCommands::ForceFinish { id, notes } => {
                let actor = acting_user(user)?;
                let result = commands::force_finish_job(data_dir, &id, &actor, &notes)?;
                output(&result, human);
            }
        },

        Some(Commands::Call { command }) => match command {
            CallCommands::Create {
                site_id,
                issue,
                engineers,
            } => {
                let actor = acting_user(user)?;
                let result = commands::call_create(data_dir, &site_id, &issue, &engineers, &actor)?;
                output(&result, human);
            }
            CallCommands::Accept { id, lat, lon } => {
                let actor = acting_user(user)?;
                let result = commands::call_accept(data_dir, &id, &actor, lat, lon)?;
                output(&result, human);
            }
            CallCommands::Escalate { id } => {
                let actor = acting_user(user)?;
                let result = commands::call_escalate(data_dir, &id, &actor)?;
                output(&result, human);
            }
            CallCommands::Reassign { id, engineer_id } => {
                let actor = acting_user(user)?;
                let result = commands::call_reassign(data_dir, &id, &engineer_id, &actor)?;
                output(&result, human);
            }
            CallCommands::Resolve {
                id,
                lat,
                lon,
                notes,
            } => {
                let actor = acting_user(user)?;
                let result = commands::call_resolve(data_dir, &id, &actor, lat, lon, notes)?;
                output(&result, human);
            }
            CallCommands::View { id } => {
                let actor = acting_user(user)?;
                let result = commands::call_view(data_dir, &id, &actor)?;
                output(&result, human);
            }
            CallCommands::List {
                status,
                needs_reassignment,
            } => {
                let status = status
                    .map(|s| CallStatus::from_str(&s).map_err(Error::InvalidInput))
                    .transpose()?;
                let result = commands::call_list(data_dir, status, needs_reassignment)?;
                output(&result, human);
            }
        },

        Some(Commands::Notifications) => {
            let actor = acting_user(user)?;
            let result = commands::notifications(data_dir, &actor)?;
            output(&result, human);
        }

        Some(Commands::Config { command }) => match command {
            ConfigCommands::Get { key } => {
                let result = commands::config_get(data_dir, &key)?;
                output(&result, human);
            }
            ConfigCommands::Set { key, value } => {
                let result = commands::config_set(data_dir, &key, &value)?;
                output(&result, human);
            }
            ConfigCommands::List => {
                let result = commands::config_list(data_dir)?;
                output(&result, human);
            }
        },

        None => {
            let result = commands::system_status(data_dir)?;
            output(&result, human);
        }
    }

    Ok(())
}

fn output<T: Output>(result: &T, human: bool) {
    if human {
        println!("{}", result.to_human());
    } else {
        println!("{}", result.to_json());
    }
}

fn serialize_command(command: &Option<Commands>) -> (String, serde_json::Value) {
    match command {
        Some(Commands::System { command }) => match command {
            SystemCommands::Init => ("system init".to_string(), serde_json::json!({})),
            SystemCommands::Status => ("system status".to_string(), serde_json::json!({})),
            SystemCommands::Rebuild => ("system rebuild".to_string(), serde_json::json!({})),
        },

        Some(Commands::User { command }) => match command {
            UserCommands::Add { name, email, admin } => (
                "user add".to_string(),
                serde_json::json!({ "name": name, "email": email, "admin": admin }),
            ),
            UserCommands::List => ("user list".to_string(), serde_json::json!({})),
            UserCommands::Show { id } => {
                ("user show".to_string(), serde_json::json!({ "id": id }))
            }
            UserCommands::SetTeam {
                leader_id,
                member_ids,
            } => (
                "user set-team".to_string(),
                serde_json::json!({ "leader_id": leader_id, "member_ids": member_ids }),
            ),
        },

        Some(Commands::Site { command }) => match command {
            SiteCommands::Add { name, client } => (
                "site add".to_string(),
                serde_json::json!({ "name": name, "client": client }),
            ),
            SiteCommands::List => ("site list".to_string(), serde_json::json!({})),
            SiteCommands::Remove { id } => {
                ("site remove".to_string(), serde_json::json!({ "id": id }))
            }
        },

        Some(Commands::Assign { user_id, site_id }) => (
            "assign".to_string(),
            serde_json::json!({ "user_id": user_id, "site_id": site_id }),
        ),

        Some(Commands::Unassign { user_id, site_id }) => (
            "unassign".to_string(),
            serde_json::json!({ "user_id": user_id, "site_id": site_id }),
        ),

        Some(Commands::Assignments { user_id }) => (
            "assignments".to_string(),
            serde_json::json!({ "user_id": user_id }),
        ),

        Some(Commands::Period { command }) => match command {
            PeriodCommands::Activate { name } => (
                "period activate".to_string(),
                serde_json::json!({ "name": name }),
            ),
            PeriodCommands::Deactivate { force } => (
                "period deactivate".to_string(),
                serde_json::json!({ "force": force }),
            ),
            PeriodCommands::Status => ("period status".to_string(), serde_json::json!({})),
        },

        Some(Commands::Job { command }) => match command {
            JobCommands::List => ("job list".to_string(), serde_json::json!({})),
            JobCommands::Start { id, lat, lon } => (
                "job start".to_string(),
                serde_json::json!({ "id": id, "lat": lat, "lon": lon }),
            ),
            JobCommands::Finish {
                id,
                lat,
                lon,
                notes,
            } => (
                "job finish".to_string(),
                serde_json::json!({ "id": id, "lat": lat, "lon": lon, "notes": notes }),
            ),
            JobCommands::ForceFinish { id, notes } => (
                "job force-finish".to_string(),
                serde_json::json!({ "id": id, "notes": notes }),
            ),
        },

        Some(Commands::Call { command }) => match command {
            CallCommands::Create {
                site_id,
                issue,
                engineers,
            } => (
                "call create".to_string(),
                serde_json::json!({ "site_id": site_id, "issue": issue, "engineers": engineers }),
            ),
            CallCommands::Accept { id, lat, lon } => (
                "call accept".to_string(),
                serde_json::json!({ "id": id, "lat": lat, "lon": lon }),
            ),
            CallCommands::Escalate { id } => {
                ("call escalate".to_string(), serde_json::json!({ "id": id }))
            }
            CallCommands::Reassign { id, engineer_id } => (
                "call reassign".to_string(),
                serde_json::json!({ "id": id, "engineer_id": engineer_id }),
            ),
            CallCommands::Resolve {
                id,
                lat,
                lon,
                notes,
            } => (
                "call resolve".to_string(),
                serde_json::json!({ "id": id, "lat": lat, "lon": lon, "notes": notes }),
            ),
            CallCommands::View { id } => {
                ("call view".to_string(), serde_json::json!({ "id": id }))
            }
            CallCommands::List {
                status,
                needs_reassignment,
            } => (
                "call list".to_string(),
                serde_json::json!({ "status": status, "needs_reassignment": needs_reassignment }),
            ),
        },

        Some(Commands::Notifications) => ("notifications".to_string(), serde_json::json!({})),

        Some(Commands::Config { command }) => match command {
            ConfigCommands::Get { key } => {
                ("config get".to_string(), serde_json::json!({ "key": key }))
            }
            ConfigCommands::Set { key, value } => (
                "config set".to_string(),
                serde_json::json!({ "key": key, "value": value }),
            ),
            ConfigCommands::List => ("config list".to_string(), serde_json::json!({})),
        },

        None => ("status".to_string(), serde_json::json!({})),
    }
}
