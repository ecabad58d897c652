//! Action logging for rota commands.
//!
//! Every CLI invocation is appended to a structured JSONL log so that
//! coordinator actions and engineer job transitions can be audited later.

use crate::storage::Storage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// A single action log entry.
#[derive(Debug, Serialize, Deserialize)]
pub struct ActionLog {
    /// ISO 8601 timestamp when the action occurred
    pub timestamp: DateTime<Utc>,

    /// Data directory the command ran against
    pub data_dir: String,

    /// Command name (e.g., "job start", "period activate")
    pub command: String,

    /// Command arguments as JSON
    pub args: serde_json::Value,

    /// Whether the command succeeded
    pub success: bool,

    /// Error message if the command failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Command execution duration in milliseconds
    pub duration_ms: u64,

    /// OS user who executed the command
    pub user: String,
}

/// Log an action to the configured log file.
///
/// This function never fails - it falls back silently on errors so logging
/// can never break a command.
pub fn log_action(
    data_dir: &Path,
    command: &str,
    args: serde_json::Value,
    success: bool,
    error: Option<String>,
    duration_ms: u64,
) {
    let enabled = get_config_bool(data_dir, "action_log_enabled").unwrap_or(true);
    if !enabled {
        return;
    }

    let log_path = match get_log_path(data_dir) {
        Some(path) => path,
        None => return,
    };

    let sanitize = get_config_bool(data_dir, "action_log_sanitize").unwrap_or(true);
    let args = if sanitize { sanitize_args(&args) } else { args };

    let entry = ActionLog {
        timestamp: Utc::now(),
        data_dir: data_dir.to_string_lossy().to_string(),
        command: command.to_string(),
        args,
        success,
        error,
        duration_ms,
        user: current_user(),
    };

    if let Err(e) = write_log_entry(&log_path, &entry) {
        eprintln!("Warning: Failed to write action log: {}", e);
    }
}

/// Resolve the log file path, honoring the `action_log_path` config override.
fn get_log_path(data_dir: &Path) -> Option<PathBuf> {
    let custom_path = Storage::open(data_dir)
        .ok()
        .and_then(|s| s.get_config("action_log_path").ok().flatten());

    if let Some(path_str) = custom_path {
        return Some(expand_home(Path::new(&path_str)));
    }

    Some(data_dir.join("action.log"))
}

/// Expand ~ in a path to the home directory.
fn expand_home(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    path.to_path_buf()
}

fn write_log_entry(path: &Path, entry: &ActionLog) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string(entry)?;
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", json)?;
    Ok(())
}

/// Sanitize arguments to strip sensitive data and shrink bulky values.
fn sanitize_args(args: &serde_json::Value) -> serde_json::Value {
    match args {
        serde_json::Value::Object(map) => {
            let mut sanitized = serde_json::Map::new();
            for (key, value) in map {
                let key_lower = key.to_lowercase();
                if key_lower.contains("password")
                    || key_lower.contains("token")
                    || key_lower.contains("secret")
                {
                    sanitized.insert(
                        key.clone(),
                        serde_json::Value::String("[REDACTED]".to_string()),
                    );
                } else {
                    sanitized.insert(key.clone(), sanitize_args(value));
                }
            }
            serde_json::Value::Object(sanitized)
        }
        serde_json::Value::Array(arr) => {
            if arr.len() > 10 {
                serde_json::Value::String(format!("[Array with {} items]", arr.len()))
            } else {
                serde_json::Value::Array(arr.iter().map(sanitize_args).collect())
            }
        }
        serde_json::Value::String(s) => {
            if s.len() > 100 {
                serde_json::Value::String(format!("{}... ({} chars)", &s[..97], s.len()))
            } else {
                serde_json::Value::String(s.clone())
            }
        }
        _ => args.clone(),
    }
}

fn get_config_bool(data_dir: &Path, key: &str) -> Option<bool> {
    let storage = Storage::open(data_dir).ok()?;
    let value = storage.get_config(key).ok().flatten()?;
    let parsed = value.to_lowercase();
    Some(parsed == "true" || parsed == "1" || parsed == "yes")
}

fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_sensitive_keys() {
        let value = serde_json::json!({
            "name": "alice",
            "password": "secret123",
            "api_token": "abc123",
            "issue": "Compressor down"
        });
        let sanitized = sanitize_args(&value);

        assert_eq!(sanitized["name"], "alice");
        assert_eq!(sanitized["password"], "[REDACTED]");
        assert_eq!(sanitized["api_token"], "[REDACTED]");
        assert_eq!(sanitized["issue"], "Compressor down");
    }

    #[test]
    fn test_sanitize_long_string() {
        let long_str = "a".repeat(150);
        let value = serde_json::json!(long_str);
        let sanitized = sanitize_args(&value);
        if let serde_json::Value::String(s) = sanitized {
            assert!(s.contains("... (150 chars)"));
        } else {
            panic!("Expected string value");
        }
    }

    #[test]
    fn test_sanitize_large_array() {
        let arr: Vec<i32> = (0..15).collect();
        let sanitized = sanitize_args(&serde_json::json!(arr));
        assert_eq!(sanitized, serde_json::json!("[Array with 15 items]"));
    }

    #[test]
    fn test_sanitize_small_array_unchanged() {
        let value = serde_json::json!([1, 2, 3]);
        assert_eq!(sanitize_args(&value), value);
    }

    #[test]
    fn test_log_entry_written_to_data_dir() {
        let env = crate::test_utils::TestEnv::new();
        env.init_storage();
        log_action(
            env.path(),
            "job start",
            serde_json::json!({"job_id": "rj-0001"}),
            true,
            None,
            12,
        );

        let contents = std::fs::read_to_string(env.path().join("action.log")).unwrap();
        let entry: ActionLog = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
        assert_eq!(entry.command, "job start");
        assert!(entry.success);
    }

    #[test]
    fn test_logging_can_be_disabled() {
        let env = crate::test_utils::TestEnv::new();
        env.init_storage();
        {
            let mut storage = Storage::open(env.path()).unwrap();
            storage.set_config("action_log_enabled", "false").unwrap();
        }
        log_action(env.path(), "user list", serde_json::json!({}), true, None, 1);
        assert!(!env.path().join("action.log").exists());
    }
}
