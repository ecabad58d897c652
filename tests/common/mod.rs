//! Common test utilities for rota integration tests.
//!
//! Provides `TestEnv` for isolated test environments that don't pollute
//! the user's real data directory.

#![allow(dead_code)]

use assert_cmd::Command;
pub use tempfile::TempDir;

/// A test environment with an isolated data directory.
///
/// The `rota()` method returns a `Command` that sets `ROTA_DATA_DIR`
/// per-invocation, making tests parallel-safe.
pub struct TestEnv {
    pub data_dir: TempDir,
}

impl TestEnv {
    /// Create a new test environment with an isolated data directory.
    pub fn new() -> Self {
        Self {
            data_dir: TempDir::new().unwrap(),
        }
    }

    /// Create a new test environment and initialize storage.
    pub fn init() -> Self {
        let env = Self::new();
        env.rota().args(["system", "init"]).assert().success();
        env
    }

    /// Get a Command for the rota binary with the isolated data directory.
    pub fn rota(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_rota"));
        cmd.env("ROTA_DATA_DIR", self.data_dir.path());
        cmd
    }

    /// Get the path to the data directory.
    pub fn data_path(&self) -> &std::path::Path {
        self.data_dir.path()
    }

    /// Run a command expected to succeed and parse its JSON stdout.
    pub fn run_json(&self, args: &[&str]) -> serde_json::Value {
        let output = self.rota().args(args).assert().success();
        let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
        serde_json::from_str(&stdout).unwrap()
    }

    /// Add a user and return its ID.
    pub fn add_user(&self, name: &str, admin: bool) -> String {
        let email = format!("{}@example.com", name.to_lowercase().replace(' ', "."));
        let mut args = vec!["user", "add", name, "--email", &email];
        if admin {
            args.push("--admin");
        }
        let result = self.run_json(&args);
        result["user"]["id"].as_str().unwrap().to_string()
    }

    /// Add a site and return its ID.
    pub fn add_site(&self, name: &str) -> String {
        let result = self.run_json(&["site", "add", name, "--client", "Acme"]);
        result["site"]["id"].as_str().unwrap().to_string()
    }

    /// Assign an engineer to a site, acting as the given coordinator.
    pub fn assign(&self, user_id: &str, site_id: &str, coordinator_id: &str) {
        self.rota()
            .args(["--user", coordinator_id, "assign", user_id, site_id])
            .assert()
            .success();
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}
