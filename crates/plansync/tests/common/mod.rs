//! Test harness for the plansync binary
//!
//! Every harness owns a temporary directory that serves as working directory,
//! home and database location, so no user config or database leaks in.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use serde_json::Value;
use tempfile::TempDir;

pub const ENV_OVERRIDES: [&str; 9] = [
    "PLANSYNC_DATABASE_URL",
    "PLANSYNC_WORKER_CONCURRENCY",
    "PLANSYNC_LOCK_TTL_MS",
    "PLANSYNC_LOCK_MAX_RETRIES",
    "PLANSYNC_QUEUE_DEBOUNCE_MS",
    "PLANSYNC_QUEUE_ATTEMPTS",
    "PLANSYNC_STORE_KIND",
    "PLANSYNC_STORE_BASE_URL",
    "PLANSYNC_STORE_TOKEN",
];

pub struct Harness {
    dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn database_url(&self) -> String {
        format!("sqlite://{}", self.dir.path().join("plansync.db").display())
    }

    pub fn write_file(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    /// `plansync` bound to this harness's directory and database.
    pub fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("plansync").unwrap();
        cmd.current_dir(self.dir.path())
            .env("HOME", self.dir.path())
            .env("XDG_CONFIG_HOME", self.dir.path().join(".config"))
            .env("RUST_LOG", "warn")
            .arg("--database")
            .arg(self.database_url());
        for var in ENV_OVERRIDES {
            cmd.env_remove(var);
        }
        cmd
    }

    /// Run with `args`, require success and parse stdout as JSON.
    pub fn json(&self, args: &[&str]) -> Value {
        let output = self.cmd().args(args).assert().success().get_output().clone();
        serde_json::from_slice(&output.stdout).unwrap()
    }
}

pub fn single_date_update(user: &str, food: &str) -> String {
    serde_json::json!({
        "orderId": "o1",
        "planId": "p1",
        "currentUserId": user,
        "orderDay": "1700000000000",
        "memberOrders": { "foodId": food, "status": "joined" }
    })
    .to_string()
}
