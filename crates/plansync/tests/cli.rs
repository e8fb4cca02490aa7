// Integration tests have relaxed clippy settings.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::too_many_lines
)]
//! Command-line contract of the `plansync` binary.

mod common;

use common::{single_date_update, Harness, ENV_OVERRIDES};
use predicates::prelude::*;
use serde_json::json;

#[test]
fn missing_subcommand_is_an_error() {
    let harness = Harness::new();
    harness.cmd().assert().failure();
}

#[test]
fn submit_enqueues_a_job_with_a_stable_dedup_key() {
    let harness = Harness::new();

    let first = harness
        .cmd()
        .args(["submit", "--file", "-"])
        .write_stdin(single_date_update("u1", "pho"))
        .assert()
        .success()
        .get_output()
        .clone();
    let first: serde_json::Value = serde_json::from_slice(&first.stdout).unwrap();
    assert_eq!(first["priority"], json!(1));
    assert_eq!(first["superseded"], json!(0));
    assert_eq!(first["dedupKey"].as_str().unwrap().len(), 64);

    let path = harness.write_file("update.json", &single_date_update("u1", "banh-mi"));
    let second = harness.json(&["submit", "--file", path.to_str().unwrap()]);
    assert_eq!(second["dedupKey"], first["dedupKey"]);
    assert_eq!(second["superseded"], json!(1));

    let stats = harness.json(&["queue", "stats"]);
    assert_eq!(stats["waiting"], json!(1));
    assert_eq!(stats["completed"], json!(0));

    let jobs = harness.json(&["queue", "list", "--status", "waiting"]);
    assert_eq!(jobs.as_array().unwrap().len(), 1);
    assert_eq!(jobs[0]["update"]["memberOrders"]["foodId"], json!("banh-mi"));
}

#[test]
fn submit_rejects_blank_identifiers() {
    let harness = Harness::new();
    harness
        .cmd()
        .args(["submit", "--file", "-"])
        .write_stdin(single_date_update("  ", "pho"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("currentUserId cannot be blank"));

    assert_eq!(harness.json(&["queue", "stats"])["waiting"], json!(0));
}

#[test]
fn submit_rejects_malformed_json() {
    let harness = Harness::new();
    harness
        .cmd()
        .args(["submit", "--file", "-"])
        .write_stdin("{ not json")
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid plan update"));
}

#[test]
fn queue_list_rejects_unknown_status() {
    let harness = Harness::new();
    harness
        .cmd()
        .args(["queue", "list", "--status", "paused"])
        .assert()
        .failure();
}

#[test]
fn queue_show_unknown_job_fails() {
    let harness = Harness::new();
    harness
        .cmd()
        .args(["queue", "show", "42"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("job 42 not found"));
}

#[test]
fn reclaim_on_an_idle_queue_reclaims_nothing() {
    let harness = Harness::new();
    let out = harness.json(&["queue", "reclaim", "--older-than-ms", "1000"]);
    assert_eq!(out, json!({ "reclaimed": 0 }));
}

#[test]
fn unheld_lock_reports_not_held() {
    let harness = Harness::new();
    let out = harness.json(&["lock", "show", "p1"]);
    assert_eq!(out, json!({ "resource": "plan:p1", "held": false }));

    let out = harness.json(&["lock", "release", "p1", "--token", "nobody"]);
    assert_eq!(out, json!({ "released": false }));
}

#[test]
fn doc_put_then_show() {
    let harness = Harness::new();
    let attrs = harness.write_file("plan.json", r#"{"title":"Team lunch","orderDetail":{}}"#);

    harness.json(&["doc", "put", "p1", "--file", attrs.to_str().unwrap()]);
    let doc = harness.json(&["doc", "show", "p1"]);
    assert_eq!(doc["id"], json!("p1"));
    assert_eq!(doc["attributes"]["title"], json!("Team lunch"));
}

#[test]
fn doc_show_missing_document_fails() {
    let harness = Harness::new();
    harness
        .cmd()
        .args(["doc", "show", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not found"));
}

#[test]
fn project_config_is_validated() {
    let harness = Harness::new();
    harness.write_file("plansync.toml", "[worker]\nconcurrency = 0\n");
    harness
        .cmd()
        .args(["queue", "stats"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("concurrency"));
}

#[test]
fn explicit_config_must_exist() {
    let harness = Harness::new();
    harness
        .cmd()
        .args(["--config", "missing.toml", "queue", "stats"])
        .assert()
        .failure();
}

/// Seed documents, submit, run a worker until the job completes, then stop
/// it with SIGTERM and read the shutdown report.
#[cfg(unix)]
#[test]
fn worker_applies_submission_and_reports_on_sigterm() {
    use std::{
        process::{Command, Stdio},
        time::{Duration, Instant},
    };

    let harness = Harness::new();
    let config = harness.write_file(
        "fast.toml",
        "[worker]\nconcurrency = 2\npoll_interval_ms = 20\n\n[queue]\ndebounce_ms = 0\n",
    );
    let config = config.to_str().unwrap();

    let order = harness.write_file("order.json", r#"{"participants":["u1"],"anonymous":[]}"#);
    let plan = harness.write_file("plan.json", r#"{"title":"Team lunch","orderDetail":{}}"#);
    harness.json(&["doc", "put", "o1", "--file", order.to_str().unwrap()]);
    harness.json(&["doc", "put", "p1", "--file", plan.to_str().unwrap()]);

    harness
        .cmd()
        .args(["--config", config, "submit", "--file", "-"])
        .write_stdin(single_date_update("u1", "pho"))
        .assert()
        .success();

    let bin = assert_cmd::cargo::cargo_bin("plansync");
    let mut worker = Command::new(bin);
    worker
        .current_dir(harness.path())
        .env("HOME", harness.path())
        .env("XDG_CONFIG_HOME", harness.path().join(".config"))
        .env("RUST_LOG", "warn")
        .args(["--database", &harness.database_url(), "--config", config, "work"])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    for var in ENV_OVERRIDES {
        worker.env_remove(var);
    }
    let worker = worker.spawn().unwrap();

    let deadline = Instant::now() + Duration::from_secs(20);
    loop {
        let stats = harness.json(&["queue", "stats"]);
        if stats["completed"] == json!(1) {
            break;
        }
        assert!(Instant::now() < deadline, "job never completed: {stats}");
        std::thread::sleep(Duration::from_millis(50));
    }
    // Completion is observed through the database; give the worker a moment
    // to reach its signal wait before interrupting it.
    std::thread::sleep(Duration::from_millis(300));

    let status = Command::new("kill")
        .args(["-TERM", &worker.id().to_string()])
        .status()
        .unwrap();
    assert!(status.success());

    let output = worker.wait_with_output().unwrap();
    assert!(
        output.status.success(),
        "worker exited with {:?}: {}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["completed"], json!(1));
    assert_eq!(report["abandoned"], json!([]));

    let plan = harness.json(&["doc", "show", "p1"]);
    assert_eq!(
        plan["attributes"]["orderDetail"]["1700000000000"]["memberOrders"]["u1"]["foodId"],
        json!("pho")
    );
    assert_eq!(plan["attributes"]["title"], json!("Team lunch"));
}
