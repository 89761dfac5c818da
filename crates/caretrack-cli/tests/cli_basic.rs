//! Basic CLI E2E tests.
//!
//! Each test runs the built binary against its own data directory.

use std::path::Path;
use std::process::Command;

const PATIENT: &str = "15551234567";

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(data_dir: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_caretrack-cli"))
        .args(args)
        .env("CARETRACK_DATA_DIR", data_dir)
        .env_remove("CARETRACK_ENV")
        .env_remove("RUST_LOG")
        .env_remove("TWILIO_ACCOUNT_SID")
        .env_remove("TWILIO_AUTH_TOKEN")
        .env_remove("TWILIO_PHONE_NUMBER")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

fn run_ok(data_dir: &Path, args: &[&str]) -> String {
    let (stdout, stderr, code) = run_cli(data_dir, args);
    assert_eq!(code, 0, "{args:?} failed: {stderr}");
    stdout
}

fn register(data_dir: &Path) {
    run_ok(
        data_dir,
        &["patient", "add", PATIENT, "--wake", "7am", "--sleep", "10pm"],
    );
}

#[test]
fn test_config_get_default() {
    let dir = tempfile::tempdir().unwrap();
    let stdout = run_ok(dir.path(), &["config", "get", "dispatch.tolerance_minutes"]);
    assert_eq!(stdout.trim(), "10");
    assert!(dir.path().join("config.toml").exists());
}

#[test]
fn test_help_and_preview_leave_no_files() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("data");

    let (stdout, _, code) = run_cli(&data, &["--help"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("patient"));

    run_ok(
        &data,
        &["schedule", "preview", "--wake", "7am", "--sleep", "10pm"],
    );
    assert!(!data.exists());
}

#[test]
fn test_config_set_then_get() {
    let dir = tempfile::tempdir().unwrap();
    run_ok(dir.path(), &["config", "set", "jobs.tick_seconds", "30"]);
    let stdout = run_ok(dir.path(), &["config", "get", "jobs.tick_seconds"]);
    assert_eq!(stdout.trim(), "30");
}

#[test]
fn test_config_unknown_key_fails() {
    let dir = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(dir.path(), &["config", "get", "nope.missing"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("error:"));
}

#[test]
fn test_patient_add_and_show_json() {
    let dir = tempfile::tempdir().unwrap();
    register(dir.path());

    let stdout = run_ok(dir.path(), &["patient", "show", PATIENT, "--json"]);
    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(json["id"], PATIENT);
    assert_eq!(json["timezone"], "UTC");

    let list = run_ok(dir.path(), &["patient", "list"]);
    assert_eq!(list.trim(), PATIENT);
}

#[test]
fn test_invalid_phone_exits_with_error() {
    let dir = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(dir.path(), &["patient", "add", "12ab"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("error:"));
}

#[test]
fn test_medication_enable_builds_schedule() {
    let dir = tempfile::tempdir().unwrap();
    register(dir.path());
    run_ok(
        dir.path(),
        &[
            "medication", "add", PATIENT, "Aspirin", "--per-day", "2", "--pills", "30", "--enable",
        ],
    );

    let stdout = run_ok(dir.path(), &["schedule", "show", PATIENT]);
    assert_eq!(stdout.trim(), "Aspirin at 8:00 AM, 9:00 PM");
}

#[test]
fn test_custom_times_replace_computed() {
    let dir = tempfile::tempdir().unwrap();
    register(dir.path());
    run_ok(
        dir.path(),
        &["medication", "add", PATIENT, "Aspirin", "--pills", "10", "--enable"],
    );
    run_ok(
        dir.path(),
        &["medication", "set-times", PATIENT, "Aspirin", "9:15am"],
    );

    let stdout = run_ok(dir.path(), &["schedule", "show", PATIENT]);
    assert_eq!(stdout.trim(), "Aspirin at 9:15 AM");

    let (_, stderr, code) = run_cli(
        dir.path(),
        &["medication", "set-times", PATIENT, "Aspirin", "noonish"],
    );
    assert_eq!(code, 1);
    assert!(stderr.contains("noonish"));
}

#[test]
fn test_schedule_preview() {
    let dir = tempfile::tempdir().unwrap();
    let stdout = run_ok(
        dir.path(),
        &["schedule", "preview", "--wake", "7am", "--sleep", "10pm", "--per-day", "2"],
    );
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines, vec!["8:00 AM  x1", "9:00 PM  x1"]);
}

#[test]
fn test_respond_with_nothing_pending() {
    let dir = tempfile::tempdir().unwrap();
    register(dir.path());
    let stdout = run_ok(dir.path(), &["patient", "respond", PATIENT, "D"]);
    assert!(stdout.contains("no pending medication reminders"));
}

#[test]
fn test_respond_rejects_unknown_reply() {
    let dir = tempfile::tempdir().unwrap();
    register(dir.path());
    let (_, _, code) = run_cli(dir.path(), &["patient", "respond", PATIENT, "maybe"]);
    assert_eq!(code, 1);
}

#[test]
fn test_job_run_json() {
    let dir = tempfile::tempdir().unwrap();
    register(dir.path());
    let stdout = run_ok(dir.path(), &["job", "run", "follow-up", "--json"]);
    let report: serde_json::Value = serde_json::from_str(stdout.trim()).unwrap();
    assert_eq!(report["job"], "follow_up");
    assert_eq!(report["errors"], 0);
}

#[test]
fn test_unknown_job_fails() {
    let dir = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(dir.path(), &["job", "run", "laundry"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("unknown job"));
}

#[test]
fn test_unknown_patient_fails() {
    let dir = tempfile::tempdir().unwrap();
    let (_, _, code) = run_cli(dir.path(), &["schedule", "show", PATIENT]);
    assert_eq!(code, 1);
}
