use std::io::Write;
use std::process::Command;

use assert_cmd::prelude::*;
use serde_json::Value;
use tempfile::NamedTempFile;

fn config_file(yaml: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    file.write_all(yaml.as_bytes()).expect("write config");
    file
}

fn fast_config() -> NamedTempFile {
    config_file("app:\n  api_latency_ms: 0\n  render_delay_ms: 0\n")
}

fn trellis(config: &NamedTempFile) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("trellis"));
    cmd.arg("--config").arg(config.path());
    cmd.env_remove("TRELLIS_BASE_URL")
        .env_remove("TRELLIS_COMMAND_TIMEOUT_MS")
        .env_remove("TRELLIS_POLL_INTERVAL_MS")
        .env_remove("TRELLIS_WAIT_TIMEOUT_MS")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn list_shows_bundled_suites() {
    let config = fast_config();
    let output = trellis(&config).arg("list").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Account Page"));
    assert!(stdout.contains("stubs the user location"));
}

#[test]
fn run_reports_json_and_succeeds() {
    let config = fast_config();
    let output = trellis(&config)
        .args(["--output", "json", "--log-level", "warn", "run"])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let report: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["totals"]["passed"], 5);
    assert_eq!(report["totals"]["failed"], 0);
    assert_eq!(report["suites"][1]["tests"][0]["status"], "passed");
}

#[test]
fn run_with_no_matching_tests_fails() {
    let config = fast_config();
    trellis(&config)
        .args(["run", "--grep", "no such test"])
        .assert()
        .failure()
        .code(1);
}

#[test]
fn environment_overrides_the_file() {
    let config = config_file("engine:\n  command_timeout_ms: 900\n");
    let output = trellis(&config)
        .env("TRELLIS_COMMAND_TIMEOUT_MS", "1234")
        .args(["config", "get", "engine.command_timeout_ms"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "1234");
}

#[test]
fn validate_rejects_bad_values() {
    let config = config_file("engine:\n  poll_interval_ms: 0\n");
    trellis(&config)
        .args(["config", "validate"])
        .assert()
        .failure();

    let config = config_file("engine: [not, a, map]\n");
    trellis(&config).args(["config", "show"]).assert().failure();
}
