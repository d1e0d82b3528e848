//! Integration tests for the `cmsi` CLI binary.
//!
//! Scenarios are short enough to play in real time; every run passes a
//! timeout so a regression fails instead of hanging.
#![allow(clippy::unwrap_used)]

use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `cmsi` binary with env isolation.
///
/// Clears the `CMSI_*` env vars the tests rely on and points config
/// directories at a nonexistent path so tests never read a real config.
fn cmsi_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("cmsi");
    cmd.env("HOME", "/tmp/cmsi-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/cmsi-cli-test-nonexistent")
        .env("NO_COLOR", "1")
        .env_remove("CMSI_CONFIG")
        .env_remove("CMSI_OUTPUT")
        .env_remove("CMSI_DOMAIN__EVAC_DELAY_MS")
        .env_remove("CMSI_RUNNER__AUTO_RESET_AFTER_SECS")
        .env_remove("CMSI_RUNNER__TIMEOUT_SECS")
        .env_remove("RUST_LOG");
    cmd
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

fn demo(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../../demos")
        .join(name)
}

fn write_scenario(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

const QUICK_RESET: &str = r#"{
  "id": "quick",
  "name": "Quick reset",
  "events": [
    { "type": "DM_TRIGGER", "zoneId": "ZF1", "offset": 0 },
    { "type": "SYSTEM_RESET", "offset": 0.2 }
  ]
}"#;

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = cmsi_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    cmsi_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("control unit")
            .and(predicate::str::contains("run"))
            .and(predicate::str::contains("plan"))
            .and(predicate::str::contains("config")),
    );
}

#[test]
fn test_version_flag() {
    cmsi_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("cmsi"));
}

#[test]
fn test_invalid_subcommand() {
    let output = cmsi_cmd().arg("foobar").output().unwrap();
    assert!(!output.status.success());
    let text = combined_output(&output);
    assert!(text.contains("foobar") || text.contains("unrecognized"), "{text}");
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    cmsi_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_completions_zsh() {
    cmsi_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

// ── Plan ────────────────────────────────────────────────────────────

#[test]
fn test_plan_table_lists_expanded_sequence() {
    cmsi_cmd()
        .args(["plan"])
        .arg(demo("detector-sweep.yaml"))
        .assert()
        .success()
        .stdout(
            predicate::str::contains("DAI_TRIGGER")
                .and(predicate::str::contains("ZD3"))
                .and(predicate::str::contains("sequence dai-north-2"))
                .and(predicate::str::contains("Dropped sequence steps"))
                .and(predicate::str::contains("kind_mismatch")),
        );
}

#[test]
fn test_plan_json_is_ordered_by_time() {
    let output = cmsi_cmd()
        .args(["plan", "-o", "json"])
        .arg(demo("dm-evacuation.json"))
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));

    let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let at: Vec<u64> = plan["steps"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["at"].as_u64().unwrap())
        .collect();
    assert_eq!(at, vec![0, 2_000, 4_000, 6_000]);
    assert_eq!(plan["steps"][3]["action"]["type"], "SYSTEM_RESET");
}

#[test]
fn test_plan_reads_toml_scenarios() {
    cmsi_cmd()
        .args(["plan", "-o", "plain"])
        .arg(demo("out-of-service.toml"))
        .assert()
        .success()
        .stdout(predicate::str::contains("1000\tDM_TRIGGER\tZF1"));
}

// ── Run ─────────────────────────────────────────────────────────────

#[test]
fn test_run_completes_after_simulated_reset() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_scenario(dir.path(), "quick.json", QUICK_RESET);

    cmsi_cmd()
        .args(["run", "--auto-reset-after", "0", "--timeout", "10"])
        .arg(&file)
        .assert()
        .success()
        .stdout(
            predicate::str::contains("manual_call_point_activated")
                .and(predicate::str::contains("scenario_awaiting_reset"))
                .and(predicate::str::contains("system_reset"))
                .and(predicate::str::contains("completed")),
        );
}

#[test]
fn test_run_json_report() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_scenario(dir.path(), "quick.json", QUICK_RESET);

    let output = cmsi_cmd()
        .args(["run", "-o", "json", "--auto-reset-after", "0", "--timeout", "10"])
        .arg(&file)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["run"]["status"], "completed");
    assert_eq!(report["unit"]["state"]["status"], "IDLE");
    let kinds: Vec<&str> = report["journal"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["kind"].as_str().unwrap())
        .collect();
    assert!(kinds.contains(&"system_reset"), "{kinds:?}");
}

#[test]
fn test_run_without_reset_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_scenario(dir.path(), "quick.json", QUICK_RESET);

    let output = cmsi_cmd()
        .args(["run", "--timeout", "1"])
        .arg(&file)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(8), "{}", combined_output(&output));
    assert!(combined_output(&output).contains("--auto-reset-after"));
}

#[test]
fn test_run_skips_out_of_service_zone() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_scenario(dir.path(), "quick.json", QUICK_RESET);

    cmsi_cmd()
        .args(["run", "--out-of-service", "DM:ZF1", "--auto-reset-after", "0", "--timeout", "10"])
        .arg(&file)
        .assert()
        .success()
        .stdout(
            predicate::str::contains("scenario_step_skipped")
                .and(predicate::str::contains("manual_call_point_activated").not()),
        );
}

#[test]
fn test_run_rejects_malformed_out_of_service_flag() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_scenario(dir.path(), "quick.json", QUICK_RESET);

    let output = cmsi_cmd()
        .args(["run", "--out-of-service", "UGA:ZF1"])
        .arg(&file)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
}

// ── Scenario file errors ────────────────────────────────────────────

#[test]
fn test_missing_scenario_file() {
    let output = cmsi_cmd()
        .args(["plan", "/tmp/cmsi-cli-test-nonexistent/absent.json"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(4));
    assert!(combined_output(&output).contains("not found"));
}

#[test]
fn test_unsupported_and_invalid_scenarios() {
    let dir = tempfile::tempdir().unwrap();

    let txt = write_scenario(dir.path(), "drill.txt", "");
    let output = cmsi_cmd().arg("plan").arg(&txt).output().unwrap();
    assert_eq!(output.status.code(), Some(5));

    let bad = write_scenario(
        dir.path(),
        "bad.json",
        r#"{ "id": "bad", "name": "Bad", "events": [{ "type": "DM_TRIGGER", "zoneId": "ZF1", "offset": -1 }] }"#,
    );
    let output = cmsi_cmd().arg("plan").arg(&bad).output().unwrap();
    assert_eq!(output.status.code(), Some(5));
    assert!(combined_output(&output).contains("invalid offset"));
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_init_show_and_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cmsi").join("config.toml");

    cmsi_cmd()
        .arg("--config")
        .arg(&path)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));

    cmsi_cmd()
        .arg("--config")
        .arg(&path)
        .args(["config", "init"])
        .assert()
        .success();
    assert!(path.exists());

    let output = cmsi_cmd()
        .arg("--config")
        .arg(&path)
        .args(["config", "init"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));

    cmsi_cmd()
        .arg("--config")
        .arg(&path)
        .args(["config", "init", "--force"])
        .assert()
        .success();

    cmsi_cmd()
        .arg("--config")
        .arg(&path)
        .args(["config", "show"])
        .env("CMSI_DOMAIN__EVAC_DELAY_MS", "1234")
        .assert()
        .success()
        .stdout(predicate::str::contains("evac_delay_ms = 1234"));
}

#[test]
fn test_config_defaults_select_output_format() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_scenario(dir.path(), "config.toml", "[defaults]\noutput = \"json\"\n");

    let output = cmsi_cmd()
        .arg("--config")
        .arg(&path)
        .args(["config", "show"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));
    let shown: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(shown["defaults"]["output"], "json");
    assert_eq!(shown["domain"]["evac_delay_ms"], 300_000);
}
