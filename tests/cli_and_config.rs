//! Layered configuration and the `rdharness` binary end to end.

#[macro_use]
mod common;

use std::io::Write as _;
use std::path::Path;
use std::process::{Command, Output};

use common::init_test_logging;
use rdharness::config::{ConfigError, ConfigLoader};
use rdharness::error::FailureCode;

fn init_test(name: &str) {
    init_test_logging();
    test_phase!(name);
}

fn binary_path() -> &'static Path {
    Path::new(env!("CARGO_BIN_EXE_rdharness"))
}

fn run_binary(args: &[&str]) -> Output {
    Command::new(binary_path())
        .args(args)
        .env_remove("RDHARNESS_LOG")
        .output()
        .expect("spawn rdharness")
}

fn write_yaml(dir: &tempfile::TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("harness.yaml");
    let mut file = std::fs::File::create(&path).expect("create yaml");
    file.write_all(body.as_bytes()).expect("write yaml");
    path
}

#[test]
fn file_then_env_then_override() {
    init_test("file_then_env_then_override");
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_yaml(
        &dir,
        "packet:\n  element_count: 32\n  max_level: 5\nrun:\n  test_sets: 2\n  seed: 11\n",
    );
    let env = vec![
        ("RDHARNESS_RUN_TEST_SETS".to_string(), "7".to_string()),
        ("RDHARNESS_RUN_SEED".to_string(), "0x10".to_string()),
        ("UNRELATED".to_string(), "ignored".to_string()),
    ];
    let config = ConfigLoader::new()
        .file(&path)
        .override_value("RDHARNESS_RUN_SEED", "99")
        .load_with_env(env)
        .expect("load");

    assert_eq!(config.packet.element_count, 32);
    assert_eq!(config.packet.max_level, 5);
    assert_with_log!(config.run.test_sets == 7, "env wins over file", 7, config.run.test_sets);
    assert_with_log!(
        config.run.seed == Some(99),
        "override wins over env",
        Some(99),
        config.run.seed
    );
    test_complete!("file_then_env_then_override");
}

#[test]
fn unknown_yaml_field_is_rejected() {
    init_test("unknown_yaml_field_is_rejected");
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_yaml(&dir, "run:\n  test_set: 3\n");
    let err = ConfigLoader::new()
        .file(&path)
        .load_with_env(Vec::new())
        .expect_err("typo");
    assert!(matches!(err, ConfigError::Parse(_)), "{err}");
    test_complete!("unknown_yaml_field_is_rejected");
}

#[test]
fn invalid_layered_value_fails_validation() {
    init_test("invalid_layered_value_fails_validation");
    let err = ConfigLoader::new()
        .override_value("RDHARNESS_PACKET_ELEMENT_COUNT", "0")
        .load_with_env(Vec::new())
        .expect_err("zero elements");
    assert!(matches!(err, ConfigError::InvalidElementCount));
    test_complete!("invalid_layered_value_fails_validation");
}

#[test]
fn cli_simulate_passes_and_writes_status() {
    init_test("cli_simulate_passes_and_writes_status");
    let dir = tempfile::tempdir().expect("tempdir");
    let status = dir.path().join("status");
    let status_arg = status.to_string_lossy().to_string();
    let output = run_binary(&[
        "--format",
        "json",
        "-q",
        "--status-file",
        &status_arg,
        "simulate",
        "--sets",
        "3",
        "--seed",
        "5",
    ]);
    assert_eq!(output.status.code(), Some(0), "{output:?}");

    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("json report");
    assert_eq!(report["sets_completed"], 3);
    assert_eq!(report["responses_verified"], 12);
    assert_eq!(report["seed"], 5);
    assert_eq!(std::fs::read_to_string(&status).expect("status"), "1\n");
    test_complete!("cli_simulate_passes_and_writes_status");
}

#[test]
fn cli_injected_duplicate_is_test_failure() {
    init_test("cli_injected_duplicate_is_test_failure");
    let dir = tempfile::tempdir().expect("tempdir");
    let status = dir.path().join("status");
    let status_arg = status.to_string_lossy().to_string();
    let output = run_binary(&[
        "--format",
        "json",
        "-q",
        "--status-file",
        &status_arg,
        "simulate",
        "--seed",
        "5",
        "--fault",
        "duplicate",
        "--fault-level",
        "2",
    ]);
    assert_eq!(output.status.code(), Some(10), "{output:?}");

    // Logs precede the structured error on stderr.
    let stderr = String::from_utf8_lossy(&output.stderr);
    let last = stderr.lines().rev().find(|l| !l.trim().is_empty()).expect("stderr");
    let error: serde_json::Value = serde_json::from_str(last).expect("json error");
    assert_eq!(error["type"], "duplicate");
    assert_eq!(error["exit_code"], 10);
    assert_eq!(error["context"]["seed"], 5);

    let word: u64 = std::fs::read_to_string(&status)
        .expect("status")
        .trim()
        .parse()
        .expect("decimal");
    assert_eq!(word & 1, 1);
    let unpacked = FailureCode::unpack(word >> 1);
    assert_eq!(unpacked.class, 3);
    assert_eq!(unpacked.phase, 2);
    test_complete!("cli_injected_duplicate_is_test_failure");
}

#[test]
fn cli_failure_reports_clock_seed() {
    init_test("cli_failure_reports_clock_seed");
    let output = run_binary(&["-q", "--format", "json", "simulate", "--fault", "corrupt"]);
    assert_eq!(output.status.code(), Some(10), "{output:?}");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!stderr.contains('\u{1b}'), "escape codes in piped stderr: {stderr}");
    let last = stderr.lines().rev().find(|l| !l.trim().is_empty()).expect("stderr");
    let error: serde_json::Value = serde_json::from_str(last).expect("json error");
    assert_eq!(error["type"], "data_mismatch");
    assert_with_log!(
        error["context"]["seed"].is_u64(),
        "seed present for replay",
        "u64",
        error["context"]["seed"]
    );
    test_complete!("cli_failure_reports_clock_seed");
}

#[test]
fn cli_bad_config_is_user_error() {
    init_test("cli_bad_config_is_user_error");
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_yaml(&dir, "packet:\n  element_count: 0\n");
    let config_arg = path.to_string_lossy().to_string();
    let output = run_binary(&["-q", "--config", &config_arg, "simulate"]);
    assert_eq!(output.status.code(), Some(1), "{output:?}");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("element_count"), "{stderr}");
    test_complete!("cli_bad_config_is_user_error");
}
