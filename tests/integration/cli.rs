//! Integration tests for the rerunkit demo binary
//!
//! Every run gets its own data directory so the real home directory is
//! never touched.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

use super::common::determinism::{test_data_dir, TEST_ENV};

fn rerunkit(data_dir: &tempfile::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("rerunkit").expect("binary should build");
    cmd.envs(TEST_ENV.iter().copied())
        .arg("--data-dir")
        .arg(data_dir.path());
    cmd
}

#[test]
fn test_counter_three_reruns() {
    let data_dir = test_data_dir();

    rerunkit(&data_dir)
        .args(["counter", "--reruns", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("rerun 3: Increment -> counter = 3"))
        .stdout(predicate::str::contains("Counter value: 3"));
}

#[test]
fn test_counter_reset() {
    let data_dir = test_data_dir();

    rerunkit(&data_dir)
        .args(["counter", "--reruns", "4", "--reset-at", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("rerun 3: Reset -> counter = 0"))
        .stdout(predicate::str::contains("Counter value: 1"));
}

#[test]
fn test_square_runs_body_once() {
    let data_dir = test_data_dir();

    rerunkit(&data_dir)
        .args(["square", "--value", "7", "--calls", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("call 3: square(7) = 49"))
        .stdout(predicate::str::contains("Body ran 1 time(s)"))
        .stdout(predicate::str::contains("Cache hits: 2, misses: 1"));
}

#[test]
fn test_load_data_hits_cache() {
    let data_dir = test_data_dir();

    rerunkit(&data_dir)
        .args(["load-data", "--rows", "100", "--calls", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("cached 100 rows"))
        .stdout(predicate::str::contains("Cache hits: 1, misses: 1"))
        .stdout(predicate::str::contains("Cleared 1 cache(s)"));
}

#[test]
fn test_config_defaults_and_first_run_file() {
    let data_dir = test_data_dir();

    rerunkit(&data_dir)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("idle_timeout_secs = 3600"))
        .stdout(predicate::str::contains("max_entries").not());

    assert!(data_dir.path().join("config.toml").exists());
}

#[test]
fn test_explicit_config_file() {
    let data_dir = test_data_dir();
    let config_file = data_dir.path().join("custom.toml");
    fs::write(
        &config_file,
        "[cache]\nttl_secs = 30\nmax_entries = 10\n\n[session]\nidle_timeout_secs = 90\n",
    )
    .unwrap();

    rerunkit(&data_dir)
        .arg("--config")
        .arg(&config_file)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("ttl_secs = 30"))
        .stdout(predicate::str::contains("max_entries = 10"))
        .stdout(predicate::str::contains("idle_timeout_secs = 90"));
}

#[test]
fn test_invalid_default_config_fails() {
    let data_dir = test_data_dir();
    fs::write(data_dir.path().join("config.toml"), "[cache]\nttl_secs = 0\n").unwrap();

    rerunkit(&data_dir)
        .arg("config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("loading config"))
        .stderr(predicate::str::contains("ttl_secs"));
}

#[test]
fn test_config_output_reads_back() {
    let data_dir = test_data_dir();
    let config_file = data_dir.path().join("odd.toml");
    fs::write(&config_file, "log_filter = \"warn\\u007F\"\n").unwrap();

    let output = rerunkit(&data_dir)
        .arg("--config")
        .arg(&config_file)
        .arg("config")
        .output()
        .unwrap();
    assert!(output.status.success());

    let rendered = data_dir.path().join("rendered.toml");
    fs::write(&rendered, &output.stdout).unwrap();

    rerunkit(&data_dir)
        .arg("--config")
        .arg(&rendered)
        .arg("config")
        .assert()
        .success()
        .stdout(String::from_utf8(output.stdout).unwrap());
}

#[test]
fn test_missing_config_file_fails() {
    let data_dir = test_data_dir();

    rerunkit(&data_dir)
        .arg("--config")
        .arg(data_dir.path().join("missing.toml"))
        .arg("config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("loading config"));
}

#[test]
fn test_invalid_config_value_fails() {
    let data_dir = test_data_dir();
    let config_file = data_dir.path().join("zero.toml");
    fs::write(&config_file, "[cache]\nmax_entries = 0\n").unwrap();

    rerunkit(&data_dir)
        .arg("--config")
        .arg(&config_file)
        .args(["square", "--value", "2"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_entries"));
}
