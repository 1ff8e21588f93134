use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use tempfile::TempDir;

#[test]
fn config_init_writes_example_file() {
    let dir = TempDir::new().expect("temp dir");
    let config_path = dir.path().join("config.toml");

    let mut cmd = cargo_bin_cmd!("skybridge");
    cmd.args(["config", "init", "--path"])
        .arg(&config_path)
        .assert()
        .success();

    let content = fs::read_to_string(&config_path).expect("read config");
    assert!(content.contains("max_posts_per_check"));
    assert!(content.contains("bearer_token_env"));
}

#[test]
fn config_init_refuses_to_overwrite() {
    let dir = TempDir::new().expect("temp dir");
    let config_path = dir.path().join("config.toml");
    fs::write(&config_path, "# existing").expect("write config");

    let mut cmd = cargo_bin_cmd!("skybridge");
    cmd.args(["config", "init", "--path"])
        .arg(&config_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn run_without_credentials_fails_and_writes_template() {
    let dir = TempDir::new().expect("temp dir");
    let config_path = dir.path().join("config.toml");

    let mut cmd = cargo_bin_cmd!("skybridge");
    cmd.current_dir(dir.path())
        .env_remove("X_BEARER_TOKEN")
        .env_remove("BLUESKY_APP_PASSWORD")
        .args(["run", "--once", "--config"])
        .arg(&config_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("X_BEARER_TOKEN"));

    // The missing config was replaced with the default template
    let content = fs::read_to_string(&config_path).expect("read config");
    assert!(content.contains("accounts = []"));
}

#[test]
fn run_once_with_zero_accounts_succeeds_in_dry_run() {
    let dir = TempDir::new().expect("temp dir");
    let config_path = dir.path().join("config.toml");

    let mut cmd = cargo_bin_cmd!("skybridge");
    cmd.current_dir(dir.path())
        .env("X_BEARER_TOKEN", "dummy-token")
        .args(["run", "--once", "--dry-run", "--config"])
        .arg(&config_path)
        .assert()
        .success();
}

#[test]
fn doctor_json_reports_missing_credentials() {
    let dir = TempDir::new().expect("temp dir");
    let config_path = dir.path().join("config.toml");

    let mut cmd = cargo_bin_cmd!("skybridge");
    let output = cmd
        .current_dir(dir.path())
        .env_remove("X_BEARER_TOKEN")
        .env_remove("BLUESKY_APP_PASSWORD")
        .args(["doctor", "--json", "--config"])
        .arg(&config_path)
        .output()
        .expect("run doctor");

    assert!(!output.status.success());

    let value: Value = serde_json::from_slice(&output.stdout).expect("valid json");
    assert_eq!(value["overall"], "error");
    assert_eq!(value["config"]["status"], "ok");
    assert_eq!(value["x_read"]["status"], "error");
}
