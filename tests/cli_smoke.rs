//! Behavioural smoke tests for the CLI entrypoint.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::str::contains;
use tempfile::TempDir;

const CONFIG_VARS: [&str; 6] = [
    "VOLPORT_CONFIG_PATH",
    "VOLPORT_REGION",
    "VOLPORT_ZONE",
    "VOLPORT_BUCKET",
    "AWS_REGION",
    "AWS_PROFILE",
];

#[test]
fn help_lists_subcommands() {
    let mut cmd = cargo_bin_cmd!("volport");
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(contains("create"))
        .stdout(contains("attach"));
}

#[test]
fn missing_subcommand_prints_usage() {
    let mut cmd = cargo_bin_cmd!("volport");
    cmd.assert().failure().stderr(contains("Usage"));
}

#[test]
fn invalid_size_is_rejected_before_any_remote_call() {
    let mut cmd = cargo_bin_cmd!("volport");
    cmd.args(["create", "db1", "--size", "lots"])
        .assert()
        .failure()
        .code(1)
        .stderr(contains("invalid --size"));
}

#[test]
fn list_without_configuration_reports_missing_fields() {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let mut cmd = cargo_bin_cmd!("volport");
    for var in CONFIG_VARS {
        cmd.env_remove(var);
    }
    cmd.env("HOME", tmp.path())
        .env("XDG_CONFIG_HOME", tmp.path().join("config"))
        .current_dir(tmp.path())
        .arg("list")
        .assert()
        .failure()
        .code(1)
        .stderr(contains("configuration error"))
        .stderr(contains("VOLPORT_REGION"));
}
