//! CLI integration tests for the `pool-server` binary's ambient CLI surface
//! (§8), exercising the compiled process directly rather than unit-level
//! handler calls.

#![allow(clippy::expect_used)]

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn help_flag_prints_usage_and_exits_successfully() {
    let mut cmd = Command::cargo_bin("pool-server").expect("binary should build");
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("pool-server"));
}

#[test]
fn version_flag_exits_successfully() {
    let mut cmd = Command::cargo_bin("pool-server").expect("binary should build");
    cmd.arg("--version");
    cmd.assert().success();
}

/// §7: `ConfigMissing` is fatal at `init()` when the child command is
/// empty, which is the case for every fresh install before a config file
/// is written. Pointing `HOME` at an empty temp dir guarantees
/// `~/.pool-server/config.toml` does not exist, so the binary runs on
/// pure defaults and must fail fast rather than bind a listener.
#[cfg(unix)]
#[test]
fn missing_child_command_fails_fast_instead_of_binding_a_listener() {
    let temp = tempfile::tempdir().expect("tempdir should be created");
    let mut cmd = Command::cargo_bin("pool-server").expect("binary should build");
    cmd.env("HOME", temp.path());
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("child command must not be empty"));
}

/// A config file that isn't valid TOML is rejected during loading, before
/// `PoolManager::init()` is ever called; `ServerError::Config` is
/// surfaced through `main`'s `anyhow::Result` rather than panicking.
#[test]
fn malformed_config_file_fails_with_a_configuration_error() {
    let temp = tempfile::tempdir().expect("tempdir should be created");
    let config_path = temp.path().join("bad.toml");
    std::fs::write(&config_path, "this is not valid toml {{{")
        .expect("config file should be writable");

    let mut cmd = Command::cargo_bin("pool-server").expect("binary should build");
    cmd.args(["--config", config_path.to_str().expect("path should be utf8")]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("configuration error"));
}
