//! Smoke tests for the msh CLI.
//!
//! These tests verify basic CLI functionality:
//! - `msh --version` outputs version info
//! - `msh --help` outputs help text
//! - `msh plugins` lists the built-in plugins

mod common;

use common::TestEnv;
use predicates::prelude::*;

#[test]
fn test_version_flag() {
    TestEnv::new()
        .msh()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("msh"))
        .stdout(predicate::str::contains("0.1.0"));
}

#[test]
fn test_help_flag() {
    TestEnv::new()
        .msh()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("Commands:"))
        .stdout(predicate::str::contains("--profile-path"));
}

#[test]
fn test_plugins_lists_builtins() {
    TestEnv::new()
        .msh()
        .arg("plugins")
        .assert()
        .success()
        .stdout(predicate::str::contains("config"))
        .stdout(predicate::str::contains("info"))
        .stdout(predicate::str::contains("plugins"))
        .stdout(predicate::str::contains("Show the loaded profile").not());
}

#[test]
fn test_info_describes_plugin() {
    TestEnv::new()
        .msh()
        .args(["info", "config"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Show session configuration"))
        .stdout(predicate::str::contains("--cache (flag)"));
}

#[test]
fn test_unknown_subcommand_fails() {
    TestEnv::new()
        .msh()
        .arg("frobnicate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}
