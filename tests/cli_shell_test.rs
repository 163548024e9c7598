//! Integration tests for the interactive shell reading from stdin.

mod common;

use common::TestEnv;
use predicates::prelude::*;

#[test]
fn test_shell_is_default_command() {
    TestEnv::new()
        .msh()
        .write_stdin("get renderer\nquit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("msh> "))
        .stdout(predicate::str::contains("\"text\""));
}

#[test]
fn test_shell_runs_plugins_and_repeats() {
    let output = TestEnv::new()
        .msh()
        .arg("shell")
        .write_stdin("plugins\nv\n")
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert_eq!(stdout.matches("description").count(), 2);
}

#[test]
fn test_shell_set_profile_activates_plugin() {
    let env = TestEnv::new();
    env.write_default_profile("Win10x64", "windows");
    env.msh()
        .write_stdin("set profile Win10x64\nprofile\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Profile Win10x64"));
}

#[test]
fn test_shell_failures_do_not_end_session() {
    TestEnv::new()
        .msh()
        .write_stdin("nosuchplugin\ninfo\nset filename 3\nhelp config\n")
        .assert()
        .success()
        .stderr(predicate::str::contains("Plugin nosuchplugin is not active"))
        .stderr(predicate::str::contains("info needs a plugin name"))
        .stdout(predicate::str::contains("Error: Configuration parameters must be simple types"))
        .stdout(predicate::str::contains("Show session configuration"));
}

#[test]
fn test_shell_summary() {
    TestEnv::new()
        .msh()
        .args(["--filename", "/images/mem.raw"])
        .write_stdin("summary\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("msh 0.1.0"))
        .stdout(predicate::str::contains("Session started"))
        .stdout(predicate::str::contains("base_filename = \"mem.raw\""))
        .stdout(predicate::str::contains("Profile: none"));
}

#[test]
fn test_shell_survives_unwritable_output_file() {
    let env = TestEnv::new();
    let target = env.path().join("no_such_dir").join("out.txt");
    env.msh()
        .write_stdin(format!("plugins > {}\nget renderer\n", target.display()))
        .assert()
        .success()
        .stdout(predicate::str::contains("Error: IO error"))
        .stdout(predicate::str::contains("\"text\""));
}
