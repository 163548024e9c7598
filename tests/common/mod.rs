//! Common test utilities for msh integration tests.
//!
//! Provides `TestEnv` for isolated test environments that don't read the
//! user's `~/.config/memshell/` or `~/.local/share/memshell/` directories.

#![allow(dead_code)]

use assert_cmd::Command;
use std::path::{Path, PathBuf};
pub use tempfile::TempDir;

/// A test environment with isolated config and data directories.
///
/// - `work_dir`: the working directory for commands (output files land here)
/// - `config_dir`: holds the system config (via `MSH_CONFIG_DIR`)
/// - `data_dir`: holds default profiles under `profiles/` (via `MSH_DATA_DIR`)
///
/// The `msh()` method sets the variables per-command, so tests can run in
/// parallel.
pub struct TestEnv {
    pub work_dir: TempDir,
    pub config_dir: TempDir,
    pub data_dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            work_dir: TempDir::new().unwrap(),
            config_dir: TempDir::new().unwrap(),
            data_dir: TempDir::new().unwrap(),
        }
    }

    /// A Command for the msh binary with isolated directories.
    pub fn msh(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_msh"));
        cmd.current_dir(self.work_dir.path());
        cmd.env("MSH_CONFIG_DIR", self.config_dir.path());
        cmd.env("MSH_DATA_DIR", self.data_dir.path());
        cmd.env_remove("MSH_CONFIG");
        cmd.env_remove("MSH_PAGER");
        cmd.env_remove("MSH_LOG");
        cmd
    }

    pub fn path(&self) -> &Path {
        self.work_dir.path()
    }

    /// Write the system config file.
    pub fn write_system_config(&self, content: &str) {
        std::fs::write(self.config_dir.path().join("config.toml"), content).unwrap();
    }

    /// Write a file into the working directory and return its path.
    pub fn write_file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.work_dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    /// Write `<data_dir>/profiles/<name>.json` so the default search finds it.
    pub fn write_default_profile(&self, name: &str, os: &str) {
        let dir = self.data_dir.path().join("profiles");
        std::fs::create_dir_all(&dir).unwrap();
        let body = serde_json::json!({ "os": os, "arch": "amd64" });
        std::fs::write(dir.join(format!("{}.json", name)), body.to_string()).unwrap();
    }

    /// Write `<work_dir>/<root>/<name>.json` and return the root directory.
    pub fn write_profile(&self, root: &str, name: &str, os: &str) -> String {
        let dir = self.work_dir.path().join(root);
        std::fs::create_dir_all(&dir).unwrap();
        let body = serde_json::json!({ "os": os, "root": root });
        std::fs::write(dir.join(format!("{}.json", name)), body.to_string()).unwrap();
        dir.to_string_lossy().into_owned()
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}
