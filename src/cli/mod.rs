//! CLI argument definitions for msh.

use crate::Result;
use crate::config::SeedOverrides;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// msh - an interactive shell for memory forensics plugins.
///
/// With no subcommand, msh reads commands from stdin.
#[derive(Parser, Debug)]
#[command(name = "msh")]
#[command(author, version, about = "Run memory forensics plugins from a configured session", long_about = None)]
pub struct Cli {
    /// Session config file (TOML), layered over the system config
    #[arg(long, global = true, env = "MSH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Profile to load (name or path)
    #[arg(long, global = true)]
    pub profile: Option<String>,

    /// Directory to search for profiles. Repeatable; later entries win.
    #[arg(long = "profile-path", global = true)]
    pub profile_path: Vec<String>,

    /// Image file to analyze
    #[arg(short = 'f', long, global = true)]
    pub filename: Option<String>,

    /// Output renderer (text or json)
    #[arg(long, global = true)]
    pub renderer: Option<String>,

    /// Pager command for long output, e.g. "less -R"
    #[arg(long, global = true, env = "MSH_PAGER")]
    pub pager: Option<String>,

    /// Output longer than this many lines goes to the pager
    #[arg(long = "paging-limit", global = true)]
    pub paging_limit: Option<u64>,

    /// Allow replacing existing output files
    #[arg(long, global = true)]
    pub overwrite: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long = "log-level", global = true)]
    pub log_level: Option<String>,

    /// Inspect unexpected plugin failures instead of exiting
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Top-level commands
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Run one plugin and exit
    ///
    /// Everything after the plugin name is passed to the plugin as flags,
    /// e.g. `msh run pslist --pid 4`.
    Run {
        /// Write output to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Plugin name
        plugin: String,

        /// Flags for the plugin
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        flags: Vec<String>,
    },

    /// List plugins active for the current profile
    Plugins,

    /// Describe a plugin
    Info {
        /// Plugin name
        plugin: String,
    },

    /// Show the session configuration
    Config {
        /// Show where each seeded value came from
        #[arg(long)]
        sources: bool,
    },

    /// Read commands from stdin (the default)
    Shell,
}

impl Cli {
    /// Seed values given on the command line.
    pub fn overrides(&self) -> Result<SeedOverrides> {
        let mut overrides = SeedOverrides::new();
        if let Some(profile) = &self.profile {
            overrides = overrides.with("profile", profile)?;
        }
        if !self.profile_path.is_empty() {
            overrides = overrides.with("profile_path", &self.profile_path)?;
        }
        if let Some(filename) = &self.filename {
            overrides = overrides.with("filename", filename)?;
        }
        if let Some(renderer) = &self.renderer {
            overrides = overrides.with("renderer", renderer)?;
        }
        if let Some(pager) = &self.pager {
            overrides = overrides.with("pager", pager)?;
        }
        if let Some(limit) = self.paging_limit {
            overrides = overrides.with("paging_limit", &limit)?;
        }
        if self.overwrite {
            overrides = overrides.with("overwrite", &true)?;
        }
        if let Some(level) = &self.log_level {
            overrides = overrides.with("logging", level)?;
        }
        if self.debug {
            overrides = overrides.with("debug", &true)?;
        }
        Ok(overrides)
    }
}
