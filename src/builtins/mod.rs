//! Plugins that ship with memshell.
//!
//! These only look at the session itself, so they work before any image or
//! profile is loaded (except `profile`, which needs one).

mod config;
mod info;
mod plugins;
mod profile;

pub use config::ConfigClass;
pub use info::{InfoClass, InfoProvider};
pub use plugins::PluginsClass;
pub use profile::ProfileClass;

use crate::plugin::PluginDirectory;
use std::sync::Arc;

/// The built-in plugin classes.
pub fn directory() -> PluginDirectory {
    PluginDirectory::new()
        .with(Arc::new(InfoClass))
        .with(Arc::new(PluginsClass))
        .with(Arc::new(ConfigClass))
        .with(Arc::new(ProfileClass))
}
