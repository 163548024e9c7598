//! Configuration storage for a memshell session.
//!
//! A session keeps two layers:
//!
//! ## State layer - explicit user settings (authoritative)
//!
//! A [`Configuration`]: locked after construction, writable only inside
//! [`Configuration::update`]. Closing an update re-synchronizes the owning
//! session (profile, renderer and plugin registry).
//!
//! ## Cache layer - derived values (advisory)
//!
//! A [`Cache`]: plugins store values they computed so later runs can reuse
//! them. It never needs the lock and it never overrides the state layer.
//!
//! ## Value restrictions
//!
//! Both layers only hold values made of null, bool, numbers, strings,
//! sequences and mappings keyed by strings (integer and bool keys are
//! converted). See [`value`].
//!
//! Use the [`file`] module to seed the state layer from config files.

pub mod file;
pub mod store;
pub mod value;

pub use file::{
    Resolved, ResolvedSeed, SeedOverrides, ValueSource, read_config_file, resolve_seed,
    system_config_path,
};
pub use store::{Cache, Configuration, LockState, base_name, normalize_log_level};
pub use value::{ConfigValue, TypeError, to_config_value};
