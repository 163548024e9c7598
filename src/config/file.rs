//! Seeding the state layer from configuration files and CLI flags.
//!
//! A session starts from a set of seed entries resolved with this precedence
//! (highest to lowest):
//!
//! 1. CLI flags (passed at runtime)
//! 2. Session config file (`--config <path>`)
//! 3. System config file (`~/.config/memshell/config.toml`)
//! 4. Built-in defaults
//!
//! Config files are TOML. Every top-level key becomes one seed entry and goes
//! through the same type check as any other configuration write.

use crate::Result;
use crate::config::value::{ConfigValue, to_config_value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Built-in defaults, lowest precedence.
const DEFAULTS: &[(&str, DefaultValue)] = &[
    ("renderer", DefaultValue::Str("text")),
    ("paging_limit", DefaultValue::Int(50)),
    ("overwrite", DefaultValue::Bool(false)),
];

enum DefaultValue {
    Str(&'static str),
    Int(i64),
    Bool(bool),
}

impl DefaultValue {
    fn to_value(&self) -> ConfigValue {
        match self {
            DefaultValue::Str(s) => ConfigValue::String(s.to_string()),
            DefaultValue::Int(i) => ConfigValue::from(*i),
            DefaultValue::Bool(b) => ConfigValue::Bool(*b),
        }
    }
}

/// Tracks where a seeded value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    /// Value from a CLI flag
    CliFlag,
    /// Value from the session config file
    Session(PathBuf),
    /// Value from the system config file
    System,
    /// Built-in default value
    Default,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::CliFlag => write!(f, "cli"),
            ValueSource::Session(path) => write!(f, "session:{}", path.display()),
            ValueSource::System => write!(f, "system"),
            ValueSource::Default => write!(f, "default"),
        }
    }
}

/// A resolved value with its source.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<T> {
    pub value: T,
    pub source: ValueSource,
}

impl<T> Resolved<T> {
    pub fn new(value: T, source: ValueSource) -> Self {
        Self { value, source }
    }
}

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct SeedOverrides {
    entries: BTreeMap<String, ConfigValue>,
}

impl SeedOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an override. Values that fail the type check are refused here.
    pub fn with<T: serde::Serialize + ?Sized>(mut self, key: &str, value: &T) -> Result<Self> {
        self.entries
            .insert(key.to_string(), to_config_value(value)?);
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Seed entries with source tracking, in key order.
#[derive(Debug, Clone, Default)]
pub struct ResolvedSeed {
    entries: BTreeMap<String, Resolved<ConfigValue>>,
}

impl ResolvedSeed {
    pub fn get(&self, key: &str) -> Option<&Resolved<ConfigValue>> {
        self.entries.get(key)
    }

    /// Where `key` came from, if it was seeded at all.
    pub fn source(&self, key: &str) -> Option<&ValueSource> {
        self.entries.get(key).map(|r| &r.source)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Resolved<ConfigValue>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Plain key/value pairs, ready for [`crate::SessionBuilder::seed`].
    pub fn values(&self) -> Vec<(String, ConfigValue)> {
        self.entries
            .iter()
            .map(|(k, r)| (k.clone(), r.value.clone()))
            .collect()
    }

    fn layer(&mut self, values: BTreeMap<String, ConfigValue>, source: ValueSource) {
        for (key, value) in values {
            self.entries
                .insert(key, Resolved::new(value, source.clone()));
        }
    }
}

/// Get the system config path (`~/.config/memshell/config.toml`).
///
/// `MSH_CONFIG_DIR` replaces the directory, which keeps tests away from the
/// user's own configuration.
pub fn system_config_path() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("MSH_CONFIG_DIR") {
        return Some(PathBuf::from(dir).join("config.toml"));
    }
    dirs::config_dir().map(|d| d.join("memshell").join("config.toml"))
}

/// Read a TOML config file. A missing file reads as empty.
pub fn read_config_file(path: &Path) -> Result<BTreeMap<String, ConfigValue>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let content = std::fs::read_to_string(path)?;
    let table: toml::Table = toml::from_str(&content)?;

    let mut values = BTreeMap::new();
    for (key, value) in table {
        let value = to_config_value(&value)?;
        values.insert(key, value);
    }
    Ok(values)
}

/// Resolve seed entries with full precedence chain.
///
/// Precedence (highest to lowest):
/// 1. CLI flags (from `overrides`)
/// 2. Session config file
/// 3. System config file
/// 4. Built-in defaults
pub fn resolve_seed(
    system: Option<&Path>,
    session: Option<&Path>,
    overrides: &SeedOverrides,
) -> Result<ResolvedSeed> {
    let mut seed = ResolvedSeed::default();

    let defaults = DEFAULTS
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_value()))
        .collect();
    seed.layer(defaults, ValueSource::Default);

    if let Some(path) = system {
        seed.layer(read_config_file(path)?, ValueSource::System);
    }

    if let Some(path) = session {
        seed.layer(
            read_config_file(path)?,
            ValueSource::Session(path.to_path_buf()),
        );
    }

    seed.layer(overrides.entries.clone(), ValueSource::CliFlag);

    Ok(seed)
}
