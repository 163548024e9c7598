//! The layered key/value store behind a session.
//!
//! [`Cache`] is a plain key/value layer with the type check and the hook
//! table applied on every write. [`Configuration`] wraps a `Cache` behind a
//! write lock: it starts locked and can only be written inside
//! [`Configuration::update`].

use crate::config::value::{ConfigValue, to_config_value};
use crate::{Error, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Deref, DerefMut};

/// Write lock attached to the state layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Locked,
    Unlocked,
}

/// A hook runs instead of the plain write for its key.
type Hook = fn(&mut Cache, ConfigValue) -> Result<()>;

/// Keys whose writes derive further entries.
const HOOKS: &[(&str, Hook)] = &[("filename", set_filename), ("logging", set_logging)];

fn hook_for(key: &str) -> Option<Hook> {
    HOOKS
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, hook)| *hook)
}

/// A single configuration layer restricted to JSON-representable values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cache {
    entries: BTreeMap<String, ConfigValue>,
}

impl Cache {
    /// Create an empty layer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a value. Null values count as absent.
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.entries.get(key).filter(|v| !v.is_null())
    }

    /// Get a value or fall back to `default`.
    pub fn get_or(&self, key: &str, default: ConfigValue) -> ConfigValue {
        self.get(key).cloned().unwrap_or(default)
    }

    /// Write a value, running the key's hook if it has one.
    ///
    /// The value is type checked before anything is stored, so a refused
    /// value leaves the layer unchanged.
    pub fn set<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<()> {
        let value = to_config_value(value)?;
        match hook_for(key) {
            Some(hook) => hook(self, value),
            None => {
                self.entries.insert(key.to_string(), value);
                Ok(())
            }
        }
    }

    /// Whether `key` holds a non-null value.
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The layer as a JSON object.
    pub fn to_json(&self) -> ConfigValue {
        ConfigValue::Object(self.entries.clone().into_iter().collect())
    }

    fn insert(&mut self, key: &str, value: ConfigValue) {
        self.entries.insert(key.to_string(), value);
    }
}

impl fmt::Display for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = serde_json::to_string_pretty(&self.entries).map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

/// The state layer: a [`Cache`] that may only be written during a scoped
/// update.
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    entries: Cache,
    lock: LockState,
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}

impl Configuration {
    /// An empty, locked configuration.
    pub fn new() -> Self {
        Self {
            entries: Cache::new(),
            lock: LockState::Locked,
        }
    }

    /// Build a configuration from initial entries and lock it.
    pub fn seeded<I, V>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, V)>,
        V: Serialize,
    {
        let mut config = Self::new();
        config.update(|cfg| {
            for (key, value) in entries {
                cfg.set(&key, &value)?;
            }
            Ok(())
        })?;
        Ok(config)
    }

    pub fn lock_state(&self) -> LockState {
        self.lock
    }

    pub fn is_locked(&self) -> bool {
        self.lock == LockState::Locked
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.entries.get(key)
    }

    pub fn get_or(&self, key: &str, default: ConfigValue) -> ConfigValue {
        self.entries.get_or(key, default)
    }

    /// Write a value. Fails with [`Error::ConfigLocked`] outside an update.
    pub fn set<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<()> {
        if self.is_locked() {
            return Err(Error::ConfigLocked(key.to_string()));
        }
        self.entries.set(key, value)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigValue)> {
        self.entries.iter()
    }

    /// Read-only view of the underlying layer.
    pub fn entries(&self) -> &Cache {
        &self.entries
    }

    /// Run `f` with the lock open.
    ///
    /// The lock closes again on every exit path, including an error returned
    /// by `f` or a panic unwinding through it. Opening the lock while it is
    /// already open fails with [`Error::ReentrantUpdate`].
    pub fn update<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Configuration) -> Result<T>,
    {
        if !self.is_locked() {
            return Err(Error::ReentrantUpdate);
        }
        let mut guard = Unlocked::open(self);
        f(&mut *guard)
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.entries.fmt(f)
    }
}

/// Holds the lock open for as long as it lives.
struct Unlocked<'a> {
    config: &'a mut Configuration,
}

impl<'a> Unlocked<'a> {
    fn open(config: &'a mut Configuration) -> Self {
        config.lock = LockState::Unlocked;
        Self { config }
    }
}

impl Deref for Unlocked<'_> {
    type Target = Configuration;

    fn deref(&self) -> &Configuration {
        self.config
    }
}

impl DerefMut for Unlocked<'_> {
    fn deref_mut(&mut self) -> &mut Configuration {
        self.config
    }
}

impl Drop for Unlocked<'_> {
    fn drop(&mut self) {
        self.config.lock = LockState::Locked;
    }
}

fn set_filename(entries: &mut Cache, value: ConfigValue) -> Result<()> {
    match value {
        ConfigValue::Null => Ok(()),
        ConfigValue::String(filename) if filename.is_empty() => Ok(()),
        ConfigValue::String(filename) => {
            let base = base_name(&filename).to_string();
            entries.insert("filename", ConfigValue::String(filename));
            entries.insert("base_filename", ConfigValue::String(base));
            Ok(())
        }
        other => Err(Error::ConfigType(format!(
            "filename must be a string, not {}",
            other
        ))),
    }
}

fn set_logging(entries: &mut Cache, value: ConfigValue) -> Result<()> {
    if value.is_null() {
        return Ok(());
    }
    let level = normalize_log_level(&value)
        .ok_or_else(|| Error::ConfigType(format!("unknown logging level {}", value)))?;
    entries.insert("logging", ConfigValue::String(level.to_string()));
    Ok(())
}

/// Final path component, split on `/` only.
pub fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Map a level name or a numeric level (10 = debug ... 40 = error) onto
/// a `tracing` filter directive.
pub fn normalize_log_level(value: &ConfigValue) -> Option<&'static str> {
    match value {
        ConfigValue::String(name) => match name.to_ascii_lowercase().as_str() {
            "trace" => Some("trace"),
            "debug" => Some("debug"),
            "info" => Some("info"),
            "warn" | "warning" => Some("warn"),
            "error" | "critical" => Some("error"),
            "off" => Some("off"),
            _ => None,
        },
        ConfigValue::Number(n) => n.as_i64().map(|level| match level {
            i64::MIN..=9 => "trace",
            10..=19 => "debug",
            20..=29 => "info",
            30..=39 => "warn",
            _ => "error",
        }),
        _ => None,
    }
}
