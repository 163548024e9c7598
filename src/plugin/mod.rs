//! Plugin contracts.
//!
//! A [`PluginClass`] describes a command: its name, documentation, declared
//! arguments, and the profiles it applies to. Instantiating a class against a
//! session yields a [`Plugin`], which renders its output into a
//! [`Renderer`](crate::render::Renderer).
//!
//! Plugins report failures through [`PluginError`]; the dispatch pipeline
//! triages them by variant.

pub mod args;
pub mod registry;

pub use args::{ArgumentMapper, ClapArgumentMapper};
pub use registry::{PluginDirectory, PluginHandle, PluginRegistry};

use crate::profile::Profile;
use crate::render::Renderer;
use crate::session::Session;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Errors raised by plugins while being constructed or rendered.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// The plugin refused its arguments.
    #[error("{0}")]
    InvalidArgs(String),

    /// A recoverable, domain-level failure.
    #[error("{0}")]
    Failed(String),

    /// The user cancelled the command.
    #[error("Interrupted")]
    Interrupted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Anything else.
    #[error("{0}")]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

/// Kind of value an argument takes on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Bool,
    Int,
    Str,
    List,
}

impl fmt::Display for ArgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgKind::Bool => write!(f, "flag"),
            ArgKind::Int => write!(f, "int"),
            ArgKind::Str => write!(f, "string"),
            ArgKind::List => write!(f, "list"),
        }
    }
}

/// A declared plugin argument.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgSpec {
    pub name: String,
    pub kind: ArgKind,
    pub help: String,
    pub default: Option<Value>,
}

impl ArgSpec {
    pub fn new(name: impl Into<String>, kind: ArgKind, help: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            help: help.into(),
            default: None,
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

/// Positional and keyword arguments for one plugin invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PluginArgs {
    positional: Vec<Value>,
    named: BTreeMap<String, Value>,
}

impl PluginArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`PluginArgs::insert`].
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.named.insert(key.to_string(), value.into());
    }

    pub fn push_positional(&mut self, value: impl Into<Value>) {
        self.positional.push(value.into());
    }

    pub fn positional(&self) -> &[Value] {
        &self.positional
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.named.get(key)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_i64)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.named.contains_key(key)
    }

    /// Keyword arguments in key order.
    pub fn named(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.named.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }

    /// Copy keyword arguments from `other` that are not already set here.
    /// Positional arguments from `other` are used only when there are none.
    pub fn fill_missing(&mut self, other: &PluginArgs) {
        for (key, value) in &other.named {
            self.named
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        if self.positional.is_empty() {
            self.positional = other.positional.clone();
        }
    }
}

/// A command that can be rendered.
pub trait Plugin {
    fn name(&self) -> &str;

    fn render(&mut self, renderer: &mut dyn Renderer) -> Result<(), PluginError>;
}

/// The description and constructor of a plugin.
pub trait PluginClass {
    /// Registered name. Classes with an empty name are never registered.
    fn name(&self) -> &str;

    fn doc(&self) -> &str;

    /// Declared arguments, in display order.
    fn args(&self) -> Vec<ArgSpec> {
        Vec::new()
    }

    /// Whether the plugin applies to `profile`.
    fn is_active(&self, profile: Option<&Profile>) -> bool {
        let _ = profile;
        true
    }

    fn instantiate(
        &self,
        session: &Session,
        args: &PluginArgs,
    ) -> Result<Box<dyn Plugin>, PluginError>;
}

/// Documentation and argument defaults for a plugin class.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginInfo {
    pub name: String,
    pub doc: String,
    pub args: Vec<ArgSpec>,
}

impl PluginInfo {
    pub fn from_class(class: &dyn PluginClass) -> Self {
        Self {
            name: class.name().to_string(),
            doc: class.doc().trim().to_string(),
            args: class.args(),
        }
    }

    /// `(name, default)` for every declared argument; null when the argument
    /// has no default.
    pub fn default_args(&self) -> Vec<(String, Value)> {
        self.args
            .iter()
            .map(|a| (a.name.clone(), a.default.clone().unwrap_or(Value::Null)))
            .collect()
    }
}

impl fmt::Display for PluginInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.name)?;
        if !self.doc.is_empty() {
            writeln!(f)?;
            for line in self.doc.lines() {
                writeln!(f, "    {}", line.trim_end())?;
            }
        }
        if !self.args.is_empty() {
            writeln!(f)?;
            writeln!(f, "Arguments:")?;
            for arg in &self.args {
                match &arg.default {
                    Some(default) => writeln!(
                        f,
                        "  --{} ({}, default {}): {}",
                        arg.name, arg.kind, default, arg.help
                    )?,
                    None => writeln!(f, "  --{} ({}): {}", arg.name, arg.kind, arg.help)?,
                }
            }
        }
        Ok(())
    }
}

/// Produces [`PluginInfo`] for a class.
pub trait PluginInfoProvider {
    fn describe(&self, class: &dyn PluginClass) -> PluginInfo;
}
