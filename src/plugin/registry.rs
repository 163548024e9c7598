//! The set of plugins active for the current profile.

use super::{Plugin, PluginArgs, PluginClass, PluginError};
use crate::profile::Profile;
use crate::session::Session;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Every plugin class the session may offer. Injected when the session is
/// built; nothing registers itself globally.
#[derive(Clone, Default)]
pub struct PluginDirectory {
    classes: Vec<Arc<dyn PluginClass>>,
}

impl PluginDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, class: Arc<dyn PluginClass>) -> Self {
        self.register(class);
        self
    }

    pub fn register(&mut self, class: Arc<dyn PluginClass>) {
        self.classes.push(class);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn PluginClass>> {
        self.classes.iter()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Named classes that apply to `profile`, in directory order.
    pub fn active_classes(&self, profile: Option<&Profile>) -> Vec<Arc<dyn PluginClass>> {
        self.classes
            .iter()
            .filter(|c| !c.name().is_empty() && c.is_active(profile))
            .cloned()
            .collect()
    }
}

impl fmt::Debug for PluginDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.classes.iter().map(|c| c.name()))
            .finish()
    }
}

/// A plugin class with keyword arguments bound ahead of the call.
#[derive(Clone)]
pub struct PluginHandle {
    class: Arc<dyn PluginClass>,
    bound: PluginArgs,
}

impl PluginHandle {
    pub fn new(class: Arc<dyn PluginClass>) -> Self {
        Self {
            class,
            bound: PluginArgs::new(),
        }
    }

    /// Bind a keyword argument. Call-time arguments still take precedence.
    pub fn bind(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.bound.insert(key, value);
        self
    }

    pub fn name(&self) -> &str {
        self.class.name()
    }

    pub fn class(&self) -> &Arc<dyn PluginClass> {
        &self.class
    }

    pub fn bound_args(&self) -> &PluginArgs {
        &self.bound
    }

    /// Call arguments completed with the bound ones.
    pub fn args_for(&self, call: &PluginArgs) -> PluginArgs {
        let mut args = call.clone();
        args.fill_missing(&self.bound);
        args
    }

    pub fn instantiate(
        &self,
        session: &Session,
        call: &PluginArgs,
    ) -> Result<Box<dyn Plugin>, PluginError> {
        self.class.instantiate(session, &self.args_for(call))
    }
}

impl fmt::Debug for PluginHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginHandle")
            .field("name", &self.name())
            .field("bound", &self.bound)
            .finish()
    }
}

/// Named handles for the plugins active under one profile.
#[derive(Debug, Clone, Default)]
pub struct PluginRegistry {
    generation: u64,
    handles: BTreeMap<String, PluginHandle>,
}

impl PluginRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a fresh registry. Nothing carries over from a previous one.
    pub fn rebuild(directory: &PluginDirectory, profile: Option<&Profile>, generation: u64) -> Self {
        let mut handles = BTreeMap::new();
        for class in directory.active_classes(profile) {
            let name = class.name().to_string();
            if handles.contains_key(&name) {
                warn!("Plugin {} is defined more than once; using the last one", name);
            }
            handles.insert(name, PluginHandle::new(class));
        }
        Self {
            generation,
            handles,
        }
    }

    /// Which re-synchronization built this registry.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn get(&self, name: &str) -> Option<&PluginHandle> {
        self.handles.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handles.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handles.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PluginHandle> {
        self.handles.values()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
