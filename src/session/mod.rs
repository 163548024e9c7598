//! The session: configuration, the loaded profile, the active plugins, and
//! the dispatch pipeline that runs them.
//!
//! Configuration changes go through [`Session::update`]. When the scoped
//! update closes, the session re-synchronizes once: it reloads the profile
//! named by the `profile` key, picks the renderer kind, rebuilds the plugin
//! registry, and applies the `pager` and `logging` keys.

pub mod dispatch;
pub mod interactive;

pub use dispatch::{ConsoleInspector, DispatchOptions, PluginRef, PostMortem};
pub use interactive::{InteractiveSession, Namespace, Runner};

use crate::config::{Cache, ConfigValue, Configuration};
use crate::plugin::{ArgumentMapper, ClapArgumentMapper, PluginDirectory, PluginError, PluginRegistry};
use crate::profile::fs::FsContainerFactory;
use crate::profile::{ContainerFactory, Profile, ProfileError, ProfileSlot, resolve_profile};
use crate::render::{ExternalPager, InterruptFlag, Pager, RendererKind};
use crate::{Error, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, warn};

/// Called with a plugin name and a recoverable plugin failure.
pub type ErrorHook = Box<dyn FnMut(&str, PluginError) -> Result<()>>;

/// Receives progress messages; the flag forces display.
pub type ProgressFn = Box<dyn FnMut(&str, bool)>;

/// Receives normalized log level names from the `logging` key.
pub type LogLevelFn = Box<dyn Fn(&str)>;

/// Collects the collaborators of a [`Session`].
pub struct SessionBuilder {
    seed: Vec<(String, ConfigValue)>,
    directory: Option<PluginDirectory>,
    containers: Option<Box<dyn ContainerFactory>>,
    mapper: Box<dyn ArgumentMapper>,
    pager: Option<Box<dyn Pager>>,
    progress: Option<ProgressFn>,
    error_hook: Option<ErrorHook>,
    inspector: Option<Box<dyn PostMortem>>,
    log_level: Option<LogLevelFn>,
    interrupt: InterruptFlag,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self {
            seed: Vec::new(),
            directory: None,
            containers: None,
            mapper: Box::new(ClapArgumentMapper),
            pager: None,
            progress: None,
            error_hook: None,
            inspector: None,
            log_level: None,
            interrupt: InterruptFlag::new(),
        }
    }

    /// Initial configuration, applied in one scoped update.
    pub fn seed(mut self, entries: impl IntoIterator<Item = (String, ConfigValue)>) -> Self {
        self.seed.extend(entries);
        self
    }

    /// Plugin classes to offer. Defaults to the built-ins.
    pub fn directory(mut self, directory: PluginDirectory) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Where profiles are loaded from. Defaults to the data directory.
    pub fn containers(mut self, factory: impl ContainerFactory + 'static) -> Self {
        self.containers = Some(Box::new(factory));
        self
    }

    pub fn argument_mapper(mut self, mapper: impl ArgumentMapper + 'static) -> Self {
        self.mapper = Box::new(mapper);
        self
    }

    pub fn pager(mut self, pager: impl Pager + 'static) -> Self {
        self.pager = Some(Box::new(pager));
        self
    }

    pub fn on_progress(mut self, progress: impl FnMut(&str, bool) + 'static) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }

    pub fn on_plugin_error(
        mut self,
        hook: impl FnMut(&str, PluginError) -> Result<()> + 'static,
    ) -> Self {
        self.error_hook = Some(Box::new(hook));
        self
    }

    pub fn inspector(mut self, inspector: impl PostMortem + 'static) -> Self {
        self.inspector = Some(Box::new(inspector));
        self
    }

    pub fn on_log_level(mut self, hook: impl Fn(&str) + 'static) -> Self {
        self.log_level = Some(Box::new(hook));
        self
    }

    pub fn interrupt_flag(mut self, flag: InterruptFlag) -> Self {
        self.interrupt = flag;
        self
    }

    pub fn build(self) -> Result<Session> {
        let mut session = Session {
            state: Configuration::seeded(self.seed)?,
            cache: Cache::new(),
            profile: ProfileSlot::default(),
            renderer_kind: RendererKind::default(),
            registry: PluginRegistry::empty(),
            directory: self.directory.unwrap_or_else(crate::builtins::directory),
            containers: self
                .containers
                .unwrap_or_else(|| Box::new(FsContainerFactory::with_data_dir())),
            mapper: self.mapper,
            pager: self.pager,
            pager_command: None,
            progress: self.progress,
            error_hook: self.error_hook.unwrap_or_else(|| Box::new(propagate)),
            inspector: self
                .inspector
                .unwrap_or_else(|| Box::new(ConsoleInspector)),
            log_level: self.log_level,
            applied_log_level: None,
            interrupt: self.interrupt,
            filename: None,
            generation: 0,
        };

        session.resync();
        Ok(session)
    }
}

fn propagate(_plugin: &str, error: PluginError) -> Result<()> {
    Err(Error::Plugin(error))
}

/// A forensic session.
pub struct Session {
    state: Configuration,
    cache: Cache,
    profile: ProfileSlot,
    renderer_kind: RendererKind,
    registry: PluginRegistry,
    directory: PluginDirectory,
    containers: Box<dyn ContainerFactory>,
    mapper: Box<dyn ArgumentMapper>,
    pager: Option<Box<dyn Pager>>,
    /// The `pager` key the current pager was built from, if any.
    pager_command: Option<String>,
    progress: Option<ProgressFn>,
    error_hook: ErrorHook,
    inspector: Box<dyn PostMortem>,
    log_level: Option<LogLevelFn>,
    applied_log_level: Option<String>,
    interrupt: InterruptFlag,
    filename: Option<String>,
    generation: u64,
}

impl Session {
    /// A session with the built-in plugins and no configuration.
    pub fn new() -> Result<Self> {
        SessionBuilder::new().build()
    }

    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Change configuration inside a scoped update.
    ///
    /// The state layer is unlocked for the duration of `f` and re-locked
    /// afterwards. The session re-synchronizes exactly once when the scope
    /// closes, whether or not `f` succeeded.
    pub fn update<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Configuration) -> Result<T>,
    {
        let result = self.state.update(f);
        self.resync();
        result
    }

    fn resync(&mut self) {
        self.generation += 1;

        self.filename = self
            .state
            .get("filename")
            .and_then(ConfigValue::as_str)
            .map(str::to_string);

        self.profile = match self.get_parameter("profile").and_then(ConfigValue::as_str) {
            Some(reference) => {
                let reference = reference.to_string();
                match self.load_profile(&reference) {
                    Ok(profile) => ProfileSlot::Loaded(profile),
                    Err(e) => {
                        warn!("Unable to load profile {}: {}", reference, e);
                        ProfileSlot::Unset {
                            reason: e.to_string(),
                        }
                    }
                }
            }
            None => ProfileSlot::default(),
        };

        self.renderer_kind = match self.get_parameter("renderer").and_then(ConfigValue::as_str) {
            Some(name) => RendererKind::from_name(name).unwrap_or_else(|| {
                warn!("Unknown renderer {}, using text", name);
                RendererKind::Text
            }),
            None => RendererKind::default(),
        };

        self.sync_pager();
        self.sync_log_level();

        self.registry =
            PluginRegistry::rebuild(&self.directory, self.profile.profile(), self.generation);
        debug!(
            "Session re-synchronized (generation {}, {} plugins active)",
            self.generation,
            self.registry.len()
        );
    }

    fn sync_pager(&mut self) {
        let wanted = self
            .get_parameter("pager")
            .and_then(ConfigValue::as_str)
            .filter(|c| !c.trim().is_empty())
            .map(str::to_string);
        if wanted == self.pager_command {
            return;
        }
        match &wanted {
            Some(command) => self.pager = Some(Box::new(ExternalPager::new(command.clone()))),
            None => self.pager = None,
        }
        self.pager_command = wanted;
    }

    fn sync_log_level(&mut self) {
        let Some(level) = self.state.get("logging").and_then(ConfigValue::as_str) else {
            return;
        };
        if self.applied_log_level.as_deref() == Some(level) {
            return;
        }
        let level = level.to_string();
        if let Some(hook) = &self.log_level {
            hook(&level);
        }
        self.applied_log_level = Some(level);
    }

    /// State layer first, then the cache layer.
    pub fn get_parameter(&self, key: &str) -> Option<&ConfigValue> {
        self.state.get(key).or_else(|| self.cache.get(key))
    }

    pub fn get_parameter_or(&self, key: &str, default: ConfigValue) -> ConfigValue {
        self.get_parameter(key).cloned().unwrap_or(default)
    }

    /// [`Session::get_parameter`] deserialized into `T`. A value of the
    /// wrong shape reads as absent.
    pub fn get_parameter_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_parameter(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Write to the cache layer. Never needs a scoped update.
    pub fn store_parameter<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<()> {
        self.cache.set(key, value)
    }

    /// Resolve a profile reference against the configured `profile_path`.
    /// Does not change the session.
    pub fn load_profile(&self, reference: &str) -> std::result::Result<Arc<Profile>, ProfileError> {
        let profile_path: Vec<String> = match self.get_parameter("profile_path") {
            Some(ConfigValue::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Some(ConfigValue::String(single)) => vec![single.clone()],
            _ => Vec::new(),
        };
        resolve_profile(self.containers.as_ref(), reference, &profile_path).map(Arc::new)
    }

    /// Forward a progress message to the progress callback, if any.
    pub fn report_progress(&mut self, message: &str, force: bool) {
        if let Some(progress) = self.progress.as_mut() {
            progress(message, force);
        }
    }

    pub fn state(&self) -> &Configuration {
        &self.state
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn profile(&self) -> &ProfileSlot {
        &self.profile
    }

    pub fn renderer_kind(&self) -> RendererKind {
        self.renderer_kind
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn directory(&self) -> &PluginDirectory {
        &self.directory
    }

    /// Number of re-synchronizations so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The `filename` key as of the last re-synchronization.
    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    pub fn interrupt_flag(&self) -> &InterruptFlag {
        &self.interrupt
    }

    pub fn has_pager(&self) -> bool {
        self.pager.is_some()
    }

    pub fn set_progress(&mut self, progress: Option<ProgressFn>) {
        self.progress = progress;
    }

    pub fn has_progress(&self) -> bool {
        self.progress.is_some()
    }

    pub fn set_error_hook(&mut self, hook: ErrorHook) {
        self.error_hook = hook;
    }

    pub fn set_inspector(&mut self, inspector: Box<dyn PostMortem>) {
        self.inspector = inspector;
    }

    pub fn overwrite(&self) -> bool {
        self.get_parameter("overwrite")
            .and_then(ConfigValue::as_bool)
            .unwrap_or(false)
    }

    pub fn debug(&self) -> bool {
        self.get_parameter("debug")
            .and_then(ConfigValue::as_bool)
            .unwrap_or(false)
    }

    /// `paging_limit` as a line count; absent means unbounded.
    pub fn paging_limit(&self) -> Option<usize> {
        self.get_parameter_as::<usize>("paging_limit")
    }
}
