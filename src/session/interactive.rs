//! The interactive layer: a namespace of runnable plugins kept in step with
//! the session, and a memory of the last completed call.

use super::{DispatchOptions, PluginRef, Session};
use crate::builtins::InfoProvider;
use crate::plugin::{
    Plugin, PluginArgs, PluginError, PluginHandle, PluginInfo, PluginInfoProvider, PluginRegistry,
};
use crate::{ConfigValue, Configuration, Result};
use chrono::{DateTime, Local};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::PathBuf;
use tracing::{debug, error};

/// A callable entry in the namespace.
#[derive(Debug, Clone)]
pub struct Runner {
    handle: PluginHandle,
    info: PluginInfo,
}

impl Runner {
    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn doc(&self) -> &str {
        &self.info.doc
    }

    /// Names of the arguments the plugin declares.
    pub fn default_arguments(&self) -> Vec<String> {
        self.info.default_args().into_iter().map(|(k, _)| k).collect()
    }

    pub fn info(&self) -> &PluginInfo {
        &self.info
    }

    pub fn handle(&self) -> &PluginHandle {
        &self.handle
    }
}

/// Plugin handles and runners for one registry generation.
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    generation: Option<u64>,
    plugins: BTreeMap<String, PluginHandle>,
    runners: BTreeMap<String, Runner>,
}

impl Namespace {
    fn build(registry: &PluginRegistry, provider: &dyn PluginInfoProvider) -> Self {
        let mut plugins = BTreeMap::new();
        let mut runners = BTreeMap::new();
        for handle in registry.iter() {
            let name = handle.name().to_string();
            let info = provider.describe(handle.class().as_ref());
            plugins.insert(name.clone(), handle.clone());
            runners.insert(
                name,
                Runner {
                    handle: handle.clone(),
                    info,
                },
            );
        }
        Self {
            generation: Some(registry.generation()),
            plugins,
            runners,
        }
    }

    /// Registry generation this namespace reflects.
    pub fn generation(&self) -> Option<u64> {
        self.generation
    }

    pub fn plugin(&self, name: &str) -> Option<&PluginHandle> {
        self.plugins.get(name)
    }

    pub fn runner(&self, name: &str) -> Option<&Runner> {
        self.runners.get(name)
    }

    pub fn runners(&self) -> impl Iterator<Item = &Runner> {
        self.runners.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.runners.keys().map(String::as_str)
    }
}

/// The options of a call that survive for a repeat. Renderers and sinks are
/// single-use and are not kept.
#[derive(Debug, Clone, Default)]
struct RecordedOptions {
    debug: bool,
    output: Option<PathBuf>,
    overwrite: Option<bool>,
    flags: Option<Vec<String>>,
}

impl RecordedOptions {
    fn from_options(options: &DispatchOptions) -> Self {
        Self {
            debug: options.debug,
            output: options.output.clone(),
            overwrite: options.overwrite,
            flags: options.flags.clone(),
        }
    }

    fn to_options(&self) -> DispatchOptions {
        DispatchOptions {
            debug: self.debug,
            output: self.output.clone(),
            overwrite: self.overwrite,
            flags: self.flags.clone(),
            ..DispatchOptions::default()
        }
    }
}

/// How to run the last call again.
#[derive(Debug, Clone)]
enum Replay {
    Name(String),
    Handle(PluginHandle),
}

impl Replay {
    fn from_ref(target: &PluginRef) -> Option<Self> {
        match target {
            PluginRef::Name(name) => Some(Replay::Name(name.clone())),
            PluginRef::Class(class) => Some(Replay::Handle(PluginHandle::new(class.clone()))),
            PluginRef::Handle(handle) => Some(Replay::Handle(handle.clone())),
            PluginRef::Instance(_) => None,
        }
    }

    fn to_ref(&self) -> PluginRef {
        match self {
            Replay::Name(name) => PluginRef::Name(name.clone()),
            Replay::Handle(handle) => PluginRef::Handle(handle.clone()),
        }
    }
}

struct LastCall {
    /// `None` when the call ran a ready instance; the result is rerun.
    replay: Option<Replay>,
    args: PluginArgs,
    options: RecordedOptions,
    result: Box<dyn Plugin>,
}

/// A [`Session`] driven by a person at a prompt.
///
/// Recoverable plugin failures are logged instead of returned, and progress
/// messages go to stderr unless the session already has a progress callback.
pub struct InteractiveSession {
    session: Session,
    provider: Box<dyn PluginInfoProvider>,
    namespace: Namespace,
    last: Option<LastCall>,
    started: DateTime<Local>,
}

impl InteractiveSession {
    pub fn new(mut session: Session) -> Self {
        session.set_error_hook(Box::new(|plugin: &str, e: PluginError| {
            error!("Failed running plugin {}: {}", plugin, e);
            Ok(())
        }));
        if !session.has_progress() {
            session.set_progress(Some(Box::new(|message: &str, _force: bool| {
                let mut stderr = std::io::stderr();
                let _ = write!(stderr, "{}", message);
                let _ = stderr.flush();
            })));
        }
        let mut interactive = Self {
            session,
            provider: Box::new(InfoProvider),
            namespace: Namespace::default(),
            last: None,
            started: Local::now(),
        };
        interactive.reset();
        interactive
    }

    /// Use a different source of plugin documentation.
    pub fn with_provider(mut self, provider: impl PluginInfoProvider + 'static) -> Self {
        self.provider = Box::new(provider);
        self.reset();
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn into_session(self) -> Session {
        self.session
    }

    pub fn started(&self) -> DateTime<Local> {
        self.started
    }

    /// [`Session::update`], keeping the namespace in step.
    pub fn update<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Configuration) -> Result<T>,
    {
        let result = self.session.update(f);
        self.sync_namespace();
        result
    }

    /// The namespace for the current registry.
    pub fn namespace(&mut self) -> &Namespace {
        self.sync_namespace();
        &self.namespace
    }

    /// Rebuild the namespace from the session's registry.
    pub fn reset(&mut self) {
        self.namespace = Namespace::build(self.session.registry(), self.provider.as_ref());
        debug!(
            "Namespace rebuilt for generation {}",
            self.session.registry().generation()
        );
    }

    fn sync_namespace(&mut self) {
        if self.namespace.generation != Some(self.session.registry().generation()) {
            self.reset();
        }
    }

    /// Run a plugin and remember the call if it completes.
    ///
    /// Names resolve through the namespace. Returns whether the plugin ran
    /// to completion.
    pub fn call(
        &mut self,
        target: impl Into<PluginRef>,
        args: PluginArgs,
        options: DispatchOptions,
    ) -> Result<bool> {
        self.sync_namespace();
        let target = match target.into() {
            PluginRef::Name(name) => match self.namespace.runner(&name) {
                Some(runner) => PluginRef::Handle(runner.handle.clone()),
                None => PluginRef::Name(name),
            },
            other => other,
        };
        let replay = Replay::from_ref(&target);
        let recorded = RecordedOptions::from_options(&options);

        let outcome = self.session.run(target, args.clone(), options)?;
        self.sync_namespace();
        Ok(match outcome {
            Some(result) => {
                self.last = Some(LastCall {
                    replay,
                    args,
                    options: recorded,
                    result,
                });
                true
            }
            None => false,
        })
    }

    /// Run a plugin by name with raw command-line flags.
    pub fn invoke(&mut self, name: &str, flags: Vec<String>, output: Option<PathBuf>) -> Result<bool> {
        let mut options = DispatchOptions::new()
            .flags(flags)
            .debug(self.session.debug());
        options.output = output;
        self.call(name, PluginArgs::new(), options)
    }

    /// Run the last completed call again. Does nothing when there is none.
    ///
    /// Calls made by name, class or handle are rebuilt from scratch and the
    /// record survives a replay that fails or does not complete. A call that
    /// ran a ready instance reruns that same instance, which the dispatch
    /// consumes: if the rerun does not complete, nothing is left to repeat.
    pub fn repeat_last(&mut self) -> Result<bool> {
        let Some(last) = self.last.take() else {
            debug!("No completed call to repeat");
            return Ok(false);
        };

        let Some(replay) = last.replay.clone() else {
            let LastCall { args, options, result, .. } = last;
            return self.call(PluginRef::Instance(result), args, options.to_options());
        };
        let outcome = self.call(replay.to_ref(), last.args.clone(), last.options.to_options());
        if !matches!(outcome, Ok(true)) {
            self.last = Some(last);
        }
        outcome
    }

    /// Whether a completed call is available to [`Self::repeat_last`].
    pub fn has_last(&self) -> bool {
        self.last.is_some()
    }

    /// The instance returned by the last completed call.
    pub fn last_result(&self) -> Option<&dyn Plugin> {
        self.last.as_ref().map(|l| l.result.as_ref())
    }

    /// Help text: an overview, or a plugin's documentation.
    pub fn help(&mut self, topic: Option<&str>) -> String {
        self.sync_namespace();
        match topic {
            None => {
                let mut text = String::from(
                    "Run a plugin by typing its name followed by its flags.\n\
                     Other commands: v (repeat), set <key> <value>, get <key>, reset,\n\
                     help [plugin], quit.\n\nActive plugins:\n",
                );
                for runner in self.namespace.runners() {
                    let summary = runner.doc().lines().next().unwrap_or_default();
                    let _ = writeln!(text, "  {:<16} {}", runner.name(), summary);
                }
                text
            }
            Some(name) => match self.namespace.runner(name) {
                Some(runner) => runner.info().to_string(),
                None => format!("No active plugin named {}\n", name),
            },
        }
    }

    /// When the session started, what it is configured with, and what it
    /// can run.
    pub fn summary(&mut self) -> String {
        self.sync_namespace();
        let mut text = String::new();
        let _ = writeln!(
            text,
            "msh {} ({}, built {})",
            env!("CARGO_PKG_VERSION"),
            env!("MSH_GIT_COMMIT"),
            env!("MSH_BUILD_TIMESTAMP")
        );
        let _ = writeln!(
            text,
            "Session started {}",
            self.started.format("%Y-%m-%d %H:%M:%S")
        );
        let _ = writeln!(text, "Generation: {}", self.session.generation());
        match self.session.profile().profile() {
            Some(profile) => {
                let _ = writeln!(text, "Profile: {} ({})", profile.name(), profile.location());
            }
            None => {
                let _ = writeln!(text, "Profile: none");
            }
        }
        let _ = writeln!(text, "Config:");
        for (key, value) in self.session.state().iter() {
            if !value.is_null() {
                let _ = writeln!(text, "  {} = {}", key, value);
            }
        }
        let names: Vec<&str> = self.namespace.names().collect();
        let _ = writeln!(text, "Plugins: {}", names.join(", "));
        text
    }

    pub fn get_parameter(&self, key: &str) -> Option<&ConfigValue> {
        self.session.get_parameter(key)
    }
}
