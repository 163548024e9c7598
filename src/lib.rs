//! Memshell - session core for an interactive memory forensics shell.
//!
//! This library holds the session configuration store (a locked state layer
//! over an advisory cache layer), resolves profiles, builds the registry of
//! plugins active for the loaded profile, and dispatches plugin invocations
//! to a renderer with structured error recovery.

pub mod builtins;
pub mod cli;
pub mod config;
pub mod plugin;
pub mod profile;
pub mod render;
pub mod session;
pub mod shell;

pub use config::{Cache, ConfigValue, Configuration, LockState};
pub use plugin::{PluginArgs, PluginError};
pub use profile::{Profile, ProfileError, ProfileSlot};
pub use session::{DispatchOptions, InteractiveSession, PluginRef, Session, SessionBuilder};

/// Test utilities shared by the unit tests of several modules.
#[cfg(test)]
pub(crate) mod test_utils {
    use std::cell::RefCell;
    use std::path::Path;
    use std::rc::Rc;
    use std::sync::Arc;
    use tempfile::TempDir;

    use crate::plugin::{ArgKind, ArgSpec, Plugin, PluginArgs, PluginClass, PluginError};
    use crate::profile::Profile;
    use crate::render::{Pager, Renderer};
    use crate::session::Session;

    /// A directory tree of profile containers.
    pub struct TestEnv {
        pub dir: TempDir,
    }

    impl TestEnv {
        pub fn new() -> Self {
            Self {
                dir: TempDir::new().unwrap(),
            }
        }

        pub fn path(&self) -> &Path {
            self.dir.path()
        }

        /// Write `<root>/<name>.json` containing a profile with the given os.
        pub fn write_profile(&self, root: &str, name: &str, os: &str) -> String {
            let dir = self.dir.path().join(root);
            std::fs::create_dir_all(&dir).unwrap();
            let body = serde_json::json!({ "os": os, "root": root });
            std::fs::write(dir.join(format!("{}.json", name)), body.to_string()).unwrap();
            dir.to_string_lossy().into_owned()
        }
    }

    /// Everything a [`RecordingRenderer`] saw, shared with the test body.
    #[derive(Debug, Default)]
    pub struct RenderLog {
        pub starts: usize,
        pub plugin_starts: Vec<(String, PluginArgs)>,
        pub ends: usize,
        pub lines: Vec<String>,
    }

    pub struct RecordingRenderer {
        pub log: Rc<RefCell<RenderLog>>,
        data: Vec<String>,
    }

    impl RecordingRenderer {
        pub fn new() -> (Self, Rc<RefCell<RenderLog>>) {
            let log = Rc::new(RefCell::new(RenderLog::default()));
            (
                Self {
                    log: log.clone(),
                    data: Vec::new(),
                },
                log,
            )
        }
    }

    impl Renderer for RecordingRenderer {
        fn start(&mut self) -> std::io::Result<()> {
            self.log.borrow_mut().starts += 1;
            Ok(())
        }

        fn start_plugin(&mut self, name: &str, args: &PluginArgs) -> std::io::Result<()> {
            self.log
                .borrow_mut()
                .plugin_starts
                .push((name.to_string(), args.clone()));
            Ok(())
        }

        fn end(&mut self) -> std::io::Result<()> {
            self.log.borrow_mut().ends += 1;
            Ok(())
        }

        fn section(&mut self, title: &str) -> Result<(), PluginError> {
            self.write_line(title)
        }

        fn table_header(&mut self, columns: &[&str]) -> Result<(), PluginError> {
            self.write_line(&columns.join(","))
        }

        fn table_row(&mut self, cells: &[serde_json::Value]) -> Result<(), PluginError> {
            let cells: Vec<String> = cells.iter().map(|c| c.to_string()).collect();
            self.write_line(&cells.join(","))
        }

        fn write_line(&mut self, text: &str) -> Result<(), PluginError> {
            self.data.push(text.to_string());
            self.log.borrow_mut().lines.push(text.to_string());
            Ok(())
        }

        fn data(&self) -> &[String] {
            &self.data
        }
    }

    /// A pager that records chunks and counts blocking flushes.
    #[derive(Clone, Default)]
    pub struct RecordingPager {
        pub chunks: Rc<RefCell<Vec<String>>>,
        pub flushes: Rc<RefCell<usize>>,
    }

    impl Pager for RecordingPager {
        fn write(&mut self, chunk: &str) -> std::io::Result<()> {
            self.chunks.borrow_mut().push(chunk.to_string());
            Ok(())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            *self.flushes.borrow_mut() += 1;
            Ok(())
        }
    }

    /// How a [`ScriptedClass`] instance behaves when rendered.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Behaviour {
        Lines(usize),
        RejectArgs,
        Fail,
        Interrupt,
        Crash,
    }

    /// A plugin class whose behaviour is chosen by the test.
    pub struct ScriptedClass {
        pub name: &'static str,
        pub os: Option<&'static str>,
        pub behaviour: Behaviour,
    }

    impl ScriptedClass {
        pub fn new(name: &'static str, behaviour: Behaviour) -> Arc<dyn PluginClass> {
            Arc::new(Self {
                name,
                os: None,
                behaviour,
            })
        }

        pub fn for_os(name: &'static str, os: &'static str) -> Arc<dyn PluginClass> {
            Arc::new(Self {
                name,
                os: Some(os),
                behaviour: Behaviour::Lines(1),
            })
        }
    }

    impl PluginClass for ScriptedClass {
        fn name(&self) -> &str {
            self.name
        }

        fn doc(&self) -> &str {
            "A scripted plugin used in tests."
        }

        fn args(&self) -> Vec<ArgSpec> {
            vec![
                ArgSpec::new("count", ArgKind::Int, "How many lines to emit.")
                    .with_default(serde_json::json!(1)),
                ArgSpec::new("verbose", ArgKind::Bool, "Emit more detail."),
            ]
        }

        fn is_active(&self, profile: Option<&Profile>) -> bool {
            match self.os {
                Some(os) => profile.is_some_and(|p| p.os() == Some(os)),
                None => true,
            }
        }

        fn instantiate(
            &self,
            _session: &Session,
            args: &PluginArgs,
        ) -> Result<Box<dyn Plugin>, PluginError> {
            if self.behaviour == Behaviour::RejectArgs {
                return Err(PluginError::InvalidArgs("count must be positive".into()));
            }
            Ok(Box::new(ScriptedPlugin {
                name: self.name,
                behaviour: self.behaviour,
                count: args.get_i64("count"),
            }))
        }
    }

    pub struct ScriptedPlugin {
        pub name: &'static str,
        pub behaviour: Behaviour,
        pub count: Option<i64>,
    }

    impl Plugin for ScriptedPlugin {
        fn name(&self) -> &str {
            self.name
        }

        fn render(&mut self, renderer: &mut dyn Renderer) -> Result<(), PluginError> {
            match self.behaviour {
                Behaviour::Lines(n) => {
                    let n = self.count.map(|c| c as usize).unwrap_or(n);
                    for i in 0..n {
                        renderer.write_line(&format!("line {}", i))?;
                    }
                    Ok(())
                }
                Behaviour::RejectArgs => Ok(()),
                Behaviour::Fail => Err(PluginError::Failed("no such process".into())),
                Behaviour::Interrupt => Err(PluginError::Interrupted),
                Behaviour::Crash => Err(PluginError::Other("page table walk exploded".into())),
            }
        }
    }
}

/// Library-level error type for memshell operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration parameters must be simple types: {0}")]
    ConfigType(String),

    #[error("Can only update configuration inside a scoped update (setting '{0}')")]
    ConfigLocked(String),

    #[error("A configuration update is already in progress")]
    ReentrantUpdate,

    #[error(transparent)]
    Profile(#[from] profile::ProfileError),

    #[error(transparent)]
    Plugin(#[from] plugin::PluginError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias for memshell operations.
pub type Result<T> = std::result::Result<T, Error>;
