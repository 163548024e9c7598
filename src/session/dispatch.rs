//! Running a plugin: resolve, parse flags, pick a renderer, render, page,
//! and recover from failures.

use super::Session;
use crate::plugin::{Plugin, PluginArgs, PluginClass, PluginError, PluginHandle};
use crate::render::{OutputSink, Renderer};
use crate::{Error, Result};
use std::fs::File;
use std::io::{self, BufRead, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// What to run.
pub enum PluginRef {
    /// A name looked up in the session's registry.
    Name(String),
    /// A class, run with no bound arguments.
    Class(Arc<dyn PluginClass>),
    /// A class with bound arguments.
    Handle(PluginHandle),
    /// An instance that has already been constructed.
    Instance(Box<dyn Plugin>),
}

impl PluginRef {
    pub fn name(&self) -> &str {
        match self {
            PluginRef::Name(name) => name,
            PluginRef::Class(class) => class.name(),
            PluginRef::Handle(handle) => handle.name(),
            PluginRef::Instance(plugin) => plugin.name(),
        }
    }
}

impl From<&str> for PluginRef {
    fn from(name: &str) -> Self {
        PluginRef::Name(name.to_string())
    }
}

impl From<String> for PluginRef {
    fn from(name: String) -> Self {
        PluginRef::Name(name)
    }
}

impl From<Arc<dyn PluginClass>> for PluginRef {
    fn from(class: Arc<dyn PluginClass>) -> Self {
        PluginRef::Class(class)
    }
}

impl From<PluginHandle> for PluginRef {
    fn from(handle: PluginHandle) -> Self {
        PluginRef::Handle(handle)
    }
}

impl From<Box<dyn Plugin>> for PluginRef {
    fn from(plugin: Box<dyn Plugin>) -> Self {
        PluginRef::Instance(plugin)
    }
}

/// Per-call options for [`Session::run`].
#[derive(Default)]
pub struct DispatchOptions {
    /// Used as-is instead of building the session's renderer.
    pub renderer: Option<Box<dyn Renderer>>,
    /// Sink for the session's renderer when no output file is given.
    pub fd: Option<Box<dyn Write>>,
    /// Inspect unexpected failures instead of propagating them.
    pub debug: bool,
    /// Write output to this file.
    pub output: Option<PathBuf>,
    /// Replace an existing output file. Falls back to the `overwrite` key.
    pub overwrite: Option<bool>,
    /// Raw command-line flags for the plugin.
    pub flags: Option<Vec<String>>,
}

impl DispatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn renderer(mut self, renderer: Box<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn fd(mut self, fd: impl Write + 'static) -> Self {
        self.fd = Some(Box::new(fd));
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = Some(overwrite);
        self
    }

    pub fn flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.flags = Some(flags.into_iter().map(Into::into).collect());
        self
    }
}

/// Examines a failed plugin run before the pipeline moves on.
pub trait PostMortem {
    fn inspect(&mut self, plugin: &str, error: &PluginError);
}

/// Prints the error chain to stderr and waits for Enter.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleInspector;

impl PostMortem for ConsoleInspector {
    fn inspect(&mut self, plugin: &str, error: &PluginError) {
        eprintln!("*** Post-mortem for plugin {} ***", plugin);
        eprintln!("{}", error);
        let mut source = std::error::Error::source(error);
        while let Some(cause) = source {
            eprintln!("  caused by: {}", cause);
            source = cause.source();
        }
        eprint!("Press Enter to continue...");
        let _ = io::stderr().flush();
        let mut line = String::new();
        let _ = io::stdin().lock().read_line(&mut line);
    }
}

/// A resolved target: something still to construct, or a ready instance.
enum Target {
    Construct(PluginHandle),
    Ready(Box<dyn Plugin>),
}

/// Calls `end()` on drop unless [`RenderScope::finish`] already did.
struct RenderScope<'a> {
    renderer: &'a mut dyn Renderer,
    open: bool,
}

impl<'a> RenderScope<'a> {
    fn new(renderer: &'a mut dyn Renderer) -> Self {
        Self {
            renderer,
            open: true,
        }
    }

    fn renderer(&mut self) -> &mut (dyn Renderer + 'a) {
        &mut *self.renderer
    }

    fn finish(mut self) -> io::Result<()> {
        self.open = false;
        self.renderer.end()
    }
}

impl Drop for RenderScope<'_> {
    fn drop(&mut self) {
        if self.open {
            if let Err(e) = self.renderer.end() {
                warn!("Renderer failed to finish: {}", e);
            }
        }
    }
}

impl Session {
    /// Run a plugin.
    ///
    /// Returns the plugin instance when it rendered to completion and
    /// `Ok(None)` when the run was reported and abandoned: the plugin is not
    /// active, its arguments were rejected, it failed with a recoverable
    /// error, the user interrupted it, or the output file already exists.
    /// Unexpected failures are returned as [`Error::Plugin`] unless
    /// `options.debug` is set.
    pub fn run(
        &mut self,
        target: impl Into<PluginRef>,
        args: PluginArgs,
        options: DispatchOptions,
    ) -> Result<Option<Box<dyn Plugin>>> {
        let DispatchOptions {
            renderer,
            fd,
            debug,
            output,
            overwrite,
            flags,
        } = options;
        self.interrupt.clear();

        let target = match target.into() {
            PluginRef::Name(name) => match self.registry.get(&name) {
                Some(handle) => Target::Construct(handle.clone()),
                None => {
                    error!(
                        "Plugin {} is not active. Is it supported with this profile?",
                        name
                    );
                    return Ok(None);
                }
            },
            PluginRef::Class(class) => Target::Construct(PluginHandle::new(class)),
            PluginRef::Handle(handle) => Target::Construct(handle),
            PluginRef::Instance(plugin) => Target::Ready(plugin),
        };
        let name = match &target {
            Target::Construct(handle) => handle.name().to_string(),
            Target::Ready(plugin) => plugin.name().to_string(),
        };

        let mut args = args;
        if let Some(flags) = flags {
            match &target {
                Target::Construct(handle) => {
                    match self.mapper.build_args(handle.class().as_ref(), &flags) {
                        Ok(parsed) => args.fill_missing(&parsed),
                        Err(e) => return self.recover(&name, e, debug),
                    }
                }
                Target::Ready(_) => {
                    warn!("Ignoring flags for already constructed plugin {}", name)
                }
            }
        }

        let mut renderer = match renderer {
            Some(renderer) => renderer,
            None => {
                let sink = match output {
                    Some(path) => {
                        if path.exists() && !(overwrite.unwrap_or(false) || self.overwrite()) {
                            error!(
                                "Output file '{}' exists but overwrite is not set.",
                                path.display()
                            );
                            return Ok(None);
                        }
                        match File::create(&path) {
                            Ok(file) => OutputSink::File(BufWriter::new(file)),
                            Err(e) => return self.recover(&name, e.into(), debug),
                        }
                    }
                    None => fd.map(OutputSink::Writer).unwrap_or(OutputSink::Stdout),
                };
                let threshold = if self.pager.is_some() {
                    self.paging_limit()
                } else {
                    None
                };
                self.renderer_kind.build(self, sink, threshold)
            }
        };

        let outcome = self
            .execute(target, &args, renderer.as_mut())
            .and_then(|plugin| {
                self.page_overflow(renderer.as_ref())?;
                Ok(plugin)
            });

        match outcome {
            Ok(plugin) => Ok(Some(plugin)),
            Err(e) => self.recover(&name, e, debug),
        }
    }

    fn execute(
        &self,
        target: Target,
        args: &PluginArgs,
        renderer: &mut dyn Renderer,
    ) -> std::result::Result<Box<dyn Plugin>, PluginError> {
        renderer.start()?;
        let mut scope = RenderScope::new(renderer);

        let (mut plugin, final_args) = match target {
            Target::Construct(handle) => {
                let final_args = handle.args_for(args);
                let plugin = handle.class().instantiate(self, &final_args)?;
                (plugin, final_args)
            }
            Target::Ready(plugin) => (plugin, args.clone()),
        };

        debug!("Running plugin {}", plugin.name());
        scope.renderer().start_plugin(plugin.name(), &final_args)?;
        plugin.render(scope.renderer())?;
        scope.finish()?;
        Ok(plugin)
    }

    /// Hand held-back output to the pager once it reached the threshold.
    fn page_overflow(&mut self, renderer: &dyn Renderer) -> io::Result<()> {
        let Some(limit) = self.paging_limit() else {
            return Ok(());
        };
        let Some(pager) = self.pager.as_mut() else {
            return Ok(());
        };
        if renderer.data().len() < limit {
            return Ok(());
        }
        for chunk in renderer.data() {
            pager.write(chunk)?;
        }
        pager.flush()
    }

    fn recover(
        &mut self,
        name: &str,
        error: PluginError,
        debug: bool,
    ) -> Result<Option<Box<dyn Plugin>>> {
        match error {
            PluginError::InvalidArgs(reason) => {
                error!("Invalid Args (Try info plugins.{}): {}", name, reason);
                Ok(None)
            }
            failed @ PluginError::Failed(_) => {
                (self.error_hook)(name, failed)?;
                Ok(None)
            }
            PluginError::Interrupted => {
                if self.debug() {
                    self.inspector.inspect(name, &PluginError::Interrupted);
                }
                self.report_progress("Aborted!\r\n", true);
                Ok(None)
            }
            unexpected => {
                error!("Error running plugin {}: {}", name, unexpected);
                if debug {
                    self.inspector.inspect(name, &unexpected);
                    Ok(None)
                } else {
                    Err(Error::Plugin(unexpected))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::PluginDirectory;
    use crate::render::SharedBuffer;
    use crate::session::SessionBuilder;
    use crate::test_utils::{
        Behaviour, RecordingPager, RecordingRenderer, ScriptedClass, ScriptedPlugin, TestEnv,
    };
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct CountingInspector(Rc<RefCell<Vec<String>>>);

    impl PostMortem for CountingInspector {
        fn inspect(&mut self, plugin: &str, error: &PluginError) {
            self.0.borrow_mut().push(format!("{}: {}", plugin, error));
        }
    }

    fn directory() -> PluginDirectory {
        PluginDirectory::new()
            .with(ScriptedClass::new("lines", Behaviour::Lines(3)))
            .with(ScriptedClass::new("reject", Behaviour::RejectArgs))
            .with(ScriptedClass::new("fail", Behaviour::Fail))
            .with(ScriptedClass::new("interrupt", Behaviour::Interrupt))
            .with(ScriptedClass::new("crash", Behaviour::Crash))
            .with(ScriptedClass::for_os("pslist", "windows"))
    }

    fn session() -> Session {
        SessionBuilder::new().directory(directory()).build().unwrap()
    }

    #[test]
    fn test_run_by_name_renders_and_returns_instance() {
        let mut session = session();
        let (renderer, log) = RecordingRenderer::new();
        let plugin = session
            .run(
                "lines",
                PluginArgs::new(),
                DispatchOptions::new().renderer(Box::new(renderer)),
            )
            .unwrap();
        assert_eq!(plugin.unwrap().name(), "lines");
        let log = log.borrow();
        assert_eq!(log.starts, 1);
        assert_eq!(log.ends, 1);
        assert_eq!(log.lines, vec!["line 0", "line 1", "line 2"]);
        assert_eq!(log.plugin_starts[0].0, "lines");
    }

    #[test]
    fn test_inactive_plugin_constructs_nothing() {
        let mut session = session();
        let (renderer, log) = RecordingRenderer::new();
        let result = session
            .run(
                "pslist",
                PluginArgs::new(),
                DispatchOptions::new().renderer(Box::new(renderer)),
            )
            .unwrap();
        assert!(result.is_none());
        assert_eq!(log.borrow().starts, 0);
    }

    #[test]
    fn test_flags_fill_only_missing_arguments() {
        let mut session = session();
        let (renderer, log) = RecordingRenderer::new();
        session
            .run(
                "lines",
                PluginArgs::new().with("count", 2),
                DispatchOptions::new()
                    .renderer(Box::new(renderer))
                    .flags(["--count", "5", "--verbose"]),
            )
            .unwrap()
            .unwrap();
        let log = log.borrow();
        let (_, args) = &log.plugin_starts[0];
        assert_eq!(args.get_i64("count"), Some(2));
        assert_eq!(args.get_bool("verbose"), Some(true));
        assert_eq!(log.lines.len(), 2);
    }

    #[test]
    fn test_bad_flags_are_reported_not_raised() {
        let mut session = session();
        let (renderer, log) = RecordingRenderer::new();
        let result = session
            .run(
                "lines",
                PluginArgs::new(),
                DispatchOptions::new()
                    .renderer(Box::new(renderer))
                    .flags(["--count", "lots"]),
            )
            .unwrap();
        assert!(result.is_none());
        assert_eq!(log.borrow().starts, 0);
    }

    #[test]
    fn test_invalid_args_end_renderer_once() {
        let mut session = session();
        let (renderer, log) = RecordingRenderer::new();
        let result = session
            .run(
                "reject",
                PluginArgs::new(),
                DispatchOptions::new().renderer(Box::new(renderer)),
            )
            .unwrap();
        assert!(result.is_none());
        assert_eq!(log.borrow().starts, 1);
        assert_eq!(log.borrow().ends, 1);
        assert!(log.borrow().plugin_starts.is_empty());
    }

    #[test]
    fn test_failed_plugin_propagates_by_default() {
        let mut session = session();
        let (renderer, log) = RecordingRenderer::new();
        let Err(err) = session.run(
            "fail",
            PluginArgs::new(),
            DispatchOptions::new().renderer(Box::new(renderer)),
        ) else {
            panic!("expected an error");
        };
        assert!(matches!(err, Error::Plugin(PluginError::Failed(_))));
        assert_eq!(log.borrow().ends, 1);
    }

    #[test]
    fn test_failed_plugin_goes_to_error_hook() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let mut session = SessionBuilder::new()
            .directory(directory())
            .on_plugin_error(move |name, e| {
                sink.borrow_mut().push(format!("{}: {}", name, e));
                Ok(())
            })
            .build()
            .unwrap();
        let (renderer, _log) = RecordingRenderer::new();
        let result = session
            .run(
                "fail",
                PluginArgs::new(),
                DispatchOptions::new().renderer(Box::new(renderer)),
            )
            .unwrap();
        assert!(result.is_none());
        assert_eq!(*seen.borrow(), vec!["fail: no such process".to_string()]);
    }

    #[test]
    fn test_interrupt_reports_aborted() {
        let progress = Rc::new(RefCell::new(Vec::new()));
        let sink = progress.clone();
        let inspector = CountingInspector::default();
        let inspected = inspector.0.clone();
        let mut session = SessionBuilder::new()
            .directory(directory())
            .on_progress(move |msg, force| sink.borrow_mut().push((msg.to_string(), force)))
            .inspector(inspector)
            .build()
            .unwrap();
        let (renderer, log) = RecordingRenderer::new();
        let result = session
            .run(
                "interrupt",
                PluginArgs::new(),
                DispatchOptions::new().renderer(Box::new(renderer)),
            )
            .unwrap();
        assert!(result.is_none());
        assert_eq!(log.borrow().ends, 1);
        assert_eq!(*progress.borrow(), vec![("Aborted!\r\n".to_string(), true)]);
        assert!(inspected.borrow().is_empty());
    }

    #[test]
    fn test_interrupt_inspected_when_session_debug() {
        let inspector = CountingInspector::default();
        let inspected = inspector.0.clone();
        let mut session = SessionBuilder::new()
            .directory(directory())
            .seed(vec![("debug".to_string(), json!(true))])
            .inspector(inspector)
            .build()
            .unwrap();
        let (renderer, _log) = RecordingRenderer::new();
        session
            .run(
                "interrupt",
                PluginArgs::new(),
                DispatchOptions::new().renderer(Box::new(renderer)),
            )
            .unwrap();
        assert_eq!(inspected.borrow().len(), 1);
    }

    #[test]
    fn test_unexpected_error_escalates_without_debug() {
        let mut session = session();
        let (renderer, log) = RecordingRenderer::new();
        let Err(err) = session.run(
            "crash",
            PluginArgs::new(),
            DispatchOptions::new().renderer(Box::new(renderer)),
        ) else {
            panic!("expected an error");
        };
        assert!(matches!(err, Error::Plugin(PluginError::Other(_))));
        assert_eq!(log.borrow().ends, 1);
    }

    #[test]
    fn test_unexpected_error_inspected_with_debug() {
        let inspector = CountingInspector::default();
        let inspected = inspector.0.clone();
        let mut session = SessionBuilder::new()
            .directory(directory())
            .inspector(inspector)
            .build()
            .unwrap();
        let (renderer, _log) = RecordingRenderer::new();
        let result = session
            .run(
                "crash",
                PluginArgs::new(),
                DispatchOptions::new().renderer(Box::new(renderer)).debug(true),
            )
            .unwrap();
        assert!(result.is_none());
        assert_eq!(
            *inspected.borrow(),
            vec!["crash: page table walk exploded".to_string()]
        );
    }

    #[test]
    fn test_existing_output_file_is_not_touched() {
        let env = TestEnv::new();
        let path = env.path().join("out.txt");
        std::fs::write(&path, "keep me").unwrap();
        let mut session = session();

        let result = session
            .run("lines", PluginArgs::new(), DispatchOptions::new().output(&path))
            .unwrap();
        assert!(result.is_none());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "keep me");
    }

    #[test]
    fn test_unopenable_output_file_is_a_plugin_error() {
        let env = TestEnv::new();
        let path = env.path().join("missing").join("out.txt");
        let mut session = session();

        let Err(err) = session.run("lines", PluginArgs::new(), DispatchOptions::new().output(&path))
        else {
            panic!("expected an error");
        };
        assert!(matches!(err, Error::Plugin(PluginError::Io(_))));
    }

    #[test]
    fn test_unopenable_output_file_inspected_with_debug() {
        let env = TestEnv::new();
        let path = env.path().join("missing").join("out.txt");
        let inspector = CountingInspector::default();
        let inspected = inspector.0.clone();
        let mut session = SessionBuilder::new()
            .directory(directory())
            .inspector(inspector)
            .build()
            .unwrap();

        let result = session
            .run(
                "lines",
                PluginArgs::new(),
                DispatchOptions::new().output(&path).debug(true),
            )
            .unwrap();
        assert!(result.is_none());
        assert_eq!(inspected.borrow().len(), 1);
        assert!(!path.exists());
    }

    #[test]
    fn test_output_file_overwritten_when_allowed() {
        let env = TestEnv::new();
        let path = env.path().join("out.txt");
        std::fs::write(&path, "old").unwrap();
        let mut session = session();

        session
            .run(
                "lines",
                PluginArgs::new().with("count", 1),
                DispatchOptions::new().output(&path).overwrite(true),
            )
            .unwrap()
            .unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "line 0\n");

        session.update(|cfg| cfg.set("overwrite", &true)).unwrap();
        session
            .run("lines", PluginArgs::new(), DispatchOptions::new().output(&path))
            .unwrap()
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "line 0\nline 1\nline 2\n"
        );
    }

    #[test]
    fn test_fd_sink_receives_session_renderer_output() {
        let mut session = session();
        let out = SharedBuffer::new();
        session
            .run("lines", PluginArgs::new(), DispatchOptions::new().fd(out.clone()))
            .unwrap()
            .unwrap();
        assert_eq!(out.contents(), "line 0\nline 1\nline 2\n");
    }

    #[test]
    fn test_long_output_goes_to_pager() {
        let pager = RecordingPager::default();
        let mut session = SessionBuilder::new()
            .directory(directory())
            .pager(pager.clone())
            .seed(vec![("paging_limit".to_string(), json!(3))])
            .build()
            .unwrap();
        let out = SharedBuffer::new();
        session
            .run("lines", PluginArgs::new(), DispatchOptions::new().fd(out.clone()))
            .unwrap()
            .unwrap();
        assert_eq!(out.contents(), "");
        assert_eq!(pager.chunks.borrow().len(), 3);
        assert_eq!(*pager.flushes.borrow(), 1);
    }

    #[test]
    fn test_short_output_skips_pager() {
        let pager = RecordingPager::default();
        let mut session = SessionBuilder::new()
            .directory(directory())
            .pager(pager.clone())
            .seed(vec![("paging_limit".to_string(), json!(10))])
            .build()
            .unwrap();
        let out = SharedBuffer::new();
        session
            .run("lines", PluginArgs::new(), DispatchOptions::new().fd(out.clone()))
            .unwrap()
            .unwrap();
        assert_eq!(out.contents(), "line 0\nline 1\nline 2\n");
        assert!(pager.chunks.borrow().is_empty());
        assert_eq!(*pager.flushes.borrow(), 0);
    }

    #[test]
    fn test_instance_target_skips_construction() {
        let mut session = session();
        let (renderer, log) = RecordingRenderer::new();
        let plugin: Box<dyn Plugin> = Box::new(ScriptedPlugin {
            name: "adhoc",
            behaviour: Behaviour::Lines(1),
            count: None,
        });
        let result = session
            .run(
                plugin,
                PluginArgs::new(),
                DispatchOptions::new()
                    .renderer(Box::new(renderer))
                    .flags(["--count", "4"]),
            )
            .unwrap();
        assert_eq!(result.unwrap().name(), "adhoc");
        assert_eq!(log.borrow().lines, vec!["line 0"]);
    }

    #[test]
    fn test_handle_target_uses_bound_arguments() {
        let mut session = session();
        let (renderer, log) = RecordingRenderer::new();
        let handle = PluginHandle::new(ScriptedClass::new("unregistered", Behaviour::Lines(1)))
            .bind("count", 2);
        session
            .run(
                handle,
                PluginArgs::new(),
                DispatchOptions::new().renderer(Box::new(renderer)),
            )
            .unwrap()
            .unwrap();
        assert_eq!(log.borrow().lines.len(), 2);
    }

    #[test]
    fn test_interrupt_flag_cleared_at_dispatch() {
        let mut session = session();
        session.interrupt_flag().raise();
        let out = SharedBuffer::new();
        let result = session
            .run("lines", PluginArgs::new(), DispatchOptions::new().fd(out.clone()))
            .unwrap();
        assert!(result.is_some());
    }
}
