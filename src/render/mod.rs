//! Output renderers.
//!
//! A [`Renderer`] receives everything a plugin prints. The dispatch pipeline
//! brackets a plugin run with [`Renderer::start`], [`Renderer::start_plugin`]
//! and [`Renderer::end`]. When the session has a pager, renderers are given a
//! paging threshold: output is held back until `end()` and written to the
//! sink only if it stayed under the threshold; otherwise the pipeline hands
//! the held lines to the [`Pager`].

pub mod json;
pub mod pager;
pub mod text;

pub use json::JsonRenderer;
pub use pager::{ExternalPager, Pager};
pub use text::TextRenderer;

use crate::plugin::{PluginArgs, PluginError};
use crate::session::Session;
use serde_json::Value;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Receives plugin output.
pub trait Renderer {
    /// Called before the plugin is constructed.
    fn start(&mut self) -> io::Result<()>;

    /// Called once the plugin exists, with its final arguments.
    fn start_plugin(&mut self, name: &str, args: &PluginArgs) -> io::Result<()>;

    /// Called exactly once after `start()`, whatever happened in between.
    fn end(&mut self) -> io::Result<()>;

    fn section(&mut self, title: &str) -> Result<(), PluginError>;

    fn table_header(&mut self, columns: &[&str]) -> Result<(), PluginError>;

    fn table_row(&mut self, cells: &[Value]) -> Result<(), PluginError>;

    fn write_line(&mut self, text: &str) -> Result<(), PluginError>;

    /// Output held back for paging. Empty when paging is off.
    fn data(&self) -> &[String];
}

/// Set when the user asks to cancel the running command.
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(PluginError::Interrupted)` once the flag is raised.
    pub fn check(&self) -> Result<(), PluginError> {
        if self.is_raised() {
            Err(PluginError::Interrupted)
        } else {
            Ok(())
        }
    }
}

/// Where rendered output goes.
pub enum OutputSink {
    Stdout,
    File(BufWriter<File>),
    Writer(Box<dyn Write>),
}

impl Write for OutputSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            OutputSink::Stdout => io::stdout().write(buf),
            OutputSink::File(f) => f.write(buf),
            OutputSink::Writer(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            OutputSink::Stdout => io::stdout().flush(),
            OutputSink::File(f) => f.flush(),
            OutputSink::Writer(w) => w.flush(),
        }
    }
}

/// Line output shared by the concrete renderers: writes through when paging
/// is off, holds lines back when it is on.
pub(crate) struct LineBuffer {
    sink: OutputSink,
    paging_limit: Option<usize>,
    held: Vec<String>,
    interrupt: InterruptFlag,
}

impl LineBuffer {
    pub(crate) fn new(sink: OutputSink, paging_limit: Option<usize>, interrupt: InterruptFlag) -> Self {
        Self {
            sink,
            paging_limit,
            held: Vec::new(),
            interrupt,
        }
    }

    pub(crate) fn emit(&mut self, line: String) -> Result<(), PluginError> {
        self.interrupt.check()?;
        match self.paging_limit {
            Some(_) => self.held.push(line),
            None => writeln!(self.sink, "{}", line)?,
        }
        Ok(())
    }

    /// Write held lines unless they reached the paging threshold, then flush.
    pub(crate) fn finish(&mut self) -> io::Result<()> {
        if let Some(limit) = self.paging_limit {
            if self.held.len() < limit {
                for line in &self.held {
                    writeln!(self.sink, "{}", line)?;
                }
            }
        }
        self.sink.flush()
    }

    pub(crate) fn reset(&mut self) {
        self.held.clear();
    }

    pub(crate) fn held(&self) -> &[String] {
        &self.held
    }
}

/// The renderer classes a session can select by name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RendererKind {
    #[default]
    Text,
    Json,
}

impl RendererKind {
    /// Parse a renderer name, case-insensitive. Class-style names such as
    /// `TextRenderer` are accepted too.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "text" | "textrenderer" => Some(RendererKind::Text),
            "json" | "jsonrenderer" => Some(RendererKind::Json),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RendererKind::Text => "text",
            RendererKind::Json => "json",
        }
    }

    /// Build a renderer of this kind writing to `sink`.
    pub fn build(
        self,
        session: &Session,
        sink: OutputSink,
        paging_limit: Option<usize>,
    ) -> Box<dyn Renderer> {
        match self {
            RendererKind::Text => Box::new(TextRenderer::new(session, sink, paging_limit)),
            RendererKind::Json => Box::new(JsonRenderer::new(session, sink, paging_limit)),
        }
    }
}

impl std::fmt::Display for RendererKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A cloneable in-memory writer, handy as an explicit output sink.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<std::sync::Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded.
    pub fn contents(&self) -> String {
        let bytes = self.0.lock().map(|b| b.clone()).unwrap_or_default();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self
            .0
            .lock()
            .map_err(|_| io::Error::other("output buffer poisoned"))?;
        inner.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renderer_kind_from_name() {
        assert_eq!(RendererKind::from_name("text"), Some(RendererKind::Text));
        assert_eq!(RendererKind::from_name("TextRenderer"), Some(RendererKind::Text));
        assert_eq!(RendererKind::from_name("JSON"), Some(RendererKind::Json));
        assert_eq!(RendererKind::from_name("html"), None);
    }

    #[test]
    fn test_line_buffer_writes_through_without_paging() {
        let out = SharedBuffer::new();
        let mut buf = LineBuffer::new(
            OutputSink::Writer(Box::new(out.clone())),
            None,
            InterruptFlag::new(),
        );
        buf.emit("a".into()).unwrap();
        assert_eq!(out.contents(), "a\n");
        assert!(buf.held().is_empty());
    }

    #[test]
    fn test_line_buffer_holds_overflow_for_pager() {
        let out = SharedBuffer::new();
        let mut buf = LineBuffer::new(
            OutputSink::Writer(Box::new(out.clone())),
            Some(2),
            InterruptFlag::new(),
        );
        buf.emit("a".into()).unwrap();
        buf.emit("b".into()).unwrap();
        buf.finish().unwrap();
        assert_eq!(out.contents(), "");
        assert_eq!(buf.held(), &["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_line_buffer_flushes_short_output() {
        let out = SharedBuffer::new();
        let mut buf = LineBuffer::new(
            OutputSink::Writer(Box::new(out.clone())),
            Some(5),
            InterruptFlag::new(),
        );
        buf.emit("a".into()).unwrap();
        buf.finish().unwrap();
        assert_eq!(out.contents(), "a\n");
    }

    #[test]
    fn test_interrupt_stops_output() {
        let flag = InterruptFlag::new();
        let mut buf = LineBuffer::new(OutputSink::Writer(Box::new(io::sink())), None, flag.clone());
        flag.raise();
        assert!(matches!(buf.emit("a".into()), Err(PluginError::Interrupted)));
        flag.clear();
        assert!(buf.emit("a".into()).is_ok());
    }
}
