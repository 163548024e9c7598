use super::{LineBuffer, OutputSink, Renderer};
use crate::plugin::{PluginArgs, PluginError};
use crate::session::Session;
use serde_json::Value;
use std::io;
use tracing::debug;

const DEFAULT_MAX_COLUMN_WIDTH: usize = 40;

/// Plain text tables for a terminal.
pub struct TextRenderer {
    out: LineBuffer,
    max_column_width: usize,
    widths: Vec<usize>,
}

impl TextRenderer {
    pub fn new(session: &Session, sink: OutputSink, paging_limit: Option<usize>) -> Self {
        let max_column_width = session
            .get_parameter_as::<usize>("max_column_width")
            .filter(|w| *w > 0)
            .unwrap_or(DEFAULT_MAX_COLUMN_WIDTH);
        Self {
            out: LineBuffer::new(sink, paging_limit, session.interrupt_flag().clone()),
            max_column_width,
            widths: Vec::new(),
        }
    }

    fn cell(&self, value: &Value, width: usize) -> String {
        let text = match value {
            Value::String(s) => s.clone(),
            Value::Null => "-".to_string(),
            other => other.to_string(),
        };
        let mut text: String = text.chars().take(self.max_column_width).collect();
        let len = text.chars().count();
        if len < width {
            text.push_str(&" ".repeat(width - len));
        }
        text
    }
}

impl Renderer for TextRenderer {
    fn start(&mut self) -> io::Result<()> {
        self.out.reset();
        self.widths.clear();
        Ok(())
    }

    fn start_plugin(&mut self, name: &str, args: &PluginArgs) -> io::Result<()> {
        debug!("Rendering {} with {:?}", name, args);
        Ok(())
    }

    fn end(&mut self) -> io::Result<()> {
        self.out.finish()
    }

    fn section(&mut self, title: &str) -> Result<(), PluginError> {
        self.widths.clear();
        self.out.emit(String::new())?;
        self.out.emit(title.to_string())?;
        self.out.emit("-".repeat(title.chars().count()))
    }

    fn table_header(&mut self, columns: &[&str]) -> Result<(), PluginError> {
        self.widths = columns
            .iter()
            .map(|c| c.chars().count().max(8).min(self.max_column_width))
            .collect();
        let header = columns
            .iter()
            .zip(&self.widths)
            .map(|(c, w)| self.cell(&Value::String((*c).to_string()), *w))
            .collect::<Vec<_>>()
            .join("  ");
        let rule = self
            .widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("  ");
        self.out.emit(header.trim_end().to_string())?;
        self.out.emit(rule)
    }

    fn table_row(&mut self, cells: &[Value]) -> Result<(), PluginError> {
        let row = cells
            .iter()
            .enumerate()
            .map(|(i, v)| self.cell(v, self.widths.get(i).copied().unwrap_or(0)))
            .collect::<Vec<_>>()
            .join("  ");
        self.out.emit(row.trim_end().to_string())
    }

    fn write_line(&mut self, text: &str) -> Result<(), PluginError> {
        self.out.emit(text.to_string())
    }

    fn data(&self) -> &[String] {
        self.out.held()
    }
}
