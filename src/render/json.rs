use super::{LineBuffer, OutputSink, Renderer};
use crate::plugin::{PluginArgs, PluginError};
use crate::session::Session;
use serde_json::{Map, Value, json};
use std::io;

/// One JSON document per line, for machine consumers.
pub struct JsonRenderer {
    out: LineBuffer,
    columns: Vec<String>,
}

impl JsonRenderer {
    pub fn new(session: &Session, sink: OutputSink, paging_limit: Option<usize>) -> Self {
        Self {
            out: LineBuffer::new(sink, paging_limit, session.interrupt_flag().clone()),
            columns: Vec::new(),
        }
    }

    fn record(&mut self, value: Value) -> Result<(), PluginError> {
        self.out.emit(value.to_string())
    }
}

impl Renderer for JsonRenderer {
    fn start(&mut self) -> io::Result<()> {
        self.out.reset();
        self.columns.clear();
        Ok(())
    }

    fn start_plugin(&mut self, name: &str, args: &PluginArgs) -> io::Result<()> {
        let record = json!({ "plugin": name, "args": args });
        self.out.emit(record.to_string()).map_err(|e| match e {
            PluginError::Io(io) => io,
            other => io::Error::other(other.to_string()),
        })
    }

    fn end(&mut self) -> io::Result<()> {
        self.out.finish()
    }

    fn section(&mut self, title: &str) -> Result<(), PluginError> {
        self.columns.clear();
        self.record(json!({ "section": title }))
    }

    fn table_header(&mut self, columns: &[&str]) -> Result<(), PluginError> {
        self.columns = columns.iter().map(|c| (*c).to_string()).collect();
        Ok(())
    }

    fn table_row(&mut self, cells: &[Value]) -> Result<(), PluginError> {
        let row = if self.columns.len() == cells.len() {
            let mut obj = Map::new();
            for (column, cell) in self.columns.iter().zip(cells) {
                obj.insert(column.clone(), cell.clone());
            }
            Value::Object(obj)
        } else {
            Value::Array(cells.to_vec())
        };
        self.record(json!({ "row": row }))
    }

    fn write_line(&mut self, text: &str) -> Result<(), PluginError> {
        self.record(json!({ "text": text }))
    }

    fn data(&self) -> &[String] {
        self.out.held()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::SharedBuffer;
    use crate::session::SessionBuilder;

    #[test]
    fn test_rows_use_header_columns() {
        let session = SessionBuilder::new().build().unwrap();
        let out = SharedBuffer::new();
        let mut r = JsonRenderer::new(&session, OutputSink::Writer(Box::new(out.clone())), None);
        r.start().unwrap();
        r.start_plugin("pslist", &PluginArgs::new().with("pid", 4))
            .unwrap();
        r.table_header(&["pid", "name"]).unwrap();
        r.table_row(&[json!(4), json!("System")]).unwrap();
        r.table_row(&[json!(8)]).unwrap();
        r.end().unwrap();

        let records: Vec<Value> = out
            .contents()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(records[0]["plugin"], "pslist");
        assert_eq!(records[0]["args"]["named"]["pid"], 4);
        assert_eq!(records[1], json!({ "row": { "pid": 4, "name": "System" } }));
        assert_eq!(records[2], json!({ "row": [8] }));
    }
}
