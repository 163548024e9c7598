//! Paging long output.

use std::io::{self, Write};
use std::process::{Command, Stdio};
use tracing::debug;

/// Receives overflowing output and shows it to the user.
pub trait Pager {
    fn write(&mut self, chunk: &str) -> io::Result<()>;

    /// Show everything written so far. Blocks until the user is done.
    fn flush(&mut self) -> io::Result<()>;
}

/// Pipes output into an external program such as `less -R`.
#[derive(Debug, Clone)]
pub struct ExternalPager {
    command: String,
    buffer: String,
}

impl ExternalPager {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            buffer: String::new(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

impl Pager for ExternalPager {
    fn write(&mut self, chunk: &str) -> io::Result<()> {
        self.buffer.push_str(chunk);
        if !chunk.ends_with('\n') {
            self.buffer.push('\n');
        }
        Ok(())
    }

    /// The buffer is emptied whether or not the pager runs, and a spawned
    /// pager is always waited for.
    fn flush(&mut self) -> io::Result<()> {
        let text = std::mem::take(&mut self.buffer);
        let mut words = self.command.split_whitespace();
        let Some(program) = words.next() else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "pager command is empty",
            ));
        };
        debug!("Paging {} bytes through {}", text.len(), self.command);

        let mut child = Command::new(program)
            .args(words)
            .stdin(Stdio::piped())
            .spawn()?;
        let written = match child.stdin.take() {
            Some(mut stdin) => match stdin.write_all(text.as_bytes()) {
                // The pager may exit before reading everything.
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
                other => other,
            },
            None => Ok(()),
        };

        let status = child.wait()?;
        if !status.success() {
            debug!("Pager exited with {}", status);
        }
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_command_is_rejected() {
        let mut pager = ExternalPager::new("  ");
        pager.write("line").unwrap();
        assert_eq!(
            pager.flush().unwrap_err().kind(),
            io::ErrorKind::InvalidInput
        );
        assert!(pager.buffer.is_empty());
    }

    #[test]
    fn test_failed_spawn_drops_buffered_output() {
        let mut pager = ExternalPager::new("/nonexistent/msh-pager --quiet");
        pager.write("stale").unwrap();
        assert!(pager.flush().is_err());
        assert!(pager.buffer.is_empty());

        pager.write("fresh").unwrap();
        assert_eq!(pager.buffer, "fresh\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_pager_that_exits_early_is_reaped() {
        let mut pager = ExternalPager::new("true");
        for i in 0..20_000 {
            pager.write(&format!("line {}", i)).unwrap();
        }
        pager.flush().unwrap();
        assert!(pager.buffer.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_pipes_buffer_through_command() {
        let mut pager = ExternalPager::new("cat");
        pager.write("one").unwrap();
        pager.write("two\n").unwrap();
        assert_eq!(pager.buffer, "one\ntwo\n");
        pager.flush().unwrap();
        assert!(pager.buffer.is_empty());
    }
}
