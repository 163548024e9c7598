//! A line-oriented prompt over an [`InteractiveSession`].

use crate::session::InteractiveSession;
use crate::{ConfigValue, Error, Result};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::debug;

pub const PROMPT: &str = "msh> ";

/// One parsed input line.
#[derive(Debug, Clone, PartialEq)]
pub enum Line {
    Empty,
    /// `<plugin> [flags...] [> FILE]`
    Run {
        plugin: String,
        flags: Vec<String>,
        output: Option<PathBuf>,
    },
    /// `v` or `!!`
    Repeat,
    /// `set <key> <value>`; the value is JSON when it parses as JSON.
    Set { key: String, value: ConfigValue },
    Get { key: String },
    Reset,
    Help(Option<String>),
    Summary,
    Quit,
}

/// Parse one line of input.
pub fn parse_line(input: &str) -> Result<Line> {
    let mut words = split_words(input)?;
    if words.is_empty() {
        return Ok(Line::Empty);
    }
    let command = words.remove(0);
    let line = match command.as_str() {
        "v" | "!!" => Line::Repeat,
        "quit" | "exit" => Line::Quit,
        "reset" => Line::Reset,
        "summary" => Line::Summary,
        "help" | "?" => Line::Help(words.into_iter().next()),
        "get" => match words.as_slice() {
            [key] => Line::Get { key: key.clone() },
            _ => return Err(Error::InvalidInput("usage: get <key>".into())),
        },
        "set" => {
            if words.len() < 2 {
                return Err(Error::InvalidInput("usage: set <key> <value>".into()));
            }
            let key = words.remove(0);
            let raw = words.join(" ");
            let value = serde_json::from_str(&raw).unwrap_or(ConfigValue::String(raw));
            Line::Set { key, value }
        }
        _ => {
            let mut output = None;
            if let Some(pos) = words.iter().position(|w| w == ">") {
                let target = words.get(pos + 1).cloned().ok_or_else(|| {
                    Error::InvalidInput("expected a file name after '>'".into())
                })?;
                if words.len() > pos + 2 {
                    return Err(Error::InvalidInput(
                        "output redirection must come last".into(),
                    ));
                }
                output = Some(PathBuf::from(target));
                words.truncate(pos);
            }
            Line::Run {
                plugin: command,
                flags: words,
                output,
            }
        }
    };
    Ok(line)
}

/// Split on whitespace, honouring single quotes, double quotes, and
/// backslash escapes.
fn split_words(input: &str) -> Result<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some('"'), '\\') | (None, '\\') => {
                if let Some(next) = chars.next() {
                    current.push(next);
                    in_word = true;
                }
            }
            (Some(_), c) => current.push(c),
            (None, '\'') | (None, '"') => {
                quote = Some(c);
                in_word = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if quote.is_some() {
        return Err(Error::InvalidInput("unterminated quote".into()));
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

/// Read lines from `input` until end of input or `quit`.
///
/// Prompts and command feedback go to `out`; plugin output goes wherever
/// the session renders it. A plugin error that escapes the pipeline is
/// reported and the loop continues.
pub fn run_shell<R: BufRead, W: Write>(
    session: &mut InteractiveSession,
    mut input: R,
    out: &mut W,
) -> Result<()> {
    let mut buf = String::new();
    loop {
        write!(out, "{}", PROMPT)?;
        out.flush()?;

        buf.clear();
        if input.read_line(&mut buf)? == 0 {
            writeln!(out)?;
            return Ok(());
        }

        let line = match parse_line(buf.trim()) {
            Ok(line) => line,
            Err(e) => {
                writeln!(out, "{}", e)?;
                continue;
            }
        };
        debug!("shell: {:?}", line);

        match execute(session, line, out)? {
            Ok(Flow::Continue) => {}
            Ok(Flow::Quit) => return Ok(()),
            Err(e) => writeln!(out, "Error: {}", e)?,
        }
    }
}

enum Flow {
    Continue,
    Quit,
}

/// The outer result fails only when `out` can no longer be written; the
/// inner one carries the command's own failure.
fn execute<W: Write>(
    session: &mut InteractiveSession,
    line: Line,
    out: &mut W,
) -> io::Result<Result<Flow>> {
    let outcome = match line {
        Line::Empty => Ok(()),
        Line::Run {
            plugin,
            flags,
            output,
        } => session.invoke(&plugin, flags, output).map(drop),
        Line::Repeat => {
            if !session.has_last() {
                writeln!(out, "Nothing to repeat")?;
                return Ok(Ok(Flow::Continue));
            }
            session.repeat_last().map(drop)
        }
        Line::Set { key, value } => session.update(|cfg| cfg.set(&key, &value)),
        Line::Get { key } => {
            match session.get_parameter(&key) {
                Some(value) => writeln!(out, "{}", value)?,
                None => writeln!(out, "{} is not set", key)?,
            }
            Ok(())
        }
        Line::Reset => {
            session.reset();
            Ok(())
        }
        Line::Help(topic) => {
            write!(out, "{}", session.help(topic.as_deref()))?;
            Ok(())
        }
        Line::Summary => {
            write!(out, "{}", session.summary())?;
            Ok(())
        }
        Line::Quit => return Ok(Ok(Flow::Quit)),
    };
    Ok(outcome.map(|()| Flow::Continue))
}
