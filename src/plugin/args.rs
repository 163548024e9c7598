//! Turning raw command-line words into plugin arguments.

use super::{ArgKind, PluginArgs, PluginClass, PluginError};
use clap::parser::ValueSource;
use clap::{Arg, ArgAction, ArgMatches, Command};
use serde_json::Value;

/// Maps CLI-style flags onto keyword arguments for a plugin class.
pub trait ArgumentMapper {
    fn build_args(
        &self,
        class: &dyn PluginClass,
        flags: &[String],
    ) -> Result<PluginArgs, PluginError>;
}

/// Builds a `clap::Command` from the class's declared arguments.
///
/// Only flags present on the command line end up in the result, so values
/// the caller passed explicitly are never replaced by clap defaults.
/// Positional words are kept as positional arguments.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClapArgumentMapper;

const POSITIONAL: &str = "__positional";

impl ClapArgumentMapper {
    /// The clap command describing `class`.
    pub fn command_for(class: &dyn PluginClass) -> Command {
        let mut cmd = Command::new(class.name().to_string())
            .no_binary_name(true)
            .about(class.doc().trim().to_string())
            .arg(
                Arg::new(POSITIONAL)
                    .num_args(0..)
                    .action(ArgAction::Append)
                    .hide(true),
            );

        for spec in class.args() {
            let mut arg = Arg::new(spec.name.clone())
                .long(spec.name.clone())
                .help(spec.help.clone());
            let dashed = spec.name.replace('_', "-");
            if dashed != spec.name {
                arg = arg.alias(dashed);
            }
            arg = match spec.kind {
                ArgKind::Bool => arg.action(ArgAction::SetTrue),
                ArgKind::Int => arg
                    .action(ArgAction::Set)
                    .value_parser(parse_int),
                ArgKind::Str => arg.action(ArgAction::Set),
                ArgKind::List => arg.action(ArgAction::Append).num_args(1..),
            };
            cmd = cmd.arg(arg);
        }
        cmd
    }

    fn collect(class: &dyn PluginClass, matches: &ArgMatches) -> PluginArgs {
        let mut args = PluginArgs::new();

        if let Some(words) = matches.get_many::<String>(POSITIONAL) {
            for word in words {
                args.push_positional(word.clone());
            }
        }

        for spec in class.args() {
            if matches.value_source(&spec.name) != Some(ValueSource::CommandLine) {
                continue;
            }
            let value = match spec.kind {
                ArgKind::Bool => Value::Bool(matches.get_flag(&spec.name)),
                ArgKind::Int => matches
                    .get_one::<i64>(&spec.name)
                    .map(|v| Value::from(*v))
                    .unwrap_or(Value::Null),
                ArgKind::Str => matches
                    .get_one::<String>(&spec.name)
                    .map(|v| Value::String(v.clone()))
                    .unwrap_or(Value::Null),
                ArgKind::List => Value::Array(
                    matches
                        .get_many::<String>(&spec.name)
                        .map(|vals| vals.map(|v| Value::String(v.clone())).collect())
                        .unwrap_or_default(),
                ),
            };
            args.insert(&spec.name, value);
        }
        args
    }
}

/// Integers may be written in decimal or with a `0x` prefix, as addresses
/// usually are.
fn parse_int(raw: &str) -> Result<i64, String> {
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16),
        None => raw.parse::<i64>(),
    };
    parsed.map_err(|e| format!("invalid integer '{}': {}", raw, e))
}

impl ArgumentMapper for ClapArgumentMapper {
    fn build_args(
        &self,
        class: &dyn PluginClass,
        flags: &[String],
    ) -> Result<PluginArgs, PluginError> {
        let matches = Self::command_for(class)
            .try_get_matches_from(flags)
            .map_err(|e| PluginError::InvalidArgs(e.render().to_string().trim().to_string()))?;
        Ok(Self::collect(class, &matches))
    }
}
