//! msh - interactive shell for memory forensics plugins.

use clap::Parser;
use memshell::cli::{Cli, Commands};
use memshell::config::{resolve_seed, system_config_path};
use memshell::render::InterruptFlag;
use memshell::session::{DispatchOptions, InteractiveSession, SessionBuilder};
use memshell::{PluginArgs, shell};
use std::io;
use std::process;
use tracing::warn;
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, reload, util::SubscriberInitExt};

type LogHandle = reload::Handle<EnvFilter, Registry>;

fn main() {
    let cli = Cli::parse();
    let log = init_logging();

    let interrupt = InterruptFlag::new();
    let flag = interrupt.clone();
    if let Err(e) = ctrlc::set_handler(move || flag.raise()) {
        warn!("Could not install interrupt handler: {}", e);
    }

    match run(cli, log, interrupt) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

/// Log to stderr, filtered by `MSH_LOG` (default `warn`). The returned
/// handle lets the session's `logging` key change the level later.
fn init_logging() -> LogHandle {
    let filter = EnvFilter::try_from_env("MSH_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let (filter, handle) = reload::Layer::new(filter);
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(false),
        )
        .init();
    handle
}

/// Returns whether the command completed.
fn run(cli: Cli, log: LogHandle, interrupt: InterruptFlag) -> memshell::Result<bool> {
    let overrides = cli.overrides()?;
    let system = system_config_path();
    let seed = resolve_seed(system.as_deref(), cli.config.as_deref(), &overrides)?;

    if let Some(Commands::Config { sources: true }) = &cli.command {
        for (key, resolved) in seed.iter() {
            println!("{} = {}  ({})", key, resolved.value, resolved.source);
        }
        return Ok(true);
    }

    let mut session = SessionBuilder::new()
        .interrupt_flag(interrupt)
        .on_log_level(move |level| {
            if let Err(e) = log.modify(|filter| *filter = EnvFilter::new(level)) {
                warn!("Could not change log level: {}", e);
            }
        })
        .seed(seed.values())
        .build()?;

    let options = || DispatchOptions::new().debug(cli.debug);
    let completed = match cli.command.clone().unwrap_or(Commands::Shell) {
        Commands::Run {
            output,
            plugin,
            flags,
        } => {
            let mut options = options().flags(flags);
            options.output = output;
            session
                .run(plugin.as_str(), PluginArgs::new(), options)?
                .is_some()
        }
        Commands::Plugins => session
            .run("plugins", PluginArgs::new(), options())?
            .is_some(),
        Commands::Info { plugin } => session
            .run("info", PluginArgs::new().with("plugin", plugin), options())?
            .is_some(),
        Commands::Config { .. } => session
            .run("config", PluginArgs::new(), options())?
            .is_some(),
        Commands::Shell => {
            let mut interactive = InteractiveSession::new(session);
            let stdin = io::stdin();
            let mut stdout = io::stdout();
            shell::run_shell(&mut interactive, stdin.lock(), &mut stdout)?;
            true
        }
    };
    Ok(completed)
}
