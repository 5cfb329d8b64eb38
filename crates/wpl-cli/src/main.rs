//! wpl - resolve Python requirements into a shared wheel pool

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use wpl_cli::cmd;
use wpl_cli::{Cli, Commands};

/// `WPL_LOG` wins; otherwise `-v` flags pick the level.
fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_env("WPL_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let global = &cli.global;
    match &cli.command {
        Commands::Solve {
            requirements,
            no_deps,
        } => cmd::solve::solve(global, requirements, *no_deps),
        Commands::Install {
            requirements,
            editable,
            no_deps,
        } => cmd::install::install(global, requirements, editable, *no_deps),
        Commands::Pool { command } => cmd::pool::run(global, command),
        Commands::Links { command } => cmd::links::run(global, command),
        Commands::Cache { command } => cmd::cache::run(global, command),
    }
}

/// Usage errors exit 2, like clap's own argument errors.
fn exit_code(error: &anyhow::Error) -> ExitCode {
    let usage = error
        .downcast_ref::<wpl_core::Error>()
        .is_some_and(wpl_core::Error::is_usage);
    if usage {
        ExitCode::from(2)
    } else {
        ExitCode::FAILURE
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error:#}");
            exit_code(&error)
        }
    }
}
