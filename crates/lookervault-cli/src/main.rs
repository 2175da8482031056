mod cli;
mod commands;
mod context;
mod error;
mod output;

use std::process::ExitCode;

use clap::Parser;
use lookervault_config::{CliOverrides, Config};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
use context::Context;
use error::CliError;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

fn run(cli: Cli) -> Result<u8, CliError> {
    let mut config = Config::load(cli.config.as_deref())?;
    config.apply_cli(&cli_overrides(&cli.command));

    let ctx = Context::open(config)?;

    match cli.command {
        Command::Extract(args) => commands::extract::run(&ctx, args),
        Command::Restore(args) => commands::restore::run(&ctx, args),
        Command::Snapshot(args) => commands::snapshot::run(&ctx, args),
    }
}

/// Collects the CLI-flag overrides present on whichever subcommand was
/// invoked, so [`Config::apply_cli`] sees them regardless of which command
/// the user ran.
fn cli_overrides(command: &Command) -> CliOverrides {
    match command {
        Command::Extract(args) => CliOverrides {
            workers: args.workers,
            batch_size: args.batch_size,
            db_path: args.db_path.clone(),
            rate_limit_per_minute: args.rate_limit_per_minute,
            rate_limit_per_second: args.rate_limit_per_second,
            ..Default::default()
        },
        Command::Restore(args) => CliOverrides {
            workers: args.workers,
            rate_limit_per_minute: args.rate_limit_per_minute,
            rate_limit_per_second: args.rate_limit_per_second,
            checkpoint_interval: args.checkpoint_interval,
            max_retries: args.max_retries,
            ..Default::default()
        },
        Command::Snapshot(_) => CliOverrides::default(),
    }
}
