//! calendar CLI entry point.

use std::process::ExitCode;

use clap::Parser;

use calendar_cli::cli::{Cli, Command, ConfigAction};
use calendar_cli::commands;
use calendar_cli::config::CalendarConfig;
use calendar_cli::error::CliResult;
use calendar_core::{TracingConfig, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let source = cli
        .config
        .clone()
        .unwrap_or_else(CalendarConfig::default_path);
    let config = match cli.config {
        Some(ref path) => CalendarConfig::load_from(path)?,
        None => CalendarConfig::load()?,
    };

    match cli.selected() {
        Command::Serve => {
            let tracing = match cli.debug {
                true => TracingConfig::debug(),
                false => config.logger.tracing_config()?,
            };
            init_tracing(tracing)?;

            let kind = cli.storage.unwrap_or(config.storage.kind);
            commands::serve::run(&config, kind).await
        }
        Command::Config { action } => match action {
            ConfigAction::Dump => commands::config::dump(&config, &source),
            ConfigAction::Validate => commands::config::validate(&config),
            ConfigAction::Path => commands::config::path(&source),
        },
        Command::Version => {
            println!("calendar {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
