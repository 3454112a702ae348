pub mod cli;
pub mod config;
pub mod logging_system;

pub use cli::{Cli, Command};
pub use logging_system::{LoggingSystem, TracingLevel, setup_logging};

use crate::domain::LogEvent;
use crate::handler::SearchHandler;
use anyhow::Context;
use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info, warn};

const CLI_LOGGER: &str = "ecs-log-shipper.cli";

pub fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_logging(cli.log_level, cli.json_logs) {
        eprintln!("Warning: Logging setup failed: {e}");
    }

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

pub fn run(cli: &Cli) -> anyhow::Result<ExitCode> {
    let config = cli.resolve_config().context("Failed to load configuration")?;
    let handler = SearchHandler::new(&config).context("Failed to create search handler")?;

    match &cli.command {
        Command::Ping => {
            let hosts = config.connection.hosts.join(",");
            if handler.ping() {
                info!(%hosts, "Datastore reachable");
                Ok(ExitCode::SUCCESS)
            } else {
                warn!(%hosts, "Datastore unreachable");
                Ok(ExitCode::FAILURE)
            }
        }
        Command::Send {
            message,
            level,
            count,
        } => {
            for sequence in 0..*count {
                let event = LogEvent::new(*level, CLI_LOGGER, message.clone())
                    .with_extra("sequence", sequence);
                handler.emit(event).context("Failed to emit event")?;
            }
            handler.close().context("Failed to flush events")?;

            let stats = handler.stats();
            info!(
                index = %handler.current_index(),
                sent = stats.documents_sent,
                rejected = stats.documents_rejected,
                dropped_batches = stats.batches_dropped,
                "Send finished"
            );
            if stats.batches_dropped > 0 {
                Ok(ExitCode::FAILURE)
            } else {
                Ok(ExitCode::SUCCESS)
            }
        }
    }
}
