mod browser;
mod cli;
mod commands;
mod config;
mod error;
mod extract;
mod logging;
mod records;
mod scraper;
mod utils;

use crate::cli::{Cli, Command};
use crate::config::Config;
use crate::error::Result;
use crate::logging::{init_logging, parse_log_level, LoggerConfig};
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::from_file_or_default(&cli.config)?;

    // Initialize logging with custom configuration
    let logger_config = LoggerConfig {
        directory: config.logging.directory.clone(),
        file_name: config.logging.filename.clone(),
        rotation: tracing_appender::rolling::Rotation::DAILY,
        level: parse_log_level(&config.logging.level)?,
    };

    init_logging(logger_config)?;

    log_info!("[main] Starting kindle-scraper...");

    let outcome = match cli.command {
        Command::ScrapeHighlights { headful, output } => {
            commands::highlights::run(&config, headful, output).await
        }
        Command::ScrapeLibrary { headful } => commands::library::run(&config, headful).await,
        Command::FormatJson { input, output } => commands::format::run(&config, input, output),
        Command::Analyze { input } => commands::analyze::run(&config, input),
        Command::ExportObsidian { input, output } => {
            commands::obsidian::run(&config, input, output)
        }
        Command::DebugDom => commands::debug_dom::run(&config).await,
    };

    if let Err(ref e) = outcome {
        log_error!(e => "[main] Command failed");
    } else {
        log_info!("[main] Command completed successfully");
    }

    outcome
}
