//! Relay CLI - Drive the relay gateway from the command line.
//!
//! Commands:
//! - `relay quote` - Fan out to several providers at once
//! - `relay forecast` - Fetch one quote per day, in order
//! - `relay config` - Manage configuration

mod commands;
mod config;
mod context;
mod output;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use relay_observability::LogFormat;

use commands::{ConfigArgs, ForecastArgs, QuoteArgs};

/// Relay CLI - Exercise cooperative cancellation against upstream providers
#[derive(Parser)]
#[command(name = "relay")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use JSON output format
    #[arg(long, global = true)]
    json: bool,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Log format (human or json)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Request quotes from several providers concurrently
    Quote(QuoteArgs),

    /// Request a day-by-day forecast
    Forecast(ForecastArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup output formatting
    let output = output::Output::new(cli.verbose, cli.json);

    // Load config
    let config_path = cli.config.as_deref();
    let ctx = context::Context::load(config_path, output)?;

    let format = cli.log_format.unwrap_or(ctx.config.logging.format);
    let directive = if cli.verbose {
        "debug"
    } else {
        ctx.config.logging.filter.as_str()
    };
    relay_observability::init_logging(format, directive).context("Failed to set up logging")?;

    // Execute command
    let result = match cli.command {
        Commands::Quote(args) => commands::quote::run(args, &ctx).await,
        Commands::Forecast(args) => commands::forecast::run(args, &ctx).await,
        Commands::Config(args) => commands::config::run(args, &ctx).await,
    };

    match result {
        Ok(true) => Ok(()),
        Ok(false) => std::process::exit(2),
        Err(e) => {
            ctx.output.error(&format!("{:#}", e));
            std::process::exit(1);
        }
    }
}
