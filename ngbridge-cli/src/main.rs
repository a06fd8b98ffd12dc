//! ngbridge CLI - drive the bridge layer against the simulated engine.
//!
//! - `copy`   runs a long native operation with progress and cancellation
//! - `draw`   replays change events into debounced map-view draws
//! - `notify` shows how a veto mask routes a change code

mod commands;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;

use ngbridge::config::BridgeConfig;
use ngbridge::logging::init_logging;

use commands::{copy, draw, notify};
use error::CliError;

#[derive(Parser)]
#[command(name = "ngbridge")]
#[command(version = ngbridge::VERSION)]
#[command(about = "Exercise the ngbridge callback and draw-scheduling layer", long_about = None)]
struct Cli {
    /// Config file (default: ~/.ngbridge/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a long native operation with a progress bar
    Copy(copy::CopyArgs),
    /// Emit change events and report the draws they cause
    Draw(draw::DrawArgs),
    /// Explain how a veto mask routes a change code
    Notify(notify::NotifyArgs),
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        e.exit();
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = match &cli.config {
        Some(path) => BridgeConfig::load_from(path),
        None => BridgeConfig::load(),
    }
    .map_err(CliError::Config)?;

    let level = if cli.verbose { "debug" } else { "info" };
    let _logging = init_logging(&config.logging, level)
        .map_err(|e| CliError::LoggingInit(e.to_string()))?;
    info!(version = ngbridge::VERSION, "ngbridge starting");

    match cli.command {
        Commands::Copy(args) => copy::run(args),
        Commands::Draw(args) => draw::run(args, &config),
        Commands::Notify(args) => notify::run(args),
    }
}
