pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use menuwise_core::config::{AppConfig, LoadOptions, LogFormat};

#[derive(Debug, Parser)]
#[command(
    name = "menuwise",
    about = "Menuwise operator CLI",
    long_about = "Generate simulated order history, train the discount classifier, and inspect runtime readiness.",
    after_help = "Examples:\n  menuwise simulate --days 30 --seed 7 --out orders.jsonl\n  menuwise train --corpus orders.jsonl\n  menuwise doctor --json\n  menuwise config"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Write a simulated order history as JSON lines")]
    Simulate {
        #[arg(long, help = "Days of history to generate (defaults to simulation.num_days)")]
        days: Option<u32>,
        #[arg(long, help = "Seed for a reproducible history")]
        seed: Option<u64>,
        #[arg(long, help = "Destination JSON-lines file")]
        out: PathBuf,
    },
    #[command(about = "Train the discount classifier and persist its artifacts")]
    Train {
        #[arg(long, conflicts_with = "days", help = "Train on an existing JSON-lines corpus")]
        corpus: Option<PathBuf>,
        #[arg(long, help = "Simulate this many days instead of reading a corpus")]
        days: Option<u32>,
        #[arg(long, help = "Seed for the simulated corpus")]
        seed: Option<u64>,
    },
    #[command(about = "Validate config, artifact presence, and feature schema compatibility")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    let result = match cli.command {
        Command::Simulate { days, seed, out } => {
            commands::simulate::run(commands::simulate::SimulateArgs { days, seed, out })
        }
        Command::Train { corpus, days, seed } => {
            commands::train::run(commands::train::TrainArgs { corpus, days, seed })
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Logs go to stderr so stdout stays parseable. A config that fails to load is
/// reported by the command itself.
fn init_logging() {
    use tracing::Level;

    let Ok(config) = AppConfig::load(LoadOptions::default()) else {
        return;
    };
    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    match config.logging.format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Json => builder.json().init(),
    }
}
