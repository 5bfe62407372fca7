pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "libdesk",
    about = "Library desk operator CLI",
    long_about = "Operate the library desk database: migrations, demo data, config inspection, readiness checks and inventory reports.",
    after_help = "Examples:\n  libdesk doctor --json\n  libdesk seed\n  libdesk inventory --threshold 3"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo catalog and customers (safe to run repeatedly)")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, language model settings, and DB connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Report books at or below the low-stock threshold as JSON")]
    Inventory {
        #[arg(long, help = "Override the configured low-stock threshold")]
        threshold: Option<i64>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Inventory { threshold } => commands::inventory::run(threshold),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
