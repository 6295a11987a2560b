pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "printshop",
    about = "PrintShop approvals operator CLI",
    long_about = "Operate the quote approval service: migrations, demo fixtures, the reminder sweep, and config inspection.",
    after_help = "Examples:\n  printshop migrate\n  printshop seed\n  printshop remind\n  printshop config"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load deterministic demo quotes into the database")]
    Seed,
    #[command(about = "Run one reminder sweep over quotes awaiting a decision")]
    Remind,
    #[command(about = "Inspect effective configuration values with source attribution and redaction")]
    Config,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Remind => commands::remind::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
