pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "storefront",
    about = "Storefront operator CLI",
    long_about = "Inspect storefront configuration, check runtime readiness, apply migrations, and query the catalog.",
    after_help = "Examples:\n  storefront doctor --json\n  storefront config\n  storefront catalog --search mug --hide-out-of-stock"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, provider credentials, static assets, and DB connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Run a catalog query against the seeded product catalog and print JSON")]
    Catalog {
        #[arg(long, help = "Case-insensitive term matched against name and description")]
        search: Option<String>,
        #[arg(long, help = "Drop products with no available stock")]
        hide_out_of_stock: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Catalog { search, hide_out_of_stock } => {
            commands::catalog::run(search, hide_out_of_stock)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
