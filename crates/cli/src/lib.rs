pub mod commands;

use clap::{Parser, Subcommand};
use soof_core::config::{AppConfig, LoadOptions, LogFormat};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "soof",
    about = "Soof operator CLI",
    long_about = "Run chat turns against the Soof shop assistant, apply migrations, inspect config and check readiness.",
    after_help = "Examples:\n  soof turn --thread demo \"Is foliumzuur veilig tijdens de zwangerschap?\"\n  soof doctor --json\n  soof config"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Process one user message on a thread and print the released reply")]
    Turn {
        #[arg(long, help = "Thread identifier the message belongs to")]
        thread: String,
        #[arg(long, help = "Shop domain used by the product catalog tool")]
        shop_domain: Option<String>,
        #[arg(long, help = "Emit the full turn outcome as JSON")]
        json: bool,
        #[arg(help = "The customer's message")]
        message: String,
    },
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, model and claims index readiness, and DB connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

/// Logs go to stderr; stdout carries command payloads.
pub fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    let _ = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    if let Ok(config) = AppConfig::load(LoadOptions::default()) {
        init_logging(&config);
    }

    let result = match cli.command {
        Command::Turn { thread, shop_domain, json, message } => {
            commands::turn::run(commands::turn::TurnArgs { thread, shop_domain, json, message })
        }
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
