mod commands;
mod config;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use commands::stage3::{LoanArgs, ProvisionsArgs};

/// Stage 3 CRMS minimum provisioning
#[derive(Parser)]
#[command(
    name = "crms",
    version,
    about = "Stage 3 CRMS minimum provision (ECL) calculations",
    long_about = "Computes regulatory minimum provisions for non-performing wholesale \
                  loans with decimal precision: secured/unsecured split, time-based \
                  provisioning percentages, and a floor at the ECL already held."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (defaults to csv for provisions, json otherwise)
    #[arg(long, global = true)]
    output: Option<OutputFormat>,

    /// Log level when RUST_LOG is not set
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision every loan in a CSV file and append the derived columns
    Provisions(ProvisionsArgs),
    /// Provision a single loan from flags, or a JSON batch
    Loan(LoanArgs),
    /// Print version information
    Version,
}

impl Commands {
    fn default_output(&self) -> OutputFormat {
        match self {
            Commands::Provisions(args) if args.out.is_none() => OutputFormat::Csv,
            _ => OutputFormat::Json,
        }
    }
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn init_tracing(level: &str, json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_json);

    let format = cli
        .output
        .clone()
        .unwrap_or_else(|| cli.command.default_output());

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Provisions(args) => commands::stage3::run_provisions(args),
        Commands::Loan(args) => commands::stage3::run_loan(args),
        Commands::Version => {
            println!("crms {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&format, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
