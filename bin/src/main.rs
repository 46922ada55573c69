//! zonda CLI - crypto exchange account history exporter.

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod commands;
mod display;

use display::{DataType, Format};

#[derive(Parser)]
#[command(name = "zonda")]
#[command(about = "Export crypto exchange account history to CSV or NDJSON", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Quiet mode (suppress progress output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Export account history for one or more exchanges
    Export {
        /// Exchange identifiers (e.g. binance_pm, okx)
        #[arg(short, long = "exchange", num_args = 1.., required = true)]
        exchange: Vec<String>,

        /// Only pull the named accounts
        #[arg(long, num_args = 1..)]
        accounts: Vec<String>,

        /// Record kinds to fetch
        #[arg(long = "data-types", num_args = 1.., value_enum, required = true)]
        data_types: Vec<DataType>,

        /// Start time (YYYY-MM-DD, 'YYYY-MM-DD HH:MM:SS', or ISO-8601)
        #[arg(short, long)]
        start: String,

        /// End time, exclusive
        #[arg(short, long)]
        end: String,

        /// Only keep trades and funding for these symbols
        #[arg(long, num_args = 1..)]
        symbols: Vec<String>,

        /// Export root directory
        #[arg(short, long, default_value = "./output")]
        output_dir: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "csv")]
        format: Format,

        /// Re-scan this many milliseconds at each fetch window boundary
        #[arg(long, default_value = "0")]
        overlap_ms: i64,

        /// Accounts fetched concurrently
        #[arg(long, default_value = "4")]
        concurrency: usize,

        /// Configuration file path
        #[arg(short, long, default_value = "config.yml")]
        config: PathBuf,
    },

    /// List the supported exchanges
    Exchanges,

    /// Show configured accounts with redacted credentials
    Accounts {
        /// Configuration file path
        #[arg(short, long, default_value = "config.yml")]
        config: PathBuf,

        /// Only show accounts for this exchange
        #[arg(short, long)]
        exchange: Option<String>,
    },
}

fn init_tracing(verbose: u8, quiet: bool) {
    let default_level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    // Show help if no command provided
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(ExitCode::SUCCESS);
    };

    match command {
        Commands::Export {
            exchange,
            accounts,
            data_types,
            start,
            end,
            symbols,
            output_dir,
            format,
            overlap_ms,
            concurrency,
            config,
        } => {
            commands::export::export(
                exchange,
                accounts,
                &data_types,
                &start,
                &end,
                symbols,
                output_dir,
                format,
                overlap_ms,
                concurrency,
                &config,
                cli.quiet,
            )
            .await
        }
        Commands::Exchanges => {
            commands::exchanges::list_exchanges();
            Ok(ExitCode::SUCCESS)
        }
        Commands::Accounts { config, exchange } => {
            commands::accounts::list_accounts(&config, exchange.as_deref())?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
