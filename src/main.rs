use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use eva_valuation::commands::{self, AppContext};
use eva_valuation::models::Config;

/// EVA/EFV valuation of listed Brazilian companies
#[derive(Parser)]
#[command(name = "eva-valuation")]
#[command(version = "0.1.0")]
#[command(about = "Value every mapped company with an EVA perpetuity model and print the results as JSON")]
#[command(long_about = "
Reads the reconciled statement tables produced by `update-data`, fetches live quotes and
price history from Yahoo Finance and rates from the Central Bank of Brazil, and prints the
filtered valuation results as JSON on stdout.

Examples:
  cargo run -- market-info
  cargo run -- analyze --pretty
  cargo run -- --data-dir ./consolidated_data analyze
")]
struct Args {
    /// Directory holding the reconciled statement tables
    #[arg(long, global = true)]
    data_dir: Option<std::path::PathBuf>,

    /// Ticker mapping CSV (CD_CVM, TICKER, NOME_EMPRESA)
    #[arg(long, global = true)]
    ticker_map: Option<std::path::PathBuf>,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the market assumptions used by the valuation
    MarketInfo,
    /// Run the full analysis over the ticker mapping
    Analyze,
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", json);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("eva_valuation=info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("setting default subscriber failed");

    let args = Args::parse();

    let mut config = Config::from_env()?;
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }
    if let Some(ticker_map) = args.ticker_map {
        config.ticker_map_path = ticker_map;
    }
    info!("📋 Configuration loaded (data dir: {})", config.data_dir.display());

    let ctx = AppContext::new(config)?;

    let outcome = match args.command {
        Command::MarketInfo => commands::get_market_info(&ctx)
            .await
            .and_then(|entries| print_json(&entries, args.pretty).map_err(|e| e.to_string())),
        Command::Analyze => commands::run_analysis(&ctx)
            .await
            .and_then(|results| print_json(&results, args.pretty).map_err(|e| e.to_string())),
    };

    if let Err(message) = outcome {
        error!("❌ {}", message);
        println!("{}", serde_json::json!({ "error": message }));
        std::process::exit(1);
    }

    Ok(())
}
