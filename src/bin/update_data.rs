use anyhow::{anyhow, Context, Result};
use chrono::{Datelike, Utc};
use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use eva_valuation::etl::{self, StatementReconciler, ZipArchiveSource};
use eva_valuation::models::{Config, StatementType};
use eva_valuation::statements::load_cvm_codes;

/// Rebuild the reconciled statement tables from yearly regulator archives
#[derive(Parser)]
#[command(name = "update-data")]
#[command(version = "0.1.0")]
#[command(about = "Merge yearly DFP archives into one consolidated CSV per statement type")]
#[command(long_about = "
Reads dfp_cia_aberta_<year>.zip archives from the archive directory, keeps only the
companies listed in the ticker mapping, prefers consolidated reports over individual ones
per company and year, and writes one <type>_consolidated.csv per statement type.

Exits with status 0 when at least one statement table was generated.

Examples:
  cargo run --bin update-data
  cargo run --bin update-data -- --history-years 4 --cleanup
")]
struct Args {
    /// Directory holding the yearly ZIP archives
    #[arg(long)]
    archive_dir: Option<PathBuf>,

    /// Directory the consolidated tables are written to
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Ticker mapping CSV used to select companies
    #[arg(long)]
    ticker_map: Option<PathBuf>,

    /// Years of history before the current year
    #[arg(long)]
    history_years: Option<i32>,

    /// Remove the archive directory once processing finishes
    #[arg(long, default_value_t = false)]
    cleanup: bool,
}

fn run(args: Args) -> Result<bool> {
    let mut config = Config::from_env()?;
    if let Some(dir) = args.archive_dir {
        config.archive_dir = dir;
    }
    if let Some(dir) = args.output_dir {
        config.data_dir = dir;
    }
    if let Some(path) = args.ticker_map {
        config.ticker_map_path = path;
    }
    if let Some(years) = args.history_years {
        config.history_years = years;
    }

    info!("📋 Loading ticker mapping from {}", config.ticker_map_path.display());
    let filter = load_cvm_codes(&config.ticker_map_path)
        .with_context(|| format!("Cannot load {}", config.ticker_map_path.display()))?;
    info!("✓ {} unique CVM codes to process", filter.len());

    if !config.archive_dir.is_dir() {
        return Err(anyhow!(
            "Archive directory {} not found; place the yearly .zip files there",
            config.archive_dir.display()
        ));
    }
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("Cannot create {}", config.data_dir.display()))?;

    let years = etl::years_to_process(Utc::now().year(), config.history_years);
    info!("📅 Processing archives from {} to {}", years.start(), years.end());

    let reconciler = StatementReconciler::new(ZipArchiveSource::new(&config.archive_dir));
    let summary = etl::run_update(
        &reconciler,
        &StatementType::all(),
        years,
        &filter,
        &config.data_dir,
    );

    if args.cleanup {
        match std::fs::remove_dir_all(&config.archive_dir) {
            Ok(()) => info!("🧹 Removed archive directory {}", config.archive_dir.display()),
            Err(e) => error!("❌ Could not remove {}: {}", config.archive_dir.display(), e),
        }
    }

    if summary.is_complete() {
        info!("✅ Update complete: all {} tables generated", summary.attempted());
    } else {
        warn!(
            "⚠️  {} of {} tables generated, check the log for errors",
            summary.generated(),
            summary.attempted()
        );
    }

    Ok(summary.is_success())
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("eva_valuation=info,update_data=info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("setting default subscriber failed");

    let start = Instant::now();
    let success = match run(Args::parse()) {
        Ok(success) => success,
        Err(e) => {
            error!("❌ {:#}", e);
            false
        }
    };
    info!("⏱️  Finished in {:.2}s", start.elapsed().as_secs_f64());

    std::process::exit(if success { 0 } else { 1 });
}
