//! macroledger CLI: run the ETL, provision assets, inspect the store.
//!
//! Commands:
//! - `run`: ingest indicators and asset events, print the result as JSON
//! - `provision`: register asset symbols for event ingestion
//! - `status`: row counts and watermarks per interval table

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use macroledger_core::data::{AlphaVantageClient, CircuitBreaker};
use macroledger_core::domain::Interval;
use macroledger_core::store::{AssetCatalog, SqliteStore};
use macroledger_runner::{EtlConfig, Orchestrator, SqliteConnector};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "macroledger", about = "Economic indicator and asset event ETL")]
struct Cli {
    /// Path to a TOML config file. Environment variables override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the ETL once and print the result object.
    Run {
        /// Restrict event processing to these symbols (e.g. AAPL,MSFT).
        #[arg(long, value_delimiter = ',')]
        tickers: Vec<String>,
    },
    /// Register asset symbols so their events are ingested.
    Provision {
        #[arg(required = true)]
        symbols: Vec<String>,
    },
    /// Show per-interval row counts and column watermarks.
    Status,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = EtlConfig::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Commands::Run { tickers } => run_etl(&config, tickers),
        Commands::Provision { symbols } => run_provision(&config, &symbols),
        Commands::Status => run_status(&config),
    }
}

fn run_etl(config: &EtlConfig, tickers: Vec<String>) -> Result<()> {
    let breaker = Arc::new(CircuitBreaker::default_upstream());
    let client = AlphaVantageClient::new(&config.upstream, breaker).context("building upstream client")?;
    let orchestrator = Orchestrator::new(client, SqliteConnector::new(&config.store.path), config);

    let filter = (!tickers.is_empty()).then_some(tickers);
    let result = orchestrator.run(filter.as_deref());

    for notice in &result.report.up_to_date {
        info!("up to date: {notice}");
    }
    for (symbol, warnings) in &result.report.asset_warnings {
        info!(symbol = symbol.as_str(), warnings = warnings.len(), "asset completed with warnings");
    }

    println!("{}", serde_json::to_string_pretty(&result)?);
    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}

fn run_provision(config: &EtlConfig, symbols: &[String]) -> Result<()> {
    let store = SqliteStore::open(&config.store.path)
        .with_context(|| format!("opening store {}", config.store.path.display()))?;
    let session = store.session();
    let listed = config.universe.symbols();

    for raw in symbols {
        let symbol = raw.trim().to_ascii_uppercase();
        if !listed.contains(&symbol) {
            println!("  {symbol}: not in the reference list, events will not be ingested");
        }
        match session.provision(&symbol) {
            Ok(true) => println!("  {symbol}: provisioned"),
            Ok(false) => println!("  {symbol}: already provisioned"),
            Err(e) => bail!("failed to provision {symbol}: {e}"),
        }
    }
    Ok(())
}

fn run_status(config: &EtlConfig) -> Result<()> {
    let store = SqliteStore::open(&config.store.path)
        .with_context(|| format!("opening store {}", config.store.path.display()))?;

    println!("Store: {}", config.store.path.display());
    for interval in Interval::ALL {
        let status = store.interval_status(interval)?;
        println!("\n{} ({} rows)", interval, status.rows);
        for column in &status.columns {
            let watermark = column
                .watermark
                .map(|d| d.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!("  {:<16} {:>8} values  till {}", column.column, column.populated, watermark);
        }
    }

    let assets = store.session().provisioned_assets()?;
    println!(
        "\nProvisioned assets: {} ({} in the reference list)",
        assets.len(),
        config.universe.symbol_count()
    );
    for symbol in &assets {
        println!("  {:<8} {:>6} events", symbol, store.event_count(symbol)?);
    }
    Ok(())
}
