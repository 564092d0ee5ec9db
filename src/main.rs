//! MA Cross Trader - Main Entry Point
//!
//! Paper-trading binary: drives the crossover core against the in-tree mock
//! venue. Live venue clients plug in through the same `ExchangeClient` trait.

use anyhow::Result;
use clap::{Parser, Subcommand};
use ma_cross_trader::config::Config;
use ma_cross_trader::exchange::MockExchange;
use ma_cross_trader::persistence::TradeStore;
use ma_cross_trader::trader::Trader;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

/// MA Cross Trader CLI
#[derive(Parser)]
#[command(name = "ma-cross-trader")]
#[command(version, about = "Moving-average crossover trading core")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the continuous paper-trading loop (default)
    Run,

    /// Run a single trading cycle and exit
    Cycle,

    /// Re-fit averaging windows for every instrument from stored history
    Optimize,

    /// Show instrument states and ledger counts from the trade store
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging()?;

    let config = Config::load()?;
    config.validate()?;

    match cli.command {
        Some(Commands::Status) => return show_status(&config),
        Some(Commands::Optimize) => {
            let trader = build_trader(&config).await?;
            let updated = trader
                .run_parameter_optimization(&config.trading.market)
                .await?;
            info!("🔬 Optimization finished: {updated} instrument(s) updated");
            return Ok(());
        }
        Some(Commands::Cycle) => {
            let trader = build_trader(&config).await?;
            step_paper_prices(&trader, &config, 0).await?;
            let report = trader.run_trading_cycle(&config.trading.market).await?;
            info!("✅ Cycle finished: {report:?}");
            return Ok(());
        }
        Some(Commands::Run) | None => {}
    }

    let trader = build_trader(&config).await?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("🛑 Shutdown signal received");
        shutdown_clone.store(true, Ordering::SeqCst);
    });

    info!("🚀 Starting paper-trading loop for market '{}'", config.trading.market);

    let mut cycle: u64 = 0;
    while !shutdown.load(Ordering::SeqCst) {
        step_paper_prices(&trader, &config, cycle).await?;

        match trader.run_trading_cycle(&config.trading.market).await {
            Ok(report) => {
                if report.entered + report.exited + report.failed > 0 {
                    info!("📊 Cycle #{cycle}: {report:?}");
                }
            }
            Err(e) => error!("❌ Cycle #{cycle} aborted: {e:#}"),
        }

        cycle += 1;
        tokio::time::sleep(Duration::from_secs(config.trading.cycle_interval_secs)).await;
    }

    info!("👋 MA Cross Trader shutdown complete");
    Ok(())
}

/// Open the store, seed configured instruments and the mock venue balances.
async fn build_trader(config: &Config) -> Result<Trader<MockExchange>> {
    let store = TradeStore::new(&config.database.path)?;

    let market = &config.trading.market;
    for entry in &config.instruments {
        store.upsert_instrument(&entry.to_instrument(market))?;
    }
    let instruments = store.active_instruments(market)?;
    if instruments.is_empty() {
        warn!("No instruments configured; the loop will idle");
    }

    let exchange = MockExchange::new();
    // Paper funds: a notional quote balance per distinct quote asset.
    let mut funded: HashSet<String> = HashSet::new();
    for instrument in &instruments {
        if funded.insert(instrument.quote_asset.clone()) {
            exchange
                .set_balance(&instrument.quote_asset, dec!(1000000))
                .await;
        }
    }

    info!(
        "📦 Trade store '{}' ready with {} instrument(s)",
        config.database.path,
        instruments.len()
    );
    Ok(Trader::new(
        exchange,
        store,
        Duration::from_secs(config.trading.pace_secs),
    ))
}

/// Advance the mock venue's prices by one deterministic paper step.
///
/// A stand-in for a live ticker: each instrument resumes from its last
/// stored sample (or 100) and drifts through a fixed wobble pattern long
/// enough to produce crossovers in both directions.
async fn step_paper_prices(
    trader: &Trader<MockExchange>,
    config: &Config,
    cycle: u64,
) -> Result<()> {
    const WOBBLE_PERMILLE: [i64; 8] = [4, 3, 1, -2, -4, -3, 1, 2];

    let market = &config.trading.market;
    for instrument in trader.store().active_instruments(market)? {
        let last = trader
            .store()
            .recent_prices(market, &instrument.symbol, 1)?
            .first()
            .copied()
            .filter(|p| *p > Decimal::ZERO)
            .unwrap_or(dec!(100));
        let wobble = WOBBLE_PERMILLE[(cycle % 8) as usize];
        let next = last * (dec!(1000) + Decimal::from(wobble)) / dec!(1000);
        // The orientation conversion is a reciprocal, so it also maps an
        // internal price back to the venue quote.
        let quoted = instrument.quote_style.to_internal(next);
        trader.exchange().set_price(&instrument.symbol, quoted).await;
    }
    Ok(())
}

/// Print per-instrument state from the trade store.
fn show_status(config: &Config) -> Result<()> {
    let store = TradeStore::new(&config.database.path)?;
    let market = &config.trading.market;
    let instruments = store.active_instruments(market)?;

    info!("📋 Market '{}': {} active instrument(s)", market, instruments.len());
    for instrument in &instruments {
        let samples = store.all_prices(market, &instrument.symbol)?.len();
        info!(
            "   {} windows {}/{} state {:?} samples {}",
            instrument.symbol,
            instrument.short_term,
            instrument.long_term,
            instrument.cross_state,
            samples
        );
    }
    info!(
        "   Active ledger rows: {}",
        store.active_transaction_count(market)?
    );
    Ok(())
}

/// Initialize logging with stdout and rolling file output.
fn init_logging() -> Result<()> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    std::fs::create_dir_all("logs")?;

    let file_appender = tracing_appender::rolling::daily("logs", "ma-cross-trader.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);

    // Leak the guard to keep it alive for the program duration
    Box::leak(Box::new(_guard));

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("ma_cross_trader=debug".parse()?)
                .add_directive(Level::INFO.into()),
        )
        .with_writer(std::io::stdout.and(file_writer))
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(true)
        .init();

    Ok(())
}
