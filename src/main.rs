//! SwingTrader - Main Entry Point
//!
//! Runs the alternating taker strategy against the paper market, driving it
//! with a fixed-rate tick until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use swing_trader::common::channels::create_order_event_channel;
use swing_trader::common::shutdown::Shutdown;
use swing_trader::config::load_config;
use swing_trader::{JsonFileStatePersistence, SharedMarket, SimulatedMarket, Strategy, SyntheticPriceFeed};

/// CLI arguments for the application
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long)]
    log_level: Option<String>,

    /// Directory holding the persisted trade state; overrides the config file
    #[arg(long, env = "SWING_STATE_DIR")]
    state_dir: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    let mut config = load_config(Some(&args.config)).context("failed to load configuration")?;
    if let Some(state_dir) = args.state_dir {
        config.persistence.state_dir = state_dir;
    }

    // Initialize logging
    let log_level = args.log_level.unwrap_or_else(|| config.settings.log_level.clone());
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting SwingTrader");
    info!("Configuration file: {}", args.config);

    let pair = config.strategy.trading_pair()?;
    let (event_tx, event_rx) = create_order_event_channel();
    let market = Arc::new(SimulatedMarket::new(
        config.simulated_market.clone(),
        pair.clone(),
        event_tx,
    )?);

    let feed_shutdown = Shutdown::new();
    let feed = SyntheticPriceFeed::new(market.clone(), &config.simulated_market)
        .spawn(feed_shutdown.subscribe());

    let state_file = config.persistence.state_file(&config.strategy.name);
    info!(path = %state_file.display(), "Trade state document");
    let persistence = JsonFileStatePersistence::new(state_file);

    let shared: SharedMarket = market.clone();
    let strategy = Strategy::new(
        &config.strategy,
        shared,
        Box::new(persistence),
        event_rx,
        config.reference_rate.as_ref(),
    )?;
    strategy.start()?;

    info!(
        strategy = %strategy.name(),
        %pair,
        order_amount = %config.strategy.order_amount,
        "Application initialized successfully"
    );

    let mut ticker = tokio::time::interval(Duration::from_millis(config.settings.tick_interval_ms));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal, cleaning up...");
                break;
            }
            _ = ticker.tick() => {
                strategy.on_tick(Utc::now());
            }
        }
    }

    strategy.stop().await;
    feed_shutdown.trigger();
    let _ = feed.await;

    let state = strategy.trade_state().await;
    info!(
        side = %state.last_side,
        price = %state.last_price,
        base = %market.balance(&pair.base),
        quote = %market.balance(&pair.quote),
        "Shutdown complete"
    );

    Ok(())
}
