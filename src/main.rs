//! DualBarrierTrader - Main Entry Point
//!
//! Connects to Deriv, selects a market, optionally runs the auto-trading
//! loop and logs every state snapshot until Ctrl-C.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use dual_barrier_trader::config::load_config;
use dual_barrier_trader::{ConnectionSettings, DerivClient, TradeEngine, TradingApi};

/// CLI arguments for the application
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error); defaults to the configured level
    #[arg(long)]
    log_level: Option<String>,

    /// Deriv API token
    #[arg(long, env = "DERIV_API_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Market to trade, overriding the configured symbol
    #[arg(long)]
    symbol: Option<String>,

    /// Amount of balance to keep out of trading
    #[arg(long)]
    locked_balance: Option<Decimal>,

    /// Start the auto-trading loop after connecting
    #[arg(long)]
    auto: bool,
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    let mut config = load_config(Some(&args.config)).context("failed to load configuration")?;

    let level = parse_level(args.log_level.as_deref().unwrap_or(&config.settings.log_level));
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting DualBarrierTrader");
    info!("Configuration file: {}", args.config);

    if let Some(symbol) = args.symbol {
        config.trading.symbol = symbol;
    }
    if let Some(locked) = args.locked_balance {
        config.trading.locked_balance = locked;
    }
    config.trading.validate()?;

    let token = args
        .token
        .or_else(|| config.deriv.api_token.clone())
        .ok_or_else(|| anyhow!("no API token: pass --token or set DERIV_API_TOKEN"))?;
    let market = config
        .market(&config.trading.symbol)
        .cloned()
        .ok_or_else(|| anyhow!("market {} is not configured", config.trading.symbol))?;

    let client = DerivClient::from_config(&config.deriv, ConnectionSettings::from(&config.settings))?;
    client.connect().await?;

    let api: Arc<dyn TradingApi> = Arc::new(client);
    let (engine, mut snapshots) = TradeEngine::new(api);

    tokio::spawn(async move {
        while snapshots.changed().await.is_ok() {
            let state = snapshots.borrow_and_update().clone();
            let stats = state.stats();
            info!(
                connected = state.is_connected,
                trading = state.is_trading,
                balance = ?state.account.as_ref().map(|a| a.balance),
                available = ?state.account.as_ref().map(|a| a.available_balance),
                price = ?state.market.as_ref().and_then(|m| m.current_price),
                pairs = state.trade_pairs.len(),
                completed = stats.completed_pairs,
                win_rate = %stats.win_rate,
                net = %stats.net_profit,
                losses_in_row = state.consecutive_losses,
                last_error = ?state.last_error,
                "State"
            );
        }
    });

    let account = engine.initialize(&token).await?;
    info!(login_id = %account.login_id, balance = %account.balance, "Account ready");
    engine.set_locked_balance(config.trading.locked_balance).await?;
    engine.set_market(&market).await?;

    let risk = engine.risk_calculation(&config.trading).await?;
    info!(
        recommended_stake = %risk.recommended_stake,
        max_risk = %risk.max_risk_amount,
        can_trade = risk.can_trade,
        "Risk assessment"
    );

    engine.follow_settlements().await?;

    if args.auto {
        engine.start_auto_trading(config.trading.clone()).await?;
    } else {
        warn!("Auto-trading not requested; watching the market only");
    }

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal, cleaning up...");

    engine.disconnect().await;

    Ok(())
}
