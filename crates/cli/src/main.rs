//! `perpbot` binary: paper-trading loop and configuration checks.

mod jsonl_ledger;
mod log_notifier;
mod synthetic;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use jsonl_ledger::JsonlLedger;
use log_notifier::LogNotifier;
use perpbot_core::traits::{ExecutionGateway, SnapshotProvider};
use perpbot_core::ConfigLoader;
use perpbot_execution::PaperGateway;
use perpbot_runtime::{Engine, LoopCommand, TradingLoop};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use synthetic::SyntheticSnapshots;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "perpbot", version, about = "RSI/MA perpetual futures paper-trading bot")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the paper-trading monitoring loop until ctrl-c.
    Run {
        /// Path to the TOML configuration file.
        #[arg(long, default_value = "config/Config.toml")]
        config: String,
        /// JSON-lines file closed trades are appended to.
        #[arg(long, default_value = "trades.jsonl")]
        ledger: PathBuf,
        /// Starting paper account equity in quote currency.
        #[arg(long, default_value = "10000")]
        equity: Decimal,
    },
    /// Load and validate the configuration, then print the resolved values.
    CheckConfig {
        #[arg(long, default_value = "config/Config.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Command::Run {
            config,
            ledger,
            equity,
        } => run(&config, ledger, equity).await,
        Command::CheckConfig { config } => check_config(&config),
    }
}

async fn run(config_path: &str, ledger_path: PathBuf, equity: Decimal) -> Result<()> {
    let config = ConfigLoader::load_from(config_path)
        .with_context(|| format!("loading configuration from {config_path}"))?;
    let gateway = Arc::new(PaperGateway::new(
        config.execution.paper_commission_rate,
        config.execution.paper_slippage_bps,
        equity,
    ));
    let snapshots = Arc::new(SyntheticSnapshots::new(&config.symbols));
    let engine = Arc::new(Engine::new(
        config.clone(),
        Arc::clone(&snapshots) as Arc<dyn SnapshotProvider>,
        Arc::clone(&gateway) as Arc<dyn ExecutionGateway>,
        Arc::new(LogNotifier),
        Arc::new(JsonlLedger::new(ledger_path)),
    ));

    let (trading_loop, handle) = TradingLoop::new(engine);
    let mark_task = tokio::spawn(track_mark_prices(
        Arc::clone(&gateway),
        Arc::clone(&snapshots),
        config.symbols.clone(),
        config.schedule.active_interval_secs,
    ));
    let loop_task = tokio::spawn(trading_loop.run());

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");
    let _ = handle.commands.send(LoopCommand::Shutdown).await;
    loop_task.await??;
    mark_task.abort();
    Ok(())
}

/// Keeps paper fills anchored to the latest synthetic close.
async fn track_mark_prices(
    gateway: Arc<PaperGateway>,
    snapshots: Arc<SyntheticSnapshots>,
    symbols: Vec<String>,
    interval_secs: u64,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    loop {
        interval.tick().await;
        for symbol in &symbols {
            if let Some(price) = snapshots.latest_close(symbol) {
                gateway.set_mark_price(symbol, price);
            }
        }
    }
}

fn check_config(config_path: &str) -> Result<()> {
    let config = ConfigLoader::load_from(config_path)
        .with_context(|| format!("loading configuration from {config_path}"))?;
    println!("configuration valid");
    println!("  symbols:          {:?}", config.symbols);
    println!("  rsi thresholds:   {:?}", config.strategy.rsi_thresholds);
    println!("  lookback:         {} candles", config.strategy.required_lookback());
    println!("  sizing:           {:?}", config.risk.sizing);
    println!("  leverage:         {}x", config.risk.leverage);
    println!(
        "  stops:            -{:.1}% / +{:.1}%",
        config.risk.stop_loss_pct * 100.0,
        config.risk.take_profit_pct * 100.0
    );
    println!("  max positions:    {}", config.risk.max_positions);
    println!("  daily loss limit: {}", config.risk.daily_loss_limit);
    println!(
        "  cadence:          {}s idle / {}s active",
        config.schedule.idle_interval_secs, config.schedule.active_interval_secs
    );
    Ok(())
}
