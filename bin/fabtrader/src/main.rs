use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use common::{Config, ExecutionLayer, MarketDataSource, PositionQuery, SyncEvent, TradingMode};
use engine::{backfill, ActionExecutor, BinanceFuturesClient, SyncSettings, Synchronizer};
use paper::PaperClient;
use strategy::{FabStrategy, StrategyConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env().context("loading environment config")?;
    let strategy_cfg = StrategyConfig::load(&cfg.strategy_config_path)
        .context("loading strategy config")?;
    info!(
        mode = %cfg.trading_mode,
        symbol = %cfg.symbol,
        timeframe = %cfg.timeframe,
        "FabTrader starting"
    );

    // ── Exchange clients (execution injected based on TRADING_MODE) ───────────
    let binance = Arc::new(BinanceFuturesClient::new(
        cfg.binance_api_key.clone(),
        cfg.binance_secret.clone(),
        cfg.order_quantity,
    )?);
    let market: Arc<dyn MarketDataSource> = binance.clone();

    let mut paper_client: Option<Arc<PaperClient>> = None;
    let (execution, positions): (Arc<dyn ExecutionLayer>, Arc<dyn PositionQuery>) =
        match cfg.trading_mode {
            TradingMode::Live => {
                info!("Live trading mode, using BinanceFuturesClient");
                let execution: Arc<dyn ExecutionLayer> = binance.clone();
                let positions: Arc<dyn PositionQuery> = binance.clone();
                (execution, positions)
            }
            TradingMode::Paper => {
                info!(slippage_bps = cfg.paper_slippage_bps, "Paper trading mode, using PaperClient");
                let client = Arc::new(PaperClient::new(cfg.order_quantity, cfg.paper_slippage_bps));
                paper_client = Some(client.clone());
                let execution: Arc<dyn ExecutionLayer> = client.clone();
                let positions: Arc<dyn PositionQuery> = client;
                (execution, positions)
            }
        };

    // ── Synchronizer ──────────────────────────────────────────────────────────
    let history = backfill(
        market.as_ref(),
        &cfg.symbol,
        cfg.timeframe,
        strategy_cfg.warmup_len(),
        Utc::now(),
    )
    .await
    .context("backfilling history")?;

    let (mut sync, handle) = Synchronizer::new(
        SyncSettings::from_config(&cfg),
        FabStrategy::new(strategy_cfg),
        market,
        ActionExecutor::new(execution, positions),
    );
    sync.load_history(history);
    let adopted = sync.reconcile().await.context("reading starting position")?;
    info!(position = %adopted, "Starting position");
    if let (Some(paper), Some(last)) = (&paper_client, sync.strategy().series().last()) {
        paper.update_price(&cfg.symbol, last.close).await;
    }

    // ── Event forwarder (prices to the paper client, outcomes to the log) ─────
    let mut events = handle.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SyncEvent::PriceUpdate { symbol, price, .. }) => {
                    if let Some(paper) = &paper_client {
                        paper.update_price(&symbol, price).await;
                    }
                }
                Ok(SyncEvent::PositionMismatch {
                    symbol,
                    internal,
                    external_quantity,
                }) => {
                    warn!(
                        symbol = %symbol,
                        internal = %internal,
                        external_quantity,
                        "Position mismatch, actions skipped until reconciled"
                    );
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(dropped = n, "Event forwarder lagged, dropped events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // ── Run ──────────────────────────────────────────────────────────────────
    let sync_task = tokio::spawn(sync.run());

    info!("Synchronizer started. Waiting for shutdown signal.");
    tokio::signal::ctrl_c()
        .await
        .context("listening for shutdown signal")?;
    info!("Shutdown signal received. Stopping synchronizer.");
    handle.stop();
    sync_task.await.context("synchronizer task panicked")?;
    info!("Exited cleanly.");
    Ok(())
}
