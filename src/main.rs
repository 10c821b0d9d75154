// =============================================================================
// Meridian — Market-Intelligence Signal Engine, Main Entry Point
// =============================================================================
//
// Ingests OHLCV from heterogeneous providers, computes the indicator
// catalog, emits trade signals with ATR-scaled levels, tracks every
// signal's outcome, and learns from categorized losses. Signals only; this
// process never trades.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod adapters;
mod app_state;
mod indicators;
mod ingestion;
mod loss_learning;
mod macro_data;
mod market_data;
mod notifications;
mod outcome_tracker;
mod predictor;
mod regime;
mod runtime_config;
mod scheduler;
mod signal;
mod signal_engine;
mod signal_store;
mod types;

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::runtime_config::RuntimeConfig;

const CONFIG_PATH: &str = "runtime_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & logging ─────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║           Meridian Signal Engine — Starting Up           ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    // ── 2. Runtime config ────────────────────────────────────────────────
    let mut config = RuntimeConfig::load(CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "failed to load config, using defaults");
        RuntimeConfig::default()
    });

    // Override watched symbols from the environment if provided.
    if let Ok(symbols) = std::env::var("MERIDIAN_SYMBOLS") {
        config.watched_symbols = symbols
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
    }
    if config.watched_symbols.is_empty() {
        config.watched_symbols = RuntimeConfig::default().watched_symbols;
    }

    info!(
        symbols = ?config.watched_symbols,
        scan_interval = config.scan_interval_seconds,
        summary_hour = config.daily_summary_hour_utc,
        "configuration resolved"
    );

    // ── 3. Shared state ──────────────────────────────────────────────────
    let state = Arc::new(AppState::new(config));

    // Warm the macro cache from disk so the first summary has context even
    // before the first network refresh completes.
    state.macro_cache.warm_from_disk();

    // ── 4. Scheduler ─────────────────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_state = state.clone();
    let scheduler = tokio::spawn(async move {
        scheduler::run(scheduler_state, shutdown_rx).await;
    });

    info!("all subsystems running, press ctrl-c to stop");

    // ── 5. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("shutdown signal received, stopping gracefully");

    let _ = shutdown_tx.send(true);
    if let Err(e) = scheduler.await {
        error!(error = %e, "scheduler task did not shut down cleanly");
    }

    if let Err(e) = state.runtime_config.read().save(CONFIG_PATH) {
        error!(error = %e, "failed to save runtime config on shutdown");
    }

    info!("meridian shut down complete");
    Ok(())
}
