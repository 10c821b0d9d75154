// =============================================================================
// Scheduler — periodic per-symbol scan loop and daily summary
// =============================================================================
//
// Every scan cycle (default 300 s):
//   - forex pairs run every other cycle to conserve provider quota
//   - each watched symbol scans as its own task on a JoinSet, bounded by a
//     wall-clock deadline; partial state (ingested candles, saved signals)
//     survives a deadline
//   - one symbol's scan and outcome checks serialize behind its store lock
//
// Once per day at the configured UTC hour, per-symbol analytics go out
// through the notifier. A failed scan is logged; the loop is never killed
// by a single symbol's failure.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{interval, timeout, Duration};
use tracing::{error, info, warn};

use crate::app_state::AppState;
use crate::loss_learning::{categorize_loss, get_active_loss_filters};
use crate::market_data::CandleSeries;
use crate::notifications::Notifier;
use crate::outcome_tracker::{check_signal_outcome, compute_analytics};
use crate::signal_engine::{asset_class, AssetClass};
use crate::types::Timeframe;

/// Timeframes loaded from the store for scanning and outcome checks.
const FRAME_TIMEFRAMES: [Timeframe; 6] = [
    Timeframe::M5,
    Timeframe::M15,
    Timeframe::M30,
    Timeframe::H1,
    Timeframe::H4,
    Timeframe::D1,
];

/// Minimum rows for a frame to participate in a scan.
const MIN_FRAME_ROWS: usize = 50;

/// Grace given to in-flight scans on shutdown.
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(10);

/// Timeframes ingested per asset class. Crypto providers serve clean
/// 15m/1h/1d; gold and forex scalp on the faster set.
pub fn scan_timeframes(class: AssetClass) -> &'static [Timeframe] {
    match class {
        AssetClass::Crypto => &[Timeframe::M15, Timeframe::H1, Timeframe::D1],
        _ => &[Timeframe::M5, Timeframe::M15, Timeframe::M30, Timeframe::D1],
    }
}

/// Forex pairs scan every other cycle.
pub fn should_scan(symbol: &str, cycle: u64) -> bool {
    match asset_class(symbol) {
        AssetClass::Forex => cycle % 2 == 0,
        _ => true,
    }
}

/// Daily summary fires once per UTC day at the configured hour.
pub fn summary_due(hour_now: u32, summary_hour: u32, today: NaiveDate, last: Option<NaiveDate>) -> bool {
    hour_now >= summary_hour && last != Some(today)
}

/// Run the scheduler until shutdown is signalled.
pub async fn run(state: Arc<AppState>, mut shutdown: watch::Receiver<bool>) {
    let (grace, scan_interval) = {
        let config = state.runtime_config.read();
        (
            Duration::from_secs(config.startup_grace_seconds),
            Duration::from_secs(config.scan_interval_seconds),
        )
    };

    info!(grace_secs = grace.as_secs(), "scheduler waiting out startup grace");
    tokio::select! {
        _ = tokio::time::sleep(grace) => {}
        _ = shutdown.changed() => return,
    }

    let mut ticker = interval(scan_interval);
    let mut cycle: u64 = 0;
    let mut last_summary: Option<NaiveDate> = None;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => {
                info!("scheduler shutting down");
                return;
            }
        }

        let (symbols, deadline) = {
            let config = state.runtime_config.read();
            (
                config.watched_symbols.clone(),
                Duration::from_secs(config.scan_deadline_seconds),
            )
        };

        // Keep the macro cache warm alongside the scans.
        if state.macro_cache.needs_refresh() {
            let cache = state.macro_cache.clone();
            tokio::spawn(async move { cache.refresh().await });
        }

        let mut scans: JoinSet<()> = JoinSet::new();
        for symbol in symbols {
            if !should_scan(&symbol, cycle) {
                continue;
            }
            let state = state.clone();
            scans.spawn(async move {
                match timeout(deadline, scan_symbol(&state, &symbol)).await {
                    Ok(()) => {}
                    Err(_) => warn!(symbol = %symbol, "scan hit deadline, partial state kept"),
                }
            });
        }

        // Drain this cycle's scans; on shutdown give them a grace window.
        loop {
            tokio::select! {
                joined = scans.join_next() => {
                    match joined {
                        Some(Ok(())) => {}
                        Some(Err(e)) => error!(error = %e, "scan task panicked"),
                        None => break,
                    }
                }
                _ = shutdown.changed() => {
                    info!("shutdown during scan cycle, draining in-flight scans");
                    let _ = timeout(SHUTDOWN_DRAIN, async {
                        while scans.join_next().await.is_some() {}
                    })
                    .await;
                    return;
                }
            }
        }

        // Daily summary.
        let now = Utc::now();
        let today = now.date_naive();
        let summary_hour = state.runtime_config.read().daily_summary_hour_utc;
        if summary_due(chrono::Timelike::hour(&now), summary_hour, today, last_summary) {
            send_daily_summary(&state).await;
            last_summary = Some(today);
        }

        cycle = cycle.wrapping_add(1);
    }
}

/// One symbol's full pass: ingest fresh candles, scan for signals, then
/// re-evaluate every open signal against the latest bar. Serialized with
/// any concurrent work on the same symbol via the store's symbol lock.
pub async fn scan_symbol(state: &AppState, symbol: &str) {
    let lock = state.signal_store.symbol_lock(symbol);
    let _guard = lock.lock().await;

    info!(symbol, "scan start");
    let class = asset_class(symbol);
    let limit = state.runtime_config.read().history_limit;

    // 1. Ingest fresh data for the class's timeframe set.
    for timeframe in scan_timeframes(class) {
        let written = state.ingestion.ingest_ohlcv(symbol, *timeframe, limit, None).await;
        if written > 0 {
            info!(symbol, timeframe = %timeframe, rows = written, "data ingested");
        }
    }

    // 2. Load frames from the store.
    let mut frames = std::collections::BTreeMap::new();
    for timeframe in FRAME_TIMEFRAMES {
        let series = state
            .candle_store
            .query_candles(symbol, timeframe, limit, None, None);
        if series.len() >= MIN_FRAME_ROWS {
            frames.insert(timeframe, series);
        }
    }
    if frames.is_empty() {
        warn!(symbol, "no frames with enough history, skipping scan");
        return;
    }

    // 3. Active loss filters from this symbol's history.
    let history = state.signal_store.get_signals(Some(symbol), None, None);
    let loss_patterns = get_active_loss_filters(&history);

    // 4. Multi-timeframe scan and persistence.
    let signals = state.signal_engine.scan_multi_timeframe(&frames, &loss_patterns);
    let generated = signals.len();
    for signal in signals {
        let saved = state.signal_store.save_signal(signal);
        state.notifier.notify_signal(&saved).await;
    }

    // 5. Outcome checks for every open signal against its frame's latest
    //    bar; losses get categorized before persisting.
    let outcomes = check_outcomes(state, symbol, &frames).await;

    info!(
        symbol,
        signals_generated = generated,
        outcomes_resolved = outcomes,
        frames = frames.len(),
        "scan complete"
    );
}

/// Evaluate open signals; returns the number of win/loss resolutions.
async fn check_outcomes(
    state: &AppState,
    symbol: &str,
    frames: &std::collections::BTreeMap<Timeframe, CandleSeries>,
) -> usize {
    let now = Utc::now();
    let mut resolved = 0;

    for signal in state.signal_store.get_open_signals(symbol) {
        let Some(series) = frames.get(&signal.timeframe) else {
            continue;
        };
        let Some(bar) = series.last() else {
            continue;
        };

        let Some(mut updated) =
            check_signal_outcome(&signal, bar.close, bar.high, bar.low, now)
        else {
            continue;
        };

        // Attach the loss analysis before persisting.
        if updated.status == crate::types::SignalStatus::Loss {
            let analysis = categorize_loss(&updated);
            updated.loss_category = Some(analysis.category);
            updated.loss_analysis = Some(analysis);
        }

        let old_status = signal.status;
        if let Some(stored) = state.signal_store.replace(updated) {
            if stored.status.is_completed() && stored.status != old_status {
                resolved += 1;
                state.notifier.notify_outcome(&stored).await;
            }
        }
    }

    resolved
}

/// Per-symbol analytics to the notifier, with the macro backdrop logged
/// alongside for operator context.
async fn send_daily_summary(state: &AppState) {
    if let Some(macro_summary) = state.macro_cache.summary() {
        info!(macro_summary = %serde_json::Value::Object(macro_summary), "macro backdrop");
    }

    for symbol in state.signal_store.symbols() {
        let signals = state.signal_store.get_signals(Some(&symbol), None, None);
        if signals.is_empty() {
            continue;
        }
        let analytics = compute_analytics(&signals);
        state.notifier.notify_summary(&analytics, &symbol).await;
        info!(
            symbol = %symbol,
            completed = analytics.completed,
            win_rate = format!("{:.1}", analytics.win_rate),
            "daily summary sent"
        );
    }
}
