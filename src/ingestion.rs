// =============================================================================
// Ingestion Pipeline — fallback-chained OHLCV fetch with idempotent upsert
// =============================================================================
//
// Data-best-effort: every adapter failure is logged and swallowed, the
// pipeline succeeds as long as *some* provider returns rows. Fallback
// results merge with the best-so-far by timestamp (the newer source wins on
// duplicates) until the row threshold `min(limit, 50)` is reached. When an
// intraday request comes back entirely empty, one retry at daily
// granularity runs and persists under `1d`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::adapters::AdapterRegistry;
use crate::market_data::{Candle, CandleSeries, CandleStore};
use crate::types::Timeframe;

/// Rows below which a fetch is considered insufficient and the fallback
/// chain continues.
const MIN_ROWS_FLOOR: usize = 50;

pub struct IngestionPipeline {
    registry: Arc<AdapterRegistry>,
    store: Arc<CandleStore>,
    /// Adapter names tried, in order, after the primary comes up short.
    fallback_adapters: Vec<String>,
}

impl IngestionPipeline {
    pub fn new(
        registry: Arc<AdapterRegistry>,
        store: Arc<CandleStore>,
        fallback_adapters: Vec<String>,
    ) -> Self {
        Self {
            registry,
            store,
            fallback_adapters,
        }
    }

    /// Fetch candles for a symbol and persist them. Returns rows written.
    /// Never fails on provider errors; an unknown asset writes nothing.
    pub async fn ingest_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
        since: Option<DateTime<Utc>>,
    ) -> usize {
        let candles = self.fetch_with_fallback(symbol, timeframe, limit, since).await;

        if candles.is_empty() {
            // Intraday came up dry everywhere: try the daily feed so the
            // rest of the system at least has coarse data to work with.
            if timeframe.is_intraday() {
                info!(symbol, requested = %timeframe, "intraday empty, retrying daily");
                let daily = self
                    .fetch_with_fallback(symbol, Timeframe::D1, limit, since)
                    .await;
                if !daily.is_empty() {
                    let written = self.store_candles(symbol, Timeframe::D1, &daily);
                    info!(symbol, requested = %timeframe, rows = written, "stored daily instead");
                    return written;
                }
            }
            warn!(symbol, timeframe = %timeframe, "no data fetched from any source");
            return 0;
        }

        self.store_candles(symbol, timeframe, &candles)
    }

    /// Try the primary adapter, then the configured fallbacks, merging
    /// results until the row threshold is reached.
    async fn fetch_with_fallback(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
        since: Option<DateTime<Utc>>,
    ) -> Vec<Candle> {
        let min_rows = limit.min(MIN_ROWS_FLOOR);

        // Primary adapter via the router.
        let mut primary_name: Option<String> = None;
        let mut best: Vec<Candle> = Vec::new();

        match self.registry.route_symbol(symbol) {
            Ok(adapter) => {
                primary_name = Some(adapter.name().to_string());
                best = Self::try_fetch(adapter.as_ref(), symbol, timeframe, limit, since).await;
            }
            Err(e) => {
                warn!(symbol, error = %e, "primary adapter routing failed");
            }
        }

        if best.len() >= min_rows {
            return best;
        }

        info!(
            symbol,
            primary = primary_name.as_deref().unwrap_or("none"),
            rows = best.len(),
            need = min_rows,
            "primary insufficient, walking fallback chain"
        );

        for fallback in &self.fallback_adapters {
            if primary_name.as_deref() == Some(fallback.as_str()) {
                continue;
            }
            let Ok(adapter) = self.registry.get_adapter(fallback) else {
                continue;
            };

            let rows = Self::try_fetch(adapter.as_ref(), symbol, timeframe, limit, since).await;
            if rows.is_empty() {
                continue;
            }

            best = merge_candles(best, rows, limit);
            info!(
                symbol,
                adapter = fallback.as_str(),
                total_rows = best.len(),
                "fallback merged"
            );

            if best.len() >= min_rows {
                return best;
            }
        }

        best
    }

    /// One adapter attempt with connect/disconnect bracketing. Failures are
    /// logged and collapse to an empty result.
    async fn try_fetch(
        adapter: &dyn crate::adapters::SourceAdapter,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
        since: Option<DateTime<Utc>>,
    ) -> Vec<Candle> {
        if let Err(e) = adapter.connect().await {
            warn!(adapter = adapter.name(), symbol, error = %e, "adapter connect failed");
            return Vec::new();
        }

        let result = adapter.fetch_ohlcv(symbol, timeframe, limit, since).await;
        adapter.disconnect().await;

        match result {
            Ok(rows) => {
                if !rows.is_empty() {
                    info!(adapter = adapter.name(), symbol, rows = rows.len(), "adapter fetched");
                }
                rows
            }
            Err(e) => {
                warn!(adapter = adapter.name(), symbol, error = %e, "adapter fetch failed");
                Vec::new()
            }
        }
    }

    fn store_candles(&self, symbol: &str, timeframe: Timeframe, candles: &[Candle]) -> usize {
        if self.store.get_asset_by_symbol(symbol).is_none() {
            warn!(symbol, "asset not registered, dropping fetched candles");
            return 0;
        }
        let written = self.store.upsert_candles(symbol, timeframe, candles);
        info!(symbol, timeframe = %timeframe, rows = written, "candles ingested");
        written
    }
}

/// Merge two candle sets by timestamp, the newer source winning duplicates,
/// trimmed to the most recent `limit` rows.
fn merge_candles(best: Vec<Candle>, newer: Vec<Candle>, limit: usize) -> Vec<Candle> {
    let mut combined = best;
    combined.extend(newer);
    // CandleSeries::new sorts and keeps the last duplicate, which is the
    // newer source because of the append order.
    let series = CandleSeries::new("merge", Timeframe::M1, combined);
    let mut candles = series.into_candles();
    if candles.len() > limit {
        candles.drain(..candles.len() - limit);
    }
    candles
}
