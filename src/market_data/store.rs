// =============================================================================
// Candle Store — in-memory, upsert-concurrent OHLCV storage
// =============================================================================
//
// One BTreeMap per (symbol, timeframe), keyed by epoch milliseconds. The
// BTreeMap key makes the store idempotent on (asset, timeframe, timestamp):
// writing the same bar twice overwrites O/H/L/C/V (last writer wins), and a
// range read is monotonic and duplicate-free by construction.
//
// The store also carries the asset catalog, seeded at startup from the
// watched-symbol configuration.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::debug;

use crate::market_data::{Candle, CandleSeries};
use crate::types::{Asset, Timeframe};

/// Composite key that identifies a unique candle series.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct SeriesKey {
    pub symbol: String,
    pub timeframe: Timeframe,
}

impl SeriesKey {
    pub fn new(symbol: &str, timeframe: Timeframe) -> Self {
        Self {
            symbol: symbol.to_uppercase(),
            timeframe,
        }
    }
}

impl std::fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.symbol, self.timeframe)
    }
}

/// Thread-safe candle store. Read-heavy; upserts are concurrent with reads
/// via the outer RwLock.
pub struct CandleStore {
    series: RwLock<HashMap<SeriesKey, BTreeMap<i64, Candle>>>,
    assets: RwLock<HashMap<String, Asset>>,
    /// Maximum bars retained per series; oldest are evicted past this.
    max_bars: usize,
}

impl CandleStore {
    pub fn new(max_bars: usize) -> Self {
        Self {
            series: RwLock::new(HashMap::new()),
            assets: RwLock::new(HashMap::new()),
            max_bars,
        }
    }

    // -------------------------------------------------------------------------
    // Asset catalog
    // -------------------------------------------------------------------------

    pub fn register_asset(&self, asset: Asset) {
        self.assets.write().insert(asset.symbol.clone(), asset);
    }

    pub fn get_asset_by_symbol(&self, symbol: &str) -> Option<Asset> {
        self.assets.read().get(&symbol.to_uppercase()).cloned()
    }

    pub fn list_assets(&self) -> Vec<Asset> {
        self.assets.read().values().cloned().collect()
    }

    // -------------------------------------------------------------------------
    // Candle writes
    // -------------------------------------------------------------------------

    /// Upsert a batch of candles for one series. Invalid candles are skipped.
    /// Returns the number of rows written (inserted or overwritten).
    pub fn upsert_candles(&self, symbol: &str, timeframe: Timeframe, rows: &[Candle]) -> usize {
        let key = SeriesKey::new(symbol, timeframe);
        let mut map = self.series.write();
        let tree = map.entry(key.clone()).or_default();

        let mut written = 0;
        for candle in rows {
            if !candle.is_valid() {
                debug!(key = %key, ts = %candle.timestamp, "skipping invalid candle on upsert");
                continue;
            }
            tree.insert(candle.timestamp.timestamp_millis(), candle.clone());
            written += 1;
        }

        // Evict oldest bars past the retention budget.
        while tree.len() > self.max_bars {
            let oldest = *tree.keys().next().unwrap();
            tree.remove(&oldest);
        }

        written
    }

    // -------------------------------------------------------------------------
    // Candle reads
    // -------------------------------------------------------------------------

    /// Query up to `limit` candles, oldest-first. `since`/`until` bound the
    /// timestamp range inclusively; when more than `limit` bars match, the
    /// most recent `limit` are returned (still oldest-first).
    pub fn query_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> CandleSeries {
        let key = SeriesKey::new(symbol, timeframe);
        let map = self.series.read();

        let candles: Vec<Candle> = match map.get(&key) {
            Some(tree) => {
                let lo = since.map(|t| t.timestamp_millis()).unwrap_or(i64::MIN);
                let hi = until.map(|t| t.timestamp_millis()).unwrap_or(i64::MAX);
                let matched: Vec<&Candle> = tree.range(lo..=hi).map(|(_, c)| c).collect();
                let start = matched.len().saturating_sub(limit);
                matched[start..].iter().map(|c| (*c).clone()).collect()
            }
            None => Vec::new(),
        };

        CandleSeries::new(key.symbol, timeframe, candles)
    }

    /// Most recent candle for a series, if any.
    pub fn latest(&self, symbol: &str, timeframe: Timeframe) -> Option<Candle> {
        let key = SeriesKey::new(symbol, timeframe);
        self.series
            .read()
            .get(&key)
            .and_then(|tree| tree.values().next_back().cloned())
    }

    /// Number of bars stored for a series.
    pub fn len(&self, symbol: &str, timeframe: Timeframe) -> usize {
        let key = SeriesKey::new(symbol, timeframe);
        self.series.read().get(&key).map_or(0, BTreeMap::len)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MarketType;
    use chrono::TimeZone;

    fn ts(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, minute, 0).unwrap()
    }

    fn candle(minute: u32, close: f64) -> Candle {
        Candle::new(ts(minute), close, close + 1.0, close - 1.0, close, 10.0)
    }

    #[test]
    fn upsert_is_idempotent_last_writer_wins() {
        let store = CandleStore::new(500);
        let rows = vec![candle(0, 100.0), candle(5, 101.0)];
        assert_eq!(store.upsert_candles("XAUUSD", Timeframe::M5, &rows), 2);

        // Re-ingest the same timestamps with revised values.
        let revised = vec![candle(5, 103.0)];
        assert_eq!(store.upsert_candles("XAUUSD", Timeframe::M5, &revised), 1);

        assert_eq!(store.len("XAUUSD", Timeframe::M5), 2);
        let latest = store.latest("XAUUSD", Timeframe::M5).unwrap();
        assert_eq!(latest.close, 103.0);
    }

    #[test]
    fn persisted_series_is_monotonic_and_deduped() {
        let store = CandleStore::new(500);
        // Ingest out of order, with a duplicate.
        let rows = vec![candle(10, 3.0), candle(0, 1.0), candle(5, 2.0), candle(10, 4.0)];
        store.upsert_candles("BTCUSD", Timeframe::M5, &rows);

        let series = store.query_candles("BTCUSD", Timeframe::M5, 100, None, None);
        assert_eq!(series.len(), 3);
        assert!(series.validate().is_ok());
        assert_eq!(series.closes(), vec![1.0, 2.0, 4.0]);
    }

    #[test]
    fn query_respects_limit_and_bounds() {
        let store = CandleStore::new(500);
        let rows: Vec<Candle> = (0..10).map(|i| candle(i * 5, 100.0 + i as f64)).collect();
        store.upsert_candles("EURUSD", Timeframe::M5, &rows);

        // Limit keeps the newest bars, oldest-first.
        let series = store.query_candles("EURUSD", Timeframe::M5, 3, None, None);
        assert_eq!(series.closes(), vec![107.0, 108.0, 109.0]);

        // Since bound is inclusive.
        let series = store.query_candles("EURUSD", Timeframe::M5, 100, Some(ts(35)), None);
        assert_eq!(series.closes(), vec![107.0, 108.0, 109.0]);

        // Until bound is inclusive.
        let series = store.query_candles("EURUSD", Timeframe::M5, 100, None, Some(ts(10)));
        assert_eq!(series.closes(), vec![100.0, 101.0, 102.0]);
    }

    #[test]
    fn retention_evicts_oldest() {
        let store = CandleStore::new(5);
        let rows: Vec<Candle> = (0..8).map(|i| candle(i * 5, i as f64)).collect();
        store.upsert_candles("SOLUSD", Timeframe::M5, &rows);
        let series = store.query_candles("SOLUSD", Timeframe::M5, 100, None, None);
        assert_eq!(series.closes(), vec![3.0, 4.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn invalid_rows_are_skipped() {
        let store = CandleStore::new(500);
        let mut bad = candle(0, 100.0);
        bad.high = 90.0;
        let written = store.upsert_candles("XAUUSD", Timeframe::H1, &[bad, candle(5, 101.0)]);
        assert_eq!(written, 1);
        assert_eq!(store.len("XAUUSD", Timeframe::H1), 1);
    }

    #[test]
    fn asset_catalog_roundtrip() {
        let store = CandleStore::new(10);
        store.register_asset(Asset::new("XAUUSD", "Gold Spot", MarketType::Commodity));
        let asset = store.get_asset_by_symbol("xauusd").unwrap();
        assert_eq!(asset.symbol, "XAUUSD");
        assert!(store.get_asset_by_symbol("GBPJPY").is_none());
    }
}
