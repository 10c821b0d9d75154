// =============================================================================
// Source Adapters — pluggable OHLCV providers behind one interface
// =============================================================================
//
// Each adapter normalizes one provider into the canonical candle schema and
// fails only with the structured error taxonomy below — provider-specific
// errors never cross this boundary. Timeframe translation is each adapter's
// concern; a provider serving only finer granularity aggregates candles
// with open = first, close = last, high = max, low = min, volume = sum.

pub mod binance;
pub mod cryptocompare;
pub mod oanda;
pub mod registry;
pub mod stooq;

pub use registry::AdapterRegistry;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::{Duration, Instant};

use crate::market_data::Candle;
use crate::types::{MarketType, Timeframe};

/// Structured adapter failures. Everything a provider can do wrong maps
/// into one of these.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("unsupported symbol: {0}")]
    UnsupportedSymbol(String),
    #[error("unsupported timeframe: {0}")]
    UnsupportedTimeframe(String),
    #[error("authentication failed: {0}")]
    AuthFailed(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("no adapter routes symbol: {0}")]
    NoRoute(String),
}

impl AdapterError {
    /// Map a transport-level reqwest error into the taxonomy.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            Self::SourceUnavailable(err.to_string())
        } else if err.is_decode() {
            Self::MalformedResponse(err.to_string())
        } else {
            Self::SourceUnavailable(err.to_string())
        }
    }

    /// Map an HTTP status into the taxonomy. `Ok(())` for success codes.
    pub fn check_status(status: reqwest::StatusCode, context: &str) -> Result<(), Self> {
        if status.is_success() {
            return Ok(());
        }
        Err(match status.as_u16() {
            429 => Self::RateLimited(format!("{context}: HTTP 429")),
            401 | 403 => Self::AuthFailed(format!("{context}: HTTP {status}")),
            _ => Self::SourceUnavailable(format!("{context}: HTTP {status}")),
        })
    }
}

/// Last-traded snapshot from a provider's ticker endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct Ticker {
    pub symbol: String,
    pub price: f64,
    pub change_pct: f64,
    pub high_24h: f64,
    pub low_24h: f64,
    pub volume_24h: f64,
}

/// One side of the order book, price/quantity.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct OrderBookLevel {
    pub price: f64,
    pub quantity: f64,
}

/// Order book snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct OrderBook {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub bids: Vec<OrderBookLevel>,
    pub asks: Vec<OrderBookLevel>,
}

impl OrderBook {
    pub fn bid_volume(&self) -> f64 {
        self.bids.iter().map(|l| l.quantity).sum()
    }

    pub fn ask_volume(&self) -> f64 {
        self.asks.iter().map(|l| l.quantity).sum()
    }

    /// (bids - asks) / total, in [-1, 1]; 0 for an empty book.
    pub fn imbalance(&self) -> f64 {
        let bids = self.bid_volume();
        let asks = self.ask_volume();
        let total = bids + asks;
        if total > 0.0 {
            (bids - asks) / total
        } else {
            0.0
        }
    }
}

/// Unified interface for any market-data source. One adapter handles
/// connection, symbol translation, and candle normalization for exactly
/// one provider.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable adapter identifier, e.g. "binance".
    fn name(&self) -> &'static str;

    /// Primary market this adapter serves.
    fn market_type(&self) -> MarketType;

    /// Acquire connection resources (HTTP client, auth check).
    async fn connect(&self) -> Result<(), AdapterError>;

    /// Release connection resources.
    async fn disconnect(&self);

    /// Best-effort list of symbols this adapter can serve.
    async fn supported_symbols(&self) -> Result<Vec<String>, AdapterError>;

    /// Fetch candles, oldest-first, deduplicated by timestamp, trimmed to
    /// `limit`.
    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Candle>, AdapterError>;

    /// Current ticker. Override where the provider supports it.
    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker, AdapterError> {
        Err(AdapterError::UnsupportedSymbol(format!(
            "{} does not serve tickers for {symbol}",
            self.name()
        )))
    }

    /// Order book snapshot. Override where the provider supports it.
    async fn fetch_orderbook(
        &self,
        symbol: &str,
        _depth: usize,
    ) -> Result<OrderBook, AdapterError> {
        Err(AdapterError::UnsupportedSymbol(format!(
            "{} does not serve order books for {symbol}",
            self.name()
        )))
    }
}

// =============================================================================
// Request pacing
// =============================================================================

/// Per-provider pacing: enforces a minimum delay between successive calls
/// so free-tier quotas survive a full scan cycle.
pub struct RequestPacer {
    min_interval: Duration,
    next_allowed: parking_lot::Mutex<Option<Instant>>,
}

impl RequestPacer {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            next_allowed: parking_lot::Mutex::new(None),
        }
    }

    /// Wait until the provider may be called again. Concurrent callers are
    /// queued one interval apart.
    pub async fn pace(&self) {
        let wait = {
            let mut next = self.next_allowed.lock();
            let now = Instant::now();
            match *next {
                Some(at) if at > now => {
                    *next = Some(at + self.min_interval);
                    Some(at - now)
                }
                _ => {
                    *next = Some(now + self.min_interval);
                    None
                }
            }
        };
        if let Some(delay) = wait {
            tokio::time::sleep(delay).await;
        }
    }
}

// =============================================================================
// Timeframe aggregation
// =============================================================================

/// Aggregate fine candles into coarser bars, `factor` source bars per
/// output bar: open = first, close = last, high = max, low = min,
/// volume = sum. A trailing partial chunk is kept.
pub fn aggregate_candles(candles: &[Candle], factor: usize) -> Vec<Candle> {
    if factor <= 1 || candles.is_empty() {
        return candles.to_vec();
    }

    candles
        .chunks(factor)
        .map(|chunk| {
            let first = &chunk[0];
            let last = &chunk[chunk.len() - 1];
            Candle::new(
                first.timestamp,
                first.open,
                chunk.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max),
                chunk.iter().map(|c| c.low).fold(f64::INFINITY, f64::min),
                last.close,
                chunk.iter().map(|c| c.volume).sum(),
            )
        })
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn candle(minute: u32, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Candle {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, minute, 0).unwrap();
        Candle::new(ts, open, high, low, close, volume)
    }

    #[test]
    fn aggregate_merges_ohlcv() {
        let fine = vec![
            candle(0, 100.0, 101.0, 99.0, 100.5, 10.0),
            candle(1, 100.5, 103.0, 100.0, 102.0, 20.0),
            candle(2, 102.0, 102.5, 98.0, 99.0, 30.0),
        ];
        let coarse = aggregate_candles(&fine, 3);
        assert_eq!(coarse.len(), 1);
        let bar = &coarse[0];
        assert_eq!(bar.open, 100.0); // first open
        assert_eq!(bar.close, 99.0); // last close
        assert_eq!(bar.high, 103.0); // max high
        assert_eq!(bar.low, 98.0); // min low
        assert_eq!(bar.volume, 60.0); // summed volume
        assert_eq!(bar.timestamp, fine[0].timestamp);
    }

    #[test]
    fn aggregate_keeps_partial_tail() {
        let fine: Vec<Candle> = (0..5)
            .map(|i| candle(i, 100.0, 101.0, 99.0, 100.0, 1.0))
            .collect();
        let coarse = aggregate_candles(&fine, 3);
        assert_eq!(coarse.len(), 2);
        assert_eq!(coarse[1].volume, 2.0);
    }

    #[test]
    fn aggregate_factor_one_is_identity() {
        let fine = vec![candle(0, 1.0, 2.0, 0.5, 1.5, 1.0)];
        assert_eq!(aggregate_candles(&fine, 1), fine);
    }

    #[test]
    fn orderbook_imbalance() {
        let book = OrderBook {
            symbol: "BTCUSD".into(),
            timestamp: Utc::now(),
            bids: vec![
                OrderBookLevel { price: 99.0, quantity: 3.0 },
                OrderBookLevel { price: 98.0, quantity: 3.0 },
            ],
            asks: vec![OrderBookLevel { price: 101.0, quantity: 2.0 }],
        };
        assert_eq!(book.bid_volume(), 6.0);
        assert_eq!(book.ask_volume(), 2.0);
        assert!((book.imbalance() - 0.5).abs() < 1e-12);

        let empty = OrderBook {
            symbol: "BTCUSD".into(),
            timestamp: Utc::now(),
            bids: vec![],
            asks: vec![],
        };
        assert_eq!(empty.imbalance(), 0.0);
    }

    #[test]
    fn status_mapping() {
        use reqwest::StatusCode;
        assert!(AdapterError::check_status(StatusCode::OK, "t").is_ok());
        assert!(matches!(
            AdapterError::check_status(StatusCode::TOO_MANY_REQUESTS, "t"),
            Err(AdapterError::RateLimited(_))
        ));
        assert!(matches!(
            AdapterError::check_status(StatusCode::UNAUTHORIZED, "t"),
            Err(AdapterError::AuthFailed(_))
        ));
        assert!(matches!(
            AdapterError::check_status(StatusCode::BAD_GATEWAY, "t"),
            Err(AdapterError::SourceUnavailable(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn pacer_enforces_interval() {
        let pacer = RequestPacer::new(Duration::from_secs(13));

        let start = Instant::now();
        pacer.pace().await; // first call goes straight through
        assert!(start.elapsed() < Duration::from_millis(10));

        pacer.pace().await; // second call waits out the interval
        assert!(start.elapsed() >= Duration::from_secs(13));
    }
}
