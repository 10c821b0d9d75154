// =============================================================================
// Market Data — canonical OHLCV candle model and candle series
// =============================================================================
//
// Every provider adapter normalizes into `Candle`; every consumer (indicator
// engine, regime classifier, signal engine, outcome tracker) reads
// `CandleSeries`. A series is the candles of exactly one (symbol, timeframe),
// ordered oldest-first and strictly monotonic in timestamp.

pub mod store;

pub use store::{CandleStore, SeriesKey};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Timeframe;

/// A single OHLCV candle in the canonical schema. Timestamps are UTC and
/// aligned to the timeframe boundary by the producing adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tick_volume: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spread: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_interest: Option<f64>,
}

impl Candle {
    pub fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
            tick_volume: None,
            spread: None,
            open_interest: None,
        }
    }

    /// Check the candle invariants: `low <= min(open, close)`,
    /// `max(open, close) <= high`, `volume >= 0`, all values finite.
    pub fn is_valid(&self) -> bool {
        let finite = [self.open, self.high, self.low, self.close, self.volume]
            .iter()
            .all(|v| v.is_finite());
        finite
            && self.low <= self.open.min(self.close)
            && self.open.max(self.close) <= self.high
            && self.volume >= 0.0
    }
}

/// Ordered candle sequence for one (symbol, timeframe).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandleSeries {
    pub symbol: String,
    pub timeframe: Timeframe,
    candles: Vec<Candle>,
}

impl CandleSeries {
    /// Build a series from candles in any order. Input is sorted by
    /// timestamp and deduplicated (latest occurrence of a timestamp wins),
    /// which makes merged multi-provider data safe to wrap.
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe, mut candles: Vec<Candle>) -> Self {
        candles.sort_by_key(|c| c.timestamp);
        // Keep the last duplicate for each timestamp.
        let mut deduped: Vec<Candle> = Vec::with_capacity(candles.len());
        for candle in candles {
            let replace = deduped
                .last()
                .is_some_and(|last| last.timestamp == candle.timestamp);
            if replace {
                let idx = deduped.len() - 1;
                deduped[idx] = candle;
            } else {
                deduped.push(candle);
            }
        }
        Self {
            symbol: symbol.into().to_uppercase(),
            timeframe,
            candles: deduped,
        }
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn into_candles(self) -> Vec<Candle> {
        self.candles
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    pub fn highs(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.high).collect()
    }

    pub fn lows(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.low).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.volume).collect()
    }

    /// Series truncated to its first `n` candles. Used by the indicator
    /// stability tests (a prefix must agree with the full series wherever
    /// both emit results).
    pub fn prefix(&self, n: usize) -> CandleSeries {
        CandleSeries {
            symbol: self.symbol.clone(),
            timeframe: self.timeframe,
            candles: self.candles.iter().take(n).cloned().collect(),
        }
    }

    /// Validate the series contract: strictly increasing timestamps and
    /// candle invariants on every bar. A violation here is a programmer
    /// error (broken adapter or store), surfaced as a hard fault upstream.
    pub fn validate(&self) -> Result<(), String> {
        for window in self.candles.windows(2) {
            if window[1].timestamp <= window[0].timestamp {
                return Err(format!(
                    "series {}@{} not strictly monotonic at {}",
                    self.symbol, self.timeframe, window[1].timestamp
                ));
            }
        }
        for candle in &self.candles {
            if !candle.is_valid() {
                return Err(format!(
                    "invalid candle in {}@{} at {}",
                    self.symbol, self.timeframe, candle.timestamp
                ));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, minute, 0).unwrap()
    }

    fn candle(minute: u32, close: f64) -> Candle {
        Candle::new(ts(minute), close, close + 1.0, close - 1.0, close, 100.0)
    }

    #[test]
    fn candle_validity() {
        assert!(candle(0, 100.0).is_valid());

        let mut bad = candle(0, 100.0);
        bad.high = 98.0; // high below close
        assert!(!bad.is_valid());

        let mut bad = candle(0, 100.0);
        bad.volume = -1.0;
        assert!(!bad.is_valid());

        let mut bad = candle(0, 100.0);
        bad.low = f64::NAN;
        assert!(!bad.is_valid());
    }

    #[test]
    fn series_sorts_and_dedups_keeping_latest() {
        let series = CandleSeries::new(
            "xauusd",
            Timeframe::M5,
            vec![candle(10, 101.0), candle(0, 100.0), candle(10, 105.0)],
        );
        assert_eq!(series.symbol, "XAUUSD");
        assert_eq!(series.len(), 2);
        // The later duplicate for minute 10 wins.
        assert_eq!(series.candles()[1].close, 105.0);
        assert!(series.validate().is_ok());
    }

    #[test]
    fn series_validate_rejects_bad_candle() {
        let mut broken = candle(5, 100.0);
        broken.high = 0.0;
        let series = CandleSeries::new("BTCUSD", Timeframe::H1, vec![candle(0, 100.0), broken]);
        assert!(series.validate().is_err());
    }

    #[test]
    fn prefix_truncates() {
        let series = CandleSeries::new(
            "EURUSD",
            Timeframe::M15,
            (0..10).map(|i| candle(i, 100.0 + i as f64)).collect(),
        );
        let p = series.prefix(4);
        assert_eq!(p.len(), 4);
        assert_eq!(p.candles()[3].close, 103.0);
    }
}
