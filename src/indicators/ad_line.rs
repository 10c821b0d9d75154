// =============================================================================
// Accumulation/Distribution Line — cumulative money-flow volume
// =============================================================================
//
// MFV = ((close - low) - (high - close)) / (high - low) * volume, summed
// cumulatively. Divergence compares the slope of price and the A/D line over
// the lookback window.

use crate::indicators::{Divergence, Indicator, IndicatorMeta, IndicatorResult};
use crate::market_data::CandleSeries;

pub struct AdLine {
    pub divergence_lookback: usize,
}

impl Default for AdLine {
    fn default() -> Self {
        Self {
            divergence_lookback: 14,
        }
    }
}

impl Indicator for AdLine {
    fn name(&self) -> &'static str {
        "ad_line"
    }

    fn calculate(&self, series: &CandleSeries) -> Vec<IndicatorResult> {
        let candles = series.candles();
        if candles.len() <= self.divergence_lookback {
            return Vec::new();
        }

        let closes = series.closes();

        let mut ad = vec![0.0_f64; candles.len()];
        let mut mfv = vec![0.0_f64; candles.len()];
        let mut cumulative = 0.0;
        for (i, candle) in candles.iter().enumerate() {
            let range = (candle.high - candle.low).max(crate::indicators::EPS);
            let mfm = ((candle.close - candle.low) - (candle.high - candle.close)) / range;
            mfv[i] = mfm * candle.volume;
            cumulative += mfv[i];
            ad[i] = cumulative;
        }

        let lb = self.divergence_lookback;
        let mut results = Vec::with_capacity(candles.len() - lb);

        for i in lb..candles.len() {
            let price_slope = closes[i] - closes[i - lb];
            let ad_slope = ad[i] - ad[i - lb];

            let divergence = if price_slope > 0.0 && ad_slope < 0.0 {
                Some(Divergence::BearishDivergence)
            } else if price_slope < 0.0 && ad_slope > 0.0 {
                Some(Divergence::BullishDivergence)
            } else {
                None
            };

            results.push(IndicatorResult {
                name: self.name(),
                value: ad[i],
                secondary_value: Some(mfv[i]),
                timestamp: candles[i].timestamp,
                meta: IndicatorMeta {
                    divergence,
                    ..Default::default()
                },
            });
        }

        results
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::Candle;
    use crate::types::Timeframe;
    use chrono::{Duration, TimeZone, Utc};

    fn bar(i: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Candle {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Candle::new(base + Duration::minutes(5 * i), open, high, low, close, volume)
    }

    #[test]
    fn close_at_high_accumulates() {
        // Close pinned to the high => MFM = +1 => A/D rises by volume.
        let candles: Vec<Candle> = (0..20)
            .map(|i| bar(i, 99.0, 100.0, 98.0, 100.0, 50.0))
            .collect();
        let series = CandleSeries::new("XAUUSD", Timeframe::M5, candles);
        let results = AdLine::default().calculate(&series);
        let last = results.last().unwrap();
        assert!((last.value - 20.0 * 50.0).abs() < 1e-9);
        assert!((last.secondary_value.unwrap() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn bullish_divergence_price_down_ad_up() {
        // Price drifts lower, but every candle closes at its high => the
        // A/D line keeps climbing.
        let candles: Vec<Candle> = (0..20)
            .map(|i| {
                let close = 100.0 - 0.2 * i as f64;
                bar(i, close - 1.0, close, close - 2.0, close, 50.0)
            })
            .collect();
        let series = CandleSeries::new("EURUSD", Timeframe::M15, candles);
        let results = AdLine::default().calculate(&series);
        let last = results.last().unwrap();
        assert_eq!(last.meta.divergence, Some(Divergence::BullishDivergence));
    }

    #[test]
    fn insufficient_history_returns_empty() {
        let candles: Vec<Candle> = (0..5).map(|i| bar(i, 99.0, 100.0, 98.0, 99.5, 1.0)).collect();
        let series = CandleSeries::new("BTCUSD", Timeframe::H1, candles);
        assert!(AdLine::default().calculate(&series).is_empty());
    }
}
