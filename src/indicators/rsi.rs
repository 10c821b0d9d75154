// =============================================================================
// Relative Strength Index — Wilder 14 with divergence detection
// =============================================================================
//
// Classification bands: >= 70 overbought, >= 60 bullish momentum, <= 30
// oversold, <= 40 bearish momentum, otherwise neutral. Divergence compares
// the price slope against the RSI slope over the same window (RSI slope must
// move more than 5 points against price).

use crate::indicators::{
    math, Classification, Divergence, Indicator, IndicatorMeta, IndicatorResult,
};
use crate::market_data::CandleSeries;

pub struct Rsi {
    pub period: usize,
}

impl Default for Rsi {
    fn default() -> Self {
        Self { period: 14 }
    }
}

impl Rsi {
    fn classify(value: f64) -> Classification {
        if value >= 70.0 {
            Classification::Overbought
        } else if value >= 60.0 {
            Classification::BullishMomentum
        } else if value <= 30.0 {
            Classification::Oversold
        } else if value <= 40.0 {
            Classification::BearishMomentum
        } else {
            Classification::Neutral
        }
    }
}

impl Indicator for Rsi {
    fn name(&self) -> &'static str {
        "rsi"
    }

    fn calculate(&self, series: &CandleSeries) -> Vec<IndicatorResult> {
        let candles = series.candles();
        if candles.len() < self.period + 1 {
            return Vec::new();
        }

        let closes = series.closes();
        let rsi = math::wilder_rsi(&closes, self.period);

        let mut results = Vec::with_capacity(candles.len() - self.period);
        for i in self.period..candles.len() {
            let value = rsi[i];
            if !value.is_finite() {
                continue;
            }

            // Divergence over the indicator period.
            let lb = self.period.min(i);
            let price_slope = closes[i] - closes[i - lb];
            let rsi_slope = if rsi[i - lb].is_finite() {
                value - rsi[i - lb]
            } else {
                0.0
            };

            let divergence = if price_slope > 0.0 && rsi_slope < -5.0 {
                Some(Divergence::BearishDivergence)
            } else if price_slope < 0.0 && rsi_slope > 5.0 {
                Some(Divergence::BullishDivergence)
            } else {
                None
            };

            results.push(IndicatorResult {
                name: self.name(),
                value,
                secondary_value: None,
                timestamp: candles[i].timestamp,
                meta: IndicatorMeta {
                    classification: Self::classify(value),
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

    fn series_from_closes(closes: &[f64]) -> CandleSeries {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let candles = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                Candle::new(base + Duration::minutes(5 * i as i64), c, c + 1.0, c - 1.0, c, 10.0)
            })
            .collect();
        CandleSeries::new("XAUUSD", Timeframe::M5, candles)
    }

    #[test]
    fn ascending_closes_are_overbought() {
        let closes: Vec<f64> = (1..=40).map(|x| x as f64).collect();
        let results = Rsi::default().calculate(&series_from_closes(&closes));
        let last = results.last().unwrap();
        assert!((last.value - 100.0).abs() < 1e-6);
        assert_eq!(last.meta.classification, Classification::Overbought);
    }

    #[test]
    fn descending_closes_are_oversold() {
        let closes: Vec<f64> = (1..=40).rev().map(|x| x as f64).collect();
        let results = Rsi::default().calculate(&series_from_closes(&closes));
        let last = results.last().unwrap();
        assert!(last.value < 1.0);
        assert_eq!(last.meta.classification, Classification::Oversold);
    }

    #[test]
    fn flat_closes_are_neutral() {
        let closes = vec![100.0; 40];
        let results = Rsi::default().calculate(&series_from_closes(&closes));
        let last = results.last().unwrap();
        assert!((last.value - 50.0).abs() < 1.0);
        assert_eq!(last.meta.classification, Classification::Neutral);
    }

    #[test]
    fn classification_band_edges() {
        assert_eq!(Rsi::classify(70.0), Classification::Overbought);
        assert_eq!(Rsi::classify(65.0), Classification::BullishMomentum);
        assert_eq!(Rsi::classify(50.0), Classification::Neutral);
        assert_eq!(Rsi::classify(35.0), Classification::BearishMomentum);
        assert_eq!(Rsi::classify(30.0), Classification::Oversold);
    }

    #[test]
    fn insufficient_history_returns_empty() {
        let closes = vec![100.0; 10];
        assert!(Rsi::default().calculate(&series_from_closes(&closes)).is_empty());
    }
}
