// =============================================================================
// Bollinger Bands — 20-period SMA with 2-sigma envelopes
// =============================================================================
//
// Reports the band levels, bandwidth, and percent-B. A squeeze (bandwidth
// below 0.75x its own rolling average) overrides the positional label.

use crate::indicators::{math, Classification, Indicator, IndicatorMeta, IndicatorResult};
use crate::market_data::CandleSeries;

pub struct BollingerBands {
    pub period: usize,
    pub std_dev: f64,
}

impl Default for BollingerBands {
    fn default() -> Self {
        Self {
            period: 20,
            std_dev: 2.0,
        }
    }
}

impl Indicator for BollingerBands {
    fn name(&self) -> &'static str {
        "bollinger_bands"
    }

    fn calculate(&self, series: &CandleSeries) -> Vec<IndicatorResult> {
        let candles = series.candles();
        if candles.len() <= self.period {
            return Vec::new();
        }

        let closes = series.closes();
        let sma = math::sma(&closes, self.period);
        let std = math::rolling_std(&closes, self.period);

        let n = candles.len();
        let mut bandwidth = vec![f64::NAN; n];
        for i in 0..n {
            if sma[i].is_finite() && std[i].is_finite() && sma[i].abs() > crate::indicators::EPS {
                let upper = sma[i] + std[i] * self.std_dev;
                let lower = sma[i] - std[i] * self.std_dev;
                bandwidth[i] = (upper - lower) / sma[i] * 100.0;
            }
        }

        let mut results = Vec::with_capacity(n - self.period);
        for i in self.period..n {
            if !sma[i].is_finite() || !std[i].is_finite() {
                continue;
            }
            let mid = sma[i];
            let upper = mid + std[i] * self.std_dev;
            let lower = mid - std[i] * self.std_dev;
            let close = closes[i];
            let bw = bandwidth[i];

            let band_range = upper - lower;
            let pct_b = if band_range > 0.0 {
                (close - lower) / band_range
            } else {
                0.5
            };

            // Squeeze: current bandwidth well below its own recent average.
            let window_start = i.saturating_sub(self.period);
            let recent_bw: Vec<f64> = bandwidth[window_start..=i]
                .iter()
                .copied()
                .filter(|v| v.is_finite())
                .collect();
            let avg_bw = if recent_bw.is_empty() {
                bw
            } else {
                recent_bw.iter().sum::<f64>() / recent_bw.len() as f64
            };
            let is_squeeze = bw < avg_bw * 0.75;

            let classification = if is_squeeze {
                Classification::Squeeze
            } else if pct_b > 1.0 {
                Classification::AboveUpperBand
            } else if pct_b > 0.8 {
                Classification::NearUpperBand
            } else if pct_b < 0.0 {
                Classification::BelowLowerBand
            } else if pct_b < 0.2 {
                Classification::NearLowerBand
            } else {
                Classification::WithinBands
            };

            results.push(IndicatorResult {
                name: self.name(),
                value: mid,
                secondary_value: Some(bw),
                timestamp: candles[i].timestamp,
                meta: IndicatorMeta::classified(classification)
                    .detail("upper_band", upper)
                    .detail("lower_band", lower)
                    .detail("middle_band", mid)
                    .detail("bandwidth", bw)
                    .detail("percent_b", pct_b)
                    .detail("is_squeeze", is_squeeze),
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
                Candle::new(base + Duration::minutes(5 * i as i64), c, c + 0.1, c - 0.1, c, 10.0)
            })
            .collect();
        CandleSeries::new("XAUUSD", Timeframe::M5, candles)
    }

    #[test]
    fn breakout_bar_is_above_upper_band() {
        // Noisy-but-stable closes keep the bands meaningful, then a jump.
        let mut closes: Vec<f64> = (0..40)
            .map(|i| 100.0 + if i % 2 == 0 { 0.3 } else { -0.3 })
            .collect();
        closes.push(106.0);
        let results = BollingerBands::default().calculate(&series_from_closes(&closes));
        let last = results.last().unwrap();
        assert_eq!(last.meta.classification, Classification::AboveUpperBand);
        let pct_b = last.meta.details["percent_b"].as_f64().unwrap();
        assert!(pct_b > 1.0);
    }

    #[test]
    fn contraction_after_expansion_is_squeeze() {
        // Wide swings first, then dead-flat closes: bandwidth collapses
        // against its rolling average.
        let mut closes: Vec<f64> = (0..30)
            .map(|i| 100.0 + if i % 2 == 0 { 2.0 } else { -2.0 })
            .collect();
        closes.extend(vec![100.0; 25]);
        let results = BollingerBands::default().calculate(&series_from_closes(&closes));
        let last = results.last().unwrap();
        assert_eq!(last.meta.classification, Classification::Squeeze);
    }

    #[test]
    fn mid_band_close_is_within_bands() {
        let closes: Vec<f64> = (0..40)
            .map(|i| 100.0 + if i % 2 == 0 { 0.5 } else { -0.5 })
            .collect();
        let results = BollingerBands::default().calculate(&series_from_closes(&closes));
        // A mid-oscillation bar sits inside the bands (when not squeezed).
        assert!(results.iter().any(|r| matches!(
            r.meta.classification,
            Classification::WithinBands | Classification::NearUpperBand | Classification::NearLowerBand
        )));
    }

    #[test]
    fn insufficient_history_returns_empty() {
        let closes = vec![100.0; 15];
        assert!(BollingerBands::default()
            .calculate(&series_from_closes(&closes))
            .is_empty());
    }
}
