// =============================================================================
// Volume Spike — participation bursts relative to a rolling volume SMA
// =============================================================================
//
// Emits only on bars where volume / SMA(volume) clears the spike threshold.
// The sign of the bar's percent price change classifies the spike as
// accumulation (up), distribution (down), or neutral high volume (flat).

use crate::indicators::{
    math, Classification, Indicator, IndicatorMeta, IndicatorResult,
};
use crate::market_data::CandleSeries;

pub struct VolumeSpike {
    pub lookback: usize,
    pub spike_threshold: f64,
}

impl Default for VolumeSpike {
    fn default() -> Self {
        Self {
            lookback: 20,
            spike_threshold: 2.0,
        }
    }
}

impl Indicator for VolumeSpike {
    fn name(&self) -> &'static str {
        "volume_spike"
    }

    fn calculate(&self, series: &CandleSeries) -> Vec<IndicatorResult> {
        let candles = series.candles();
        if candles.len() <= self.lookback {
            return Vec::new();
        }

        let volumes = series.volumes();
        let vol_sma = math::sma(&volumes, self.lookback);

        let mut results = Vec::new();
        for i in self.lookback..candles.len() {
            let sma = vol_sma[i];
            if !sma.is_finite() || sma <= 0.0 {
                continue;
            }
            let ratio = volumes[i] / sma;
            if ratio < self.spike_threshold {
                continue;
            }

            let prev_close = candles[i - 1].close;
            let pchange = if prev_close.abs() > crate::indicators::EPS {
                (candles[i].close - prev_close) / prev_close
            } else {
                0.0
            };

            let classification = if pchange > 0.001 {
                Classification::Accumulation
            } else if pchange < -0.001 {
                Classification::Distribution
            } else {
                Classification::NeutralHighVolume
            };

            results.push(IndicatorResult {
                name: self.name(),
                value: ratio,
                secondary_value: Some(pchange),
                timestamp: candles[i].timestamp,
                meta: IndicatorMeta::classified(classification)
                    .detail("volume", volumes[i])
                    .detail("sma_volume", sma)
                    .detail("threshold", self.spike_threshold),
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

    fn series_with_spike(spike_close_delta: f64) -> CandleSeries {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut candles = Vec::new();
        for i in 0..30 {
            let close = 100.0;
            candles.push(Candle::new(
                base + Duration::minutes(5 * i),
                close,
                close + 0.5,
                close - 0.5,
                close,
                1_000.0,
            ));
        }
        // Final bar: 3x volume with the requested price move.
        let close = 100.0 + spike_close_delta;
        candles.push(Candle::new(
            base + Duration::minutes(150),
            100.0,
            close.max(100.0) + 0.5,
            close.min(100.0) - 0.5,
            close,
            3_000.0,
        ));
        CandleSeries::new("XAUUSD", Timeframe::M5, candles)
    }

    #[test]
    fn emits_nothing_without_spikes() {
        let series = series_with_spike(0.0);
        // Flat-volume prefix only (drop the spike bar).
        let flat = series.prefix(30);
        let results = VolumeSpike::default().calculate(&flat);
        assert!(results.is_empty());
    }

    #[test]
    fn classifies_accumulation_on_up_spike() {
        let results = VolumeSpike::default().calculate(&series_with_spike(1.0));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].meta.classification, Classification::Accumulation);
        assert!(results[0].value >= 2.0);
    }

    #[test]
    fn classifies_distribution_on_down_spike() {
        let results = VolumeSpike::default().calculate(&series_with_spike(-1.0));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].meta.classification, Classification::Distribution);
    }

    #[test]
    fn classifies_neutral_on_flat_spike() {
        let results = VolumeSpike::default().calculate(&series_with_spike(0.0));
        assert_eq!(results.len(), 1);
        assert_eq!(
            results[0].meta.classification,
            Classification::NeutralHighVolume
        );
    }

    #[test]
    fn insufficient_history_returns_empty() {
        let series = series_with_spike(1.0).prefix(10);
        assert!(VolumeSpike::default().calculate(&series).is_empty());
    }
}
