// =============================================================================
// Average True Range — Wilder 14 volatility estimator
// =============================================================================
//
// Reports ATR in absolute terms and as a percent of price, classifies the
// volatility state by the ratio of current ATR to its own rolling average,
// and suggests a 2x ATR stop distance.

use crate::indicators::{math, Classification, Indicator, IndicatorMeta, IndicatorResult};
use crate::market_data::CandleSeries;

pub struct Atr {
    pub period: usize,
}

impl Default for Atr {
    fn default() -> Self {
        Self { period: 14 }
    }
}

impl Indicator for Atr {
    fn name(&self) -> &'static str {
        "atr"
    }

    fn calculate(&self, series: &CandleSeries) -> Vec<IndicatorResult> {
        let candles = series.candles();
        if candles.len() < self.period + 1 {
            return Vec::new();
        }

        let atr = math::wilder_atr(candles, self.period);

        let mut results = Vec::with_capacity(candles.len() - self.period);
        for i in self.period..candles.len() {
            let atr_val = atr[i];
            if !atr_val.is_finite() {
                continue;
            }
            let price = candles[i].close;
            let atr_pct = if price.abs() > crate::indicators::EPS {
                atr_val / price * 100.0
            } else {
                0.0
            };

            // Volatility state: current ATR against its own recent average.
            let window_start = i.saturating_sub(self.period);
            let recent: Vec<f64> = atr[window_start..=i]
                .iter()
                .copied()
                .filter(|v| v.is_finite())
                .collect();
            let avg_atr = if recent.is_empty() {
                atr_val
            } else {
                recent.iter().sum::<f64>() / recent.len() as f64
            };
            let atr_ratio = if avg_atr > 0.0 { atr_val / avg_atr } else { 1.0 };

            let classification = if atr_ratio > 1.5 {
                Classification::HighVolatility
            } else if atr_ratio > 1.15 {
                Classification::RisingVolatility
            } else if atr_ratio < 0.65 {
                Classification::LowVolatility
            } else if atr_ratio < 0.85 {
                Classification::FallingVolatility
            } else {
                Classification::NormalVolatility
            };

            results.push(IndicatorResult {
                name: self.name(),
                value: atr_val,
                secondary_value: Some(atr_pct),
                timestamp: candles[i].timestamp,
                meta: IndicatorMeta::classified(classification)
                    .detail("atr_percent", atr_pct)
                    .detail("atr_ratio", atr_ratio)
                    .detail("stop_loss_distance", atr_val * 2.0)
                    .detail("price", price),
            });
        }

        results
    }
}
