// =============================================================================
// On-Balance Volume — cumulative signed volume with divergence detection
// =============================================================================
//
// Divergence over the lookback window uses swing comparison: price prints a
// higher high while OBV prints a lower high (bearish), or price prints a
// lower low while OBV prints a higher low (bullish).

use crate::indicators::{Divergence, Indicator, IndicatorMeta, IndicatorResult};
use crate::market_data::CandleSeries;

pub struct Obv {
    pub divergence_lookback: usize,
}

impl Default for Obv {
    fn default() -> Self {
        Self {
            divergence_lookback: 14,
        }
    }
}

impl Obv {
    fn detect_divergence(prices: &[f64], obv: &[f64]) -> Option<Divergence> {
        if prices.len() <= 2 || obv.len() <= 2 {
            return None;
        }
        let interior_price_max = prices[1..prices.len() - 1]
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        let interior_price_min = prices[1..prices.len() - 1]
            .iter()
            .copied()
            .fold(f64::INFINITY, f64::min);
        let interior_obv_max = obv[1..obv.len() - 1]
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        let interior_obv_min = obv[1..obv.len() - 1]
            .iter()
            .copied()
            .fold(f64::INFINITY, f64::min);

        let price_higher_high = prices[prices.len() - 1] > interior_price_max;
        let obv_lower_high = obv[obv.len() - 1] < interior_obv_max;
        let price_lower_low = prices[prices.len() - 1] < interior_price_min;
        let obv_higher_low = obv[obv.len() - 1] > interior_obv_min;

        if price_higher_high && obv_lower_high {
            Some(Divergence::BearishDivergence)
        } else if price_lower_low && obv_higher_low {
            Some(Divergence::BullishDivergence)
        } else {
            None
        }
    }
}

impl Indicator for Obv {
    fn name(&self) -> &'static str {
        "obv"
    }

    fn calculate(&self, series: &CandleSeries) -> Vec<IndicatorResult> {
        let candles = series.candles();
        if candles.len() <= self.divergence_lookback {
            return Vec::new();
        }

        let closes = series.closes();

        let mut obv = vec![0.0_f64; candles.len()];
        for i in 1..candles.len() {
            obv[i] = if closes[i] > closes[i - 1] {
                obv[i - 1] + candles[i].volume
            } else if closes[i] < closes[i - 1] {
                obv[i - 1] - candles[i].volume
            } else {
                obv[i - 1]
            };
        }

        let lb = self.divergence_lookback;
        let mut results = Vec::with_capacity(candles.len() - lb);

        for i in lb..candles.len() {
            let divergence = Self::detect_divergence(&closes[i - lb..=i], &obv[i - lb..=i]);

            results.push(IndicatorResult {
                name: self.name(),
                value: obv[i],
                secondary_value: None,
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
