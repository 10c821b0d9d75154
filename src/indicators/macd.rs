// =============================================================================
// MACD — 12/26 EMA spread with a 9-period signal line
// =============================================================================
//
// Momentum classification comes from the histogram's sign and direction;
// crossovers are tagged at the bar where the MACD line crosses the signal.

use crate::indicators::{
    math, Classification, Crossover, Indicator, IndicatorMeta, IndicatorResult,
};
use crate::market_data::CandleSeries;

pub struct Macd {
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
}

impl Default for Macd {
    fn default() -> Self {
        Self {
            fast: 12,
            slow: 26,
            signal: 9,
        }
    }
}

impl Indicator for Macd {
    fn name(&self) -> &'static str {
        "macd"
    }

    fn calculate(&self, series: &CandleSeries) -> Vec<IndicatorResult> {
        let candles = series.candles();
        let start = self.slow + self.signal;
        if candles.len() <= start {
            return Vec::new();
        }

        let closes = series.closes();
        let ema_fast = math::ema(&closes, self.fast);
        let ema_slow = math::ema(&closes, self.slow);

        let macd_line: Vec<f64> = ema_fast
            .iter()
            .zip(&ema_slow)
            .map(|(f, s)| f - s)
            .collect();
        let signal_line = math::ema(&macd_line, self.signal);
        let histogram: Vec<f64> = macd_line
            .iter()
            .zip(&signal_line)
            .map(|(m, s)| m - s)
            .collect();

        let mut results = Vec::with_capacity(candles.len() - start);
        for i in start..candles.len() {
            let macd_val = macd_line[i];
            let sig_val = signal_line[i];
            let hist_val = histogram[i];
            let prev_hist = histogram[i - 1];

            let crossover = {
                let prev_macd = macd_line[i - 1];
                let prev_sig = signal_line[i - 1];
                if prev_macd <= prev_sig && macd_val > sig_val {
                    Some(Crossover::BullishCrossover)
                } else if prev_macd >= prev_sig && macd_val < sig_val {
                    Some(Crossover::BearishCrossover)
                } else {
                    None
                }
            };

            let classification = if hist_val > 0.0 && hist_val > prev_hist {
                Classification::BullishMomentum
            } else if hist_val > 0.0 {
                Classification::BullishWeakening
            } else if hist_val < 0.0 && hist_val < prev_hist {
                Classification::BearishMomentum
            } else if hist_val < 0.0 {
                Classification::BearishWeakening
            } else {
                Classification::Neutral
            };

            results.push(IndicatorResult {
                name: self.name(),
                value: macd_val,
                secondary_value: Some(sig_val),
                timestamp: candles[i].timestamp,
                meta: IndicatorMeta {
                    classification,
                    crossover,
                    ..Default::default()
                }
                .detail("signal_line", sig_val)
                .detail("histogram", hist_val),
            });
        }

        results
    }
}
