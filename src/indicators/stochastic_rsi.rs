// =============================================================================
// Stochastic RSI — stochastic oscillator applied to Wilder RSI (14/14/3/3)
// =============================================================================
//
// %K is the smoothed stochastic of RSI, %D smooths %K again. Crossovers are
// tagged at the bar; a bullish cross below 50 reads as a bullish reversal,
// a bearish cross above 50 as a bearish reversal.

use crate::indicators::{
    math, Classification, Crossover, Indicator, IndicatorMeta, IndicatorResult, EPS,
};
use crate::market_data::CandleSeries;

pub struct StochasticRsi {
    pub rsi_period: usize,
    pub stoch_period: usize,
    pub k_smooth: usize,
    pub d_smooth: usize,
}

impl Default for StochasticRsi {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            stoch_period: 14,
            k_smooth: 3,
            d_smooth: 3,
        }
    }
}

impl Indicator for StochasticRsi {
    fn name(&self) -> &'static str {
        "stochastic_rsi"
    }

    fn calculate(&self, series: &CandleSeries) -> Vec<IndicatorResult> {
        let candles = series.candles();
        let start = self.rsi_period + self.stoch_period + self.d_smooth;
        if candles.len() <= start {
            return Vec::new();
        }

        let closes = series.closes();
        let rsi = math::wilder_rsi(&closes, self.rsi_period);

        let rsi_low = math::rolling_min(
            &rsi.iter().map(|v| if v.is_finite() { *v } else { 50.0 }).collect::<Vec<_>>(),
            self.stoch_period,
        );
        let rsi_high = math::rolling_max(
            &rsi.iter().map(|v| if v.is_finite() { *v } else { 50.0 }).collect::<Vec<_>>(),
            self.stoch_period,
        );

        let n = candles.len();
        let mut stoch = vec![f64::NAN; n];
        for i in 0..n {
            if rsi[i].is_finite() && rsi_low[i].is_finite() && rsi_high[i].is_finite() {
                let range = (rsi_high[i] - rsi_low[i]).max(EPS);
                stoch[i] = (rsi[i] - rsi_low[i]) / range * 100.0;
            }
        }

        let k_line = math::rolling_mean(&stoch, self.k_smooth);
        let d_line = math::rolling_mean(&k_line, self.d_smooth);

        let mut results = Vec::with_capacity(n - start);
        for i in start..n {
            let k_val = k_line[i];
            let d_val = d_line[i];
            if !k_val.is_finite() || !d_val.is_finite() {
                continue;
            }

            let crossover = if i > start && k_line[i - 1].is_finite() && d_line[i - 1].is_finite() {
                let prev_k = k_line[i - 1];
                let prev_d = d_line[i - 1];
                if prev_k <= prev_d && k_val > d_val {
                    Some(Crossover::BullishCrossover)
                } else if prev_k >= prev_d && k_val < d_val {
                    Some(Crossover::BearishCrossover)
                } else {
                    None
                }
            } else {
                None
            };

            let classification = if k_val >= 80.0 {
                Classification::Overbought
            } else if k_val <= 20.0 {
                Classification::Oversold
            } else if crossover == Some(Crossover::BullishCrossover) && k_val < 50.0 {
                Classification::BullishReversal
            } else if crossover == Some(Crossover::BearishCrossover) && k_val > 50.0 {
                Classification::BearishReversal
            } else {
                Classification::Neutral
            };

            results.push(IndicatorResult {
                name: self.name(),
                value: k_val,
                secondary_value: Some(d_val),
                timestamp: candles[i].timestamp,
                meta: IndicatorMeta {
                    classification,
                    crossover,
                    ..Default::default()
                }
                .detail("k_line", k_val)
                .detail("d_line", d_val),
            });
        }

        results
    }
}
