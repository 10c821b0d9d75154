// =============================================================================
// Moving Averages — SMA 20/50/200 trend structure with EMA 9/21 signals
// =============================================================================
//
// The trend label counts how many of {price > SMA20, price > SMA50,
// price > SMA200, SMA20 > SMA50} hold. An EMA 9/21 cross at the bar replaces
// the label; a 50/200 cross is tagged as golden/death cross.

use crate::indicators::{
    math, Classification, Crossover, Indicator, IndicatorMeta, IndicatorResult,
};
use crate::market_data::CandleSeries;

pub struct MovingAverages;

impl Indicator for MovingAverages {
    fn name(&self) -> &'static str {
        "moving_averages"
    }

    fn calculate(&self, series: &CandleSeries) -> Vec<IndicatorResult> {
        let candles = series.candles();
        let start = 50;
        if candles.len() <= start {
            return Vec::new();
        }

        let closes = series.closes();
        let sma20 = math::sma(&closes, 20);
        let sma50 = math::sma(&closes, 50);
        let ema9 = math::ema(&closes, 9);
        let ema21 = math::ema(&closes, 21);

        let has_sma200 = candles.len() >= 200;
        let sma200 = if has_sma200 {
            Some(math::sma(&closes, 200))
        } else {
            None
        };

        let mut results = Vec::with_capacity(candles.len() - start);
        for i in start..candles.len() {
            let close = closes[i];
            let s20 = sma20[i];
            let s50 = sma50[i];
            let e9 = ema9[i];
            let e21 = ema21[i];
            let s200 = sma200
                .as_ref()
                .map(|v| v[i])
                .filter(|v| v.is_finite());

            let mut conditions = vec![close > s20, close > s50, s20 > s50];
            if let Some(s200) = s200 {
                conditions.push(close > s200);
            }
            let bullish_count = conditions.iter().filter(|&&c| c).count();
            let total = conditions.len();

            let mut classification = if bullish_count as f64 >= total as f64 * 0.75 {
                Classification::StrongUptrend
            } else if bullish_count as f64 >= total as f64 * 0.5 {
                Classification::Uptrend
            } else if bullish_count as f64 <= total as f64 * 0.25 {
                Classification::StrongDowntrend
            } else {
                Classification::Downtrend
            };

            // EMA 9/21 cross at this bar overrides the structural label.
            if i > start {
                let prev_e9 = ema9[i - 1];
                let prev_e21 = ema21[i - 1];
                if prev_e9 <= prev_e21 && e9 > e21 {
                    classification = Classification::BullishEmaCrossover;
                } else if prev_e9 >= prev_e21 && e9 < e21 {
                    classification = Classification::BearishEmaCrossover;
                }
            }

            // Golden / death cross on SMA 50 vs 200.
            let mut crossover = None;
            if let Some(ref s200_vec) = sma200 {
                if i > 200 && s200_vec[i - 1].is_finite() {
                    let prev_s50 = sma50[i - 1];
                    let prev_s200 = s200_vec[i - 1];
                    let s200_now = s200_vec[i];
                    if prev_s50 <= prev_s200 && s50 > s200_now {
                        crossover = Some(Crossover::GoldenCross);
                    } else if prev_s50 >= prev_s200 && s50 < s200_now {
                        crossover = Some(Crossover::DeathCross);
                    }
                }
            }

            let mut meta = IndicatorMeta {
                classification,
                crossover,
                ..Default::default()
            }
            .detail("sma20", s20)
            .detail("sma50", s50)
            .detail("ema9", e9)
            .detail("ema21", e21)
            .detail("above_sma20", close > s20)
            .detail("above_sma50", close > s50);
            if let Some(s200) = s200 {
                meta = meta.detail("sma200", s200).detail("above_sma200", close > s200);
            }

            results.push(IndicatorResult {
                name: self.name(),
                value: s20,
                secondary_value: Some(s50),
                timestamp: candles[i].timestamp,
                meta,
            });
        }

        results
    }
}
