// =============================================================================
// Key Levels — support/resistance clusters, floor pivots, Fibonacci
// =============================================================================
//
// Swing highs/lows within 0.3% of each other cluster into S/R levels whose
// strength is the touch count. Classic floor pivots (PP, R1-R3, S1-S3) come
// from the last 20 bars; Fibonacci retracements from the major swing of the
// last 100. Emits one aggregated result with the proximity classification
// and the risk/reward ratio to the nearest levels.

use serde_json::json;

use crate::indicators::smart_money::find_swing_points;
use crate::indicators::{Classification, Indicator, IndicatorMeta, IndicatorResult};
use crate::market_data::{Candle, CandleSeries};

pub struct KeyLevels {
    pub swing_lookback: usize,
    /// Clustering distance as a fraction of price.
    pub cluster_threshold: f64,
}

impl Default for KeyLevels {
    fn default() -> Self {
        Self {
            swing_lookback: 5,
            cluster_threshold: 0.003,
        }
    }
}

#[derive(Debug, Clone)]
struct Level {
    price: f64,
    label: String,
    touches: usize,
}

#[derive(Debug, Clone, Copy)]
struct Pivots {
    pp: f64,
    r1: f64,
    r2: f64,
    r3: f64,
    s1: f64,
    s2: f64,
    s3: f64,
}

impl KeyLevels {
    /// Classic floor pivots computed from the high/low of the last 20 bars
    /// and the latest close.
    fn calculate_pivots(candles: &[Candle]) -> Pivots {
        let recent = &candles[candles.len().saturating_sub(20)..];
        let high = recent.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
        let low = recent.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
        let close = candles.last().map(|c| c.close).unwrap_or_default();

        let pp = (high + low + close) / 3.0;
        Pivots {
            pp,
            r1: 2.0 * pp - low,
            r2: pp + (high - low),
            r3: high + 2.0 * (pp - low),
            s1: 2.0 * pp - high,
            s2: pp - (high - low),
            s3: low - 2.0 * (high - pp),
        }
    }

    /// Cluster swing points within `cluster_threshold` of each other into
    /// S/R levels, strongest (most touches) first.
    fn find_sr_levels(&self, candles: &[Candle]) -> Vec<Level> {
        let (swing_highs, swing_lows) = find_swing_points(candles, self.swing_lookback);

        let mut raw: Vec<f64> = swing_highs.iter().map(|(_, p)| *p).collect();
        raw.extend(swing_lows.iter().map(|(_, p)| *p));
        if raw.is_empty() {
            return Vec::new();
        }
        raw.sort_by(f64::total_cmp);

        let mut clustered = Vec::new();
        let mut used = vec![false; raw.len()];
        for i in 0..raw.len() {
            if used[i] {
                continue;
            }
            let mut prices = vec![raw[i]];
            used[i] = true;
            for j in (i + 1)..raw.len() {
                if used[j] {
                    continue;
                }
                if (raw[j] - raw[i]).abs() / raw[i] < self.cluster_threshold {
                    prices.push(raw[j]);
                    used[j] = true;
                }
            }
            let touches = prices.len();
            let avg = prices.iter().sum::<f64>() / touches as f64;
            clustered.push(Level {
                price: avg,
                label: format!("SR ({touches}x)"),
                touches,
            });
        }

        clustered.sort_by(|a, b| b.touches.cmp(&a.touches));
        clustered.truncate(15);
        clustered
    }

    /// Fibonacci retracement levels from the major swing of the recent
    /// window (up to 100 bars).
    fn calculate_fibonacci(candles: &[Candle]) -> Vec<(f64, f64, String)> {
        let recent = &candles[candles.len().saturating_sub(100)..];

        let (high_idx, swing_high) = recent
            .iter()
            .enumerate()
            .map(|(i, c)| (i, c.high))
            .fold((0, f64::NEG_INFINITY), |acc, x| if x.1 > acc.1 { x } else { acc });
        let (low_idx, swing_low) = recent
            .iter()
            .enumerate()
            .map(|(i, c)| (i, c.low))
            .fold((0, f64::INFINITY), |acc, x| if x.1 < acc.1 { x } else { acc });

        let diff = swing_high - swing_low;
        if diff <= 0.0 {
            return Vec::new();
        }

        // Low before high => retracement of an up-swing.
        let is_upswing = low_idx < high_idx;

        const RATIOS: [(f64, &str); 7] = [
            (0.0, "0%"),
            (0.236, "23.6%"),
            (0.382, "38.2%"),
            (0.5, "50%"),
            (0.618, "61.8%"),
            (0.786, "78.6%"),
            (1.0, "100%"),
        ];

        RATIOS
            .iter()
            .map(|(ratio, label)| {
                let price = if is_upswing {
                    swing_high - diff * ratio
                } else {
                    swing_low + diff * ratio
                };
                (price, *ratio, format!("Fib {label}"))
            })
            .collect()
    }
}

impl Indicator for KeyLevels {
    fn name(&self) -> &'static str {
        "key_levels"
    }

    fn calculate(&self, series: &CandleSeries) -> Vec<IndicatorResult> {
        let candles = series.candles();
        if candles.len() < 30 {
            return Vec::new();
        }

        let close = candles.last().unwrap().close;
        let pivots = Self::calculate_pivots(candles);
        let sr_levels = self.find_sr_levels(candles);
        let fibs = Self::calculate_fibonacci(candles);

        // Partition every level into supports (below price) and resistances.
        let mut supports: Vec<(f64, String)> = Vec::new();
        let mut resistances: Vec<(f64, String)> = Vec::new();

        let mut push = |price: f64, label: String| {
            if price < close {
                supports.push((price, label));
            } else {
                resistances.push((price, label));
            }
        };

        for level in &sr_levels {
            push(level.price, level.label.clone());
        }
        for (label, price) in [
            ("PP", pivots.pp),
            ("R1", pivots.r1),
            ("R2", pivots.r2),
            ("R3", pivots.r3),
            ("S1", pivots.s1),
            ("S2", pivots.s2),
            ("S3", pivots.s3),
        ] {
            push(price, label.to_string());
        }
        for (price, _, label) in &fibs {
            push(*price, label.clone());
        }

        supports.sort_by(|a, b| (close - a.0).abs().total_cmp(&(close - b.0).abs()));
        resistances.sort_by(|a, b| (a.0 - close).abs().total_cmp(&(b.0 - close).abs()));

        let nearest_support = supports.first().cloned();
        let nearest_resistance = resistances.first().cloned();

        let support_dist = nearest_support
            .as_ref()
            .map(|(p, _)| (close - p).abs() / close * 100.0)
            .unwrap_or(999.0);
        let resist_dist = nearest_resistance
            .as_ref()
            .map(|(p, _)| (p - close).abs() / close * 100.0)
            .unwrap_or(999.0);

        let classification = if support_dist < 0.3 {
            Classification::AtSupport
        } else if resist_dist < 0.3 {
            Classification::AtResistance
        } else if resist_dist > support_dist * 2.0 {
            Classification::BullishRoom
        } else if support_dist > resist_dist * 2.0 {
            Classification::BearishRoom
        } else {
            Classification::BetweenLevels
        };

        let rr_ratio = if nearest_support.is_some() && nearest_resistance.is_some() {
            resist_dist / support_dist.max(0.01)
        } else {
            1.0
        };

        let meta = IndicatorMeta::classified(classification)
            .detail("pivot_point", pivots.pp)
            .detail("r1", pivots.r1)
            .detail("r2", pivots.r2)
            .detail("r3", pivots.r3)
            .detail("s1", pivots.s1)
            .detail("s2", pivots.s2)
            .detail("s3", pivots.s3)
            .detail(
                "nearest_support",
                nearest_support
                    .map(|(p, l)| json!({ "price": p, "label": l }))
                    .unwrap_or(serde_json::Value::Null),
            )
            .detail(
                "nearest_resistance",
                nearest_resistance
                    .map(|(p, l)| json!({ "price": p, "label": l }))
                    .unwrap_or(serde_json::Value::Null),
            )
            .detail("support_distance_pct", support_dist)
            .detail("resistance_distance_pct", resist_dist)
            .detail("risk_reward_ratio", rr_ratio)
            .detail(
                "sr_levels",
                json!(sr_levels
                    .iter()
                    .take(10)
                    .map(|l| json!({ "price": l.price, "touches": l.touches }))
                    .collect::<Vec<_>>()),
            );

        vec![IndicatorResult {
            name: self.name(),
            value: rr_ratio,
            secondary_value: Some(close),
            timestamp: candles.last().unwrap().timestamp,
            meta,
        }]
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Timeframe;
    use chrono::{Duration, TimeZone, Utc};

    fn bar(i: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Candle::new(base + Duration::minutes(15 * i), open, high, low, close, 100.0)
    }

    fn range_series(last_close: f64) -> CandleSeries {
        // Price oscillates between ~95 (support) and ~105 (resistance).
        let mut candles: Vec<Candle> = (0..60)
            .map(|i| {
                let phase = (i % 20) as f64;
                let level = if phase < 10.0 { phase } else { 20.0 - phase };
                let mid = 95.0 + level;
                bar(i, mid, mid + 0.5, mid - 0.5, mid)
            })
            .collect();
        candles.push(bar(60, last_close, last_close + 0.2, last_close - 0.2, last_close));
        CandleSeries::new("XAUUSD", Timeframe::M15, candles)
    }

    #[test]
    fn pivots_bracket_the_close() {
        let series = range_series(100.0);
        let pivots = KeyLevels::calculate_pivots(series.candles());
        assert!(pivots.r1 > pivots.pp);
        assert!(pivots.r2 > pivots.r1);
        assert!(pivots.r3 > pivots.r2);
        assert!(pivots.s1 < pivots.pp);
        assert!(pivots.s2 < pivots.s1);
        assert!(pivots.s3 < pivots.s2);
    }

    #[test]
    fn close_at_range_floor_reads_at_support() {
        let series = range_series(94.6);
        let results = KeyLevels::default().calculate(&series);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].meta.classification, Classification::AtSupport);
    }

    #[test]
    fn close_at_range_ceiling_reads_at_resistance() {
        let series = range_series(104.9);
        let results = KeyLevels::default().calculate(&series);
        assert_eq!(results[0].meta.classification, Classification::AtResistance);
    }

    #[test]
    fn fib_levels_span_the_swing() {
        let series = range_series(100.0);
        let fibs = KeyLevels::calculate_fibonacci(series.candles());
        assert_eq!(fibs.len(), 7);
        let prices: Vec<f64> = fibs.iter().map(|(p, _, _)| *p).collect();
        let lo = prices.iter().cloned().fold(f64::INFINITY, f64::min);
        let hi = prices.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        assert!(lo >= 94.0 && hi <= 106.0);
    }

    #[test]
    fn clustered_levels_accumulate_touches() {
        let series = range_series(100.0);
        let levels = KeyLevels::default().find_sr_levels(series.candles());
        assert!(!levels.is_empty());
        // Repeated visits to the same extremes merge into strong levels.
        assert!(levels[0].touches >= 2);
    }

    #[test]
    fn insufficient_history_returns_empty() {
        let candles: Vec<Candle> = (0..20).map(|i| bar(i, 100.0, 101.0, 99.0, 100.0)).collect();
        let series = CandleSeries::new("XAUUSD", Timeframe::M15, candles);
        assert!(KeyLevels::default().calculate(&series).is_empty());
    }
}
