// =============================================================================
// Candle Patterns — single/two/three-candle reversal and continuation setups
// =============================================================================
//
// Per bar, every matching pattern is collected with a strength in [0, 1];
// the strongest one names the bar and the bullish/bearish majority sets the
// classification. Body sizes are judged against a 20-bar average body.

use serde_json::json;

use crate::indicators::{math, Classification, Indicator, IndicatorMeta, IndicatorResult, EPS};
use crate::market_data::{Candle, CandleSeries};

pub struct CandlePatterns;

#[derive(Debug, Clone, Copy, PartialEq)]
enum PatternBias {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone)]
struct Pattern {
    name: &'static str,
    kind: &'static str, // "reversal" | "continuation"
    bias: PatternBias,
    strength: f64,
}

fn body(c: &Candle) -> f64 {
    (c.close - c.open).abs()
}

fn upper_wick(c: &Candle) -> f64 {
    c.high - c.close.max(c.open)
}

fn lower_wick(c: &Candle) -> f64 {
    c.close.min(c.open) - c.low
}

fn is_bullish(c: &Candle) -> bool {
    c.close > c.open
}

fn is_bearish(c: &Candle) -> bool {
    c.close < c.open
}

fn detect_patterns(curr: &Candle, prev: &Candle, prev2: &Candle, avg_body: f64) -> Vec<Pattern> {
    let mut patterns = Vec::new();

    let b = body(curr);
    let rng = curr.high - curr.low;
    let uw = upper_wick(curr);
    let lw = lower_wick(curr);
    let avg_b = if avg_body.is_finite() && avg_body > EPS {
        avg_body
    } else {
        b
    };

    if rng < EPS || avg_b < EPS {
        return patterns;
    }

    // --- Single candle ------------------------------------------------------

    if b / rng < 0.1 {
        patterns.push(Pattern {
            name: "doji",
            kind: "reversal",
            bias: PatternBias::Neutral,
            strength: 0.5,
        });
    } else if lw > b * 2.0 && uw < b * 0.5 && b / rng < 0.35 {
        patterns.push(Pattern {
            name: "hammer",
            kind: "reversal",
            bias: PatternBias::Bullish,
            strength: 0.7,
        });
    } else if uw > b * 2.0 && lw < b * 0.5 && b / rng < 0.35 {
        patterns.push(Pattern {
            name: "shooting_star",
            kind: "reversal",
            bias: PatternBias::Bearish,
            strength: 0.7,
        });
    }

    if b / rng > 0.85 && b > avg_b * 1.2 {
        patterns.push(Pattern {
            name: "marubozu",
            kind: "continuation",
            bias: if is_bullish(curr) {
                PatternBias::Bullish
            } else {
                PatternBias::Bearish
            },
            strength: 0.6,
        });
    }

    // --- Two candle ---------------------------------------------------------

    let prev_body = body(prev);
    if prev_body > EPS {
        if is_bearish(prev)
            && is_bullish(curr)
            && curr.open <= prev.close
            && curr.close >= prev.open
            && b > prev_body
        {
            patterns.push(Pattern {
                name: "bullish_engulfing",
                kind: "reversal",
                bias: PatternBias::Bullish,
                strength: 0.85,
            });
        }

        if is_bullish(prev)
            && is_bearish(curr)
            && curr.open >= prev.close
            && curr.close <= prev.open
            && b > prev_body
        {
            patterns.push(Pattern {
                name: "bearish_engulfing",
                kind: "reversal",
                bias: PatternBias::Bearish,
                strength: 0.85,
            });
        }

        let prev_mid = (prev.open + prev.close) / 2.0;
        if is_bearish(prev)
            && is_bullish(curr)
            && curr.open < prev.low
            && curr.close > prev_mid
            && curr.close < prev.open
        {
            patterns.push(Pattern {
                name: "piercing_line",
                kind: "reversal",
                bias: PatternBias::Bullish,
                strength: 0.7,
            });
        }

        if is_bullish(prev)
            && is_bearish(curr)
            && curr.open > prev.high
            && curr.close < prev_mid
            && curr.close > prev.open
        {
            patterns.push(Pattern {
                name: "dark_cloud_cover",
                kind: "reversal",
                bias: PatternBias::Bearish,
                strength: 0.7,
            });
        }
    }

    // --- Three candle -------------------------------------------------------

    let prev2_body = body(prev2);
    let prev2_mid = (prev2.open + prev2.close) / 2.0;

    if is_bearish(prev2)
        && prev2_body > avg_b * 0.5
        && prev_body < avg_b * 0.5
        && is_bullish(curr)
        && b > avg_b * 0.5
        && curr.close > prev2_mid
    {
        patterns.push(Pattern {
            name: "morning_star",
            kind: "reversal",
            bias: PatternBias::Bullish,
            strength: 0.9,
        });
    }

    if is_bullish(prev2)
        && prev2_body > avg_b * 0.5
        && prev_body < avg_b * 0.5
        && is_bearish(curr)
        && b > avg_b * 0.5
        && curr.close < prev2_mid
    {
        patterns.push(Pattern {
            name: "evening_star",
            kind: "reversal",
            bias: PatternBias::Bearish,
            strength: 0.9,
        });
    }

    if is_bullish(prev2)
        && is_bullish(prev)
        && is_bullish(curr)
        && prev.close > prev2.close
        && curr.close > prev.close
        && prev2_body > avg_b * 0.5
        && prev_body > avg_b * 0.5
        && b > avg_b * 0.5
    {
        patterns.push(Pattern {
            name: "three_white_soldiers",
            kind: "continuation",
            bias: PatternBias::Bullish,
            strength: 0.85,
        });
    }

    if is_bearish(prev2)
        && is_bearish(prev)
        && is_bearish(curr)
        && prev.close < prev2.close
        && curr.close < prev.close
        && prev2_body > avg_b * 0.5
        && prev_body > avg_b * 0.5
        && b > avg_b * 0.5
    {
        patterns.push(Pattern {
            name: "three_black_crows",
            kind: "continuation",
            bias: PatternBias::Bearish,
            strength: 0.85,
        });
    }

    patterns
}

impl Indicator for CandlePatterns {
    fn name(&self) -> &'static str {
        "candle_patterns"
    }

    fn calculate(&self, series: &CandleSeries) -> Vec<IndicatorResult> {
        let candles = series.candles();
        if candles.len() < 5 {
            return Vec::new();
        }

        let bodies: Vec<f64> = candles.iter().map(body).collect();
        let avg_body = math::sma(&bodies, 20);

        let mut results = Vec::with_capacity(candles.len() - 2);
        for i in 2..candles.len() {
            let patterns = detect_patterns(
                &candles[i],
                &candles[i - 1],
                &candles[i - 2],
                avg_body[i],
            );

            let result = if patterns.is_empty() {
                IndicatorResult {
                    name: self.name(),
                    value: 0.0,
                    secondary_value: None,
                    timestamp: candles[i].timestamp,
                    meta: IndicatorMeta::classified(Classification::Neutral)
                        .detail("pattern", "none"),
                }
            } else {
                let strongest = patterns
                    .iter()
                    .max_by(|a, b| a.strength.total_cmp(&b.strength))
                    .unwrap()
                    .clone();

                let bullish = patterns.iter().filter(|p| p.bias == PatternBias::Bullish).count();
                let bearish = patterns.iter().filter(|p| p.bias == PatternBias::Bearish).count();

                let classification = if bullish > bearish {
                    Classification::Bullish
                } else if bearish > bullish {
                    Classification::Bearish
                } else {
                    Classification::Neutral
                };

                let names: Vec<&str> = patterns.iter().map(|p| p.name).collect();

                IndicatorResult {
                    name: self.name(),
                    value: strongest.strength,
                    secondary_value: Some(patterns.len() as f64),
                    timestamp: candles[i].timestamp,
                    meta: IndicatorMeta::classified(classification)
                        .detail("pattern", strongest.name)
                        .detail("pattern_type", strongest.kind)
                        .detail("all_patterns", json!(names))
                        .detail("strength", strongest.strength),
                }
            };

            results.push(result);
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
    use crate::types::Timeframe;
    use chrono::{Duration, TimeZone, Utc};

    fn bar(i: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Candle::new(base + Duration::minutes(5 * i), open, high, low, close, 100.0)
    }

    fn with_preamble(tail: Vec<Candle>) -> CandleSeries {
        // Ordinary candles establish the average body before the pattern.
        let mut candles: Vec<Candle> = (0..25)
            .map(|i| {
                if i % 2 == 0 {
                    bar(i, 100.0, 101.1, 99.9, 101.0)
                } else {
                    bar(i, 101.0, 101.1, 99.9, 100.0)
                }
            })
            .collect();
        let offset = candles.len() as i64;
        for (j, mut c) in tail.into_iter().enumerate() {
            let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
            c.timestamp = base + Duration::minutes(5 * (offset + j as i64));
            candles.push(c);
        }
        CandleSeries::new("XAUUSD", Timeframe::M5, candles)
    }

    #[test]
    fn doji_detected_on_tiny_body() {
        let series = with_preamble(vec![bar(0, 100.0, 101.0, 99.0, 100.01)]);
        let results = CandlePatterns.calculate(&series);
        let last = results.last().unwrap();
        assert_eq!(last.meta.details["pattern"], "doji");
        assert_eq!(last.meta.classification, Classification::Neutral);
    }

    #[test]
    fn hammer_is_bullish_reversal() {
        // Long lower wick, modest body near the top (big enough to dodge
        // the doji branch).
        let series = with_preamble(vec![bar(0, 100.0, 100.6, 97.5, 100.5)]);
        let results = CandlePatterns.calculate(&series);
        let last = results.last().unwrap();
        assert_eq!(last.meta.details["pattern"], "hammer");
        assert_eq!(last.meta.classification, Classification::Bullish);
        assert_eq!(last.meta.details["pattern_type"], "reversal");
    }

    #[test]
    fn shooting_star_is_bearish() {
        let series = with_preamble(vec![bar(0, 100.0, 102.5, 99.45, 99.5)]);
        let results = CandlePatterns.calculate(&series);
        let last = results.last().unwrap();
        assert_eq!(last.meta.details["pattern"], "shooting_star");
        assert_eq!(last.meta.classification, Classification::Bearish);
    }

    #[test]
    fn bullish_engulfing_detected() {
        let series = with_preamble(vec![
            bar(0, 101.0, 101.2, 99.8, 100.0),  // bearish
            bar(1, 99.9, 102.6, 99.8, 102.5),   // engulfs it
        ]);
        let results = CandlePatterns.calculate(&series);
        let last = results.last().unwrap();
        let all = last.meta.details["all_patterns"].as_array().unwrap();
        assert!(all.iter().any(|p| p == "bullish_engulfing"));
        assert_eq!(last.meta.classification, Classification::Bullish);
    }

    #[test]
    fn morning_star_beats_weaker_patterns() {
        let series = with_preamble(vec![
            bar(0, 102.0, 102.2, 99.9, 100.0),   // strong bearish
            bar(1, 99.9, 100.2, 99.7, 100.05),   // small middle candle
            bar(2, 100.1, 102.4, 100.0, 102.3),  // strong bullish close above midpoint
        ]);
        let results = CandlePatterns.calculate(&series);
        let last = results.last().unwrap();
        assert_eq!(last.meta.details["pattern"], "morning_star");
        assert!((last.value - 0.9).abs() < 1e-9);
    }

    #[test]
    fn three_black_crows_detected() {
        let series = with_preamble(vec![
            bar(0, 101.0, 101.1, 99.4, 99.5),
            bar(1, 99.5, 99.6, 97.9, 98.0),
            bar(2, 98.0, 98.1, 96.4, 96.5),
        ]);
        let results = CandlePatterns.calculate(&series);
        let last = results.last().unwrap();
        let all = last.meta.details["all_patterns"].as_array().unwrap();
        assert!(all.iter().any(|p| p == "three_black_crows"));
        assert_eq!(last.meta.classification, Classification::Bearish);
    }

    #[test]
    fn plain_bar_emits_neutral_none() {
        let series = with_preamble(vec![bar(0, 100.0, 101.1, 99.9, 101.0)]);
        let results = CandlePatterns.calculate(&series);
        let last = results.last().unwrap();
        assert_eq!(last.meta.details["pattern"], "none");
        assert_eq!(last.value, 0.0);
    }

    #[test]
    fn insufficient_history_returns_empty() {
        let series = CandleSeries::new(
            "XAUUSD",
            Timeframe::M5,
            vec![bar(0, 100.0, 101.0, 99.0, 100.5)],
        );
        assert!(CandlePatterns.calculate(&series).is_empty());
    }
}
