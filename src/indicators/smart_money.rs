// =============================================================================
// Smart Money Concepts — Order Blocks, Fair Value Gaps, BOS, CHoCH
// =============================================================================
//
// Structural markers of institutional flow:
//   - Order Block: last opposing candle before an impulsive move (> 0.3%).
//   - Fair Value Gap: 3-candle imbalance (> 0.1%) not yet filled.
//   - Break of Structure: swing break in the direction of the trend.
//   - Change of Character: first swing break against the prevailing trend.
//
// Emits a single aggregated result per invocation: active zone counts, the
// structural trend, near-zone flags, and a seven-level classification from
// strong bullish reversal through strong bearish reversal.

use serde_json::json;

use crate::indicators::{Bias, Classification, Indicator, IndicatorMeta, IndicatorResult};
use crate::market_data::{Candle, CandleSeries};

pub struct SmartMoney {
    pub swing_lookback: usize,
    /// Minimum body move of the impulsive candle, as a fraction of its open.
    pub impulse_threshold: f64,
}

impl Default for SmartMoney {
    fn default() -> Self {
        Self {
            swing_lookback: 5,
            impulse_threshold: 0.003,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Zone {
    bias: Bias,
    price: f64,
    high: f64,
    low: f64,
    active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct StructureEvent {
    bias: Bias,
    level: f64,
}

#[derive(Debug, Default)]
struct Structure {
    trend: Option<Bias>,
    last_bos: Option<StructureEvent>,
    last_choch: Option<StructureEvent>,
}

/// Swing highs and lows: a bar whose high (low) is the extreme of the
/// surrounding `lookback`-wide window on both sides.
pub(crate) fn find_swing_points(
    candles: &[Candle],
    lookback: usize,
) -> (Vec<(usize, f64)>, Vec<(usize, f64)>) {
    let mut swing_highs = Vec::new();
    let mut swing_lows = Vec::new();

    if candles.len() < 2 * lookback + 1 {
        return (swing_highs, swing_lows);
    }

    for i in lookback..candles.len() - lookback {
        let high = candles[i].high;
        let low = candles[i].low;
        let window = &candles[i - lookback..=i + lookback];

        let is_swing_high = window
            .iter()
            .enumerate()
            .all(|(j, c)| j == lookback || high >= c.high);
        if is_swing_high {
            swing_highs.push((i, high));
        }

        let is_swing_low = window
            .iter()
            .enumerate()
            .all(|(j, c)| j == lookback || low <= c.low);
        if is_swing_low {
            swing_lows.push((i, low));
        }
    }

    (swing_highs, swing_lows)
}

impl SmartMoney {
    fn detect_structure(
        swing_highs: &[(usize, f64)],
        swing_lows: &[(usize, f64)],
    ) -> Structure {
        let mut result = Structure::default();
        if swing_highs.len() < 2 || swing_lows.len() < 2 {
            return result;
        }

        // Trend from the last few swings: higher highs + higher lows is
        // bullish, lower highs + lower lows is bearish.
        let recent_highs = &swing_highs[swing_highs.len().saturating_sub(4)..];
        let recent_lows = &swing_lows[swing_lows.len().saturating_sub(4)..];

        let hh = recent_highs.windows(2).filter(|w| w[1].1 > w[0].1).count();
        let lh = recent_highs.windows(2).filter(|w| w[1].1 < w[0].1).count();
        let ll = recent_lows.windows(2).filter(|w| w[1].1 < w[0].1).count();
        let hl = recent_lows.windows(2).filter(|w| w[1].1 > w[0].1).count();

        if hh >= 2 && hl >= 1 {
            result.trend = Some(Bias::Bullish);
        } else if ll >= 2 && lh >= 1 {
            result.trend = Some(Bias::Bearish);
        }

        let prev_high = swing_highs[swing_highs.len() - 2].1;
        let curr_high = swing_highs[swing_highs.len() - 1].1;
        let prev_low = swing_lows[swing_lows.len() - 2].1;
        let curr_low = swing_lows[swing_lows.len() - 1].1;

        // BOS: break of the previous swing in the trend direction.
        match result.trend {
            Some(Bias::Bullish) => {
                if curr_high > prev_high {
                    result.last_bos = Some(StructureEvent {
                        bias: Bias::Bullish,
                        level: prev_high,
                    });
                } else if curr_low > prev_low {
                    result.last_bos = Some(StructureEvent {
                        bias: Bias::Bullish,
                        level: prev_low,
                    });
                }
                // CHoCH: first break against the bullish trend.
                if curr_low < prev_low {
                    result.last_choch = Some(StructureEvent {
                        bias: Bias::Bearish,
                        level: prev_low,
                    });
                }
            }
            Some(Bias::Bearish) => {
                if curr_high < prev_high {
                    result.last_bos = Some(StructureEvent {
                        bias: Bias::Bearish,
                        level: prev_high,
                    });
                } else if curr_low < prev_low {
                    result.last_bos = Some(StructureEvent {
                        bias: Bias::Bearish,
                        level: prev_low,
                    });
                }
                if curr_high > prev_high {
                    result.last_choch = Some(StructureEvent {
                        bias: Bias::Bullish,
                        level: prev_high,
                    });
                }
            }
            _ => {}
        }

        result
    }

    /// Order Blocks: last opposing candle before an impulsive move. Only
    /// zones price has not yet invalidated are returned (last 10).
    fn detect_order_blocks(&self, candles: &[Candle]) -> Vec<Zone> {
        let close = match candles.last() {
            Some(c) => c.close,
            None => return Vec::new(),
        };
        let mut zones = Vec::new();

        for i in 2..candles.len().saturating_sub(1) {
            let c0 = &candles[i - 1];
            let c1 = &candles[i];

            let body_0 = c0.close - c0.open;
            let body_1 = c1.close - c1.open;
            if c1.high - c1.low <= 0.0 || c1.open.abs() < crate::indicators::EPS {
                continue;
            }
            let impulse_pct = body_1.abs() / c1.open;
            if impulse_pct <= self.impulse_threshold {
                continue;
            }

            // Bullish OB: bearish candle then strong bullish impulse.
            if body_0 < 0.0 && body_1 > 0.0 {
                zones.push(Zone {
                    bias: Bias::Bullish,
                    price: (c0.open + c0.close) / 2.0,
                    high: c0.open,
                    low: c0.close,
                    active: close > c0.low,
                });
            // Bearish OB: bullish candle then strong bearish impulse.
            } else if body_0 > 0.0 && body_1 < 0.0 {
                zones.push(Zone {
                    bias: Bias::Bearish,
                    price: (c0.open + c0.close) / 2.0,
                    high: c0.close,
                    low: c0.open,
                    active: close < c0.high,
                });
            }
        }

        let active: Vec<Zone> = zones.into_iter().filter(|z| z.active).collect();
        let start = active.len().saturating_sub(10);
        active[start..].to_vec()
    }

    /// Fair Value Gaps: imbalance between candle 1 and candle 3 of a
    /// 3-candle sequence, larger than 0.1%, not yet filled (last 10).
    fn detect_fvgs(&self, candles: &[Candle]) -> Vec<Zone> {
        let close = match candles.last() {
            Some(c) => c.close,
            None => return Vec::new(),
        };
        let mut gaps = Vec::new();

        for i in 2..candles.len() {
            let c0 = &candles[i - 2];
            let c2 = &candles[i];

            // Bullish FVG: third candle's low above first candle's high.
            if c2.low > c0.high && c0.high > 0.0 {
                let gap_pct = (c2.low - c0.high) / c0.high;
                if gap_pct > 0.001 {
                    gaps.push(Zone {
                        bias: Bias::Bullish,
                        price: (c2.low + c0.high) / 2.0,
                        high: c2.low,
                        low: c0.high,
                        active: close >= c0.high,
                    });
                }
            }

            // Bearish FVG: third candle's high below first candle's low.
            if c2.high < c0.low && c0.low > 0.0 {
                let gap_pct = (c0.low - c2.high) / c0.low;
                if gap_pct > 0.001 {
                    gaps.push(Zone {
                        bias: Bias::Bearish,
                        price: (c0.low + c2.high) / 2.0,
                        high: c0.low,
                        low: c2.high,
                        active: close <= c0.low,
                    });
                }
            }
        }

        let active: Vec<Zone> = gaps.into_iter().filter(|z| z.active).collect();
        let start = active.len().saturating_sub(10);
        active[start..].to_vec()
    }
}

impl Indicator for SmartMoney {
    fn name(&self) -> &'static str {
        "smart_money"
    }

    fn calculate(&self, series: &CandleSeries) -> Vec<IndicatorResult> {
        let candles = series.candles();
        if candles.len() < 30 {
            return Vec::new();
        }

        let (swing_highs, swing_lows) = find_swing_points(candles, self.swing_lookback);
        let structure = Self::detect_structure(&swing_highs, &swing_lows);
        let order_blocks = self.detect_order_blocks(candles);
        let fvgs = self.detect_fvgs(candles);

        let close = candles.last().map(|c| c.close).unwrap_or_default();

        let bullish_ob = order_blocks.iter().filter(|z| z.bias == Bias::Bullish).count();
        let bearish_ob = order_blocks.iter().filter(|z| z.bias == Bias::Bearish).count();
        let bullish_fvg = fvgs.iter().filter(|z| z.bias == Bias::Bullish).count();
        let bearish_fvg = fvgs.iter().filter(|z| z.bias == Bias::Bearish).count();

        // Proximity to zones: an OB within 0.5% of price, or price inside an
        // FVG band.
        let mut near_bullish_zone = false;
        let mut near_bearish_zone = false;
        let mut active_zones: Vec<String> = Vec::new();

        for zone in &order_blocks {
            let dist_pct = (close - zone.price).abs() / close.max(crate::indicators::EPS) * 100.0;
            if dist_pct < 0.5 {
                match zone.bias {
                    Bias::Bullish => {
                        near_bullish_zone = true;
                        active_zones.push(format!("Bullish OB @ {:.2}", zone.price));
                    }
                    Bias::Bearish => {
                        near_bearish_zone = true;
                        active_zones.push(format!("Bearish OB @ {:.2}", zone.price));
                    }
                    Bias::Neutral => {}
                }
            }
        }
        for zone in &fvgs {
            if zone.low <= close && close <= zone.high {
                match zone.bias {
                    Bias::Bullish => {
                        near_bullish_zone = true;
                        active_zones.push(format!("Bullish FVG {:.2}-{:.2}", zone.low, zone.high));
                    }
                    Bias::Bearish => {
                        near_bearish_zone = true;
                        active_zones.push(format!("Bearish FVG {:.2}-{:.2}", zone.low, zone.high));
                    }
                    Bias::Neutral => {}
                }
            }
        }
        active_zones.truncate(5);

        let trend = structure.trend;
        let classification = match (structure.last_choch, structure.last_bos, trend) {
            (Some(choch), _, _) if choch.bias == Bias::Bullish && near_bullish_zone => {
                Classification::StrongBullishReversal
            }
            (Some(choch), _, _) if choch.bias == Bias::Bearish && near_bearish_zone => {
                Classification::StrongBearishReversal
            }
            (_, Some(bos), _) if bos.bias == Bias::Bullish && near_bullish_zone => {
                Classification::BullishContinuation
            }
            (_, Some(bos), _) if bos.bias == Bias::Bearish && near_bearish_zone => {
                Classification::BearishContinuation
            }
            (_, _, Some(Bias::Bullish)) => Classification::BullishStructure,
            (_, _, Some(Bias::Bearish)) => Classification::BearishStructure,
            _ => Classification::Neutral,
        };

        let bullish_signals =
            bullish_ob + bullish_fvg + usize::from(trend == Some(Bias::Bullish));
        let bearish_signals =
            bearish_ob + bearish_fvg + usize::from(trend == Some(Bias::Bearish));
        let total_signals = (bullish_signals + bearish_signals).max(1);
        let confidence =
            bullish_signals.max(bearish_signals) as f64 / total_signals as f64 * 100.0;

        let mut meta = IndicatorMeta::classified(classification)
            .detail(
                "trend",
                trend.map(|b| b.to_string()).unwrap_or_else(|| "neutral".into()),
            )
            .detail("bullish_ob_count", bullish_ob)
            .detail("bearish_ob_count", bearish_ob)
            .detail("bullish_fvg_count", bullish_fvg)
            .detail("bearish_fvg_count", bearish_fvg)
            .detail("near_bullish_zone", near_bullish_zone)
            .detail("near_bearish_zone", near_bearish_zone)
            .detail("active_zones", json!(active_zones))
            .detail("confidence", confidence);
        if let Some(bos) = structure.last_bos {
            meta = meta.detail(
                "last_bos",
                json!({ "type": bos.bias.to_string(), "level": bos.level }),
            );
        }
        if let Some(choch) = structure.last_choch {
            meta = meta.detail(
                "last_choch",
                json!({ "type": choch.bias.to_string(), "level": choch.level }),
            );
        }

        vec![IndicatorResult {
            name: self.name(),
            value: confidence,
            secondary_value: Some(bullish_signals as f64 - bearish_signals as f64),
            timestamp: candles.last().unwrap().timestamp,
            meta,
        }]
    }
}
