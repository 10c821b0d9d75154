// =============================================================================
// Session Analysis — Asia / London / New York session bias and volatility
// =============================================================================
//
// Partitions candles into sessions by UTC hour, reports per-session bias
// (bullish/bearish share of candles) and average range, and flags the
// London-NY overlap (13:00-16:00 UTC). The "current" session is taken from
// the latest candle's timestamp so the result is a pure function of the
// series.

use chrono::Timelike;
use serde_json::json;

use crate::indicators::{Bias, Classification, Indicator, IndicatorMeta, IndicatorResult};
use crate::market_data::CandleSeries;

/// Session windows in UTC hours: [start, end).
const SESSIONS: [(&str, u32, u32); 3] = [
    ("asia", 0, 8),
    ("london", 7, 16),
    ("new_york", 13, 22),
];

const OVERLAP_START: u32 = 13;
const OVERLAP_END: u32 = 16;

pub struct SessionAnalysis;

#[derive(Debug, Default, Clone)]
struct SessionStats {
    range_sum: f64,
    count: usize,
    bullish: usize,
    bearish: usize,
    volume: f64,
}

impl SessionStats {
    fn bias(&self) -> Bias {
        let count = self.count.max(1) as f64;
        let bull_pct = self.bullish as f64 / count * 100.0;
        let bear_pct = self.bearish as f64 / count * 100.0;
        if bull_pct > 55.0 {
            Bias::Bullish
        } else if bear_pct > 55.0 {
            Bias::Bearish
        } else {
            Bias::Neutral
        }
    }
}

impl Indicator for SessionAnalysis {
    fn name(&self) -> &'static str {
        "session_analysis"
    }

    fn calculate(&self, series: &CandleSeries) -> Vec<IndicatorResult> {
        let candles = series.candles();
        if candles.len() < 20 {
            return Vec::new();
        }

        let mut stats: Vec<SessionStats> = vec![SessionStats::default(); SESSIONS.len()];

        for candle in candles {
            let hour = candle.timestamp.hour();
            let range = candle.high - candle.low;
            let bullish = candle.close > candle.open;

            for (idx, (_, start, end)) in SESSIONS.iter().enumerate() {
                if *start <= hour && hour < *end {
                    let s = &mut stats[idx];
                    s.range_sum += range;
                    s.count += 1;
                    s.volume += candle.volume;
                    if bullish {
                        s.bullish += 1;
                    } else {
                        s.bearish += 1;
                    }
                }
            }
        }

        let mut session_metrics = serde_json::Map::new();
        for (idx, (name, _, _)) in SESSIONS.iter().enumerate() {
            let s = &stats[idx];
            let count = s.count.max(1) as f64;
            session_metrics.insert(
                name.to_string(),
                json!({
                    "avg_range": s.range_sum / count,
                    "candle_count": s.count,
                    "bullish_pct": s.bullish as f64 / count * 100.0,
                    "bearish_pct": s.bearish as f64 / count * 100.0,
                    "avg_volume": s.volume / count,
                    "bias": s.bias().to_string(),
                }),
            );
        }

        // Current session from the latest bar, keeping the calculation a
        // pure function of the input series.
        let current_hour = candles.last().unwrap().timestamp.hour();
        let in_overlap = (OVERLAP_START..OVERLAP_END).contains(&current_hour);
        let current_session = SESSIONS
            .iter()
            .enumerate()
            .find(|(_, (_, start, end))| *start <= current_hour && current_hour < *end)
            .map(|(idx, (name, _, _))| (*name, stats[idx].bias()))
            .unwrap_or(("off_hours", Bias::Neutral));

        let most_volatile = SESSIONS
            .iter()
            .enumerate()
            .max_by(|(a, _), (b, _)| {
                let ra = stats[*a].range_sum / stats[*a].count.max(1) as f64;
                let rb = stats[*b].range_sum / stats[*b].count.max(1) as f64;
                ra.total_cmp(&rb)
            })
            .map(|(_, (name, _, _))| *name)
            .unwrap_or("london");

        // London and NY agreeing on direction is the strongest session read.
        let london_bias = stats[1].bias();
        let ny_bias = stats[2].bias();
        let session_confluence = london_bias == ny_bias && london_bias != Bias::Neutral;

        let current_bias = current_session.1;
        let classification = if session_confluence && london_bias == Bias::Bullish {
            Classification::StrongBullishSessions
        } else if session_confluence && london_bias == Bias::Bearish {
            Classification::StrongBearishSessions
        } else {
            match current_bias {
                Bias::Bullish => Classification::BullishSession,
                Bias::Bearish => Classification::BearishSession,
                Bias::Neutral => Classification::Neutral,
            }
        };

        let mut confidence = if session_confluence { 70.0 } else { 50.0 };
        if in_overlap {
            confidence += 15.0;
        }

        let meta = IndicatorMeta::classified(classification)
            .detail("current_session", current_session.0)
            .detail("in_overlap", in_overlap)
            .detail("session_confluence", session_confluence)
            .detail("sessions", serde_json::Value::Object(session_metrics))
            .detail("most_volatile_session", most_volatile)
            .detail("current_session_bias", current_bias.to_string());

        vec![IndicatorResult {
            name: self.name(),
            value: confidence,
            secondary_value: None,
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
    use crate::market_data::Candle;
    use crate::types::Timeframe;
    use chrono::{Duration, TimeZone, Utc};

    /// One bullish hourly candle per hour across two days.
    fn bullish_series() -> CandleSeries {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let candles: Vec<Candle> = (0..48)
            .map(|i| {
                let open = 100.0 + 0.1 * i as f64;
                Candle::new(
                    base + Duration::hours(i),
                    open,
                    open + 0.6,
                    open - 0.1,
                    open + 0.5,
                    1_000.0,
                )
            })
            .collect();
        CandleSeries::new("XAUUSD", Timeframe::H1, candles)
    }

    #[test]
    fn all_bullish_candles_give_strong_bullish_sessions() {
        let results = SessionAnalysis.calculate(&bullish_series());
        assert_eq!(results.len(), 1);
        assert_eq!(
            results[0].meta.classification,
            Classification::StrongBullishSessions
        );
        assert_eq!(results[0].meta.details["session_confluence"], true);
    }

    #[test]
    fn overlap_flag_follows_latest_bar_hour() {
        // Last candle of the series lands at 23:00 UTC — outside overlap.
        let results = SessionAnalysis.calculate(&bullish_series());
        assert_eq!(results[0].meta.details["in_overlap"], false);

        // Truncate so the last candle is at 14:00 UTC — inside overlap.
        let truncated = bullish_series().prefix(15);
        let results = SessionAnalysis.calculate(&truncated);
        assert_eq!(results[0].meta.details["in_overlap"], true);
        // Overlap adds confidence.
        assert!(results[0].value > 70.0);
    }

    #[test]
    fn session_metrics_cover_all_three_sessions() {
        let results = SessionAnalysis.calculate(&bullish_series());
        let sessions = results[0].meta.details["sessions"].as_object().unwrap();
        for name in ["asia", "london", "new_york"] {
            assert!(sessions.contains_key(name));
            assert!(sessions[name]["candle_count"].as_u64().unwrap() > 0);
        }
    }

    #[test]
    fn insufficient_history_returns_empty() {
        let series = bullish_series().prefix(10);
        assert!(SessionAnalysis.calculate(&series).is_empty());
    }
}
