// =============================================================================
// Predictor — external ML contract with a deterministic default
// =============================================================================
//
// The signal engine consumes next-candle direction predictions through this
// trait and treats the model as a black box: any error degrades to
// direction = neutral, confidence = 0. The bundled `MomentumPredictor` is a
// deterministic stand-in built from the same features the trained models
// consume (EMA 9/21 spread, RSI, 10-bar rate of change).

use anyhow::{bail, Result};
use serde::Serialize;

use crate::indicators::math;
use crate::market_data::CandleSeries;
use crate::types::{Bias, Timeframe};

/// Next-candle direction prediction.
#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    pub direction: Bias,
    /// Confidence in [0, 1].
    pub confidence: f64,
    /// Free-form diagnostics from the underlying model.
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    pub diagnostics: serde_json::Map<String, serde_json::Value>,
}

impl Prediction {
    /// The value the engine substitutes for a failed or absent model.
    pub fn neutral() -> Self {
        Self {
            direction: Bias::Neutral,
            confidence: 0.0,
            diagnostics: serde_json::Map::new(),
        }
    }
}

/// Black-box predictor contract.
pub trait Predictor: Send + Sync {
    fn predict(&self, series: &CandleSeries, symbol: &str, timeframe: Timeframe)
        -> Result<Prediction>;
}

// =============================================================================
// MomentumPredictor — deterministic feature-vote model
// =============================================================================

/// Votes three momentum features and maps the margin to a confidence.
pub struct MomentumPredictor {
    /// Minimum history before a prediction is attempted.
    pub min_bars: usize,
}

impl Default for MomentumPredictor {
    fn default() -> Self {
        Self { min_bars: 30 }
    }
}

impl Predictor for MomentumPredictor {
    fn predict(
        &self,
        series: &CandleSeries,
        _symbol: &str,
        _timeframe: Timeframe,
    ) -> Result<Prediction> {
        if series.len() < self.min_bars {
            bail!("insufficient history: {} bars", series.len());
        }

        let closes = series.closes();
        let n = closes.len();

        let ema9 = math::ema(&closes, 9);
        let ema21 = math::ema(&closes, 21);
        let rsi = math::wilder_rsi(&closes, 14);
        let roc10 = math::roc(&closes, 10);

        let ema_spread = (ema9[n - 1] - ema21[n - 1]) / closes[n - 1].abs().max(1e-10) * 100.0;
        let rsi_val = if rsi[n - 1].is_finite() { rsi[n - 1] } else { 50.0 };
        let roc_val = if roc10[n - 1].is_finite() { roc10[n - 1] } else { 0.0 };

        let mut bullish_votes = 0;
        let mut bearish_votes = 0;
        if ema_spread > 0.02 {
            bullish_votes += 1;
        } else if ema_spread < -0.02 {
            bearish_votes += 1;
        }
        if rsi_val > 55.0 {
            bullish_votes += 1;
        } else if rsi_val < 45.0 {
            bearish_votes += 1;
        }
        if roc_val > 0.1 {
            bullish_votes += 1;
        } else if roc_val < -0.1 {
            bearish_votes += 1;
        }

        let (direction, margin) = if bullish_votes > bearish_votes {
            (Bias::Bullish, bullish_votes - bearish_votes)
        } else if bearish_votes > bullish_votes {
            (Bias::Bearish, bearish_votes - bullish_votes)
        } else {
            (Bias::Neutral, 0)
        };

        // One-vote margin reads ~0.55, unanimous reads ~0.85.
        let confidence = match margin {
            0 => 0.0,
            1 => 0.55,
            2 => 0.70,
            _ => 0.85,
        };

        let mut diagnostics = serde_json::Map::new();
        diagnostics.insert("ema_spread_pct".into(), ema_spread.into());
        diagnostics.insert("rsi".into(), rsi_val.into());
        diagnostics.insert("roc10".into(), roc_val.into());
        diagnostics.insert("model_type".into(), "momentum_vote".into());

        Ok(Prediction {
            direction,
            confidence,
            diagnostics,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::Candle;
    use chrono::{Duration, TimeZone, Utc};

    fn series_from_closes(closes: &[f64]) -> CandleSeries {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let candles = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                Candle::new(base + Duration::minutes(5 * i as i64), c, c + 0.2, c - 0.2, c, 10.0)
            })
            .collect();
        CandleSeries::new("BTCUSD", Timeframe::M5, candles)
    }

    #[test]
    fn rally_predicts_bullish_with_confidence() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let p = MomentumPredictor::default()
            .predict(&series_from_closes(&closes), "BTCUSD", Timeframe::M5)
            .unwrap();
        assert_eq!(p.direction, Bias::Bullish);
        assert!(p.confidence >= 0.55);
    }

    #[test]
    fn selloff_predicts_bearish() {
        let closes: Vec<f64> = (0..60).map(|i| 200.0 - i as f64).collect();
        let p = MomentumPredictor::default()
            .predict(&series_from_closes(&closes), "BTCUSD", Timeframe::M5)
            .unwrap();
        assert_eq!(p.direction, Bias::Bearish);
    }

    #[test]
    fn flat_market_is_neutral() {
        let closes = vec![100.0; 60];
        let p = MomentumPredictor::default()
            .predict(&series_from_closes(&closes), "BTCUSD", Timeframe::M5)
            .unwrap();
        assert_eq!(p.direction, Bias::Neutral);
        assert_eq!(p.confidence, 0.0);
    }

    #[test]
    fn short_history_errors() {
        let closes = vec![100.0; 10];
        assert!(MomentumPredictor::default()
            .predict(&series_from_closes(&closes), "BTCUSD", Timeframe::M5)
            .is_err());
    }

    #[test]
    fn deterministic_output() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64 / 7.0).sin()).collect();
        let series = series_from_closes(&closes);
        let p1 = MomentumPredictor::default()
            .predict(&series, "BTCUSD", Timeframe::M5)
            .unwrap();
        let p2 = MomentumPredictor::default()
            .predict(&series, "BTCUSD", Timeframe::M5)
            .unwrap();
        assert_eq!(p1.direction, p2.direction);
        assert_eq!(p1.confidence, p2.confidence);
    }
}
