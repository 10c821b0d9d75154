// =============================================================================
// Market Regime Classifier
// =============================================================================
//
// Labels the current market state from a handful of volatility and trend
// features, with a confidence in [0, 1] and a stability score (fraction of
// the last 20 bars carrying the same label).
//
// Features per bar:
//   - atr_pct:       14-bar SMA of true range, as % of price
//   - trend_slope:   5-bar EMA20 slope divided by ATR
//   - rsi:           Wilder RSI-14
//   - bb_width:      2 * rolling std(20) / SMA20 * 100
//   - volume_ratio:  volume / SMA20(volume)
//   - roc10:         10-bar rate of change, %
//   - adx_proxy:     14-bar rolling mean of |trend_slope|
//
// Rule set (first match wins):
//   1. volatile_breakout — atr_pct > 1.5 AND volume_ratio > 1.5 AND bb_width > 4
//   2. trending_up       — trend_slope > 0.5 AND rsi > 55 AND adx_proxy > 0.3
//   3. trending_down     — trend_slope < -0.5 AND rsi < 45 AND adx_proxy > 0.3
//   4. ranging           — everything else

use serde::Serialize;

use crate::indicators::{math, EPS};
use crate::market_data::CandleSeries;
use crate::types::Regime;

/// Bars of history below which the classifier reports `unknown`.
const MIN_BARS: usize = 30;

/// Window for the stability score.
const STABILITY_WINDOW: usize = 20;

/// Feature values backing a regime decision, reported for transparency.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RegimeFeatures {
    pub atr_pct: f64,
    pub trend_slope: f64,
    pub rsi: f64,
    pub bb_width: f64,
    pub volume_ratio: f64,
    pub roc10: f64,
    pub adx_proxy: f64,
}

/// Full classifier output for one series.
#[derive(Debug, Clone, Serialize)]
pub struct RegimeReport {
    pub regime: Regime,
    pub confidence: f64,
    /// Fraction of the last 20 bars labelled identically to the latest bar.
    pub stability: f64,
    pub features: RegimeFeatures,
    /// Labels of the most recent bars, oldest first (up to 10).
    pub history: Vec<Regime>,
}

impl RegimeReport {
    fn unknown() -> Self {
        Self {
            regime: Regime::Unknown,
            confidence: 0.0,
            stability: 0.0,
            features: RegimeFeatures::default(),
            history: Vec::new(),
        }
    }
}

/// Compute the full feature matrix; positions without enough history hold
/// NaN in every column that is not yet warm.
fn compute_features(series: &CandleSeries) -> Vec<RegimeFeatures> {
    let candles = series.candles();
    let closes = series.closes();
    let volumes = series.volumes();
    let n = candles.len();

    let tr = math::true_range(candles);
    let atr14 = math::rolling_mean(&tr, 14);
    let ema20 = math::ema(&closes, 20);
    let rsi = math::wilder_rsi(&closes, 14);
    let sma20 = math::sma(&closes, 20);
    let std20 = math::rolling_std(&closes, 20);
    let vol_sma = math::sma(&volumes, 20);
    let roc10 = math::roc(&closes, 10);

    let mut trend_slope = vec![f64::NAN; n];
    for i in 5..n {
        if ema20[i].is_finite() && ema20[i - 5].is_finite() && atr14[i].is_finite() {
            trend_slope[i] = (ema20[i] - ema20[i - 5]) / atr14[i].max(EPS);
        }
    }
    let abs_slope: Vec<f64> = trend_slope.iter().map(|v| v.abs()).collect();
    let adx_proxy = math::rolling_mean(&abs_slope, 14);

    (0..n)
        .map(|i| RegimeFeatures {
            atr_pct: if atr14[i].is_finite() && closes[i].abs() > EPS {
                atr14[i] / closes[i] * 100.0
            } else {
                f64::NAN
            },
            trend_slope: trend_slope[i],
            rsi: rsi[i],
            bb_width: if std20[i].is_finite() && sma20[i].abs() > EPS {
                std20[i] * 2.0 / sma20[i] * 100.0
            } else {
                f64::NAN
            },
            volume_ratio: if vol_sma[i].is_finite() && vol_sma[i] > 0.0 {
                volumes[i] / vol_sma[i]
            } else {
                f64::NAN
            },
            roc10: roc10[i],
            adx_proxy: adx_proxy[i],
        })
        .collect()
}

/// Rule-based classification of one feature row.
fn classify(f: &RegimeFeatures) -> (Regime, f64) {
    let atr_pct = if f.atr_pct.is_finite() { f.atr_pct } else { 0.0 };
    let trend_slope = if f.trend_slope.is_finite() { f.trend_slope } else { 0.0 };
    let bb_width = if f.bb_width.is_finite() { f.bb_width } else { 0.0 };
    let volume_ratio = if f.volume_ratio.is_finite() { f.volume_ratio } else { 1.0 };
    let rsi = if f.rsi.is_finite() { f.rsi } else { 50.0 };
    let adx_proxy = if f.adx_proxy.is_finite() { f.adx_proxy } else { 0.0 };

    if atr_pct > 1.5 && volume_ratio > 1.5 && bb_width > 4.0 {
        let confidence =
            (0.6 + (atr_pct - 1.5) * 0.1 + (volume_ratio - 1.5) * 0.1).min(0.95);
        return (Regime::VolatileBreakout, confidence);
    }

    if trend_slope > 0.5 && rsi > 55.0 && adx_proxy > 0.3 {
        let confidence = (0.5 + trend_slope * 0.15 + (rsi - 55.0) * 0.005).min(0.95);
        return (Regime::TrendingUp, confidence);
    }

    if trend_slope < -0.5 && rsi < 45.0 && adx_proxy > 0.3 {
        let confidence = (0.5 + trend_slope.abs() * 0.15 + (45.0 - rsi) * 0.005).min(0.95);
        return (Regime::TrendingDown, confidence);
    }

    let confidence = (0.4 + (1.0 - adx_proxy).max(0.0) * 0.3).min(0.9);
    (Regime::Ranging, confidence)
}

/// Detect the regime of the latest bar of `series`.
pub fn detect_regime(series: &CandleSeries) -> RegimeReport {
    if series.len() < MIN_BARS {
        return RegimeReport::unknown();
    }

    let features = compute_features(series);

    // Latest bar must have a warm feature row.
    let latest = match features.last() {
        Some(f) if f.trend_slope.is_finite() || f.rsi.is_finite() => *f,
        _ => return RegimeReport::unknown(),
    };

    let (regime, confidence) = classify(&latest);

    // Stability: how often the recent bars carried the same label.
    let window = STABILITY_WINDOW.min(features.len());
    let recent: Vec<Regime> = features[features.len() - window..]
        .iter()
        .map(|f| classify(f).0)
        .collect();
    let stability =
        recent.iter().filter(|r| **r == regime).count() as f64 / recent.len().max(1) as f64;

    let history: Vec<Regime> = recent[recent.len().saturating_sub(10)..].to_vec();

    tracing::debug!(
        symbol = %series.symbol,
        timeframe = %series.timeframe,
        regime = %regime,
        confidence = format!("{confidence:.2}"),
        stability = format!("{stability:.2}"),
        "regime detected"
    );

    RegimeReport {
        regime,
        confidence,
        stability,
        features: latest,
        history,
    }
}
