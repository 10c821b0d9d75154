// =============================================================================
// Rolling-window math shared by the indicator catalog and regime classifier
// =============================================================================
//
// All functions return full-length vectors aligned with the input; warm-up
// positions (where the window is not yet filled) hold NaN. Callers index the
// output with the same bar index as the candle list and must check
// `is_finite()` before use.

use crate::indicators::EPS;
use crate::market_data::Candle;

/// Simple moving average over `period` values.
pub fn sma(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }
    let mut sum: f64 = values[..period].iter().sum();
    out[period - 1] = sum / period as f64;
    for i in period..values.len() {
        sum += values[i] - values[i - period];
        out[i] = sum / period as f64;
    }
    out
}

/// Exponential moving average with span semantics: alpha = 2 / (span + 1),
/// seeded with the first value.
pub fn ema(values: &[f64], span: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if values.is_empty() || span == 0 {
        return out;
    }
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut prev = values[0];
    out[0] = prev;
    for i in 1..values.len() {
        prev = alpha * values[i] + (1.0 - alpha) * prev;
        out[i] = prev;
    }
    out
}

/// Rolling sample standard deviation over `period` values.
pub fn rolling_std(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period < 2 || values.len() < period {
        return out;
    }
    for i in (period - 1)..values.len() {
        let window = &values[i + 1 - period..=i];
        let mean = window.iter().sum::<f64>() / period as f64;
        let var = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (period as f64 - 1.0);
        out[i] = var.sqrt();
    }
    out
}

/// Rolling minimum over `period` values.
pub fn rolling_min(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }
    for i in (period - 1)..values.len() {
        out[i] = values[i + 1 - period..=i]
            .iter()
            .copied()
            .fold(f64::INFINITY, f64::min);
    }
    out
}

/// Rolling maximum over `period` values.
pub fn rolling_max(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }
    for i in (period - 1)..values.len() {
        out[i] = values[i + 1 - period..=i]
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
    }
    out
}

/// Rolling mean over `period` values, tolerating NaN warm-ups in the input
/// (a NaN inside the window yields NaN for that position).
pub fn rolling_mean(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }
    for i in (period - 1)..values.len() {
        let window = &values[i + 1 - period..=i];
        if window.iter().any(|v| v.is_nan()) {
            continue;
        }
        out[i] = window.iter().sum::<f64>() / period as f64;
    }
    out
}

/// Wilder RSI: averages seeded with the SMA of the first `period` deltas,
/// then smoothed with alpha = 1/period. Valid from bar index `period`.
pub fn wilder_rsi(closes: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; closes.len()];
    if period == 0 || closes.len() < period + 1 {
        return out;
    }

    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();

    let (mut avg_gain, mut avg_loss) =
        deltas[..period]
            .iter()
            .fold((0.0_f64, 0.0_f64), |(g, l), &d| {
                if d > 0.0 {
                    (g + d, l)
                } else {
                    (g, l - d)
                }
            });
    let period_f = period as f64;
    avg_gain /= period_f;
    avg_loss /= period_f;

    out[period] = rsi_value(avg_gain, avg_loss);

    for (i, &delta) in deltas.iter().enumerate().skip(period) {
        let gain = delta.max(0.0);
        let loss = (-delta).max(0.0);
        avg_gain = (avg_gain * (period_f - 1.0) + gain) / period_f;
        avg_loss = (avg_loss * (period_f - 1.0) + loss) / period_f;
        out[i + 1] = rsi_value(avg_gain, avg_loss);
    }

    out
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    let rs = avg_gain / avg_loss.max(EPS);
    100.0 - 100.0 / (1.0 + rs)
}

/// True range per bar; the first bar falls back to high - low.
pub fn true_range(candles: &[Candle]) -> Vec<f64> {
    candles
        .iter()
        .enumerate()
        .map(|(i, c)| {
            if i == 0 {
                c.high - c.low
            } else {
                let prev_close = candles[i - 1].close;
                (c.high - c.low)
                    .max((c.high - prev_close).abs())
                    .max((c.low - prev_close).abs())
            }
        })
        .collect()
}

/// Wilder-smoothed ATR: SMA of the first `period` true ranges as seed, then
/// alpha = 1/period smoothing. Valid from bar index `period`.
pub fn wilder_atr(candles: &[Candle], period: usize) -> Vec<f64> {
    let tr = true_range(candles);
    let mut out = vec![f64::NAN; candles.len()];
    if period == 0 || candles.len() < period + 1 {
        return out;
    }
    let period_f = period as f64;
    let mut atr = tr[1..=period].iter().sum::<f64>() / period_f;
    out[period] = atr;
    for i in (period + 1)..candles.len() {
        atr = (atr * (period_f - 1.0) + tr[i]) / period_f;
        out[i] = atr;
    }
    out
}

/// Rate of change over `n` bars, in percent.
pub fn roc(values: &[f64], n: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    for i in n..values.len() {
        let base = values[i - n];
        if base.abs() > EPS {
            out[i] = (values[i] - base) / base * 100.0;
        }
    }
    out
}
