// =============================================================================
// Signal Engine — weighted indicator scoring into trade signals with SL/TP
// =============================================================================
//
// Pipeline per (symbol, timeframe) frame:
//   1. Run the whole indicator catalog and derive a tri-state bias per
//      indicator (divergence first, then crossover, then classification).
//   2. Sum weighted biases into a 0-100 composite score.
//   3. Pick a direction against the per-(asset class, timeframe) threshold
//      table; blend confidence with the ML prediction; penalize regime
//      incompatibility, low confluence, and known loss patterns; block
//      overextended entries outright.
//   4. Build entry/SL/TP from ATR with per-class multipliers and stamp the
//      expiry window.
//
// Multi-timeframe scan flags confluence when two or more timeframes agree
// on direction and boosts those signals' confidence by 15%.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, info};

use crate::indicators::{math, IndicatorEngine, IndicatorMeta, IndicatorResult};
use crate::loss_learning::LossPattern;
use crate::market_data::CandleSeries;
use crate::predictor::{Prediction, Predictor};
use crate::regime::{detect_regime, RegimeReport};
use crate::signal::{IndicatorSnapshot, LossCategory, Signal, SignalReasons};
use crate::types::{Bias, Direction, Regime, Timeframe};

/// Minimum bars before a frame is scanned at all.
const MIN_BARS: usize = 50;

/// Weight multiplier when an indicator carries a divergence marker.
const DIVERGENCE_BOOST: f64 = 1.3;
/// Weight multiplier when an indicator carries a crossover marker.
const CROSSOVER_BOOST: f64 = 1.2;

/// Confidence multiplier for signals fighting the regime.
const REGIME_PENALTY: f64 = 0.4;
/// Confidence multiplier when confluence is below the threshold.
const CONFLUENCE_PENALTY: f64 = 0.7;
/// Confidence multiplier when a known loss pattern matches.
const LOSS_PATTERN_PENALTY: f64 = 0.5;
/// Multi-timeframe confluence boost.
const MTF_BOOST: f64 = 1.15;

/// RSI levels beyond which new entries are refused outright.
const OVEREXTENDED_LONG_RSI: f64 = 72.0;
const OVEREXTENDED_SHORT_RSI: f64 = 28.0;
/// Wider RSI band used when an "overextended" loss pattern is active.
const PATTERN_LONG_RSI: f64 = 65.0;
const PATTERN_SHORT_RSI: f64 = 35.0;

// =============================================================================
// Asset classes, weights, thresholds, ATR multipliers
// =============================================================================

const CRYPTO_SYMBOLS: [&str; 5] = ["BTCUSD", "ETHUSD", "SOLUSD", "XRPUSD", "ETHBTC"];
const FOREX_SYMBOLS: [&str; 10] = [
    "EURUSD", "GBPUSD", "USDJPY", "AUDUSD", "USDCAD", "NZDUSD", "USDCHF", "EURGBP", "EURJPY",
    "GBPJPY",
];

/// Threshold class of a symbol. Crypto runs stricter gates than forex and
/// everything else (gold, indices).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetClass {
    Crypto,
    Forex,
    Other,
}

pub fn asset_class(symbol: &str) -> AssetClass {
    let upper = symbol.to_uppercase();
    if CRYPTO_SYMBOLS.contains(&upper.as_str()) {
        AssetClass::Crypto
    } else if FOREX_SYMBOLS.contains(&upper.as_str()) {
        AssetClass::Forex
    } else {
        AssetClass::Other
    }
}

/// Scalper weight per indicator; unknown names weigh 1.0.
pub fn indicator_weight(name: &str) -> f64 {
    match name {
        "smart_money" => 2.5,
        "moving_averages" | "macd" | "volume_spike" | "key_levels" => 2.0,
        "rsi" | "stochastic_rsi" | "candle_patterns" => 1.5,
        "bollinger_bands" | "obv" => 1.0,
        "session_analysis" | "ad_line" => 0.75,
        "atr" => 0.5,
        _ => 1.0,
    }
}

/// Per-(class, timeframe) signal gates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub min_score: f64,
    pub min_confidence: f64,
    pub min_confluence: usize,
}

const fn th(min_score: f64, min_confidence: f64, min_confluence: usize) -> Thresholds {
    Thresholds {
        min_score,
        min_confidence,
        min_confluence,
    }
}

pub fn thresholds_for(class: AssetClass, timeframe: Timeframe) -> Thresholds {
    use Timeframe::*;
    match class {
        AssetClass::Crypto => match timeframe {
            M5 => th(72.0, 0.70, 7),
            H1 => th(65.0, 0.62, 6),
            D1 => th(58.0, 0.55, 5),
            _ => th(70.0, 0.68, 6),
        },
        AssetClass::Forex => match timeframe {
            M5 => th(68.0, 0.68, 7),
            M15 => th(65.0, 0.65, 6),
            H1 => th(62.0, 0.60, 5),
            D1 => th(55.0, 0.50, 4),
            _ => th(65.0, 0.65, 6),
        },
        AssetClass::Other => match timeframe {
            M5 => th(68.0, 0.68, 7),
            M15 => th(65.0, 0.65, 6),
            H1 => th(62.0, 0.60, 5),
            D1 => th(55.0, 0.50, 4),
            W1 => th(55.0, 0.45, 3),
            _ => th(65.0, 0.65, 6),
        },
    }
}

/// (SL multiplier, TP multiplier) for ATR-scaled level construction. Fast
/// timeframes get wider stops to survive spread noise; crypto wider still.
pub fn atr_multipliers(class: AssetClass, timeframe: Timeframe) -> (f64, f64) {
    use Timeframe::*;
    match class {
        AssetClass::Crypto => match timeframe {
            M1 => (2.5, 4.0),
            M5 => (3.0, 5.0),
            M15 => (2.5, 4.0),
            M30 => (2.0, 3.5),
            H1 => (2.0, 3.0),
            H4 => (1.8, 3.0),
            D1 => (1.5, 2.5),
            _ => (2.0, 3.0),
        },
        _ => match timeframe {
            M1 => (2.0, 3.0),
            M5 => (2.5, 4.0),
            M15 => (2.0, 3.5),
            M30 => (1.8, 3.0),
            _ => (1.5, 2.5),
        },
    }
}

// =============================================================================
// Scoring
// =============================================================================

/// Tri-state bias of one indicator result: divergence dominates, then
/// crossover, then the classification label.
pub fn classify_result(meta: &IndicatorMeta) -> Bias {
    if let Some(divergence) = meta.divergence {
        return divergence.bias();
    }
    if let Some(crossover) = meta.crossover {
        return crossover.bias();
    }
    meta.classification.bias()
}

/// Summed weighted evidence over the latest result of every indicator.
#[derive(Debug, Default)]
pub struct ScoreBreakdown {
    pub bullish_weight: f64,
    pub bearish_weight: f64,
    pub total_weight: f64,
    pub bullish_reasons: Vec<String>,
    pub bearish_reasons: Vec<String>,
    pub snapshot: BTreeMap<String, IndicatorSnapshot>,
}

impl ScoreBreakdown {
    /// Composite score on the 0-100 scale (50 = neutral), rounded to 0.1.
    pub fn composite_score(&self) -> f64 {
        if self.total_weight <= 0.0 {
            return 50.0;
        }
        let net =
            (self.bullish_weight - self.bearish_weight) / self.total_weight;
        let score = 50.0 + net * 50.0;
        (score.clamp(0.0, 100.0) * 10.0).round() / 10.0
    }

    pub fn bullish_pct(&self) -> f64 {
        if self.total_weight <= 0.0 {
            0.0
        } else {
            self.bullish_weight / self.total_weight
        }
    }

    pub fn bearish_pct(&self) -> f64 {
        if self.total_weight <= 0.0 {
            0.0
        } else {
            self.bearish_weight / self.total_weight
        }
    }
}

/// Score the latest result of every indicator that emitted anything.
pub fn score_results(raw: &BTreeMap<&'static str, Vec<IndicatorResult>>) -> ScoreBreakdown {
    let mut breakdown = ScoreBreakdown::default();

    for (name, results) in raw {
        let Some(latest) = results.last() else {
            continue;
        };

        let mut weight = indicator_weight(name);
        if latest.meta.divergence.is_some() {
            weight *= DIVERGENCE_BOOST;
        }
        if latest.meta.crossover.is_some() {
            weight *= CROSSOVER_BOOST;
        }

        let bias = classify_result(&latest.meta);
        match bias {
            Bias::Bullish => {
                breakdown.bullish_weight += weight;
                breakdown.bullish_reasons.push(name.to_string());
            }
            Bias::Bearish => {
                breakdown.bearish_weight += weight;
                breakdown.bearish_reasons.push(name.to_string());
            }
            Bias::Neutral => {}
        }
        breakdown.total_weight += weight;

        breakdown.snapshot.insert(
            name.to_string(),
            IndicatorSnapshot {
                value: latest.value,
                secondary: latest.secondary_value,
                classification: latest.meta.classification,
                signal: bias,
            },
        );
    }

    breakdown
}

/// Apply loss-pattern filters. Returns the adjusted confidence and whether
/// any filter fired, or None when an overextended pattern blocks the entry
/// outright. Confidence never increases (monotone penalty).
pub fn apply_loss_filters(
    confidence: f64,
    direction: Direction,
    regime: Regime,
    rsi: f64,
    patterns: &[LossPattern],
) -> Option<(f64, bool)> {
    let mut confidence = confidence;
    let mut applied = false;

    for pattern in patterns.iter().filter(|p| p.is_active) {
        if pattern.conditions.regime == Some(regime)
            && pattern.conditions.direction == Some(direction)
        {
            confidence *= LOSS_PATTERN_PENALTY;
            applied = true;
            info!(
                pattern_id = %pattern.id,
                category = %pattern.category,
                new_confidence = format!("{confidence:.3}"),
                "loss filter applied"
            );
        }

        if pattern.category == LossCategory::Overextended {
            let blocked = match direction {
                Direction::Long => rsi > PATTERN_LONG_RSI,
                Direction::Short => rsi < PATTERN_SHORT_RSI,
            };
            if blocked {
                info!(rsi, %direction, "signal blocked by overextended loss pattern");
                return None;
            }
        }
    }

    Some((confidence, applied))
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

// =============================================================================
// SignalEngine
// =============================================================================

pub struct SignalEngine {
    indicators: Arc<IndicatorEngine>,
    predictor: Arc<dyn Predictor>,
}

impl SignalEngine {
    pub fn new(indicators: Arc<IndicatorEngine>, predictor: Arc<dyn Predictor>) -> Self {
        Self {
            indicators,
            predictor,
        }
    }

    /// Generate signals for one frame. Returns zero or one signal.
    pub fn generate_signals(
        &self,
        series: &CandleSeries,
        loss_patterns: &[LossPattern],
    ) -> Vec<Signal> {
        if series.len() < MIN_BARS {
            debug!(
                symbol = %series.symbol,
                timeframe = %series.timeframe,
                rows = series.len(),
                "insufficient data for scan"
            );
            return Vec::new();
        }

        let raw = self.indicators.calculate_all(series);
        let breakdown = score_results(&raw);
        if breakdown.total_weight <= 0.0 {
            return Vec::new();
        }

        let prediction = self
            .predictor
            .predict(series, &series.symbol, series.timeframe)
            .unwrap_or_else(|e| {
                debug!(error = %e, "ml predict failed");
                Prediction::neutral()
            });

        let regime_report = detect_regime(series);

        self.build_signal(series, breakdown, prediction, regime_report, loss_patterns)
            .into_iter()
            .collect()
    }

    /// Threshold gates, confidence adjustments, and level construction for
    /// an already-scored frame.
    fn build_signal(
        &self,
        series: &CandleSeries,
        breakdown: ScoreBreakdown,
        prediction: Prediction,
        regime_report: RegimeReport,
        loss_patterns: &[LossPattern],
    ) -> Option<Signal> {
        let symbol = series.symbol.clone();
        let timeframe = series.timeframe;
        let class = asset_class(&symbol);
        let thresholds = thresholds_for(class, timeframe);
        let composite_score = breakdown.composite_score();
        let regime = regime_report.regime;

        // Direction from the composite score.
        let (direction, confluence_count) = if composite_score >= thresholds.min_score {
            (Direction::Long, breakdown.bullish_reasons.len())
        } else if composite_score <= 100.0 - thresholds.min_score {
            (Direction::Short, breakdown.bearish_reasons.len())
        } else {
            info!(
                symbol = %symbol,
                timeframe = %timeframe,
                composite_score,
                threshold = thresholds.min_score,
                "score too neutral, no signal"
            );
            return None;
        };

        // ML agreement: same direction, or neutral (does not contradict).
        let ml_agrees = matches!(
            (direction, prediction.direction),
            (Direction::Long, Bias::Bullish)
                | (Direction::Short, Bias::Bearish)
                | (_, Bias::Neutral)
        );

        // Regime compatibility.
        let regime_compatible = !matches!(
            (direction, regime),
            (Direction::Long, Regime::TrendingDown) | (Direction::Short, Regime::TrendingUp)
        );

        // Base confidence: weight share of the winning side.
        let mut confidence = match direction {
            Direction::Long => breakdown.bullish_pct(),
            Direction::Short => breakdown.bearish_pct(),
        };

        if ml_agrees && prediction.confidence > 0.5 {
            confidence = confidence * 0.7 + prediction.confidence * 0.3;
        }
        if !regime_compatible {
            confidence *= REGIME_PENALTY;
        }
        if confluence_count < thresholds.min_confluence {
            confidence *= CONFLUENCE_PENALTY;
        }
        confidence = round3(confidence.clamp(0.0, 1.0));

        // Overextension block on RSI extremes.
        let rsi_val = breakdown
            .snapshot
            .get("rsi")
            .map(|s| s.value)
            .unwrap_or(50.0);
        match direction {
            Direction::Long if rsi_val > OVEREXTENDED_LONG_RSI => {
                info!(symbol = %symbol, rsi = rsi_val, "long blocked at overbought");
                return None;
            }
            Direction::Short if rsi_val < OVEREXTENDED_SHORT_RSI => {
                info!(symbol = %symbol, rsi = rsi_val, "short blocked at oversold");
                return None;
            }
            _ => {}
        }

        // Learned loss filters.
        let (adjusted, loss_filter_applied) =
            apply_loss_filters(confidence, direction, regime, rsi_val, loss_patterns)?;
        confidence = round3(adjusted);

        if confidence < thresholds.min_confidence {
            info!(
                symbol = %symbol,
                timeframe = %timeframe,
                confidence,
                threshold = thresholds.min_confidence,
                composite_score,
                %direction,
                confluence = confluence_count,
                "signal below confidence threshold"
            );
            return None;
        }

        // ATR for level construction: snapshot first, inline fallback, then
        // a 0.2% floor of price.
        let current_price = series.last()?.close;
        let mut atr_value = breakdown
            .snapshot
            .get("atr")
            .map(|s| s.value)
            .unwrap_or(0.0);
        if atr_value <= 0.0 && series.len() >= 14 {
            let tail = &series.candles()[series.len() - 14..];
            let tr = math::true_range(tail);
            atr_value = tr[1..].iter().sum::<f64>() / (tr.len() - 1) as f64;
        }
        if atr_value <= 0.0 {
            atr_value = (current_price * 0.002).abs();
        }

        let (sl_mult, tp_mult) = atr_multipliers(class, timeframe);
        let entry_price = current_price;
        let (stop_loss, take_profit) = match direction {
            Direction::Long => (
                entry_price - sl_mult * atr_value,
                entry_price + tp_mult * atr_value,
            ),
            Direction::Short => (
                entry_price + sl_mult * atr_value,
                entry_price - tp_mult * atr_value,
            ),
        };

        let risk = (entry_price - stop_loss).abs();
        let reward = (take_profit - entry_price).abs();
        let risk_reward_ratio = if risk > 0.0 {
            ((reward / risk) * 100.0).round() / 100.0
        } else {
            0.0
        };

        let now = Utc::now();
        let signal = Signal {
            id: 0,
            symbol: symbol.clone(),
            timeframe,
            direction,
            status: crate::types::SignalStatus::Pending,
            entry_price,
            stop_loss,
            take_profit,
            risk_reward_ratio,
            confidence,
            composite_score,
            ml_confidence: (prediction.confidence > 0.0).then_some(prediction.confidence),
            regime_at_signal: regime,
            signal_reasons: SignalReasons {
                bullish_indicators: breakdown.bullish_reasons.clone(),
                bearish_indicators: breakdown.bearish_reasons.clone(),
                confluence_count,
                ml_agrees,
                regime_compatible,
                loss_filter_applied,
                atr_value,
            },
            indicator_snapshot: breakdown.snapshot,
            mtf_confluence: false,
            agreeing_timeframes: vec![timeframe],
            exit_price: None,
            outcome_pnl: None,
            outcome_pnl_pct: None,
            max_favorable: 0.0,
            max_adverse: 0.0,
            loss_category: None,
            loss_analysis: None,
            generated_at: now,
            expires_at: now + Duration::minutes(timeframe.expiry_minutes()),
            triggered_at: None,
            closed_at: None,
        };

        info!(
            symbol = %symbol,
            timeframe = %timeframe,
            %direction,
            entry = entry_price,
            sl = stop_loss,
            tp = take_profit,
            confidence = format!("{:.1}%", confidence * 100.0),
            score = composite_score,
            "signal generated"
        );

        Some(signal)
    }

    /// Scan several timeframes of one symbol and flag multi-timeframe
    /// confluence across the emitted signals.
    pub fn scan_multi_timeframe(
        &self,
        frames: &BTreeMap<Timeframe, CandleSeries>,
        loss_patterns: &[LossPattern],
    ) -> Vec<Signal> {
        let mut all_signals = Vec::new();

        for series in frames.values() {
            if series.len() < MIN_BARS {
                continue;
            }
            all_signals.extend(self.generate_signals(series, loss_patterns));
        }

        apply_mtf_confluence(&mut all_signals);
        all_signals
    }
}

/// Flag and boost signals whose direction is shared by two or more
/// timeframes. Confidence is multiplied by 1.15 and clamped to 1.0.
pub fn apply_mtf_confluence(signals: &mut [Signal]) {
    let long_tfs: Vec<Timeframe> = signals
        .iter()
        .filter(|s| s.direction == Direction::Long)
        .map(|s| s.timeframe)
        .collect();
    let short_tfs: Vec<Timeframe> = signals
        .iter()
        .filter(|s| s.direction == Direction::Short)
        .map(|s| s.timeframe)
        .collect();

    if long_tfs.len() >= 2 {
        for signal in signals.iter_mut().filter(|s| s.direction == Direction::Long) {
            signal.mtf_confluence = true;
            signal.agreeing_timeframes = long_tfs.clone();
            signal.confidence = round3((signal.confidence * MTF_BOOST).min(1.0));
        }
    }
    if short_tfs.len() >= 2 {
        for signal in signals.iter_mut().filter(|s| s.direction == Direction::Short) {
            signal.mtf_confluence = true;
            signal.agreeing_timeframes = short_tfs.clone();
            signal.confidence = round3((signal.confidence * MTF_BOOST).min(1.0));
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{Classification, Crossover, Divergence};
    use crate::loss_learning::PatternConditions;
    use crate::market_data::Candle;
    use crate::predictor::MomentumPredictor;
    use crate::signal::tests::sample_signal;
    use chrono::TimeZone;

    fn engine() -> SignalEngine {
        SignalEngine::new(
            Arc::new(IndicatorEngine::with_default_catalog()),
            Arc::new(MomentumPredictor::default()),
        )
    }

    fn result(name: &'static str, meta: IndicatorMeta) -> IndicatorResult {
        IndicatorResult {
            name,
            value: 1.0,
            secondary_value: None,
            timestamp: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
            meta,
        }
    }

    // ---- tables ----------------------------------------------------------

    #[test]
    fn weight_catalog_matches_scalper_profile() {
        assert_eq!(indicator_weight("smart_money"), 2.5);
        assert_eq!(indicator_weight("moving_averages"), 2.0);
        assert_eq!(indicator_weight("macd"), 2.0);
        assert_eq!(indicator_weight("volume_spike"), 2.0);
        assert_eq!(indicator_weight("key_levels"), 2.0);
        assert_eq!(indicator_weight("rsi"), 1.5);
        assert_eq!(indicator_weight("stochastic_rsi"), 1.5);
        assert_eq!(indicator_weight("candle_patterns"), 1.5);
        assert_eq!(indicator_weight("bollinger_bands"), 1.0);
        assert_eq!(indicator_weight("obv"), 1.0);
        assert_eq!(indicator_weight("session_analysis"), 0.75);
        assert_eq!(indicator_weight("ad_line"), 0.75);
        assert_eq!(indicator_weight("atr"), 0.5);
        assert_eq!(indicator_weight("something_else"), 1.0);
    }

    #[test]
    fn threshold_table_spot_checks() {
        let t = thresholds_for(AssetClass::Crypto, Timeframe::M5);
        assert_eq!(t, th(72.0, 0.70, 7));
        let t = thresholds_for(AssetClass::Other, Timeframe::D1);
        assert_eq!(t, th(55.0, 0.50, 4));
        let t = thresholds_for(AssetClass::Forex, Timeframe::H1);
        assert_eq!(t, th(62.0, 0.60, 5));
        // Unlisted timeframe falls back to the default row.
        let t = thresholds_for(AssetClass::Crypto, Timeframe::M30);
        assert_eq!(t, th(70.0, 0.68, 6));
    }

    #[test]
    fn atr_multiplier_spot_checks() {
        assert_eq!(atr_multipliers(AssetClass::Other, Timeframe::M5), (2.5, 4.0));
        assert_eq!(atr_multipliers(AssetClass::Crypto, Timeframe::M5), (3.0, 5.0));
        assert_eq!(atr_multipliers(AssetClass::Other, Timeframe::D1), (1.5, 2.5));
        assert_eq!(atr_multipliers(AssetClass::Forex, Timeframe::H4), (1.5, 2.5));
    }

    #[test]
    fn asset_class_routing() {
        assert_eq!(asset_class("BTCUSD"), AssetClass::Crypto);
        assert_eq!(asset_class("ethbtc"), AssetClass::Crypto);
        assert_eq!(asset_class("EURUSD"), AssetClass::Forex);
        assert_eq!(asset_class("XAUUSD"), AssetClass::Other);
    }

    // ---- classification precedence ---------------------------------------

    #[test]
    fn divergence_beats_crossover_and_classification() {
        let meta = IndicatorMeta {
            classification: Classification::Overbought, // bearish
            divergence: Some(Divergence::BullishDivergence),
            crossover: Some(Crossover::BearishCrossover),
            ..Default::default()
        };
        assert_eq!(classify_result(&meta), Bias::Bullish);
    }

    #[test]
    fn crossover_beats_classification() {
        let meta = IndicatorMeta {
            classification: Classification::Overbought,
            crossover: Some(Crossover::GoldenCross),
            ..Default::default()
        };
        assert_eq!(classify_result(&meta), Bias::Bullish);
    }

    #[test]
    fn classification_used_last() {
        let meta = IndicatorMeta::classified(Classification::Accumulation);
        assert_eq!(classify_result(&meta), Bias::Bullish);
    }

    // ---- scoring ---------------------------------------------------------

    #[test]
    fn composite_score_formula() {
        let mut raw: BTreeMap<&'static str, Vec<IndicatorResult>> = BTreeMap::new();
        raw.insert(
            "macd",
            vec![result("macd", IndicatorMeta::classified(Classification::BullishMomentum))],
        );
        raw.insert(
            "rsi",
            vec![result("rsi", IndicatorMeta::classified(Classification::BearishMomentum))],
        );
        raw.insert(
            "atr",
            vec![result("atr", IndicatorMeta::classified(Classification::NormalVolatility))],
        );

        let breakdown = score_results(&raw);
        // W_b = 2.0 (macd), W_s = 1.5 (rsi), W_n = 0.5 (atr), total = 4.0.
        assert!((breakdown.bullish_weight - 2.0).abs() < 1e-12);
        assert!((breakdown.bearish_weight - 1.5).abs() < 1e-12);
        assert!((breakdown.total_weight - 4.0).abs() < 1e-12);
        // 50 + 50 * (0.5 / 4.0) = 56.25 -> 56.3 after rounding.
        assert!((breakdown.composite_score() - 56.3).abs() < 1e-9);
    }

    #[test]
    fn divergence_boost_applied() {
        let mut raw: BTreeMap<&'static str, Vec<IndicatorResult>> = BTreeMap::new();
        raw.insert(
            "obv",
            vec![result(
                "obv",
                IndicatorMeta {
                    divergence: Some(Divergence::BullishDivergence),
                    ..Default::default()
                },
            )],
        );
        let breakdown = score_results(&raw);
        assert!((breakdown.bullish_weight - 1.3).abs() < 1e-12);
    }

    #[test]
    fn crossover_boost_applied() {
        let mut raw: BTreeMap<&'static str, Vec<IndicatorResult>> = BTreeMap::new();
        raw.insert(
            "macd",
            vec![result(
                "macd",
                IndicatorMeta {
                    classification: Classification::BullishMomentum,
                    crossover: Some(Crossover::BullishCrossover),
                    ..Default::default()
                },
            )],
        );
        let breakdown = score_results(&raw);
        assert!((breakdown.bullish_weight - 2.4).abs() < 1e-12);
    }

    #[test]
    fn empty_indicators_are_skipped() {
        let mut raw: BTreeMap<&'static str, Vec<IndicatorResult>> = BTreeMap::new();
        raw.insert("volume_spike", Vec::new());
        let breakdown = score_results(&raw);
        assert_eq!(breakdown.total_weight, 0.0);
        assert!(breakdown.snapshot.is_empty());
    }

    // ---- loss filters ----------------------------------------------------

    fn regime_pattern(regime: Regime, direction: Direction) -> LossPattern {
        LossPattern {
            id: "regime_mismatch_0".into(),
            category: LossCategory::RegimeMismatch,
            conditions: PatternConditions {
                category: LossCategory::RegimeMismatch,
                regime: Some(regime),
                direction: Some(direction),
                avg_rsi_at_entry: None,
            },
            frequency: 4,
            total_window: 50,
            avg_loss_pct: -0.4,
            recommendation: String::new(),
            is_active: true,
        }
    }

    #[test]
    fn matching_loss_pattern_halves_confidence() {
        let patterns = vec![regime_pattern(Regime::Ranging, Direction::Long)];
        let (conf, applied) =
            apply_loss_filters(0.8, Direction::Long, Regime::Ranging, 50.0, &patterns).unwrap();
        assert!((conf - 0.4).abs() < 1e-12);
        assert!(applied);
    }

    #[test]
    fn loss_filter_penalty_is_monotone() {
        // Same inputs with and without a matching pattern: the filtered
        // confidence can never exceed the unfiltered one.
        let patterns = vec![regime_pattern(Regime::Ranging, Direction::Long)];
        let (with, _) =
            apply_loss_filters(0.8, Direction::Long, Regime::Ranging, 50.0, &patterns).unwrap();
        let (without, applied) =
            apply_loss_filters(0.8, Direction::Long, Regime::TrendingUp, 50.0, &patterns).unwrap();
        assert!(with <= without);
        assert!(!applied);
    }

    #[test]
    fn overextended_pattern_blocks_extreme_entries() {
        let pattern = LossPattern {
            id: "overextended_0".into(),
            category: LossCategory::Overextended,
            conditions: PatternConditions {
                category: LossCategory::Overextended,
                regime: None,
                direction: None,
                avg_rsi_at_entry: Some(78.0),
            },
            frequency: 3,
            total_window: 50,
            avg_loss_pct: -0.6,
            recommendation: String::new(),
            is_active: true,
        };

        // RSI 70 long with the pattern active: blocked (> 65 band).
        assert!(apply_loss_filters(0.8, Direction::Long, Regime::Ranging, 70.0, &[pattern.clone()])
            .is_none());
        // RSI 60 long: allowed.
        assert!(apply_loss_filters(0.8, Direction::Long, Regime::Ranging, 60.0, &[pattern.clone()])
            .is_some());
        // RSI 30 short with the pattern active: blocked (< 35 band).
        assert!(apply_loss_filters(0.8, Direction::Short, Regime::Ranging, 30.0, &[pattern])
            .is_none());
    }

    #[test]
    fn inactive_patterns_are_ignored() {
        let mut pattern = regime_pattern(Regime::Ranging, Direction::Long);
        pattern.is_active = false;
        let (conf, applied) =
            apply_loss_filters(0.8, Direction::Long, Regime::Ranging, 50.0, &[pattern]).unwrap();
        assert_eq!(conf, 0.8);
        assert!(!applied);
    }

    // ---- full path -------------------------------------------------------

    fn steep_decline_series(len: usize) -> CandleSeries {
        let base = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let candles: Vec<Candle> = (0..len as i64)
            .map(|i| {
                let mid = 3_000.0 - 8.0 * i as f64;
                Candle::new(
                    base + chrono::Duration::minutes(5 * i),
                    mid + 2.0,
                    mid + 3.0,
                    mid - 3.0,
                    mid - 2.0,
                    1_000.0,
                )
            })
            .collect();
        CandleSeries::new("XAUUSD", Timeframe::M5, candles)
    }

    #[test]
    fn overextension_blocks_shorts_at_oversold() {
        // A relentless decline pins RSI far below 28; whatever the composite
        // score, no short may be emitted.
        let series = steep_decline_series(120);
        let signals = engine().generate_signals(&series, &[]);
        assert!(
            signals.is_empty(),
            "short emitted at oversold RSI: {signals:?}"
        );
    }

    #[test]
    fn insufficient_data_emits_nothing() {
        let series = steep_decline_series(30);
        assert!(engine().generate_signals(&series, &[]).is_empty());
    }

    #[test]
    fn emitted_signals_have_coherent_levels() {
        // Sweep a family of drifting series; every emitted signal must hold
        // the level invariants regardless of direction.
        let base = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        for drift in [-0.8_f64, -0.3, 0.0, 0.3, 0.8] {
            let candles: Vec<Candle> = (0..150_i64)
                .map(|i| {
                    let mid = 2_600.0 + drift * i as f64 + 4.0 * ((i as f64) / 7.0).sin();
                    Candle::new(
                        base + chrono::Duration::minutes(5 * i),
                        mid - 0.5,
                        mid + 1.5,
                        mid - 1.5,
                        mid + 0.5,
                        1_000.0 + (i % 7) as f64 * 100.0,
                    )
                })
                .collect();
            let series = CandleSeries::new("XAUUSD", Timeframe::M5, candles);
            for signal in engine().generate_signals(&series, &[]) {
                assert!(signal.levels_coherent(), "incoherent levels: {signal:?}");
                assert!(signal.confidence <= 1.0);
                assert!((0.0..=100.0).contains(&signal.composite_score));
                // P7: overextension bounds honored.
                if let Some(rsi) = signal.snapshot_value("rsi") {
                    match signal.direction {
                        Direction::Long => assert!(rsi <= OVEREXTENDED_LONG_RSI),
                        Direction::Short => assert!(rsi >= OVEREXTENDED_SHORT_RSI),
                    }
                }
            }
        }
    }

    // ---- MTF confluence --------------------------------------------------

    #[test]
    fn mtf_confluence_boosts_agreeing_signals() {
        let mut m5 = sample_signal(Direction::Long);
        m5.timeframe = Timeframe::M5;
        m5.confidence = 0.62;
        let mut m15 = sample_signal(Direction::Long);
        m15.timeframe = Timeframe::M15;
        m15.confidence = 0.60;

        let mut signals = vec![m5, m15];
        apply_mtf_confluence(&mut signals);

        assert!(signals.iter().all(|s| s.mtf_confluence));
        assert_eq!(
            signals[0].agreeing_timeframes,
            vec![Timeframe::M5, Timeframe::M15]
        );
        assert!((signals[0].confidence - 0.713).abs() < 1e-9);
        assert!((signals[1].confidence - 0.69).abs() < 1e-9);
    }

    #[test]
    fn single_timeframe_gets_no_boost() {
        let mut signals = vec![sample_signal(Direction::Long)];
        let before = signals[0].confidence;
        apply_mtf_confluence(&mut signals);
        assert!(!signals[0].mtf_confluence);
        assert_eq!(signals[0].confidence, before);
    }

    #[test]
    fn opposing_directions_do_not_boost() {
        let mut long = sample_signal(Direction::Long);
        long.timeframe = Timeframe::M5;
        let mut short = sample_signal(Direction::Short);
        short.timeframe = Timeframe::M15;
        let mut signals = vec![long, short];
        apply_mtf_confluence(&mut signals);
        assert!(signals.iter().all(|s| !s.mtf_confluence));
    }

    #[test]
    fn mtf_boost_clamps_at_one() {
        let mut a = sample_signal(Direction::Long);
        a.timeframe = Timeframe::M5;
        a.confidence = 0.95;
        let mut b = sample_signal(Direction::Long);
        b.timeframe = Timeframe::M30;
        b.confidence = 0.95;
        let mut signals = vec![a, b];
        apply_mtf_confluence(&mut signals);
        assert!((signals[0].confidence - 1.0).abs() < 1e-12);
    }
}
