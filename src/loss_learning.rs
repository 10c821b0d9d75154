// =============================================================================
// Loss Learning — categorize losses, mine recurring patterns, build filters
// =============================================================================
//
// Seven loss categories, checked in a fixed order against the closed
// signal's snapshot; the first hit is the primary category and every hit is
// recorded:
//
//   1. regime_mismatch — direction opposed the regime at signal time
//   2. overextended    — RSI/StochRSI already at an extreme at entry
//   3. low_confluence  — fewer than 4 indicators agreed
//   4. weak_volume     — participation below average at signal time
//   5. against_trend   — direction opposed the moving-average trend
//   6. false_breakout  — price ran in favor (MFE > 0.3x risk) then reversed
//   7. news_event      — MAE blew past 2x ATR, event-driven volatility
//
// Categories recurring at least three times inside the analysis window
// become active `LossPattern` filters the signal engine consults on the
// next scan.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use crate::indicators::Classification;
use crate::signal::{LossAnalysis, LossCategory, Signal};
use crate::types::{Direction, Regime, SignalStatus};

/// Minimum occurrences before a category becomes an active pattern.
pub const MIN_PATTERN_FREQUENCY: usize = 3;
/// Completed signals examined per analysis.
pub const ANALYSIS_WINDOW: usize = 50;

/// Conditions a mined pattern matches against future scans.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternConditions {
    pub category: LossCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regime: Option<Regime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_rsi_at_entry: Option<f64>,
}

/// A recurring loss profile mined from recent history.
#[derive(Debug, Clone, Serialize)]
pub struct LossPattern {
    pub id: String,
    pub category: LossCategory,
    pub conditions: PatternConditions,
    pub frequency: usize,
    pub total_window: usize,
    pub avg_loss_pct: f64,
    pub recommendation: String,
    pub is_active: bool,
}

/// Per-category aggregate inside the analysis window.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CategoryBreakdown {
    pub count: usize,
    pub percentage: f64,
    pub avg_factors: BTreeMap<String, f64>,
}

/// Full output of a pattern analysis pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LossPatternReport {
    pub patterns: Vec<LossPattern>,
    pub total_analyzed: usize,
    pub total_losses: usize,
    pub total_wins: usize,
    pub win_rate: f64,
    /// Win rate had all pattern losses been skipped.
    pub adjusted_win_rate: f64,
    pub improvement: f64,
    pub loss_breakdown: BTreeMap<String, CategoryBreakdown>,
    pub recommendations: Vec<String>,
    pub active_filters: usize,
}

// =============================================================================
// Loss categorization
// =============================================================================

/// Analyze a single losing signal and determine why it lost.
pub fn categorize_loss(signal: &Signal) -> LossAnalysis {
    let reasons = &signal.signal_reasons;
    let direction = signal.direction;
    let regime = signal.regime_at_signal;
    let mfe = signal.max_favorable;
    let mae = signal.max_adverse;

    let mut categories: Vec<LossCategory> = Vec::new();
    let mut details: Vec<String> = Vec::new();
    let mut factors = serde_json::Map::new();

    // ── 1. Regime mismatch ──────────────────────────────────────────────
    if !reasons.regime_compatible {
        categories.push(LossCategory::RegimeMismatch);
        details.push(format!(
            "Signal was {direction} but regime was {regime}. Trading against the dominant trend."
        ));
        factors.insert("regime".into(), json!(regime.to_string()));
        factors.insert("direction".into(), json!(direction.to_string()));
    }
    // Secondary confirmation from the regime/direction table, even when the
    // compatibility flag was set.
    let adverse_regime = matches!(
        (direction, regime),
        (Direction::Long, Regime::TrendingDown)
            | (Direction::Long, Regime::VolatileBreakout)
            | (Direction::Short, Regime::TrendingUp)
    );
    if adverse_regime && !categories.contains(&LossCategory::RegimeMismatch) {
        categories.push(LossCategory::RegimeMismatch);
        details.push(format!(
            "{} signal in {regime} regime, adverse conditions.",
            direction.to_string().to_uppercase()
        ));
        factors.insert("regime".into(), json!(regime.to_string()));
        factors.insert("direction".into(), json!(direction.to_string()));
    }

    // ── 2. Overextended ─────────────────────────────────────────────────
    let rsi_val = signal.snapshot_value("rsi").unwrap_or(50.0);
    let stoch_val = signal.snapshot_value("stochastic_rsi").unwrap_or(50.0);
    let overextended = match direction {
        Direction::Long => rsi_val > 75.0 || stoch_val > 80.0,
        Direction::Short => rsi_val < 25.0 || stoch_val < 20.0,
    };
    if overextended {
        categories.push(LossCategory::Overextended);
        let side = match direction {
            Direction::Long => "overbought",
            Direction::Short => "oversold",
        };
        details.push(format!(
            "Entered at already {side} levels: RSI={rsi_val:.1}, Stoch={stoch_val:.1}."
        ));
        factors.insert("rsi".into(), json!(rsi_val));
        factors.insert("stochastic".into(), json!(stoch_val));
    }

    // ── 3. Low confluence ───────────────────────────────────────────────
    if reasons.confluence_count < 4 {
        categories.push(LossCategory::LowConfluence);
        details.push(format!(
            "Only {} indicators agreed on direction. Minimum 4 recommended.",
            reasons.confluence_count
        ));
        factors.insert("confluence_count".into(), json!(reasons.confluence_count));
    }

    // ── 4. Weak volume ──────────────────────────────────────────────────
    let vol_val = signal.snapshot_value("volume_spike").unwrap_or(1.0);
    let vol_low = signal
        .snapshot_classification("volume_spike")
        .is_some_and(|c| c == Classification::LowVolatility);
    if vol_val < 0.8 || vol_low {
        categories.push(LossCategory::WeakVolume);
        details.push(format!(
            "Volume was below average (ratio: {vol_val:.2}). Insufficient participation."
        ));
        factors.insert("volume_ratio".into(), json!(vol_val));
    }

    // ── 5. Against trend ────────────────────────────────────────────────
    if let Some(ma_class) = signal.snapshot_classification("moving_averages") {
        let against = match direction {
            Direction::Long => matches!(
                ma_class,
                Classification::Downtrend | Classification::StrongDowntrend
            ),
            Direction::Short => matches!(
                ma_class,
                Classification::Uptrend | Classification::StrongUptrend
            ),
        };
        if against {
            categories.push(LossCategory::AgainstTrend);
            details.push(format!(
                "{} signal against the moving-average trend.",
                direction.to_string().to_uppercase()
            ));
            factors.insert("ma_trend".into(), json!(format!("{ma_class:?}")));
        }
    }

    // ── 6. False breakout ───────────────────────────────────────────────
    let risk = {
        let r = (signal.entry_price - signal.stop_loss).abs();
        if r > 0.0 {
            r
        } else {
            1.0
        }
    };
    if mfe > 0.0 && mfe > risk * 0.3 {
        categories.push(LossCategory::FalseBreakout);
        details.push(format!(
            "Price moved {mfe:.2} in favor (MFE) before reversing to the stop. \
             Possible false breakout or liquidity grab."
        ));
        factors.insert("mfe".into(), json!(mfe));
        factors.insert("mae".into(), json!(mae));
    }

    // ── 7. News event ───────────────────────────────────────────────────
    let atr_val = signal.snapshot_value("atr").unwrap_or(0.0);
    if atr_val > 0.0 && mae > atr_val * 2.0 {
        categories.push(LossCategory::NewsEvent);
        details.push(format!(
            "MAE ({mae:.2}) was {:.1}x ATR, unusual volatility suggesting news impact.",
            mae / atr_val
        ));
        factors.insert("atr".into(), json!(atr_val));
        factors.insert("volatility_multiple".into(), json!(mae / atr_val));
    }

    if categories.is_empty() {
        categories.push(LossCategory::Unknown);
        details.push("No clear loss pattern identified. May be normal market noise.".into());
    }

    LossAnalysis {
        category: categories[0],
        all_categories: categories,
        detail: details.join(" | "),
        contributing_factors: factors,
        mfe,
        mae,
        analyzed_at: Utc::now(),
    }
}

// =============================================================================
// Pattern analysis
// =============================================================================

/// Analyze the last `window` completed signals for recurring loss patterns.
pub fn analyze_loss_patterns(signals: &[Signal], window: usize) -> LossPatternReport {
    let completed: Vec<&Signal> = signals.iter().filter(|s| s.status.is_completed()).collect();
    let start = completed.len().saturating_sub(window);
    let recent = &completed[start..];

    if recent.is_empty() {
        return LossPatternReport::default();
    }

    let wins = recent.iter().filter(|s| s.status == SignalStatus::Win).count();
    let losses: Vec<&Signal> = recent
        .iter()
        .filter(|s| s.status == SignalStatus::Loss)
        .copied()
        .collect();
    let win_rate = wins as f64 / recent.len() as f64 * 100.0;

    // Categorize each loss, reusing analyses already attached.
    let analyses: Vec<(&Signal, LossAnalysis)> = losses
        .iter()
        .map(|s| {
            let analysis = s
                .loss_analysis
                .clone()
                .unwrap_or_else(|| categorize_loss(s));
            (*s, analysis)
        })
        .collect();

    // Category frequencies, most common first.
    let mut counts: BTreeMap<LossCategory, usize> = BTreeMap::new();
    for (_, analysis) in &analyses {
        *counts.entry(analysis.category).or_default() += 1;
    }
    let mut ordered: Vec<(LossCategory, usize)> =
        counts.iter().map(|(c, n)| (*c, *n)).collect();
    ordered.sort_by(|a, b| b.1.cmp(&a.1));

    // Per-category breakdown with averaged numeric factors.
    let mut loss_breakdown = BTreeMap::new();
    for (category, count) in &ordered {
        let members: Vec<&LossAnalysis> = analyses
            .iter()
            .filter(|(_, a)| a.category == *category)
            .map(|(_, a)| a)
            .collect();

        let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
        for analysis in &members {
            for (key, value) in &analysis.contributing_factors {
                if let Some(v) = value.as_f64() {
                    let entry = sums.entry(key.clone()).or_default();
                    entry.0 += v;
                    entry.1 += 1;
                }
            }
        }
        let avg_factors: BTreeMap<String, f64> = sums
            .into_iter()
            .map(|(k, (sum, n))| (k, sum / n as f64))
            .collect();

        loss_breakdown.insert(
            category.to_string(),
            CategoryBreakdown {
                count: *count,
                percentage: if losses.is_empty() {
                    0.0
                } else {
                    *count as f64 / losses.len() as f64 * 100.0
                },
                avg_factors,
            },
        );
    }

    // Promote hot categories to patterns.
    let mut patterns: Vec<LossPattern> = Vec::new();
    for (category, count) in &ordered {
        if *count < MIN_PATTERN_FREQUENCY {
            continue;
        }

        let members: Vec<&Signal> = analyses
            .iter()
            .filter(|(_, a)| a.category == *category)
            .map(|(s, _)| *s)
            .collect();

        let mut conditions = PatternConditions {
            category: *category,
            regime: None,
            direction: None,
            avg_rsi_at_entry: None,
        };

        match category {
            LossCategory::RegimeMismatch => {
                // Modal (regime, direction) pair among the member losses.
                let mut combos: BTreeMap<(String, String), (Regime, Direction, usize)> =
                    BTreeMap::new();
                for s in &members {
                    let key = (s.regime_at_signal.to_string(), s.direction.to_string());
                    let entry = combos
                        .entry(key)
                        .or_insert((s.regime_at_signal, s.direction, 0));
                    entry.2 += 1;
                }
                if let Some((regime, direction, _)) =
                    combos.values().max_by_key(|(_, _, n)| *n)
                {
                    conditions.regime = Some(*regime);
                    conditions.direction = Some(*direction);
                }
            }
            LossCategory::Overextended => {
                let rsi_sum: f64 = members
                    .iter()
                    .map(|s| s.snapshot_value("rsi").unwrap_or(50.0))
                    .sum();
                conditions.avg_rsi_at_entry =
                    Some((rsi_sum / members.len() as f64 * 10.0).round() / 10.0);
            }
            _ => {}
        }

        let pnls: Vec<f64> = members
            .iter()
            .map(|s| s.outcome_pnl_pct.unwrap_or(0.0))
            .collect();
        let avg_loss_pct = if pnls.is_empty() {
            0.0
        } else {
            pnls.iter().sum::<f64>() / pnls.len() as f64
        };

        patterns.push(LossPattern {
            id: format!("{}_{}", category, patterns.len()),
            category: *category,
            conditions: conditions.clone(),
            frequency: *count,
            total_window: recent.len(),
            avg_loss_pct,
            recommendation: recommendation(*category, &conditions),
            is_active: true,
        });
    }

    // Adjusted win rate: what if every pattern loss had been skipped?
    let pattern_loss_count: usize = patterns.iter().map(|p| p.frequency).sum();
    let adjusted_total = recent.len().saturating_sub(pattern_loss_count);
    let adjusted_win_rate = if adjusted_total > 0 {
        wins as f64 / adjusted_total as f64 * 100.0
    } else {
        win_rate
    };

    let recommendations: Vec<String> =
        patterns.iter().map(|p| p.recommendation.clone()).collect();

    debug!(
        analyzed = recent.len(),
        losses = losses.len(),
        patterns = patterns.len(),
        win_rate = format!("{win_rate:.1}"),
        adjusted = format!("{adjusted_win_rate:.1}"),
        "loss pattern analysis complete"
    );

    LossPatternReport {
        active_filters: patterns.len(),
        patterns,
        total_analyzed: recent.len(),
        total_losses: losses.len(),
        total_wins: wins,
        win_rate,
        adjusted_win_rate,
        improvement: adjusted_win_rate - win_rate,
        loss_breakdown,
        recommendations,
    }
}

/// Active loss patterns the signal engine should consult on the next scan.
pub fn get_active_loss_filters(signals: &[Signal]) -> Vec<LossPattern> {
    analyze_loss_patterns(signals, ANALYSIS_WINDOW)
        .patterns
        .into_iter()
        .filter(|p| p.is_active)
        .collect()
}

/// Static recommendation text per category.
fn recommendation(category: LossCategory, conditions: &PatternConditions) -> String {
    match category {
        LossCategory::FalseBreakout => "Avoid entries at key support/resistance levels during \
            low volume. Wait for a confirmation candle after the breakout before entering."
            .into(),
        LossCategory::RegimeMismatch => format!(
            "Avoid {} signals during {} regime. Trade with the trend, not against it.",
            conditions
                .direction
                .map(|d| d.to_string().to_uppercase())
                .unwrap_or_else(|| "counter-trend".into()),
            conditions
                .regime
                .map(|r| r.to_string().replace('_', " "))
                .unwrap_or_else(|| "adverse".into()),
        ),
        LossCategory::LowConfluence => "Require at least 4 indicators to agree before entering. \
            Low confluence signals have poor win rates."
            .into(),
        LossCategory::Overextended => "Avoid entering when RSI is already extreme (>75 for \
            longs, <25 for shorts). Wait for a pullback before entering in the direction of the \
            trend."
            .into(),
        LossCategory::WeakVolume => "Skip signals when volume is below average. Strong moves \
            require volume confirmation."
            .into(),
        LossCategory::AgainstTrend => "Avoid counter-trend trades unless multiple reversal \
            signals confirm. Trend-following has higher probability on scalper timeframes."
            .into(),
        LossCategory::NewsEvent => "Reduce position size or avoid trading during high-volatility \
            events. ATR expansion beyond 2x normal suggests event-driven volatility."
            .into(),
        LossCategory::Unknown => "Review trade manually, no specific pattern identified.".into(),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::tests::sample_signal;
    use crate::signal::IndicatorSnapshot;
    use crate::types::Bias;
    use chrono::TimeZone;

    fn snapshot(value: f64, classification: Classification) -> IndicatorSnapshot {
        IndicatorSnapshot {
            value,
            secondary: None,
            classification,
            signal: Bias::Neutral,
        }
    }

    /// Closed losing long with a configurable snapshot.
    fn losing_signal(regime: Regime, rsi: f64, confluence: usize, mfe_ratio: f64) -> Signal {
        let mut s = sample_signal(Direction::Long);
        s.status = SignalStatus::Loss;
        s.outcome_pnl = Some(-(s.entry_price - s.stop_loss));
        s.outcome_pnl_pct = Some(-0.17);
        s.closed_at = Some(Utc.with_ymd_and_hms(2024, 6, 1, 14, 0, 0).unwrap());
        s.regime_at_signal = regime;
        s.signal_reasons.regime_compatible = true;
        s.signal_reasons.confluence_count = confluence;
        let risk = (s.entry_price - s.stop_loss).abs();
        s.max_favorable = risk * mfe_ratio;
        s.max_adverse = risk;
        s.indicator_snapshot
            .insert("rsi".into(), snapshot(rsi, Classification::Neutral));
        s.indicator_snapshot
            .insert("stochastic_rsi".into(), snapshot(50.0, Classification::Neutral));
        s.indicator_snapshot
            .insert("atr".into(), snapshot(risk, Classification::NormalVolatility));
        s
    }

    // ---- categorization --------------------------------------------------

    #[test]
    fn overextended_primary_with_false_breakout_secondary() {
        // Long loss entered at RSI 78, confluence 5, regime trending_up,
        // MFE = 0.35x risk: primary category is overextended (first
        // triggered); false_breakout also recorded.
        let signal = losing_signal(Regime::TrendingUp, 78.0, 5, 0.35);
        let analysis = categorize_loss(&signal);
        assert_eq!(analysis.category, LossCategory::Overextended);
        assert!(analysis.all_categories.contains(&LossCategory::FalseBreakout));
        assert!(!analysis.all_categories.contains(&LossCategory::LowConfluence));
        assert!(!analysis.all_categories.contains(&LossCategory::RegimeMismatch));
    }

    #[test]
    fn regime_mismatch_detected_from_flag() {
        let mut signal = losing_signal(Regime::TrendingUp, 50.0, 6, 0.0);
        signal.signal_reasons.regime_compatible = false;
        let analysis = categorize_loss(&signal);
        assert_eq!(analysis.category, LossCategory::RegimeMismatch);
    }

    #[test]
    fn regime_mismatch_detected_from_table() {
        // Flag says compatible, but a long in trending_down is adverse.
        let signal = losing_signal(Regime::TrendingDown, 50.0, 6, 0.0);
        let analysis = categorize_loss(&signal);
        assert_eq!(analysis.category, LossCategory::RegimeMismatch);
    }

    #[test]
    fn low_confluence_detected() {
        let signal = losing_signal(Regime::Ranging, 50.0, 2, 0.0);
        let analysis = categorize_loss(&signal);
        assert_eq!(analysis.category, LossCategory::LowConfluence);
    }

    #[test]
    fn news_event_on_mae_blowout() {
        let mut signal = losing_signal(Regime::Ranging, 50.0, 6, 0.0);
        let atr = 1.0;
        signal
            .indicator_snapshot
            .insert("atr".into(), snapshot(atr, Classification::NormalVolatility));
        signal.max_adverse = atr * 3.0;
        let analysis = categorize_loss(&signal);
        assert!(analysis.all_categories.contains(&LossCategory::NewsEvent));
    }

    #[test]
    fn clean_loss_is_unknown() {
        let signal = losing_signal(Regime::Ranging, 50.0, 6, 0.0);
        let analysis = categorize_loss(&signal);
        assert_eq!(analysis.category, LossCategory::Unknown);
        assert_eq!(analysis.all_categories.len(), 1);
    }

    // ---- pattern mining --------------------------------------------------

    fn winning_signal() -> Signal {
        let mut s = sample_signal(Direction::Long);
        s.status = SignalStatus::Win;
        s.outcome_pnl = Some(7.7);
        s.outcome_pnl_pct = Some(0.29);
        s.closed_at = Some(Utc.with_ymd_and_hms(2024, 6, 1, 15, 0, 0).unwrap());
        s
    }

    #[test]
    fn pattern_requires_min_frequency() {
        // Two overextended losses: below the activation threshold.
        let mut signals: Vec<Signal> =
            (0..2).map(|_| losing_signal(Regime::Ranging, 80.0, 6, 0.0)).collect();
        signals.push(winning_signal());

        let report = analyze_loss_patterns(&signals, ANALYSIS_WINDOW);
        assert!(report.patterns.is_empty());

        // A third occurrence activates the pattern.
        signals.push(losing_signal(Regime::Ranging, 80.0, 6, 0.0));
        let report = analyze_loss_patterns(&signals, ANALYSIS_WINDOW);
        assert_eq!(report.patterns.len(), 1);
        assert_eq!(report.patterns[0].category, LossCategory::Overextended);
        assert_eq!(report.patterns[0].frequency, 3);
        assert!(report.patterns[0].is_active);
        // Every reported pattern satisfies the activation threshold.
        assert!(report
            .patterns
            .iter()
            .all(|p| p.frequency >= MIN_PATTERN_FREQUENCY));
    }

    #[test]
    fn overextended_pattern_carries_avg_rsi() {
        let signals: Vec<Signal> = vec![
            losing_signal(Regime::Ranging, 78.0, 6, 0.0),
            losing_signal(Regime::Ranging, 80.0, 6, 0.0),
            losing_signal(Regime::Ranging, 82.0, 6, 0.0),
        ];
        let report = analyze_loss_patterns(&signals, ANALYSIS_WINDOW);
        let pattern = &report.patterns[0];
        assert_eq!(pattern.conditions.avg_rsi_at_entry, Some(80.0));
    }

    #[test]
    fn regime_pattern_carries_modal_pair() {
        let mut signals: Vec<Signal> = (0..3)
            .map(|_| {
                let mut s = losing_signal(Regime::TrendingDown, 50.0, 6, 0.0);
                s.signal_reasons.regime_compatible = false;
                s
            })
            .collect();
        signals.push(winning_signal());

        let report = analyze_loss_patterns(&signals, ANALYSIS_WINDOW);
        let pattern = &report.patterns[0];
        assert_eq!(pattern.category, LossCategory::RegimeMismatch);
        assert_eq!(pattern.conditions.regime, Some(Regime::TrendingDown));
        assert_eq!(pattern.conditions.direction, Some(Direction::Long));
        assert!(pattern.recommendation.contains("LONG"));
        assert!(pattern.recommendation.contains("trending down"));
    }

    #[test]
    fn adjusted_win_rate_reports_uplift() {
        // 2 wins + 3 pattern losses in a window of 5: win rate 40%,
        // adjusted (skip the 3 pattern losses) 2/2 = 100%.
        let mut signals: Vec<Signal> =
            (0..3).map(|_| losing_signal(Regime::Ranging, 80.0, 6, 0.0)).collect();
        signals.push(winning_signal());
        signals.push(winning_signal());

        let report = analyze_loss_patterns(&signals, ANALYSIS_WINDOW);
        assert!((report.win_rate - 40.0).abs() < 1e-9);
        assert!((report.adjusted_win_rate - 100.0).abs() < 1e-9);
        assert!((report.improvement - 60.0).abs() < 1e-9);
    }

    #[test]
    fn window_limits_analysis() {
        // Old losses outside the window are ignored.
        let mut signals: Vec<Signal> =
            (0..3).map(|_| losing_signal(Regime::Ranging, 80.0, 6, 0.0)).collect();
        signals.extend((0..10).map(|_| winning_signal()));

        let report = analyze_loss_patterns(&signals, 10);
        assert_eq!(report.total_analyzed, 10);
        assert!(report.patterns.is_empty());
    }

    #[test]
    fn active_filters_roundtrip() {
        let signals: Vec<Signal> =
            (0..4).map(|_| losing_signal(Regime::Ranging, 80.0, 6, 0.0)).collect();
        let filters = get_active_loss_filters(&signals);
        assert_eq!(filters.len(), 1);
        assert!(filters.iter().all(|f| f.is_active));
    }

    #[test]
    fn cached_analysis_is_reused() {
        let mut signal = losing_signal(Regime::Ranging, 80.0, 6, 0.0);
        let mut cached = categorize_loss(&signal);
        cached.detail = "cached sentinel".into();
        signal.loss_analysis = Some(cached);

        let signals = vec![
            signal,
            losing_signal(Regime::Ranging, 80.0, 6, 0.0),
            losing_signal(Regime::Ranging, 80.0, 6, 0.0),
        ];
        let report = analyze_loss_patterns(&signals, ANALYSIS_WINDOW);
        // The cached analysis keeps its category and still counts.
        assert_eq!(report.patterns[0].frequency, 3);
    }
}
