// =============================================================================
// Outcome Tracker — signal lifecycle against live candles
// =============================================================================
//
// The only component allowed to transition signal status:
//
//            price reaches entry
//   pending ───────────────────▶ active
//      │                           │── low/high hits TP ─▶ win
//      │ now > expires_at          │
//      └──▶ expired                └── low/high hits SL ─▶ loss
//
// Intra-bar tie-break: when a single candle spans both SL and TP, the stop
// is assumed to fill first (conservative). The rule is fixed so repeated
// evaluation of the same bars is deterministic.
//
// `check_signal_outcome` is pure: it returns the updated signal, or None
// when nothing changed. Closed signals are never modified again.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::signal::Signal;
use crate::types::{Direction, SignalStatus, Timeframe};

/// Trigger band for market-order style activation: price already within
/// 0.1% of entry in the adverse direction counts as triggered.
const ENTRY_BAND: f64 = 0.001;

/// Evaluate one signal against the latest bar. Returns the updated signal
/// or None when no field changed.
pub fn check_signal_outcome(
    signal: &Signal,
    current_price: f64,
    high: f64,
    low: f64,
    now: DateTime<Utc>,
) -> Option<Signal> {
    match signal.status {
        SignalStatus::Pending => check_pending(signal, current_price, high, low, now),
        SignalStatus::Active => check_active(signal, high, low, now),
        // Closed signals are immutable.
        _ => None,
    }
}

fn check_pending(
    signal: &Signal,
    current_price: f64,
    high: f64,
    low: f64,
    now: DateTime<Utc>,
) -> Option<Signal> {
    // Expiry first: a bar arriving after the window never activates.
    if now > signal.expires_at {
        let mut updated = signal.clone();
        updated.status = SignalStatus::Expired;
        updated.closed_at = Some(now);
        return Some(updated);
    }

    let triggered = match signal.direction {
        Direction::Long => {
            low <= signal.entry_price || current_price <= signal.entry_price * (1.0 + ENTRY_BAND)
        }
        Direction::Short => {
            high >= signal.entry_price || current_price >= signal.entry_price * (1.0 - ENTRY_BAND)
        }
    };

    if triggered {
        let mut updated = signal.clone();
        updated.status = SignalStatus::Active;
        updated.triggered_at = Some(now);
        return Some(updated);
    }

    None
}

fn check_active(signal: &Signal, high: f64, low: f64, now: DateTime<Utc>) -> Option<Signal> {
    let entry = signal.entry_price;

    let (favorable, adverse) = match signal.direction {
        Direction::Long => (high - entry, entry - low),
        Direction::Short => (entry - low, high - entry),
    };
    let mfe = signal.max_favorable.max(favorable);
    let mae = signal.max_adverse.max(adverse);

    let sl_hit = match signal.direction {
        Direction::Long => low <= signal.stop_loss,
        Direction::Short => high >= signal.stop_loss,
    };
    let tp_hit = match signal.direction {
        Direction::Long => high >= signal.take_profit,
        Direction::Short => low <= signal.take_profit,
    };

    // Stop checked first: when the bar spans both levels, the loss stands.
    if sl_hit {
        return Some(close_signal(signal, SignalStatus::Loss, signal.stop_loss, mfe, mae, now));
    }
    if tp_hit {
        return Some(close_signal(signal, SignalStatus::Win, signal.take_profit, mfe, mae, now));
    }

    // Excursion bookkeeping without a close.
    if mfe > signal.max_favorable || mae > signal.max_adverse {
        let mut updated = signal.clone();
        updated.max_favorable = mfe;
        updated.max_adverse = mae;
        return Some(updated);
    }

    None
}

fn close_signal(
    signal: &Signal,
    status: SignalStatus,
    exit_price: f64,
    mfe: f64,
    mae: f64,
    now: DateTime<Utc>,
) -> Signal {
    let entry = signal.entry_price;
    let pnl = match signal.direction {
        Direction::Long => exit_price - entry,
        Direction::Short => entry - exit_price,
    };
    let pnl_pct = if entry.abs() > 0.0 { pnl / entry * 100.0 } else { 0.0 };

    let mut updated = signal.clone();
    updated.status = status;
    updated.exit_price = Some(exit_price);
    updated.outcome_pnl = Some(pnl);
    updated.outcome_pnl_pct = Some(pnl_pct);
    updated.max_favorable = mfe;
    updated.max_adverse = mae;
    updated.closed_at = Some(now);
    updated
}

// =============================================================================
// Analytics
// =============================================================================

#[derive(Debug, Clone, Default, Serialize)]
pub struct GroupStats {
    pub total: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: f64,
    pub avg_pnl: f64,
}

/// Performance analytics over a symbol's signal history, reported in the
/// daily summary.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalyticsReport {
    pub total_signals: usize,
    pub completed: usize,
    pub wins: usize,
    pub losses: usize,
    pub pending: usize,
    pub active: usize,
    pub expired: usize,
    pub win_rate: f64,
    pub avg_pnl: f64,
    pub avg_pnl_pct: f64,
    pub total_pnl: f64,
    pub best_trade: f64,
    pub worst_trade: f64,
    pub avg_rr: f64,
    /// None when there are no losing trades to divide by.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profit_factor: Option<f64>,
    pub by_timeframe: BTreeMap<Timeframe, GroupStats>,
    pub by_direction: BTreeMap<String, GroupStats>,
    /// Cumulative PnL over completed signals in close order.
    pub equity_curve: Vec<(DateTime<Utc>, f64)>,
}

pub fn compute_analytics(signals: &[Signal]) -> AnalyticsReport {
    let mut report = AnalyticsReport {
        total_signals: signals.len(),
        pending: signals.iter().filter(|s| s.status == SignalStatus::Pending).count(),
        active: signals.iter().filter(|s| s.status == SignalStatus::Active).count(),
        expired: signals.iter().filter(|s| s.status == SignalStatus::Expired).count(),
        ..Default::default()
    };

    let completed: Vec<&Signal> = signals.iter().filter(|s| s.status.is_completed()).collect();
    if completed.is_empty() {
        return report;
    }

    let wins = completed.iter().filter(|s| s.status == SignalStatus::Win).count();
    let pnls: Vec<f64> = completed.iter().map(|s| s.outcome_pnl.unwrap_or(0.0)).collect();
    let pnl_pcts: Vec<f64> = completed
        .iter()
        .map(|s| s.outcome_pnl_pct.unwrap_or(0.0))
        .collect();

    report.completed = completed.len();
    report.wins = wins;
    report.losses = completed.len() - wins;
    report.win_rate = wins as f64 / completed.len() as f64 * 100.0;
    report.avg_pnl = pnls.iter().sum::<f64>() / pnls.len() as f64;
    report.avg_pnl_pct = pnl_pcts.iter().sum::<f64>() / pnl_pcts.len() as f64;
    report.total_pnl = pnls.iter().sum();
    report.best_trade = pnls.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    report.worst_trade = pnls.iter().copied().fold(f64::INFINITY, f64::min);
    report.avg_rr = completed.iter().map(|s| s.risk_reward_ratio).sum::<f64>()
        / completed.len() as f64;

    let gross_profit: f64 = pnls.iter().filter(|p| **p > 0.0).sum();
    let gross_loss: f64 = pnls.iter().filter(|p| **p < 0.0).map(|p| p.abs()).sum();
    report.profit_factor = (gross_loss > 0.0).then(|| gross_profit / gross_loss);

    // Per-timeframe breakdown.
    for signal in &completed {
        let entry = report.by_timeframe.entry(signal.timeframe).or_default();
        entry.total += 1;
        if signal.status == SignalStatus::Win {
            entry.wins += 1;
        } else {
            entry.losses += 1;
        }
        entry.avg_pnl += signal.outcome_pnl.unwrap_or(0.0);
    }
    for stats in report.by_timeframe.values_mut() {
        stats.win_rate = stats.wins as f64 / stats.total as f64 * 100.0;
        stats.avg_pnl /= stats.total as f64;
    }

    // Per-direction breakdown.
    for signal in &completed {
        let entry = report
            .by_direction
            .entry(signal.direction.to_string())
            .or_default();
        entry.total += 1;
        if signal.status == SignalStatus::Win {
            entry.wins += 1;
        } else {
            entry.losses += 1;
        }
        entry.avg_pnl += signal.outcome_pnl.unwrap_or(0.0);
    }
    for stats in report.by_direction.values_mut() {
        stats.win_rate = stats.wins as f64 / stats.total as f64 * 100.0;
        stats.avg_pnl /= stats.total as f64;
    }

    // Equity curve in close order.
    let mut closed: Vec<&Signal> = completed.clone();
    closed.sort_by_key(|s| s.closed_at);
    let mut cumulative = 0.0;
    for signal in closed {
        cumulative += signal.outcome_pnl.unwrap_or(0.0);
        if let Some(at) = signal.closed_at {
            report.equity_curve.push((at, cumulative));
        }
    }

    report
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::tests::sample_signal;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 30, 0).unwrap()
    }

    // ---- scenario: long win ---------------------------------------------

    #[test]
    fn long_win_scenario() {
        // Entry 2650.30, SL 2645.80, TP 2658.00.
        let signal = sample_signal(Direction::Long);

        // First bar touches entry (low 2650.1): pending -> active.
        let active = check_signal_outcome(&signal, 2650.5, 2651.0, 2650.1, now()).unwrap();
        assert_eq!(active.status, SignalStatus::Active);
        assert!(active.triggered_at.is_some());

        // Next bar reaches TP (high 2658.5): active -> win at 2658.00.
        let won = check_signal_outcome(&active, 2657.0, 2658.5, 2652.0, now()).unwrap();
        assert_eq!(won.status, SignalStatus::Win);
        assert!((won.exit_price.unwrap() - 2658.00).abs() < 1e-9);
        assert!((won.outcome_pnl.unwrap() - 7.70).abs() < 1e-9);
        assert!(won.closed_at.is_some());
    }

    #[test]
    fn long_loss_at_stop() {
        let signal = sample_signal(Direction::Long);
        let active = check_signal_outcome(&signal, 2650.3, 2650.5, 2650.0, now()).unwrap();
        let lost = check_signal_outcome(&active, 2646.0, 2649.0, 2645.5, now()).unwrap();
        assert_eq!(lost.status, SignalStatus::Loss);
        assert!((lost.exit_price.unwrap() - 2645.80).abs() < 1e-9);
        assert!((lost.outcome_pnl.unwrap() - (-4.50)).abs() < 1e-9);
        assert!(lost.outcome_pnl_pct.unwrap() < 0.0);
    }

    #[test]
    fn short_lifecycle() {
        // Entry 2650.30, SL 2654.80, TP 2642.60.
        let signal = sample_signal(Direction::Short);

        let active = check_signal_outcome(&signal, 2650.0, 2650.6, 2649.0, now()).unwrap();
        assert_eq!(active.status, SignalStatus::Active);

        let won = check_signal_outcome(&active, 2643.0, 2645.0, 2642.0, now()).unwrap();
        assert_eq!(won.status, SignalStatus::Win);
        assert!((won.outcome_pnl.unwrap() - 7.70).abs() < 1e-9);
    }

    // ---- scenario: expiry ------------------------------------------------

    #[test]
    fn pending_expires_without_outcome() {
        let signal = sample_signal(Direction::Long);
        let after_expiry = signal.expires_at + Duration::seconds(1);

        // Bar entirely below entry would have triggered — expiry wins.
        let expired =
            check_signal_outcome(&signal, 2648.0, 2649.0, 2647.0, after_expiry).unwrap();
        assert_eq!(expired.status, SignalStatus::Expired);
        assert!(expired.exit_price.is_none());
        assert!(expired.outcome_pnl.is_none());
        assert!(expired.closed_at.is_some());
    }

    #[test]
    fn active_does_not_expire() {
        let signal = sample_signal(Direction::Long);
        let active = check_signal_outcome(&signal, 2650.3, 2650.5, 2650.0, now()).unwrap();
        let after_expiry = active.expires_at + Duration::seconds(1);

        // A quiet bar past the expiry leaves the active signal open.
        let update = check_signal_outcome(&active, 2651.0, 2651.5, 2650.5, after_expiry);
        if let Some(updated) = update {
            // Only excursion bookkeeping is allowed.
            assert_eq!(updated.status, SignalStatus::Active);
        }
    }

    // ---- tie-break -------------------------------------------------------

    #[test]
    fn bar_spanning_both_levels_closes_as_loss() {
        let signal = sample_signal(Direction::Long);
        let active = check_signal_outcome(&signal, 2650.3, 2650.5, 2650.0, now()).unwrap();

        // One huge candle touches SL (2645.80) and TP (2658.00).
        let closed = check_signal_outcome(&active, 2652.0, 2659.0, 2645.0, now()).unwrap();
        assert_eq!(closed.status, SignalStatus::Loss);
        assert!((closed.exit_price.unwrap() - 2645.80).abs() < 1e-9);
    }

    // ---- MFE / MAE -------------------------------------------------------

    #[test]
    fn excursions_never_decrease() {
        let signal = sample_signal(Direction::Long);
        let active = check_signal_outcome(&signal, 2650.3, 2650.5, 2650.0, now()).unwrap();

        // Wide bar sets MFE/MAE.
        let step1 = check_signal_outcome(&active, 2653.0, 2654.0, 2648.0, now()).unwrap();
        assert!((step1.max_favorable - (2654.0 - 2650.30)).abs() < 1e-9);
        assert!((step1.max_adverse - (2650.30 - 2648.0)).abs() < 1e-9);

        // Narrow bar afterwards must not shrink them.
        let step2 = check_signal_outcome(&step1, 2651.0, 2651.5, 2650.8, now());
        assert!(step2.is_none(), "no change expected on an inside bar");

        // A bar extending only the favorable side bumps MFE alone.
        let step3 = check_signal_outcome(&step1, 2655.0, 2656.0, 2651.0, now()).unwrap();
        assert!(step3.max_favorable > step1.max_favorable);
        assert_eq!(step3.max_adverse, step1.max_adverse);
    }

    // ---- idempotence -----------------------------------------------------

    #[test]
    fn closed_signal_is_immutable() {
        let signal = sample_signal(Direction::Long);
        let active = check_signal_outcome(&signal, 2650.3, 2650.5, 2650.0, now()).unwrap();
        let won = check_signal_outcome(&active, 2657.0, 2658.5, 2652.0, now()).unwrap();

        // Re-running the same bar (or any bar) changes nothing.
        assert!(check_signal_outcome(&won, 2657.0, 2658.5, 2652.0, now()).is_none());
        assert!(check_signal_outcome(&won, 2600.0, 2610.0, 2590.0, now()).is_none());
    }

    // ---- analytics -------------------------------------------------------

    fn closed(direction: Direction, pnl: f64, minute: u32) -> Signal {
        let mut s = sample_signal(direction);
        s.status = if pnl >= 0.0 { SignalStatus::Win } else { SignalStatus::Loss };
        s.outcome_pnl = Some(pnl);
        s.outcome_pnl_pct = Some(pnl / s.entry_price * 100.0);
        s.closed_at = Some(Utc.with_ymd_and_hms(2024, 6, 1, 13, minute, 0).unwrap());
        s
    }

    #[test]
    fn analytics_on_empty_history() {
        let report = compute_analytics(&[]);
        assert_eq!(report.total_signals, 0);
        assert_eq!(report.completed, 0);
        assert_eq!(report.win_rate, 0.0);
    }

    #[test]
    fn analytics_aggregates() {
        let signals = vec![
            closed(Direction::Long, 10.0, 0),
            closed(Direction::Long, -5.0, 1),
            closed(Direction::Short, 6.0, 2),
            sample_signal(Direction::Long), // still pending
        ];
        let report = compute_analytics(&signals);

        assert_eq!(report.total_signals, 4);
        assert_eq!(report.completed, 3);
        assert_eq!(report.wins, 2);
        assert_eq!(report.losses, 1);
        assert_eq!(report.pending, 1);
        assert!((report.win_rate - 66.666).abs() < 0.01);
        assert!((report.total_pnl - 11.0).abs() < 1e-9);
        assert!((report.best_trade - 10.0).abs() < 1e-9);
        assert!((report.worst_trade - (-5.0)).abs() < 1e-9);
        assert!((report.profit_factor.unwrap() - 16.0 / 5.0).abs() < 1e-9);

        // Equity curve is cumulative in close order.
        assert_eq!(report.equity_curve.len(), 3);
        assert!((report.equity_curve[2].1 - 11.0).abs() < 1e-9);

        let long_stats = &report.by_direction["long"];
        assert_eq!(long_stats.total, 2);
        assert_eq!(long_stats.wins, 1);
    }

    #[test]
    fn profit_factor_none_without_losses() {
        let signals = vec![closed(Direction::Long, 10.0, 0)];
        let report = compute_analytics(&signals);
        assert!(report.profit_factor.is_none());
    }
}
