// =============================================================================
// Notifications — best-effort signal, outcome, and summary delivery
// =============================================================================
//
// The core never fails because a notifier failed: every transport error is
// logged and swallowed. `NotificationHub` fans one event out to every
// configured transport (Telegram bot API, Discord webhooks); an unconfigured
// transport is a silent no-op.

pub mod discord;
pub mod telegram;

use async_trait::async_trait;

use crate::outcome_tracker::AnalyticsReport;
use crate::signal::Signal;
use crate::types::{Direction, SignalStatus};

/// Write-only notification contract. Implementations are best-effort and
/// must never propagate transport errors.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_signal(&self, signal: &Signal);
    async fn notify_outcome(&self, signal: &Signal);
    async fn notify_summary(&self, analytics: &AnalyticsReport, symbol: &str);
}

/// Fan-out to every configured transport.
pub struct NotificationHub {
    transports: Vec<Box<dyn Notifier>>,
}

impl NotificationHub {
    pub fn new(transports: Vec<Box<dyn Notifier>>) -> Self {
        Self { transports }
    }

    /// Build the hub from environment configuration; transports without
    /// credentials are skipped.
    pub fn from_env() -> Self {
        let mut transports: Vec<Box<dyn Notifier>> = Vec::new();
        if let Some(telegram) = telegram::TelegramNotifier::from_env() {
            transports.push(Box::new(telegram));
        }
        if let Some(discord) = discord::DiscordNotifier::from_env() {
            transports.push(Box::new(discord));
        }
        Self { transports }
    }

    pub fn transport_count(&self) -> usize {
        self.transports.len()
    }
}

#[async_trait]
impl Notifier for NotificationHub {
    async fn notify_signal(&self, signal: &Signal) {
        for transport in &self.transports {
            transport.notify_signal(signal).await;
        }
    }

    async fn notify_outcome(&self, signal: &Signal) {
        for transport in &self.transports {
            transport.notify_outcome(signal).await;
        }
    }

    async fn notify_summary(&self, analytics: &AnalyticsReport, symbol: &str) {
        for transport in &self.transports {
            transport.notify_summary(analytics, symbol).await;
        }
    }
}

// =============================================================================
// Shared message formatting
// =============================================================================

/// Plain-text signal message shared by the transports.
pub(crate) fn format_signal_text(signal: &Signal) -> String {
    let arrow = match signal.direction {
        Direction::Long => "LONG",
        Direction::Short => "SHORT",
    };
    let mtf = if signal.mtf_confluence {
        let tfs: Vec<String> = signal
            .agreeing_timeframes
            .iter()
            .map(|tf| tf.to_string())
            .collect();
        format!("\nMTF confluence: {}", tfs.join(" + "))
    } else {
        String::new()
    };

    format!(
        "{arrow} {} {} \n\
         Entry: {:.5}\n\
         Stop: {:.5}\n\
         Target: {:.5}\n\
         R:R {:.2} | Confidence {:.0}% | Score {:.1}\n\
         Regime: {}{mtf}",
        signal.symbol,
        signal.timeframe,
        signal.entry_price,
        signal.stop_loss,
        signal.take_profit,
        signal.risk_reward_ratio,
        signal.confidence * 100.0,
        signal.composite_score,
        signal.regime_at_signal,
    )
}

/// Plain-text outcome message shared by the transports.
pub(crate) fn format_outcome_text(signal: &Signal) -> String {
    let verdict = match signal.status {
        SignalStatus::Win => "WIN",
        SignalStatus::Loss => "LOSS",
        SignalStatus::Expired => "EXPIRED",
        other => return format!("{} {} status {other}", signal.symbol, signal.timeframe),
    };

    let mut text = format!(
        "{verdict} {} {} {}\nEntry {:.5}",
        signal.symbol, signal.timeframe, signal.direction, signal.entry_price
    );
    if let (Some(exit), Some(pnl), Some(pct)) =
        (signal.exit_price, signal.outcome_pnl, signal.outcome_pnl_pct)
    {
        text.push_str(&format!(" -> Exit {exit:.5}\nPnL {pnl:+.2} ({pct:+.3}%)"));
    }
    if let Some(category) = signal.loss_category {
        text.push_str(&format!("\nLoss category: {category}"));
    }
    text
}

/// Plain-text daily summary shared by the transports.
pub(crate) fn format_summary_text(analytics: &AnalyticsReport, symbol: &str) -> String {
    let mut text = format!(
        "Daily summary {symbol}\n\
         Signals: {} total, {} completed ({} wins / {} losses, {} expired)\n\
         Win rate {:.1}% | Total PnL {:+.2} | Avg R:R {:.2}",
        analytics.total_signals,
        analytics.completed,
        analytics.wins,
        analytics.losses,
        analytics.expired,
        analytics.win_rate,
        analytics.total_pnl,
        analytics.avg_rr,
    );
    if let Some(pf) = analytics.profit_factor {
        text.push_str(&format!(" | PF {pf:.2}"));
    }
    for (timeframe, stats) in &analytics.by_timeframe {
        text.push_str(&format!(
            "\n  {timeframe}: {}/{} wins ({:.0}%)",
            stats.wins, stats.total, stats.win_rate
        ));
    }
    text
}
