// =============================================================================
// Discord Notifier — webhook delivery with embeds
// =============================================================================
//
// No bot needed, just webhook URLs. Per-asset webhooks are optional
// (DISCORD_GOLD_WEBHOOK_URL, DISCORD_CRYPTO_WEBHOOK_URL) with
// DISCORD_WEBHOOK_URL as the general fallback.

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use crate::notifications::{format_summary_text, Notifier};
use crate::outcome_tracker::AnalyticsReport;
use crate::signal::Signal;
use crate::types::{Direction, SignalStatus};

const CRYPTO_WEBHOOK_SYMBOLS: [&str; 5] = ["BTCUSD", "ETHUSD", "SOLUSD", "XRPUSD", "ETHBTC"];

/// Embed side-bar colors.
const COLOR_LONG: u32 = 0x00C853;
const COLOR_SHORT: u32 = 0xD50000;
const COLOR_NEUTRAL: u32 = 0x90A4AE;

pub struct DiscordNotifier {
    webhook_url: String,
    gold_webhook_url: Option<String>,
    crypto_webhook_url: Option<String>,
    username: String,
    client: reqwest::Client,
}

impl DiscordNotifier {
    /// Build from environment; None without a general webhook URL.
    pub fn from_env() -> Option<Self> {
        let webhook_url = std::env::var("DISCORD_WEBHOOK_URL").ok().filter(|v| !v.is_empty())?;
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .ok()?;

        Some(Self {
            webhook_url,
            gold_webhook_url: std::env::var("DISCORD_GOLD_WEBHOOK_URL").ok().filter(|v| !v.is_empty()),
            crypto_webhook_url: std::env::var("DISCORD_CRYPTO_WEBHOOK_URL").ok().filter(|v| !v.is_empty()),
            username: "Meridian Signals".into(),
            client,
        })
    }

    fn webhook_for_symbol(&self, symbol: &str) -> &str {
        let upper = symbol.to_uppercase();
        if upper == "XAUUSD" {
            if let Some(url) = &self.gold_webhook_url {
                return url;
            }
        }
        if CRYPTO_WEBHOOK_SYMBOLS.contains(&upper.as_str()) {
            if let Some(url) = &self.crypto_webhook_url {
                return url;
            }
        }
        &self.webhook_url
    }

    fn signal_embed(signal: &Signal) -> serde_json::Value {
        let color = match signal.direction {
            Direction::Long => COLOR_LONG,
            Direction::Short => COLOR_SHORT,
        };
        json!({
            "title": format!(
                "{} {} {}",
                signal.direction.to_string().to_uppercase(),
                signal.symbol,
                signal.timeframe
            ),
            "color": color,
            "fields": [
                {"name": "Entry", "value": format!("{:.5}", signal.entry_price), "inline": true},
                {"name": "Stop", "value": format!("{:.5}", signal.stop_loss), "inline": true},
                {"name": "Target", "value": format!("{:.5}", signal.take_profit), "inline": true},
                {"name": "R:R", "value": format!("{:.2}", signal.risk_reward_ratio), "inline": true},
                {"name": "Confidence", "value": format!("{:.0}%", signal.confidence * 100.0), "inline": true},
                {"name": "Score", "value": format!("{:.1}", signal.composite_score), "inline": true},
                {"name": "Regime", "value": signal.regime_at_signal.to_string(), "inline": true},
                {"name": "Confluence", "value": signal.signal_reasons.confluence_count.to_string(), "inline": true},
            ],
        })
    }

    fn outcome_embed(signal: &Signal) -> serde_json::Value {
        let (title, color) = match signal.status {
            SignalStatus::Win => ("WIN", COLOR_LONG),
            SignalStatus::Loss => ("LOSS", COLOR_SHORT),
            _ => ("CLOSED", COLOR_NEUTRAL),
        };
        let mut fields = vec![
            json!({"name": "Entry", "value": format!("{:.5}", signal.entry_price), "inline": true}),
        ];
        if let Some(exit) = signal.exit_price {
            fields.push(json!({"name": "Exit", "value": format!("{exit:.5}"), "inline": true}));
        }
        if let (Some(pnl), Some(pct)) = (signal.outcome_pnl, signal.outcome_pnl_pct) {
            fields.push(json!({
                "name": "PnL",
                "value": format!("{pnl:+.2} ({pct:+.3}%)"),
                "inline": true
            }));
        }
        if let Some(category) = signal.loss_category {
            fields.push(json!({"name": "Loss category", "value": category.to_string(), "inline": true}));
        }
        json!({
            "title": format!("{title} {} {} {}", signal.symbol, signal.timeframe, signal.direction),
            "color": color,
            "fields": fields,
        })
    }

    async fn send(&self, url: &str, embeds: Vec<serde_json::Value>, content: Option<String>) {
        let mut payload = json!({ "username": self.username, "embeds": embeds });
        if let Some(content) = content {
            payload["content"] = json!(content);
        }

        match self.client.post(url).json(&payload).send().await {
            Ok(resp) if resp.status().is_success() || resp.status().as_u16() == 204 => {
                info!("discord sent");
            }
            Ok(resp) if resp.status().as_u16() == 429 => {
                warn!("discord rate limited");
            }
            Ok(resp) => {
                warn!(status = %resp.status(), "discord http error");
            }
            Err(e) => {
                warn!(error = %e, "discord send failed");
            }
        }
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn notify_signal(&self, signal: &Signal) {
        let url = self.webhook_for_symbol(&signal.symbol).to_string();
        self.send(&url, vec![Self::signal_embed(signal)], None).await;
    }

    async fn notify_outcome(&self, signal: &Signal) {
        let url = self.webhook_for_symbol(&signal.symbol).to_string();
        self.send(&url, vec![Self::outcome_embed(signal)], None).await;
    }

    async fn notify_summary(&self, analytics: &AnalyticsReport, symbol: &str) {
        let url = self.webhook_for_symbol(symbol).to_string();
        self.send(&url, Vec::new(), Some(format_summary_text(analytics, symbol)))
            .await;
    }
}
