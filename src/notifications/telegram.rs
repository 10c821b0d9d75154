// =============================================================================
// Telegram Notifier — bot-API delivery with per-asset channel routing
// =============================================================================
//
// Needs TELEGRAM_BOT_TOKEN plus at least one target chat. Signals route to
// an asset-class channel when configured (TELEGRAM_GOLD_CHANNEL_ID,
// TELEGRAM_CRYPTO_CHANNEL_ID), otherwise to the general TELEGRAM_CHAT_ID.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::notifications::{
    format_outcome_text, format_signal_text, format_summary_text, Notifier,
};
use crate::outcome_tracker::AnalyticsReport;
use crate::signal::Signal;

const CRYPTO_CHANNEL_SYMBOLS: [&str; 5] = ["BTCUSD", "ETHUSD", "SOLUSD", "XRPUSD", "ETHBTC"];

pub struct TelegramNotifier {
    token: String,
    chat_id: String,
    gold_channel_id: Option<String>,
    crypto_channel_id: Option<String>,
    client: reqwest::Client,
}

impl TelegramNotifier {
    /// Build from environment; None when the bot token or default chat is
    /// missing (the transport is simply not configured).
    pub fn from_env() -> Option<Self> {
        let token = std::env::var("TELEGRAM_BOT_TOKEN").ok().filter(|v| !v.is_empty())?;
        let chat_id = std::env::var("TELEGRAM_CHAT_ID").ok().filter(|v| !v.is_empty())?;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .ok()?;

        Some(Self {
            token,
            chat_id,
            gold_channel_id: std::env::var("TELEGRAM_GOLD_CHANNEL_ID").ok().filter(|v| !v.is_empty()),
            crypto_channel_id: std::env::var("TELEGRAM_CRYPTO_CHANNEL_ID").ok().filter(|v| !v.is_empty()),
            client,
        })
    }

    /// Channel for a symbol: gold and crypto broadcast channels when
    /// configured, the personal chat otherwise.
    fn channel_for_symbol(&self, symbol: &str) -> &str {
        let upper = symbol.to_uppercase();
        if upper == "XAUUSD" {
            if let Some(channel) = &self.gold_channel_id {
                return channel;
            }
        }
        if CRYPTO_CHANNEL_SYMBOLS.contains(&upper.as_str()) {
            if let Some(channel) = &self.crypto_channel_id {
                return channel;
            }
        }
        &self.chat_id
    }

    async fn send(&self, chat_id: &str, text: &str) {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.token);
        let payload = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "disable_web_page_preview": true,
        });

        match self.client.post(&url).json(&payload).send().await {
            Ok(resp) if resp.status().is_success() => {
                info!(chat_id, "telegram sent");
            }
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                let preview: String = body.chars().take(200).collect();
                warn!(chat_id, %status, body = %preview, "telegram http error");
            }
            Err(e) => {
                warn!(chat_id, error = %e, "telegram send failed");
            }
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify_signal(&self, signal: &Signal) {
        let channel = self.channel_for_symbol(&signal.symbol).to_string();
        self.send(&channel, &format_signal_text(signal)).await;
    }

    async fn notify_outcome(&self, signal: &Signal) {
        let channel = self.channel_for_symbol(&signal.symbol).to_string();
        self.send(&channel, &format_outcome_text(signal)).await;
    }

    async fn notify_summary(&self, analytics: &AnalyticsReport, symbol: &str) {
        let channel = self.channel_for_symbol(symbol).to_string();
        self.send(&channel, &format_summary_text(analytics, symbol)).await;
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn notifier() -> TelegramNotifier {
        TelegramNotifier {
            token: "test-token".into(),
            chat_id: "111".into(),
            gold_channel_id: Some("222".into()),
            crypto_channel_id: Some("333".into()),
            client: reqwest::Client::new(),
        }
    }

    #[test]
    fn routes_gold_to_gold_channel() {
        assert_eq!(notifier().channel_for_symbol("XAUUSD"), "222");
    }

    #[test]
    fn routes_crypto_to_crypto_channel() {
        assert_eq!(notifier().channel_for_symbol("btcusd"), "333");
        assert_eq!(notifier().channel_for_symbol("ETHBTC"), "333");
    }

    #[test]
    fn falls_back_to_personal_chat() {
        assert_eq!(notifier().channel_for_symbol("EURUSD"), "111");

        let mut bare = notifier();
        bare.gold_channel_id = None;
        assert_eq!(bare.channel_for_symbol("XAUUSD"), "111");
    }
}
