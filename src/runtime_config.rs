// =============================================================================
// Runtime Configuration — JSON settings with atomic save
// =============================================================================
//
// Every field carries a serde default so an older config file keeps
// loading after new fields appear. Persistence uses the tmp + rename
// pattern to avoid a half-written file on crash. Provider credentials are
// NOT part of this file; they come from the environment only.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

// =============================================================================
// Default-value helpers (required by the serde `default = "..."` attribute)
// =============================================================================

fn default_scan_interval_seconds() -> u64 {
    300
}

fn default_daily_summary_hour_utc() -> u32 {
    22
}

fn default_history_limit() -> usize {
    500
}

fn default_scan_deadline_seconds() -> u64 {
    90
}

fn default_startup_grace_seconds() -> u64 {
    30
}

fn default_watched_symbols() -> Vec<String> {
    vec![
        "XAUUSD".to_string(),
        "BTCUSD".to_string(),
        "EURUSD".to_string(),
        "GBPUSD".to_string(),
        "USDJPY".to_string(),
    ]
}

fn default_fallback_adapters() -> Vec<String> {
    vec![
        "cryptocompare".to_string(),
        "oanda".to_string(),
        "stooq".to_string(),
    ]
}

fn default_candle_retention() -> usize {
    2000
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Process-wide settings for the Meridian engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Seconds between scan cycles.
    #[serde(default = "default_scan_interval_seconds")]
    pub scan_interval_seconds: u64,

    /// UTC hour at which the daily analytics summary is sent.
    #[serde(default = "default_daily_summary_hour_utc")]
    pub daily_summary_hour_utc: u32,

    /// Symbols the scheduler scans every cycle.
    #[serde(default = "default_watched_symbols")]
    pub watched_symbols: Vec<String>,

    /// Candles requested per (symbol, timeframe) ingest.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Wall-clock budget for one symbol's scan; partial state is kept on
    /// deadline.
    #[serde(default = "default_scan_deadline_seconds")]
    pub scan_deadline_seconds: u64,

    /// Delay before the first scan cycle after startup.
    #[serde(default = "default_startup_grace_seconds")]
    pub startup_grace_seconds: u64,

    /// Adapter names tried, in order, when the primary comes up short.
    #[serde(default = "default_fallback_adapters")]
    pub fallback_adapters: Vec<String>,

    /// Per-symbol adapter overrides consulted before routing heuristics.
    #[serde(default)]
    pub adapter_overrides: HashMap<String, String>,

    /// Maximum candles retained in memory per (symbol, timeframe).
    #[serde(default = "default_candle_retention")]
    pub candle_retention: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            scan_interval_seconds: default_scan_interval_seconds(),
            daily_summary_hour_utc: default_daily_summary_hour_utc(),
            watched_symbols: default_watched_symbols(),
            history_limit: default_history_limit(),
            scan_deadline_seconds: default_scan_deadline_seconds(),
            startup_grace_seconds: default_startup_grace_seconds(),
            fallback_adapters: default_fallback_adapters(),
            adapter_overrides: HashMap::new(),
            candle_retention: default_candle_retention(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file. A missing file is an error so
    /// the caller can fall back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            symbols = ?config.watched_symbols,
            scan_interval = config.scan_interval_seconds,
            "runtime config loaded"
        );
        Ok(config)
    }

    /// Persist to `path` atomically (write `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)
            .context("failed to serialize runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved");
        Ok(())
    }
}
