// =============================================================================
// Macro Data Cache — single-writer, many-reader summary with TTL
// =============================================================================
//
// Treasury yields, the Fed funds rate, and CPI from the Alpha Vantage
// economic endpoints, folded into one opaque JSON summary that consumers
// (daily summary, notifications) read as-is. Absence is never an error.
//
// Discipline:
//   - Readers always get the in-memory summary, stale or not; a missing
//     in-memory copy falls back to the on-disk cache. Nothing ever blocks
//     on a network refresh.
//   - A background refresh holds the `refreshing` flag so concurrent
//     refreshes coalesce into one.
//   - Free-tier pacing: 13 seconds between upstream requests.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::RwLock;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::adapters::RequestPacer;

const BASE_URL: &str = "https://www.alphavantage.co/query";

/// Seconds between free-tier requests.
const REQUEST_SPACING: Duration = Duration::from_secs(13);

/// Summary age beyond which a background refresh is due.
const DEFAULT_TTL: Duration = Duration::from_secs(6 * 3600);

pub type MacroSummary = serde_json::Map<String, Value>;

pub struct MacroCache {
    api_key: Option<String>,
    summary: RwLock<Option<MacroSummary>>,
    fetched_at: RwLock<Option<Instant>>,
    refreshing: AtomicBool,
    ttl: Duration,
    cache_path: PathBuf,
    pacer: RequestPacer,
    client: reqwest::Client,
}

impl MacroCache {
    pub fn new(api_key: Option<String>, cache_path: PathBuf, ttl: Duration) -> Self {
        Self {
            api_key,
            summary: RwLock::new(None),
            fetched_at: RwLock::new(None),
            refreshing: AtomicBool::new(false),
            ttl,
            cache_path,
            pacer: RequestPacer::new(tokio::time::Duration::from_secs(
                REQUEST_SPACING.as_secs(),
            )),
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("failed to build reqwest client"),
        }
    }

    /// Cache from `ALPHAVANTAGE_API_KEY` with the default TTL and disk
    /// location.
    pub fn from_env() -> Self {
        let key = std::env::var("ALPHAVANTAGE_API_KEY").ok().filter(|k| !k.is_empty());
        Self::new(key, PathBuf::from("data/cache/macro_summary.json"), DEFAULT_TTL)
    }

    /// Current summary: in-memory first, on-disk fallback. Stale data is
    /// better than no data.
    pub fn summary(&self) -> Option<MacroSummary> {
        if let Some(summary) = self.summary.read().clone() {
            return Some(summary);
        }
        self.load_file_cache()
    }

    /// Whether the in-memory summary is missing or past its TTL.
    pub fn needs_refresh(&self) -> bool {
        match *self.fetched_at.read() {
            Some(at) => at.elapsed() > self.ttl,
            None => true,
        }
    }

    /// Refresh from upstream, coalescing concurrent callers: only one
    /// refresh runs at a time, others return immediately.
    pub async fn refresh(&self) {
        if self
            .refreshing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("macro refresh already in flight, coalescing");
            return;
        }

        let result = self.fetch_summary().await;
        match result {
            Ok(summary) => {
                self.save_file_cache(&summary);
                *self.summary.write() = Some(summary);
                *self.fetched_at.write() = Some(Instant::now());
                info!("macro summary refreshed");
            }
            Err(e) => {
                // Keep whatever we have; stale beats empty.
                warn!(error = %e, "macro refresh failed, serving stale cache");
            }
        }

        self.refreshing.store(false, Ordering::SeqCst);
    }

    /// Seed the in-memory summary from disk without any network traffic.
    pub fn warm_from_disk(&self) {
        if self.summary.read().is_some() {
            return;
        }
        if let Some(summary) = self.load_file_cache() {
            info!("macro summary warmed from disk cache");
            *self.summary.write() = Some(summary);
        }
    }

    // -------------------------------------------------------------------------
    // Upstream fetches
    // -------------------------------------------------------------------------

    async fn fetch_summary(&self) -> anyhow::Result<MacroSummary> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("ALPHAVANTAGE_API_KEY not set"))?;

        let treasury_10y = self
            .fetch_latest_value(api_key, &[("function", "TREASURY_YIELD"), ("interval", "daily"), ("maturity", "10year")])
            .await?;
        self.pacer.pace().await;

        let fed_rate = self
            .fetch_latest_value(api_key, &[("function", "FEDERAL_FUNDS_RATE"), ("interval", "daily")])
            .await?;
        self.pacer.pace().await;

        let cpi = self
            .fetch_latest_value(api_key, &[("function", "CPI"), ("interval", "monthly")])
            .await?;

        let mut summary = MacroSummary::new();
        summary.insert("treasury_10y".into(), json!(treasury_10y));
        summary.insert("fed_funds_rate".into(), json!(fed_rate));
        summary.insert("cpi".into(), json!(cpi));
        // Real-yield proxy drives the gold bias: yields up, gold down.
        summary.insert(
            "gold_bias".into(),
            json!(if treasury_10y - cpi_yoy_estimate(cpi) < 0.0 { "bullish" } else { "bearish" }),
        );
        summary.insert("cached_at".into(), json!(Utc::now().to_rfc3339()));
        Ok(summary)
    }

    /// Latest non-empty data point of an Alpha Vantage economic series.
    async fn fetch_latest_value(
        &self,
        api_key: &str,
        params: &[(&str, &str)],
    ) -> anyhow::Result<f64> {
        let mut query: Vec<(String, String)> = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        query.push(("apikey".into(), api_key.to_string()));

        let resp = self.client.get(BASE_URL).query(&query).send().await?;
        let body: Value = resp.error_for_status()?.json().await?;

        if body.get("Error Message").is_some() {
            anyhow::bail!("alpha vantage error: {}", body["Error Message"]);
        }

        body["data"]
            .as_array()
            .and_then(|rows| {
                rows.iter().find_map(|row| {
                    row["value"]
                        .as_str()
                        .filter(|v| *v != ".")
                        .and_then(|v| v.parse::<f64>().ok())
                })
            })
            .ok_or_else(|| anyhow::anyhow!("no usable data point in series"))
    }

    // -------------------------------------------------------------------------
    // Disk cache
    // -------------------------------------------------------------------------

    fn load_file_cache(&self) -> Option<MacroSummary> {
        let text = std::fs::read_to_string(&self.cache_path).ok()?;
        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => Some(map),
            _ => {
                warn!(path = %self.cache_path.display(), "macro file cache unreadable");
                None
            }
        }
    }

    fn save_file_cache(&self, summary: &MacroSummary) {
        if let Some(parent) = self.cache_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match serde_json::to_string_pretty(&Value::Object(summary.clone())) {
            Ok(text) => {
                if let Err(e) = std::fs::write(&self.cache_path, text) {
                    warn!(error = %e, "failed to write macro file cache");
                }
            }
            Err(e) => warn!(error = %e, "failed to serialize macro summary"),
        }
    }
}

/// Rough year-over-year CPI inflation estimate from the index level. The
/// index hovers around ~310 with ~3% yearly drift; good enough for a coarse
/// bias flag.
fn cpi_yoy_estimate(cpi_index: f64) -> f64 {
    if cpi_index <= 0.0 {
        return 0.0;
    }
    (cpi_index / 300.0 - 1.0).max(0.0) * 10.0
}
