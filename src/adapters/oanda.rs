// =============================================================================
// OANDA Adapter — forex & spot metals via the v20 REST API
// =============================================================================
//
// Requires `OANDA_API_KEY`; the practice endpoint is used unless
// `OANDA_LIVE=1`. Candles come back as mid prices in RFC3339 timestamps;
// only completed candles are kept.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::time::Duration;
use tracing::debug;

use crate::adapters::{AdapterError, RequestPacer, SourceAdapter};
use crate::market_data::{Candle, CandleSeries};
use crate::types::{MarketType, Timeframe};

const PRACTICE_URL: &str = "https://api-fxpractice.oanda.com";
const LIVE_URL: &str = "https://api-fxtrade.oanda.com";

/// API maximum candles per request.
const MAX_COUNT: usize = 5000;

const SUPPORTED: [&str; 12] = [
    "XAUUSD", "XAGUSD", "EURUSD", "GBPUSD", "USDJPY", "AUDUSD", "USDCAD", "NZDUSD", "USDCHF",
    "EURGBP", "EURJPY", "GBPJPY",
];

/// Canonical symbol -> OANDA instrument (`EURUSD` -> `EUR_USD`).
fn to_instrument(symbol: &str) -> String {
    let upper = symbol.to_uppercase();
    if upper.len() == 6 && upper.chars().all(|c| c.is_ascii_alphabetic()) {
        format!("{}_{}", &upper[..3], &upper[3..])
    } else {
        upper
    }
}

fn granularity(timeframe: Timeframe) -> &'static str {
    use Timeframe::*;
    match timeframe {
        M1 => "M1",
        M5 => "M5",
        M15 => "M15",
        M30 => "M30",
        H1 => "H1",
        H4 => "H4",
        D1 => "D",
        W1 => "W",
        Mo1 => "M",
    }
}

pub struct OandaAdapter {
    api_key: Option<String>,
    live: bool,
    client: RwLock<Option<reqwest::Client>>,
    pacer: RequestPacer,
}

impl OandaAdapter {
    pub fn new(api_key: Option<String>, live: bool) -> Self {
        Self {
            api_key,
            live,
            client: RwLock::new(None),
            pacer: RequestPacer::new(Duration::from_millis(300)),
        }
    }

    /// Construct from `OANDA_API_KEY` / `OANDA_LIVE` environment variables.
    pub fn from_env() -> Self {
        let key = std::env::var("OANDA_API_KEY").ok().filter(|k| !k.is_empty());
        let live = std::env::var("OANDA_LIVE").map(|v| v == "1").unwrap_or(false);
        Self::new(key, live)
    }

    fn base_url(&self) -> &'static str {
        if self.live {
            LIVE_URL
        } else {
            PRACTICE_URL
        }
    }

    fn client(&self) -> Result<reqwest::Client, AdapterError> {
        let key = self
            .api_key
            .as_ref()
            .ok_or_else(|| AdapterError::AuthFailed("OANDA_API_KEY not set".into()))?;

        if self.client.read().is_none() {
            let mut headers = reqwest::header::HeaderMap::new();
            let bearer = reqwest::header::HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|_| AdapterError::AuthFailed("invalid OANDA_API_KEY".into()))?;
            headers.insert(reqwest::header::AUTHORIZATION, bearer);
            headers.insert(
                "Accept-Datetime-Format",
                reqwest::header::HeaderValue::from_static("RFC3339"),
            );
            let client = reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .default_headers(headers)
                .build()
                .map_err(AdapterError::from_transport)?;
            *self.client.write() = Some(client);
        }
        Ok(self.client.read().as_ref().cloned().unwrap())
    }

    fn parse_candles(body: &serde_json::Value) -> Result<Vec<Candle>, AdapterError> {
        let rows = body["candles"]
            .as_array()
            .ok_or_else(|| AdapterError::MalformedResponse("missing candles array".into()))?;

        let mut candles = Vec::with_capacity(rows.len());
        for row in rows {
            // Skip the still-forming candle.
            if row["complete"].as_bool() == Some(false) {
                continue;
            }

            let time = row["time"]
                .as_str()
                .ok_or_else(|| AdapterError::MalformedResponse("candle missing time".into()))?;
            let timestamp = time
                .parse::<DateTime<Utc>>()
                .map_err(|e| AdapterError::MalformedResponse(format!("bad timestamp: {e}")))?;

            let mid = &row["mid"];
            let price = |field: &str| -> Result<f64, AdapterError> {
                mid[field]
                    .as_str()
                    .and_then(|s| s.parse::<f64>().ok())
                    .ok_or_else(|| {
                        AdapterError::MalformedResponse(format!("mid.{field} missing"))
                    })
            };

            candles.push(Candle::new(
                timestamp,
                price("o")?,
                price("h")?,
                price("l")?,
                price("c")?,
                row["volume"].as_f64().unwrap_or(0.0),
            ));
        }
        Ok(candles)
    }
}

#[async_trait]
impl SourceAdapter for OandaAdapter {
    fn name(&self) -> &'static str {
        "oanda"
    }

    fn market_type(&self) -> MarketType {
        MarketType::Forex
    }

    async fn connect(&self) -> Result<(), AdapterError> {
        self.client()?;
        debug!(adapter = self.name(), live = self.live, "connected");
        Ok(())
    }

    async fn disconnect(&self) {
        *self.client.write() = None;
    }

    async fn supported_symbols(&self) -> Result<Vec<String>, AdapterError> {
        Ok(SUPPORTED.iter().map(|s| s.to_string()).collect())
    }

    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Candle>, AdapterError> {
        let client = self.client()?;
        self.pacer.pace().await;

        let instrument = to_instrument(symbol);
        let count = limit.min(MAX_COUNT);
        let mut url = format!(
            "{}/v3/instruments/{instrument}/candles?granularity={}&count={count}&price=M",
            self.base_url(),
            granularity(timeframe),
        );
        if let Some(since) = since {
            url = format!(
                "{}/v3/instruments/{instrument}/candles?granularity={}&from={}&price=M",
                self.base_url(),
                granularity(timeframe),
                since.to_rfc3339(),
            );
        }

        let resp = client
            .get(&url)
            .send()
            .await
            .map_err(AdapterError::from_transport)?;
        AdapterError::check_status(resp.status(), "GET /candles")?;
        let body: serde_json::Value = resp.json().await.map_err(AdapterError::from_transport)?;

        let candles = Self::parse_candles(&body)?;
        let series = CandleSeries::new(symbol, timeframe, candles);
        let mut candles = series.into_candles();
        if candles.len() > limit {
            candles.drain(..candles.len() - limit);
        }

        debug!(
            symbol,
            timeframe = %timeframe,
            rows = candles.len(),
            "oanda candles fetched"
        );
        Ok(candles)
    }
}
