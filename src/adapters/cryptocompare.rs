// =============================================================================
// CryptoCompare Adapter — crypto OHLCV fallback (minute/hour/day endpoints)
// =============================================================================
//
// Works where Binance is geo-blocked. Free tier allows 50K calls/month
// without a key, 100K with one (`CRYPTOCOMPARE_API_KEY`). Timeframes the
// API lacks natively are served by fetching finer bars and aggregating.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::RwLock;
use tokio::time::Duration;
use tracing::debug;

use crate::adapters::{aggregate_candles, AdapterError, RequestPacer, SourceAdapter, Ticker};
use crate::market_data::{Candle, CandleSeries};
use crate::types::{MarketType, Timeframe};

const BASE_URL: &str = "https://min-api.cryptocompare.com/data";

/// API maximum rows per histo* request.
const MAX_ROWS: usize = 2000;

/// (fsym, tsym) pairs served by this adapter.
const SYMBOL_MAP: [(&str, &str, &str); 5] = [
    ("BTCUSD", "BTC", "USD"),
    ("ETHUSD", "ETH", "USD"),
    ("SOLUSD", "SOL", "USD"),
    ("XRPUSD", "XRP", "USD"),
    ("ETHBTC", "ETH", "BTC"),
];

fn pair_for(symbol: &str) -> Option<(&'static str, &'static str)> {
    let upper = symbol.to_uppercase();
    SYMBOL_MAP
        .iter()
        .find(|(s, _, _)| *s == upper)
        .map(|(_, f, t)| (*f, *t))
}

/// (endpoint, aggregation factor): factor > 1 fetches finer bars and
/// aggregates client-side.
fn timeframe_config(timeframe: Timeframe) -> (&'static str, usize) {
    use Timeframe::*;
    match timeframe {
        M1 => ("histominute", 1),
        M5 => ("histominute", 5),
        M15 => ("histominute", 15),
        M30 => ("histominute", 30),
        H1 => ("histohour", 1),
        H4 => ("histohour", 4),
        D1 => ("histoday", 1),
        W1 => ("histoday", 7),
        Mo1 => ("histoday", 30),
    }
}

pub struct CryptoCompareAdapter {
    api_key: Option<String>,
    client: RwLock<Option<reqwest::Client>>,
    pacer: RequestPacer,
}

impl CryptoCompareAdapter {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key,
            client: RwLock::new(None),
            pacer: RequestPacer::new(Duration::from_millis(500)),
        }
    }

    /// Construct from the `CRYPTOCOMPARE_API_KEY` environment variable.
    pub fn from_env() -> Self {
        Self::new(std::env::var("CRYPTOCOMPARE_API_KEY").ok().filter(|k| !k.is_empty()))
    }

    fn client(&self) -> Result<reqwest::Client, AdapterError> {
        if self.client.read().is_none() {
            let mut headers = reqwest::header::HeaderMap::new();
            if let Some(key) = &self.api_key {
                if let Ok(value) =
                    reqwest::header::HeaderValue::from_str(&format!("Apikey {key}"))
                {
                    headers.insert("authorization", value);
                }
            }
            let client = reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .default_headers(headers)
                .build()
                .map_err(AdapterError::from_transport)?;
            *self.client.write() = Some(client);
        }
        Ok(self.client.read().as_ref().cloned().unwrap())
    }

    fn parse_rows(body: &serde_json::Value) -> Result<Vec<Candle>, AdapterError> {
        if body["Response"].as_str() == Some("Error") {
            let message = body["Message"].as_str().unwrap_or("unknown error");
            if message.to_lowercase().contains("rate limit") {
                return Err(AdapterError::RateLimited(message.into()));
            }
            return Err(AdapterError::MalformedResponse(message.into()));
        }

        let rows = body["Data"]["Data"]
            .as_array()
            .ok_or_else(|| AdapterError::MalformedResponse("missing Data.Data array".into()))?;

        let mut candles = Vec::with_capacity(rows.len());
        for row in rows {
            let time = row["time"]
                .as_i64()
                .ok_or_else(|| AdapterError::MalformedResponse("row missing time".into()))?;
            let timestamp = Utc
                .timestamp_opt(time, 0)
                .single()
                .ok_or_else(|| AdapterError::MalformedResponse("time out of range".into()))?;

            let get = |field: &str| -> Result<f64, AdapterError> {
                row[field].as_f64().ok_or_else(|| {
                    AdapterError::MalformedResponse(format!("row missing {field}"))
                })
            };

            let candle = Candle::new(
                timestamp,
                get("open")?,
                get("high")?,
                get("low")?,
                get("close")?,
                get("volumefrom")?,
            );
            // The API pads gaps with zero rows; drop them.
            if candle.open > 0.0 || candle.close > 0.0 {
                candles.push(candle);
            }
        }
        Ok(candles)
    }
}

#[async_trait]
impl SourceAdapter for CryptoCompareAdapter {
    fn name(&self) -> &'static str {
        "cryptocompare"
    }

    fn market_type(&self) -> MarketType {
        MarketType::Crypto
    }

    async fn connect(&self) -> Result<(), AdapterError> {
        self.client()?;
        debug!(adapter = self.name(), "connected");
        Ok(())
    }

    async fn disconnect(&self) {
        *self.client.write() = None;
    }

    async fn supported_symbols(&self) -> Result<Vec<String>, AdapterError> {
        let mut symbols: Vec<String> =
            SYMBOL_MAP.iter().map(|(s, _, _)| s.to_string()).collect();
        symbols.sort();
        Ok(symbols)
    }

    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Candle>, AdapterError> {
        let (fsym, tsym) = pair_for(symbol)
            .ok_or_else(|| AdapterError::UnsupportedSymbol(symbol.to_string()))?;
        let (endpoint, factor) = timeframe_config(timeframe);

        let client = self.client()?;
        self.pacer.pace().await;

        // Fetch enough raw bars to produce `limit` aggregated bars.
        let raw_limit = (limit * factor).min(MAX_ROWS);
        let mut url = format!(
            "{BASE_URL}/v2/{endpoint}?fsym={fsym}&tsym={tsym}&limit={raw_limit}"
        );
        if let Some(since) = since {
            // toTs bounds the window's end; shift it so the raw window
            // starts near `since`. Raw bar width depends on the endpoint.
            let unit_secs: i64 = match endpoint {
                "histominute" => 60,
                "histohour" => 3_600,
                _ => 86_400,
            };
            let span = raw_limit as i64 * unit_secs;
            url.push_str(&format!("&toTs={}", since.timestamp() + span));
        }

        let resp = client
            .get(&url)
            .send()
            .await
            .map_err(AdapterError::from_transport)?;
        AdapterError::check_status(resp.status(), endpoint)?;
        let body: serde_json::Value = resp.json().await.map_err(AdapterError::from_transport)?;

        let mut candles = Self::parse_rows(&body)?;
        if factor > 1 {
            candles = aggregate_candles(&candles, factor);
        }

        let series = CandleSeries::new(symbol, timeframe, candles);
        let mut candles = series.into_candles();
        if candles.len() > limit {
            candles.drain(..candles.len() - limit);
        }

        debug!(
            symbol,
            timeframe = %timeframe,
            rows = candles.len(),
            "cryptocompare fetched"
        );
        Ok(candles)
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker, AdapterError> {
        let (fsym, tsym) = pair_for(symbol)
            .ok_or_else(|| AdapterError::UnsupportedSymbol(symbol.to_string()))?;

        let client = self.client()?;
        self.pacer.pace().await;

        let url = format!("{BASE_URL}/pricemultifull?fsyms={fsym}&tsyms={tsym}");
        let resp = client
            .get(&url)
            .send()
            .await
            .map_err(AdapterError::from_transport)?;
        AdapterError::check_status(resp.status(), "pricemultifull")?;
        let body: serde_json::Value = resp.json().await.map_err(AdapterError::from_transport)?;

        let raw = &body["RAW"][fsym][tsym];
        if raw.is_null() {
            return Err(AdapterError::MalformedResponse(format!(
                "no ticker data for {symbol}"
            )));
        }

        Ok(Ticker {
            symbol: symbol.to_uppercase(),
            price: raw["PRICE"].as_f64().unwrap_or(0.0),
            change_pct: raw["CHANGEPCT24HOUR"].as_f64().unwrap_or(0.0),
            high_24h: raw["HIGH24HOUR"].as_f64().unwrap_or(0.0),
            low_24h: raw["LOW24HOUR"].as_f64().unwrap_or(0.0),
            volume_24h: raw["VOLUME24HOUR"].as_f64().unwrap_or(0.0),
        })
    }
}
