// =============================================================================
// Binance Adapter — crypto OHLCV via public REST endpoints
// =============================================================================
//
// No API key required for market data. Klines arrive as arrays of arrays
// with numeric fields encoded as strings:
//   [0] openTime, [1] open, [2] high, [3] low, [4] close, [5] volume, ...
//
// Pagination walks backwards in batches of 1000 until `limit` candles are
// collected or the exchange runs out of history. Gold is served through the
// PAXG token (1:1 gold backing).

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::RwLock;
use tokio::time::Duration;
use tracing::{debug, warn};

use crate::adapters::{
    AdapterError, OrderBook, OrderBookLevel, RequestPacer, SourceAdapter, Ticker,
};
use crate::market_data::{Candle, CandleSeries};
use crate::types::{MarketType, Timeframe};

const REST_URL: &str = "https://api.binance.com/api/v3";

/// Exchange maximum candles per klines request.
const PAGE_SIZE: usize = 1000;

/// Special symbol mappings (canonical symbol -> Binance symbol).
fn to_binance_symbol(symbol: &str) -> String {
    let symbol = symbol.to_uppercase();
    match symbol.as_str() {
        // Gold via PAX Gold token; no silver token exists, PAXG is the
        // closest proxy.
        "XAUUSD" | "XAGUSD" => "PAXGUSDT".to_string(),
        _ if symbol.ends_with("USD") && !symbol.ends_with("USDT") => format!("{symbol}T"),
        _ => symbol,
    }
}

pub struct BinanceAdapter {
    client: RwLock<Option<reqwest::Client>>,
    pacer: RequestPacer,
}

impl BinanceAdapter {
    pub fn new() -> Self {
        Self {
            client: RwLock::new(None),
            pacer: RequestPacer::new(Duration::from_millis(250)),
        }
    }

    fn client(&self) -> Result<reqwest::Client, AdapterError> {
        // Lazy connect: fetch paths build the client on first use.
        if self.client.read().is_none() {
            let client = reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(15))
                .build()
                .map_err(AdapterError::from_transport)?;
            *self.client.write() = Some(client);
        }
        Ok(self.client.read().as_ref().cloned().unwrap())
    }

    /// Binance encodes kline numbers as JSON strings.
    fn parse_str_f64(value: &serde_json::Value, field: &str) -> Result<f64, AdapterError> {
        match value {
            serde_json::Value::String(s) => s.parse::<f64>().map_err(|_| {
                AdapterError::MalformedResponse(format!("field {field} not parseable: {s}"))
            }),
            serde_json::Value::Number(n) => n.as_f64().ok_or_else(|| {
                AdapterError::MalformedResponse(format!("field {field} not a valid f64"))
            }),
            _ => Err(AdapterError::MalformedResponse(format!(
                "field {field} has unexpected type"
            ))),
        }
    }

    fn parse_klines(raw: &serde_json::Value) -> Result<Vec<Candle>, AdapterError> {
        let rows = raw
            .as_array()
            .ok_or_else(|| AdapterError::MalformedResponse("klines response not an array".into()))?;

        let mut candles = Vec::with_capacity(rows.len());
        for entry in rows {
            let arr = entry.as_array().ok_or_else(|| {
                AdapterError::MalformedResponse("kline entry not an array".into())
            })?;
            if arr.len() < 6 {
                warn!(len = arr.len(), "skipping malformed kline entry");
                continue;
            }

            let open_time = arr[0]
                .as_i64()
                .ok_or_else(|| AdapterError::MalformedResponse("openTime not an i64".into()))?;
            let timestamp = Utc
                .timestamp_millis_opt(open_time)
                .single()
                .ok_or_else(|| AdapterError::MalformedResponse("openTime out of range".into()))?;

            candles.push(Candle::new(
                timestamp,
                Self::parse_str_f64(&arr[1], "open")?,
                Self::parse_str_f64(&arr[2], "high")?,
                Self::parse_str_f64(&arr[3], "low")?,
                Self::parse_str_f64(&arr[4], "close")?,
                Self::parse_str_f64(&arr[5], "volume")?,
            ));
        }
        Ok(candles)
    }
}

impl Default for BinanceAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for BinanceAdapter {
    fn name(&self) -> &'static str {
        "binance"
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
        let client = self.client()?;
        self.pacer.pace().await;

        let resp = client
            .get(format!("{REST_URL}/exchangeInfo"))
            .send()
            .await
            .map_err(AdapterError::from_transport)?;
        AdapterError::check_status(resp.status(), "GET /exchangeInfo")?;

        let body: serde_json::Value = resp.json().await.map_err(AdapterError::from_transport)?;
        let symbols = body["symbols"]
            .as_array()
            .ok_or_else(|| AdapterError::MalformedResponse("missing symbols array".into()))?
            .iter()
            .filter(|s| s["status"].as_str() == Some("TRADING"))
            .filter_map(|s| s["symbol"].as_str().map(str::to_string))
            .collect();
        Ok(symbols)
    }

    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Candle>, AdapterError> {
        let client = self.client()?;
        let binance_symbol = to_binance_symbol(symbol);
        let interval = timeframe.as_str();

        let mut all: Vec<Candle> = Vec::new();
        let mut remaining = limit;
        let mut end_time: Option<i64> = None;

        // Paginate backwards until enough candles or no more history.
        while remaining > 0 {
            self.pacer.pace().await;
            let batch = remaining.min(PAGE_SIZE);

            let mut url = format!(
                "{REST_URL}/klines?symbol={binance_symbol}&interval={interval}&limit={batch}"
            );
            if let (Some(since), None) = (since, end_time) {
                url.push_str(&format!("&startTime={}", since.timestamp_millis()));
            }
            if let Some(end) = end_time {
                url.push_str(&format!("&endTime={end}"));
            }

            let resp = client
                .get(&url)
                .send()
                .await
                .map_err(AdapterError::from_transport)?;
            AdapterError::check_status(resp.status(), "GET /klines")?;
            let body: serde_json::Value =
                resp.json().await.map_err(AdapterError::from_transport)?;

            let mut page = Self::parse_klines(&body)?;
            if page.is_empty() {
                break;
            }
            let got = page.len();

            // Next page ends just before the earliest candle of this one.
            end_time = Some(page[0].timestamp.timestamp_millis() - 1);

            page.extend(all);
            all = page;
            remaining = remaining.saturating_sub(got);

            if got < batch {
                break; // No more history available.
            }
        }

        debug!(
            symbol,
            interval,
            count = all.len(),
            "binance klines fetched"
        );

        // Dedup, sort, trim through the series invariants.
        let series = CandleSeries::new(symbol, timeframe, all);
        let mut candles = series.into_candles();
        if candles.len() > limit {
            candles.drain(..candles.len() - limit);
        }
        Ok(candles)
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker, AdapterError> {
        let client = self.client()?;
        self.pacer.pace().await;

        let binance_symbol = to_binance_symbol(symbol);
        let url = format!("{REST_URL}/ticker/24hr?symbol={binance_symbol}");
        let resp = client
            .get(&url)
            .send()
            .await
            .map_err(AdapterError::from_transport)?;
        AdapterError::check_status(resp.status(), "GET /ticker/24hr")?;
        let body: serde_json::Value = resp.json().await.map_err(AdapterError::from_transport)?;

        Ok(Ticker {
            symbol: symbol.to_uppercase(),
            price: Self::parse_str_f64(&body["lastPrice"], "lastPrice")?,
            change_pct: Self::parse_str_f64(&body["priceChangePercent"], "priceChangePercent")?,
            high_24h: Self::parse_str_f64(&body["highPrice"], "highPrice")?,
            low_24h: Self::parse_str_f64(&body["lowPrice"], "lowPrice")?,
            volume_24h: Self::parse_str_f64(&body["volume"], "volume")?,
        })
    }

    async fn fetch_orderbook(
        &self,
        symbol: &str,
        depth: usize,
    ) -> Result<OrderBook, AdapterError> {
        let client = self.client()?;
        self.pacer.pace().await;

        let binance_symbol = to_binance_symbol(symbol);
        let url = format!(
            "{REST_URL}/depth?symbol={binance_symbol}&limit={}",
            depth.min(1000)
        );
        let resp = client
            .get(&url)
            .send()
            .await
            .map_err(AdapterError::from_transport)?;
        AdapterError::check_status(resp.status(), "GET /depth")?;
        let body: serde_json::Value = resp.json().await.map_err(AdapterError::from_transport)?;

        let parse_side = |key: &str| -> Result<Vec<OrderBookLevel>, AdapterError> {
            body[key]
                .as_array()
                .ok_or_else(|| AdapterError::MalformedResponse(format!("missing {key}")))?
                .iter()
                .map(|level| {
                    let arr = level.as_array().ok_or_else(|| {
                        AdapterError::MalformedResponse("depth level not an array".into())
                    })?;
                    Ok(OrderBookLevel {
                        price: Self::parse_str_f64(&arr[0], "price")?,
                        quantity: Self::parse_str_f64(&arr[1], "quantity")?,
                    })
                })
                .collect()
        };

        Ok(OrderBook {
            symbol: symbol.to_uppercase(),
            timestamp: Utc::now(),
            bids: parse_side("bids")?,
            asks: parse_side("asks")?,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn symbol_mapping() {
        assert_eq!(to_binance_symbol("BTCUSD"), "BTCUSDT");
        assert_eq!(to_binance_symbol("ethusd"), "ETHUSDT");
        assert_eq!(to_binance_symbol("XAUUSD"), "PAXGUSDT");
        assert_eq!(to_binance_symbol("XAGUSD"), "PAXGUSDT");
        assert_eq!(to_binance_symbol("BTCUSDT"), "BTCUSDT");
        assert_eq!(to_binance_symbol("ETHBTC"), "ETHBTC");
    }

    #[test]
    fn parse_klines_happy_path() {
        let raw = json!([
            [1700000000000_i64, "37000.0", "37100.0", "36900.0", "37050.0", "123.4", 0, "0", 0, "0", "0", "0"],
            [1700000060000_i64, "37050.0", "37200.0", "37000.0", "37150.0", "98.7", 0, "0", 0, "0", "0", "0"]
        ]);
        let candles = BinanceAdapter::parse_klines(&raw).unwrap();
        assert_eq!(candles.len(), 2);
        assert!((candles[0].open - 37000.0).abs() < 1e-9);
        assert!((candles[1].close - 37150.0).abs() < 1e-9);
        assert!(candles[0].timestamp < candles[1].timestamp);
    }

    #[test]
    fn parse_klines_rejects_non_array() {
        let raw = json!({"code": -1121, "msg": "Invalid symbol."});
        assert!(matches!(
            BinanceAdapter::parse_klines(&raw),
            Err(AdapterError::MalformedResponse(_))
        ));
    }

    #[test]
    fn parse_klines_skips_short_entries() {
        let raw = json!([[1700000000000_i64, "1.0"]]);
        let candles = BinanceAdapter::parse_klines(&raw).unwrap();
        assert!(candles.is_empty());
    }

    #[test]
    fn parse_str_f64_accepts_both_encodings() {
        assert_eq!(
            BinanceAdapter::parse_str_f64(&json!("1.25"), "x").unwrap(),
            1.25
        );
        assert_eq!(BinanceAdapter::parse_str_f64(&json!(2.5), "x").unwrap(), 2.5);
        assert!(BinanceAdapter::parse_str_f64(&json!(null), "x").is_err());
        assert!(BinanceAdapter::parse_str_f64(&json!("abc"), "x").is_err());
    }
}
