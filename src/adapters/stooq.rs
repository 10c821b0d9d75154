// =============================================================================
// Stooq Adapter — free daily CSV bars, the last-resort fallback
// =============================================================================
//
// No API key, no quota worth speaking of, daily granularity only. Serves
// `1d` directly and aggregates trading weeks (5 daily bars) for `1w`;
// intraday requests are refused with UnsupportedTimeframe so the fallback
// chain can move on.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use parking_lot::RwLock;
use tokio::time::Duration;
use tracing::debug;

use crate::adapters::{aggregate_candles, AdapterError, RequestPacer, SourceAdapter};
use crate::market_data::{Candle, CandleSeries};
use crate::types::{MarketType, Timeframe};

const BASE_URL: &str = "https://stooq.com/q/d/l/";

/// Canonical symbol -> stooq ticker.
const SYMBOL_MAP: [(&str, &str); 11] = [
    ("XAUUSD", "xauusd"),
    ("XAGUSD", "xagusd"),
    ("EURUSD", "eurusd"),
    ("GBPUSD", "gbpusd"),
    ("USDJPY", "usdjpy"),
    ("USDCHF", "usdchf"),
    ("AUDUSD", "audusd"),
    ("USDCAD", "usdcad"),
    ("NZDUSD", "nzdusd"),
    ("EURGBP", "eurgbp"),
    ("EURJPY", "eurjpy"),
];

fn ticker_for(symbol: &str) -> Option<&'static str> {
    let upper = symbol.to_uppercase();
    SYMBOL_MAP
        .iter()
        .find(|(s, _)| *s == upper)
        .map(|(_, t)| *t)
}

pub struct StooqAdapter {
    client: RwLock<Option<reqwest::Client>>,
    pacer: RequestPacer,
}

impl StooqAdapter {
    pub fn new() -> Self {
        Self {
            client: RwLock::new(None),
            pacer: RequestPacer::new(Duration::from_millis(500)),
        }
    }

    fn client(&self) -> Result<reqwest::Client, AdapterError> {
        if self.client.read().is_none() {
            let client = reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .map_err(AdapterError::from_transport)?;
            *self.client.write() = Some(client);
        }
        Ok(self.client.read().as_ref().cloned().unwrap())
    }

    /// Parse the stooq CSV payload: `Date,Open,High,Low,Close,Volume`
    /// (volume column absent for forex).
    fn parse_csv(text: &str) -> Result<Vec<Candle>, AdapterError> {
        let mut lines = text.lines();
        let header = lines
            .next()
            .ok_or_else(|| AdapterError::MalformedResponse("empty CSV body".into()))?;
        if !header.starts_with("Date") {
            return Err(AdapterError::MalformedResponse(format!(
                "unexpected CSV header: {header}"
            )));
        }

        let mut candles = Vec::new();
        for line in lines {
            let fields: Vec<&str> = line.split(',').collect();
            if fields.len() < 5 {
                continue;
            }

            let date = match fields[0].parse::<NaiveDate>() {
                Ok(d) => d,
                Err(_) => continue,
            };
            let parse = |s: &str| s.parse::<f64>().ok();
            let (Some(open), Some(high), Some(low), Some(close)) = (
                parse(fields[1]),
                parse(fields[2]),
                parse(fields[3]),
                parse(fields[4]),
            ) else {
                continue;
            };
            let volume = fields.get(5).and_then(|s| s.parse::<f64>().ok()).unwrap_or(0.0);

            let timestamp: DateTime<Utc> = Utc.from_utc_datetime(
                &date
                    .and_hms_opt(0, 0, 0)
                    .expect("midnight is always a valid time"),
            );
            candles.push(Candle::new(timestamp, open, high, low, close, volume));
        }

        if candles.is_empty() {
            return Err(AdapterError::MalformedResponse(
                "CSV contained no parseable rows".into(),
            ));
        }
        Ok(candles)
    }
}

impl Default for StooqAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for StooqAdapter {
    fn name(&self) -> &'static str {
        "stooq"
    }

    fn market_type(&self) -> MarketType {
        MarketType::Forex
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
        let mut symbols: Vec<String> = SYMBOL_MAP.iter().map(|(s, _)| s.to_string()).collect();
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
        // Daily bars only; weekly via trading-week aggregation.
        let weekly = match timeframe {
            Timeframe::D1 => false,
            Timeframe::W1 => true,
            other => {
                return Err(AdapterError::UnsupportedTimeframe(format!(
                    "stooq serves daily bars only, requested {other}"
                )))
            }
        };

        let ticker = ticker_for(symbol)
            .ok_or_else(|| AdapterError::UnsupportedSymbol(symbol.to_string()))?;

        let client = self.client()?;
        self.pacer.pace().await;

        let url = format!("{BASE_URL}?s={ticker}&i=d");
        let resp = client
            .get(&url)
            .send()
            .await
            .map_err(AdapterError::from_transport)?;
        AdapterError::check_status(resp.status(), "GET stooq daily CSV")?;
        let text = resp.text().await.map_err(AdapterError::from_transport)?;

        let mut candles = Self::parse_csv(&text)?;
        if let Some(since) = since {
            candles.retain(|c| c.timestamp >= since);
        }
        if weekly {
            candles = aggregate_candles(&candles, 5);
        }

        let series = CandleSeries::new(symbol, timeframe, candles);
        let mut candles = series.into_candles();
        if candles.len() > limit {
            candles.drain(..candles.len() - limit);
        }

        debug!(symbol, timeframe = %timeframe, rows = candles.len(), "stooq fetched");
        Ok(candles)
    }
}
