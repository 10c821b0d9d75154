// =============================================================================
// Shared types used across the Meridian market-intelligence engine
// =============================================================================

use serde::{Deserialize, Serialize};

/// Market class an asset belongs to. Drives adapter routing, threshold
/// selection, and per-class scan timeframes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketType {
    Forex,
    Crypto,
    Commodity,
    Index,
    Equity,
}

impl std::fmt::Display for MarketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Forex => write!(f, "forex"),
            Self::Crypto => write!(f, "crypto"),
            Self::Commodity => write!(f, "commodity"),
            Self::Index => write!(f, "index"),
            Self::Equity => write!(f, "equity"),
        }
    }
}

/// Candle bar width. The enumeration is closed: adapters translate these to
/// their provider-native granularity and must reject anything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
    #[serde(rename = "1w")]
    W1,
    #[serde(rename = "1M")]
    Mo1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 9] = [
        Self::M1,
        Self::M5,
        Self::M15,
        Self::M30,
        Self::H1,
        Self::H4,
        Self::D1,
        Self::W1,
        Self::Mo1,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::M1 => "1m",
            Self::M5 => "5m",
            Self::M15 => "15m",
            Self::M30 => "30m",
            Self::H1 => "1h",
            Self::H4 => "4h",
            Self::D1 => "1d",
            Self::W1 => "1w",
            Self::Mo1 => "1M",
        }
    }

    /// Bar width in minutes.
    pub fn minutes(&self) -> i64 {
        match self {
            Self::M1 => 1,
            Self::M5 => 5,
            Self::M15 => 15,
            Self::M30 => 30,
            Self::H1 => 60,
            Self::H4 => 240,
            Self::D1 => 1440,
            Self::W1 => 10_080,
            Self::Mo1 => 43_200,
        }
    }

    /// Signal expiry window in minutes — roughly twelve bars to develop,
    /// with a flat fallback for the slow timeframes.
    pub fn expiry_minutes(&self) -> i64 {
        match self {
            Self::M1 => 15,
            Self::M5 => 60,
            Self::M15 => 180,
            Self::M30 => 360,
            Self::H1 => 600,
            Self::H4 => 1440,
            Self::D1 => 2880,
            _ => 120,
        }
    }

    /// True for bars narrower than a day.
    pub fn is_intraday(&self) -> bool {
        self.minutes() < Self::D1.minutes()
    }
}

impl std::str::FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|tf| tf.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown timeframe: {s}"))
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Trade direction of an emitted signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Long,
    Short,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "long"),
            Self::Short => write!(f, "short"),
        }
    }
}

/// Tri-state reading derived from an indicator result, an ML prediction, or
/// a session bias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bias {
    Bullish,
    Bearish,
    Neutral,
}

impl std::fmt::Display for Bias {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bullish => write!(f, "bullish"),
            Self::Bearish => write!(f, "bearish"),
            Self::Neutral => write!(f, "neutral"),
        }
    }
}

/// Signal lifecycle. Transitions are one-way and owned exclusively by the
/// outcome tracker: pending → active → {win | loss}, or pending → expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalStatus {
    Pending,
    Active,
    Win,
    Loss,
    Expired,
}

impl SignalStatus {
    /// Whether `self → next` is a legal lifecycle transition.
    pub fn can_transition_to(&self, next: SignalStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Active)
                | (Self::Pending, Self::Expired)
                | (Self::Active, Self::Win)
                | (Self::Active, Self::Loss)
        )
    }

    /// Win or loss — the signal has a final outcome.
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Win | Self::Loss)
    }

    /// Pending or active — the outcome tracker still watches this signal.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::Active)
    }
}

impl std::fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Active => write!(f, "active"),
            Self::Win => write!(f, "win"),
            Self::Loss => write!(f, "loss"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

/// Coarse market-state label from the regime classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    TrendingUp,
    TrendingDown,
    Ranging,
    VolatileBreakout,
    Unknown,
}

impl std::fmt::Display for Regime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TrendingUp => write!(f, "trending_up"),
            Self::TrendingDown => write!(f, "trending_down"),
            Self::Ranging => write!(f, "ranging"),
            Self::VolatileBreakout => write!(f, "volatile_breakout"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Tradeable instrument. Symbol is canonical upper-case and is the sole key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub symbol: String,
    pub name: String,
    pub market_type: MarketType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange: Option<String>,
    pub base_currency: String,
    pub quote_currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
}

impl Asset {
    /// Build an asset record with the symbol normalized to upper-case and
    /// base/quote split on the 3-letter convention where applicable.
    pub fn new(symbol: &str, name: &str, market_type: MarketType) -> Self {
        let symbol = symbol.to_uppercase();
        let (base, quote) = if symbol.len() == 6 && symbol.chars().all(|c| c.is_ascii_alphabetic())
        {
            (symbol[..3].to_string(), symbol[3..].to_string())
        } else {
            (symbol.clone(), "USD".to_string())
        };
        Self {
            symbol,
            name: name.to_string(),
            market_type,
            exchange: None,
            base_currency: base,
            quote_currency: quote,
            config: None,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeframe_roundtrip_str() {
        for tf in Timeframe::ALL {
            let parsed: Timeframe = tf.as_str().parse().unwrap();
            assert_eq!(parsed, tf);
        }
    }

    #[test]
    fn timeframe_rejects_unknown() {
        assert!("7m".parse::<Timeframe>().is_err());
    }

    #[test]
    fn timeframe_serde_uses_short_names() {
        let json = serde_json::to_string(&Timeframe::M5).unwrap();
        assert_eq!(json, "\"5m\"");
        let tf: Timeframe = serde_json::from_str("\"1d\"").unwrap();
        assert_eq!(tf, Timeframe::D1);
    }

    #[test]
    fn expiry_windows_match_policy() {
        assert_eq!(Timeframe::M1.expiry_minutes(), 15);
        assert_eq!(Timeframe::M5.expiry_minutes(), 60);
        assert_eq!(Timeframe::M15.expiry_minutes(), 180);
        assert_eq!(Timeframe::M30.expiry_minutes(), 360);
        assert_eq!(Timeframe::H1.expiry_minutes(), 600);
        assert_eq!(Timeframe::H4.expiry_minutes(), 1440);
        assert_eq!(Timeframe::D1.expiry_minutes(), 2880);
        // Unlisted timeframes fall back to two hours.
        assert_eq!(Timeframe::W1.expiry_minutes(), 120);
    }

    #[test]
    fn intraday_classification() {
        assert!(Timeframe::M5.is_intraday());
        assert!(Timeframe::H4.is_intraday());
        assert!(!Timeframe::D1.is_intraday());
        assert!(!Timeframe::W1.is_intraday());
    }

    #[test]
    fn status_transitions_one_way() {
        use SignalStatus::*;
        assert!(Pending.can_transition_to(Active));
        assert!(Pending.can_transition_to(Expired));
        assert!(Active.can_transition_to(Win));
        assert!(Active.can_transition_to(Loss));

        assert!(!Pending.can_transition_to(Win));
        assert!(!Pending.can_transition_to(Loss));
        assert!(!Active.can_transition_to(Expired));
        assert!(!Win.can_transition_to(Loss));
        assert!(!Loss.can_transition_to(Active));
        assert!(!Expired.can_transition_to(Active));
    }

    #[test]
    fn asset_splits_forex_pair() {
        let a = Asset::new("eurusd", "Euro / US Dollar", MarketType::Forex);
        assert_eq!(a.symbol, "EURUSD");
        assert_eq!(a.base_currency, "EUR");
        assert_eq!(a.quote_currency, "USD");
    }
}
