// =============================================================================
// Indicator Engine — deterministic technical + smart-money indicators
// =============================================================================
//
// Every indicator is a pure function of one candle series: same input, same
// output, no state across calls. Results carry a normalized classification
// label (a closed enum, not free-form strings) plus optional divergence and
// crossover markers; the signal engine derives its tri-state bias from those
// three fields.
//
// The catalog is assembled explicitly at startup — no runtime discovery.

pub mod ad_line;
pub mod atr;
pub mod bollinger;
pub mod candle_patterns;
pub mod key_levels;
pub mod macd;
pub mod math;
pub mod moving_averages;
pub mod obv;
pub mod rsi;
pub mod session_analysis;
pub mod smart_money;
pub mod stochastic_rsi;
pub mod volume_spike;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::market_data::CandleSeries;

pub use crate::types::Bias;

/// Division-by-zero guard used throughout the indicator math.
pub(crate) const EPS: f64 = 1e-10;

/// Normalized classification labels across the whole catalog. Each indicator
/// emits only its own subset; the engine maps every label to a tri-state
/// bias via [`Classification::bias`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    #[default]
    Neutral,
    // volume_spike
    Accumulation,
    Distribution,
    NeutralHighVolume,
    // rsi / stochastic_rsi
    Overbought,
    Oversold,
    BullishMomentum,
    BearishMomentum,
    BullishReversal,
    BearishReversal,
    // macd
    BullishWeakening,
    BearishWeakening,
    // bollinger_bands
    AboveUpperBand,
    NearUpperBand,
    WithinBands,
    NearLowerBand,
    BelowLowerBand,
    Squeeze,
    // moving_averages
    StrongUptrend,
    Uptrend,
    Downtrend,
    StrongDowntrend,
    BullishEmaCrossover,
    BearishEmaCrossover,
    // atr
    HighVolatility,
    RisingVolatility,
    NormalVolatility,
    FallingVolatility,
    LowVolatility,
    // smart_money
    StrongBullishReversal,
    BullishContinuation,
    BullishStructure,
    BearishStructure,
    BearishContinuation,
    StrongBearishReversal,
    // key_levels
    AtSupport,
    AtResistance,
    BullishRoom,
    BearishRoom,
    BetweenLevels,
    // session_analysis
    StrongBullishSessions,
    StrongBearishSessions,
    BullishSession,
    BearishSession,
    // candle_patterns
    Bullish,
    Bearish,
}

impl Classification {
    /// Tri-state bias of the label. This is the keyword catalog of the
    /// scorer, folded into a match: accumulation/oversold/uptrend/at-support
    /// style labels read bullish, their mirrors read bearish, everything
    /// else (bands, volatility states, squeezes) reads neutral.
    pub fn bias(&self) -> Bias {
        use Classification::*;
        match self {
            Accumulation | Oversold | BullishMomentum | BullishWeakening | BullishReversal
            | StrongUptrend | Uptrend | BullishEmaCrossover | StrongBullishReversal
            | BullishContinuation | BullishStructure | AtSupport | BullishRoom
            | StrongBullishSessions | BullishSession | Bullish => Bias::Bullish,

            Distribution | Overbought | BearishMomentum | BearishWeakening | BearishReversal
            | Downtrend | StrongDowntrend | BearishEmaCrossover | StrongBearishReversal
            | BearishContinuation | BearishStructure | AtResistance | BearishRoom
            | StrongBearishSessions | BearishSession | Bearish => Bias::Bearish,

            _ => Bias::Neutral,
        }
    }
}

/// Price/indicator divergence over the lookback window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Divergence {
    BullishDivergence,
    BearishDivergence,
}

impl Divergence {
    pub fn bias(&self) -> Bias {
        match self {
            Self::BullishDivergence => Bias::Bullish,
            Self::BearishDivergence => Bias::Bearish,
        }
    }
}

/// Line-crossing event at the emitting bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Crossover {
    BullishCrossover,
    BearishCrossover,
    GoldenCross,
    DeathCross,
}

impl Crossover {
    pub fn bias(&self) -> Bias {
        match self {
            Self::BullishCrossover | Self::GoldenCross => Bias::Bullish,
            Self::BearishCrossover | Self::DeathCross => Bias::Bearish,
        }
    }
}

/// Structured metadata attached to every indicator result. The typed fields
/// drive scoring; `details` carries indicator-specific values (band levels,
/// pivots, pattern names) for snapshots and notifications.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndicatorMeta {
    pub classification: Classification,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub divergence: Option<Divergence>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crossover: Option<Crossover>,
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    pub details: serde_json::Map<String, serde_json::Value>,
}

impl IndicatorMeta {
    pub fn classified(classification: Classification) -> Self {
        Self {
            classification,
            ..Default::default()
        }
    }

    pub fn detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

/// Standard output from any indicator calculation.
#[derive(Debug, Clone, Serialize)]
pub struct IndicatorResult {
    pub name: &'static str,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_value: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub meta: IndicatorMeta,
}

/// Contract every indicator implements. `calculate` is deterministic and
/// returns an empty list (never an error) on insufficient history.
pub trait Indicator: Send + Sync {
    fn name(&self) -> &'static str;
    fn calculate(&self, series: &CandleSeries) -> Vec<IndicatorResult>;
}

// =============================================================================
// IndicatorEngine
// =============================================================================

/// Explicit lookup map of the indicator catalog, constructed at init.
pub struct IndicatorEngine {
    indicators: BTreeMap<&'static str, Box<dyn Indicator>>,
}

impl IndicatorEngine {
    pub fn new() -> Self {
        Self {
            indicators: BTreeMap::new(),
        }
    }

    /// The full production catalog of thirteen indicators.
    pub fn with_default_catalog() -> Self {
        let mut engine = Self::new();
        engine.register(Box::new(volume_spike::VolumeSpike::default()));
        engine.register(Box::new(obv::Obv::default()));
        engine.register(Box::new(ad_line::AdLine::default()));
        engine.register(Box::new(rsi::Rsi::default()));
        engine.register(Box::new(macd::Macd::default()));
        engine.register(Box::new(bollinger::BollingerBands::default()));
        engine.register(Box::new(moving_averages::MovingAverages));
        engine.register(Box::new(atr::Atr::default()));
        engine.register(Box::new(stochastic_rsi::StochasticRsi::default()));
        engine.register(Box::new(smart_money::SmartMoney::default()));
        engine.register(Box::new(key_levels::KeyLevels::default()));
        engine.register(Box::new(session_analysis::SessionAnalysis));
        engine.register(Box::new(candle_patterns::CandlePatterns));
        engine
    }

    pub fn register(&mut self, indicator: Box<dyn Indicator>) {
        self.indicators.insert(indicator.name(), indicator);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Indicator> {
        self.indicators.get(name).map(|b| b.as_ref())
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.indicators.keys().copied().collect()
    }

    /// Run every registered indicator on the series. The map iterates in
    /// name order, so downstream scoring is deterministic.
    pub fn calculate_all(&self, series: &CandleSeries) -> BTreeMap<&'static str, Vec<IndicatorResult>> {
        self.indicators
            .iter()
            .map(|(name, indicator)| (*name, indicator.calculate(series)))
            .collect()
    }
}

impl Default for IndicatorEngine {
    fn default() -> Self {
        Self::with_default_catalog()
    }
}
