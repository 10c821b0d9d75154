// =============================================================================
// Signal — the central compound entity of the pipeline
// =============================================================================
//
// Created by the signal engine, mutated only by the outcome tracker (status
// and outcome fields) and the loss analyzer (loss category/analysis attach
// on loss). Level invariants: for a long signal SL < entry < TP, mirrored
// for a short; risk_reward_ratio = reward / risk.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::indicators::Classification;
use crate::types::{Bias, Direction, Regime, SignalStatus, Timeframe};

/// Why a loss happened. The seven categories of the loss-learning analyzer
/// plus a catch-all for losses matching no predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LossCategory {
    FalseBreakout,
    RegimeMismatch,
    LowConfluence,
    Overextended,
    WeakVolume,
    AgainstTrend,
    NewsEvent,
    Unknown,
}

impl std::fmt::Display for LossCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::FalseBreakout => "false_breakout",
            Self::RegimeMismatch => "regime_mismatch",
            Self::LowConfluence => "low_confluence",
            Self::Overextended => "overextended",
            Self::WeakVolume => "weak_volume",
            Self::AgainstTrend => "against_trend",
            Self::NewsEvent => "news_event",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// Full write-up of a categorized loss. The first triggered category is the
/// primary; every triggered category is kept.
#[derive(Debug, Clone, Serialize)]
pub struct LossAnalysis {
    pub category: LossCategory,
    pub all_categories: Vec<LossCategory>,
    pub detail: String,
    pub contributing_factors: serde_json::Map<String, serde_json::Value>,
    pub mfe: f64,
    pub mae: f64,
    pub analyzed_at: DateTime<Utc>,
}

/// Snapshot of one indicator's latest reading at signal time.
#[derive(Debug, Clone, Serialize)]
pub struct IndicatorSnapshot {
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary: Option<f64>,
    pub classification: Classification,
    /// Tri-state signal the scorer derived for this indicator.
    pub signal: Bias,
}

/// The evidence that produced a signal.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SignalReasons {
    pub bullish_indicators: Vec<String>,
    pub bearish_indicators: Vec<String>,
    pub confluence_count: usize,
    pub ml_agrees: bool,
    pub regime_compatible: bool,
    pub loss_filter_applied: bool,
    pub atr_value: f64,
}

/// A generated trade signal with entry/SL/TP levels, confidence scoring,
/// outcome tracking, and loss-learning attachments.
#[derive(Debug, Clone, Serialize)]
pub struct Signal {
    /// Store-assigned, globally monotonic. Zero until saved.
    pub id: u64,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub direction: Direction,
    pub status: SignalStatus,

    // Levels.
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub risk_reward_ratio: f64,

    // Quality.
    pub confidence: f64,
    pub composite_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ml_confidence: Option<f64>,
    pub regime_at_signal: Regime,

    // Snapshots.
    pub signal_reasons: SignalReasons,
    pub indicator_snapshot: BTreeMap<String, IndicatorSnapshot>,
    pub mtf_confluence: bool,
    pub agreeing_timeframes: Vec<Timeframe>,

    // Outcome.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome_pnl: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome_pnl_pct: Option<f64>,
    /// Maximum favorable excursion since activation. Never decreases.
    pub max_favorable: f64,
    /// Maximum adverse excursion since activation. Never decreases.
    pub max_adverse: f64,

    // Loss learning.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loss_category: Option<LossCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loss_analysis: Option<LossAnalysis>,

    // Timestamps.
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub triggered_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
}

impl Signal {
    /// Check the level invariants for this signal's direction.
    pub fn levels_coherent(&self) -> bool {
        let ordered = match self.direction {
            Direction::Long => self.stop_loss < self.entry_price && self.entry_price < self.take_profit,
            Direction::Short => self.stop_loss > self.entry_price && self.entry_price > self.take_profit,
        };
        let risk = (self.entry_price - self.stop_loss).abs();
        let reward = (self.take_profit - self.entry_price).abs();
        ordered && risk > 0.0 && (reward / risk - self.risk_reward_ratio).abs() < 0.02
    }

    /// Snapshot value of one indicator, if present.
    pub fn snapshot_value(&self, indicator: &str) -> Option<f64> {
        self.indicator_snapshot.get(indicator).map(|s| s.value)
    }

    /// Snapshot classification of one indicator, if present.
    pub fn snapshot_classification(&self, indicator: &str) -> Option<Classification> {
        self.indicator_snapshot.get(indicator).map(|s| s.classification)
    }
}
