use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::Direction;
use crate::regime::Regime;

/// One input to the confluence count, or an advisory annotation.
///
/// The first six variants each contribute at most one point to the 0–6 scale.
/// `PatternMemory` and `RlPolicy` are recorded for the journal but never counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Factor {
    HigherTimeframeTrend,
    IntermediateTimeframeTrend,
    ModelProbability,
    AiAgreement,
    StructuralZone,
    TrendStrength,
    PatternMemory,
    RlPolicy,
}

impl Factor {
    /// Factors that make up the confluence count.
    pub const COUNTED: [Factor; 6] = [
        Factor::HigherTimeframeTrend,
        Factor::IntermediateTimeframeTrend,
        Factor::ModelProbability,
        Factor::AiAgreement,
        Factor::StructuralZone,
        Factor::TrendStrength,
    ];

    /// Recorded for the journal, never counted.
    pub fn is_advisory(self) -> bool {
        !Self::COUNTED.contains(&self)
    }
}

impl fmt::Display for Factor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Factor::HigherTimeframeTrend => "htf_trend",
            Factor::IntermediateTimeframeTrend => "itf_trend",
            Factor::ModelProbability => "model_probability",
            Factor::AiAgreement => "ai_agreement",
            Factor::StructuralZone => "structural_zone",
            Factor::TrendStrength => "trend_strength",
            Factor::PatternMemory => "pattern_memory",
            Factor::RlPolicy => "rl_policy",
        };
        f.write_str(s)
    }
}

/// Per-factor outcome: whether it scored a point and the raw value behind it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactorDetail {
    pub satisfied: bool,
    pub value: f64,
}

impl FactorDetail {
    pub fn new(satisfied: bool, value: f64) -> Self {
        Self { satisfied, value }
    }
}

pub type FactorMap = BTreeMap<Factor, FactorDetail>;

/// Ephemeral per-cycle trade proposal for one instrument.
///
/// Built by the agent after scoring, ranked by the scheduler, never persisted
/// (the journal stores a flattened copy of the factors on entry).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub symbol: String,
    pub direction: Direction,
    /// Technical confluence count, 0–6.
    pub confluence: u8,
    /// Weighted ensemble score in [0, 1].
    pub ensemble: f64,
    /// Model probability normalized to the candidate direction.
    pub probability: f64,
    pub factors: FactorMap,
    /// Stop distance in price units (always positive).
    pub stop_distance: f64,
    /// Target distance in price units (always positive).
    pub target_distance: f64,
    /// Regime scale applied to the risk percentage.
    pub sizing_scale: f64,
    pub regime: Regime,
    /// Close of the analyzed entry-timeframe candle.
    pub reference_price: f64,
    pub atr: f64,
    pub candle_time: DateTime<Utc>,
}

impl Candidate {
    /// Distance of the directional probability from a coin flip.
    pub fn conviction(&self) -> f64 {
        (self.probability - 0.5).abs()
    }

    /// Stop price for a fill at `entry`.
    pub fn stop_price(&self, entry: f64) -> f64 {
        self.direction.behind(entry, self.stop_distance)
    }

    /// Target price for a fill at `entry`.
    pub fn target_price(&self, entry: f64) -> f64 {
        self.direction.ahead_of(entry, self.target_distance)
    }

    /// Number of counted factors that were satisfied. Equals `confluence`.
    pub fn satisfied_factors(&self) -> impl Iterator<Item = Factor> + '_ {
        self.factors
            .iter()
            .filter(|(f, d)| !f.is_advisory() && d.satisfied)
            .map(|(f, _)| *f)
    }
}
