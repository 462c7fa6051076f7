//! Signal providers: the unreliable outside opinions fused by the scorer.
//!
//! Every provider is independently fallible. A failure never propagates past
//! the point where the bundle is assembled: the slot is filled with its
//! neutral value and the failure is recorded in `SignalBundle::degraded`.
//!
//! - `SignalProvider`: probability of an up move (technical model, ML ensemble)
//! - `AiAdvisor`: sentiment + confidence + free-text reason
//! - `PatternMemory`: historical-pattern recall (advisory)
//! - `RlPolicy`: reinforcement-learning action (advisory)

pub mod bundle;

pub use bundle::{Degraded, SignalBundle};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::domain::{Direction, Timeframe};
use crate::features::FeatureSnapshot;
use crate::hot_swap::HotSwap;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProviderError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("not configured")]
    NotConfigured,

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("missing credentials")]
    MissingCredentials,

    #[error("invalid output: {0}")]
    InvalidOutput(String),

    #[error("provider panicked")]
    Panicked,
}

/// Which slot of the bundle a provider fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Technical,
    Ensemble,
    Ai,
    Pattern,
    Rl,
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SignalKind::Technical => "technical",
            SignalKind::Ensemble => "ensemble",
            SignalKind::Ai => "ai",
            SignalKind::Pattern => "pattern",
            SignalKind::Rl => "rl",
        };
        f.write_str(s)
    }
}

/// Probability that price moves up, and the implied class (1 = up).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub probability: f64,
    pub class: u8,
}

impl Prediction {
    pub fn neutral() -> Self {
        Self { probability: 0.5, class: 0 }
    }

    pub fn from_probability(probability: f64) -> Self {
        Self { probability, class: u8::from(probability > 0.5) }
    }

    /// Probability normalized to `direction`: p for BUY, 1 − p for SELL.
    pub fn directional(&self, direction: Direction) -> f64 {
        match direction {
            Direction::Buy => self.probability,
            Direction::Sell => 1.0 - self.probability,
        }
    }

    pub fn validate(self) -> Result<Self, ProviderError> {
        if (0.0..=1.0).contains(&self.probability) && self.class <= 1 {
            Ok(self)
        } else {
            Err(ProviderError::InvalidOutput(format!(
                "probability {} class {}",
                self.probability, self.class
            )))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Bullish,
    Bearish,
    Neutral,
}

impl Sentiment {
    /// −1, 0 or +1 relative to `direction`.
    pub fn vote(self, direction: Direction) -> f64 {
        let raw = match self {
            Sentiment::Bullish => 1.0,
            Sentiment::Bearish => -1.0,
            Sentiment::Neutral => 0.0,
        };
        raw * direction.sign()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiSignal {
    pub sentiment: Sentiment,
    /// 0–100.
    pub confidence: f64,
    pub reason: String,
}

impl AiSignal {
    pub fn neutral() -> Self {
        Self { sentiment: Sentiment::Neutral, confidence: 0.0, reason: String::new() }
    }

    /// Confident vote relative to `direction`: the sentiment's vote when
    /// confidence reaches `min_confidence`, otherwise 0.
    pub fn vote(&self, direction: Direction, min_confidence: f64) -> f64 {
        if self.confidence >= min_confidence {
            self.sentiment.vote(direction)
        } else {
            0.0
        }
    }

    pub fn validate(self) -> Result<Self, ProviderError> {
        if (0.0..=100.0).contains(&self.confidence) {
            Ok(self)
        } else {
            Err(ProviderError::InvalidOutput(format!("confidence {}", self.confidence)))
        }
    }
}

/// Closest historical pattern match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternRecall {
    pub direction: Direction,
    /// 0–1.
    pub similarity: f64,
    pub win_rate: f64,
    pub samples: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RlAction {
    Hold,
    Buy,
    Sell,
}

impl RlAction {
    pub fn direction(self) -> Option<Direction> {
        match self {
            RlAction::Hold => None,
            RlAction::Buy => Some(Direction::Buy),
            RlAction::Sell => Some(Direction::Sell),
        }
    }
}

pub trait SignalProvider: Send + Sync {
    fn name(&self) -> &str;
    fn predict(&self, features: &FeatureSnapshot) -> Result<Prediction, ProviderError>;
}

pub trait AiAdvisor: Send + Sync {
    fn analyze(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        indicators: &BTreeMap<String, f64>,
    ) -> Result<AiSignal, ProviderError>;
}

pub trait PatternMemory: Send + Sync {
    /// `None` when no stored pattern is similar enough.
    fn recall(&self, features: &FeatureSnapshot) -> Result<Option<PatternRecall>, ProviderError>;
}

pub trait RlPolicy: Send + Sync {
    fn act(&self, features: &FeatureSnapshot) -> Result<RlAction, ProviderError>;
}

/// Placeholder for a slot with no provider wired in.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unconfigured;

impl SignalProvider for Unconfigured {
    fn name(&self) -> &str {
        "unconfigured"
    }

    fn predict(&self, _: &FeatureSnapshot) -> Result<Prediction, ProviderError> {
        Err(ProviderError::NotConfigured)
    }
}

impl AiAdvisor for Unconfigured {
    fn analyze(&self, _: &str, _: Timeframe, _: &BTreeMap<String, f64>) -> Result<AiSignal, ProviderError> {
        Err(ProviderError::NotConfigured)
    }
}

impl PatternMemory for Unconfigured {
    fn recall(&self, _: &FeatureSnapshot) -> Result<Option<PatternRecall>, ProviderError> {
        Err(ProviderError::NotConfigured)
    }
}

impl RlPolicy for Unconfigured {
    fn act(&self, _: &FeatureSnapshot) -> Result<RlAction, ProviderError> {
        Err(ProviderError::NotConfigured)
    }
}

/// The live provider set. Each slot can be replaced while the bot runs.
pub struct ProviderSet {
    pub technical: HotSwap<dyn SignalProvider>,
    pub ensemble: HotSwap<dyn SignalProvider>,
    pub advisor: HotSwap<dyn AiAdvisor>,
    pub pattern: HotSwap<dyn PatternMemory>,
    pub rl: HotSwap<dyn RlPolicy>,
}

impl Default for ProviderSet {
    fn default() -> Self {
        Self {
            technical: HotSwap::new(Arc::new(Unconfigured) as Arc<dyn SignalProvider>),
            ensemble: HotSwap::new(Arc::new(Unconfigured) as Arc<dyn SignalProvider>),
            advisor: HotSwap::new(Arc::new(Unconfigured) as Arc<dyn AiAdvisor>),
            pattern: HotSwap::new(Arc::new(Unconfigured) as Arc<dyn PatternMemory>),
            rl: HotSwap::new(Arc::new(Unconfigured) as Arc<dyn RlPolicy>),
        }
    }
}

impl fmt::Debug for ProviderSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSet")
            .field("technical", &self.technical.load().name())
            .field("ensemble", &self.ensemble.load().name())
            .finish_non_exhaustive()
    }
}

impl ProviderSet {
    /// One consistent set of providers for a single scoring task.
    pub fn snapshot(&self) -> ProviderSnapshot {
        ProviderSnapshot {
            technical: self.technical.load(),
            ensemble: self.ensemble.load(),
            advisor: self.advisor.load(),
            pattern: self.pattern.load(),
            rl: self.rl.load(),
        }
    }
}

#[derive(Clone)]
pub struct ProviderSnapshot {
    pub technical: Arc<dyn SignalProvider>,
    pub ensemble: Arc<dyn SignalProvider>,
    pub advisor: Arc<dyn AiAdvisor>,
    pub pattern: Arc<dyn PatternMemory>,
    pub rl: Arc<dyn RlPolicy>,
}

impl ProviderSnapshot {
    /// Call every provider in turn on the current thread, no timeouts.
    ///
    /// The async gateway in the runner bounds each call; this path serves
    /// synchronous callers and tests.
    pub fn gather_blocking(&self, features: &FeatureSnapshot) -> SignalBundle {
        let mut bundle = SignalBundle::neutral();
        bundle.absorb_technical(self.technical.predict(features).and_then(Prediction::validate));
        bundle.absorb_ensemble(self.ensemble.predict(features).and_then(Prediction::validate));
        bundle.absorb_ai(
            self.advisor
                .analyze(&features.symbol, features.timeframe, &features.indicator_map())
                .and_then(AiSignal::validate),
        );
        bundle.absorb_pattern(self.pattern.recall(features));
        bundle.absorb_rl(self.rl.act(features));
        bundle
    }
}
