//! Confluence count and ensemble score.
//!
//! Both directions are scored from the same inputs; the candidate direction is
//! the one with the higher confluence, then the higher ensemble score, then
//! the side the model probability leans to. Pure: the same features and
//! signals always give bit-identical output.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::config::ScoringConfig;
use crate::domain::{Candidate, Direction, Factor, FactorDetail, FactorMap};
use crate::features::{FeatureSnapshot, Trend};
use crate::signals::SignalBundle;

/// Score for one direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionScore {
    pub direction: Direction,
    pub confluence: u8,
    pub ensemble: f64,
    /// Model probability normalized to `direction`.
    pub probability: f64,
    pub factors: FactorMap,
}

/// Both directions plus the resolved one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreCard {
    pub buy: DirectionScore,
    pub sell: DirectionScore,
    pub chosen: Direction,
}

impl ScoreCard {
    pub fn best(&self) -> &DirectionScore {
        match self.chosen {
            Direction::Buy => &self.buy,
            Direction::Sell => &self.sell,
        }
    }

    pub fn into_best(self) -> DirectionScore {
        match self.chosen {
            Direction::Buy => self.buy,
            Direction::Sell => self.sell,
        }
    }
}

/// Why a setup qualifies for execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetupBasis {
    /// Confluence met the session threshold.
    Threshold,
    /// Low confluence carried by a very confident model.
    ProbabilityBoost,
}

#[derive(Debug, Clone)]
pub struct ConfluenceScorer {
    cfg: ScoringConfig,
}

impl ConfluenceScorer {
    pub fn new(cfg: ScoringConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.cfg
    }

    pub fn score(&self, features: &FeatureSnapshot, signals: &SignalBundle) -> ScoreCard {
        let buy = self.score_direction(Direction::Buy, features, signals);
        let sell = self.score_direction(Direction::Sell, features, signals);
        let chosen = match resolve(&buy, &sell) {
            Ordering::Less => Direction::Sell,
            _ => Direction::Buy,
        };
        ScoreCard { buy, sell, chosen }
    }

    pub fn score_direction(
        &self,
        direction: Direction,
        features: &FeatureSnapshot,
        signals: &SignalBundle,
    ) -> DirectionScore {
        let cfg = &self.cfg;
        let mut factors = FactorMap::new();
        let trend_value = |t: Trend| match t {
            Trend::Up => 1.0,
            Trend::Down => -1.0,
            Trend::Flat => 0.0,
        };

        factors.insert(
            Factor::HigherTimeframeTrend,
            FactorDetail::new(features.higher_trend.aligned_with(direction), trend_value(features.higher_trend)),
        );
        factors.insert(
            Factor::IntermediateTimeframeTrend,
            FactorDetail::new(
                features.intermediate_trend.aligned_with(direction),
                trend_value(features.intermediate_trend),
            ),
        );

        let probability = signals.model().directional(direction);
        factors.insert(
            Factor::ModelProbability,
            FactorDetail::new(probability >= cfg.probability_threshold, probability),
        );

        let ai_vote = signals.ai.vote(direction, cfg.ai_min_confidence);
        factors.insert(Factor::AiAgreement, FactorDetail::new(ai_vote > 0.0, signals.ai.confidence));

        let zone = features.zone_distance(direction).map(|d| d / features.atr);
        let near_zone = zone.is_some_and(|z| (0.0..=cfg.zone_atr_multiple).contains(&z));
        factors.insert(Factor::StructuralZone, FactorDetail::new(near_zone, zone.unwrap_or(-1.0)));

        factors.insert(
            Factor::TrendStrength,
            FactorDetail::new(features.adx >= cfg.adx_threshold, features.adx),
        );

        if let Some(recall) = &signals.pattern {
            factors.insert(
                Factor::PatternMemory,
                FactorDetail::new(recall.direction == direction, recall.similarity),
            );
        }
        let rl_dir = signals.rl.direction();
        factors.insert(
            Factor::RlPolicy,
            FactorDetail::new(rl_dir == Some(direction), rl_dir.map_or(0.0, |d| d.sign())),
        );

        let confluence = Factor::COUNTED
            .iter()
            .filter(|f| factors.get(f).is_some_and(|d| d.satisfied))
            .count() as u8;

        DirectionScore {
            direction,
            confluence,
            ensemble: self.ensemble(probability, ai_vote, confluence),
            probability,
            factors,
        }
    }

    /// Weighted blend of directional probability, AI vote mapped from
    /// {−1, 0, 1} to [0, 1], and confluence ÷ 6.
    pub fn ensemble(&self, probability: f64, ai_vote: f64, confluence: u8) -> f64 {
        let w = &self.cfg.weights;
        let ai = (ai_vote + 1.0) / 2.0;
        let conf = f64::from(confluence.min(6)) / 6.0;
        (w.probability * probability + w.ai * ai + w.confluence * conf).clamp(0.0, 1.0)
    }

    /// Why a setup with this confluence and directional probability may be
    /// traded at `threshold`; `None` when it may not.
    pub fn setup_basis(&self, confluence: u8, probability: f64, threshold: u8) -> Option<SetupBasis> {
        if confluence >= threshold {
            Some(SetupBasis::Threshold)
        } else if confluence >= self.cfg.boost_min_confluence && probability > self.cfg.boost_probability {
            Some(SetupBasis::ProbabilityBoost)
        } else {
            None
        }
    }

    pub fn is_valid_setup(&self, candidate: &Candidate, threshold: u8) -> bool {
        self.setup_basis(candidate.confluence, candidate.probability, threshold).is_some()
    }
}

/// Greater means `a` wins.
fn resolve(a: &DirectionScore, b: &DirectionScore) -> Ordering {
    a.confluence
        .cmp(&b.confluence)
        .then_with(|| a.ensemble.total_cmp(&b.ensemble))
        .then_with(|| a.probability.total_cmp(&b.probability))
}
