//! Scoring: confluence count, ensemble blend, candidate ranking.

pub mod confluence;
pub mod ranking;

pub use confluence::{ConfluenceScorer, DirectionScore, ScoreCard, SetupBasis};
pub use ranking::{rank_candidates, rank_order};
