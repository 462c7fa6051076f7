//! Integration tests for scoring, validity and ranking.
//!
//! Tests:
//! 1. Confluence 2 with probability 0.90 is valid through the boost rule
//! 2. Confluence 5 at threshold 5 is valid, 4 is not (no boost)
//! 3. Session phase moves the threshold
//! 4. Ranking order: ensemble, confluence, conviction, then symbol
//! 5. SELL setups normalize probability to 1 − p

use chrono::{DateTime, TimeZone, Utc};

use confluence_core::config::{ScoringConfig, SessionConfig};
use confluence_core::domain::{Candidate, Direction, Factor, FactorMap, Timeframe};
use confluence_core::features::{FeatureSnapshot, Trend};
use confluence_core::regime::Regime;
use confluence_core::scoring::{rank_candidates, ConfluenceScorer, SetupBasis};
use confluence_core::session::SessionSchedule;
use confluence_core::signals::{AiSignal, Prediction, Sentiment, SignalBundle};

// ──────────────────────────────────────────────
// Helpers
// ──────────────────────────────────────────────

fn at(hour: u32) -> DateTime<Utc> {
    // Monday
    Utc.with_ymd_and_hms(2024, 3, 4, hour, 15, 0).unwrap()
}

fn flat_features() -> FeatureSnapshot {
    FeatureSnapshot {
        symbol: "GBPUSD".into(),
        timeframe: Timeframe::M15,
        candle_time: at(10),
        close: 1.2700,
        atr: 0.0012,
        atr_expansion: 1.0,
        adx: 18.0,
        rsi: 50.0,
        ema_fast: 1.2700,
        ema_slow: 1.2700,
        ema_slope: 0.0,
        entry_trend: Trend::Flat,
        intermediate_trend: Trend::Flat,
        higher_trend: Trend::Flat,
        nearest_support: None,
        nearest_resistance: None,
    }
}

fn bundle(p: f64) -> SignalBundle {
    let mut b = SignalBundle::neutral();
    b.ensemble = Some(Prediction::from_probability(p));
    b
}

fn candidate(symbol: &str, confluence: u8, ensemble: f64, probability: f64) -> Candidate {
    Candidate {
        symbol: symbol.into(),
        direction: Direction::Buy,
        confluence,
        ensemble,
        probability,
        factors: FactorMap::new(),
        stop_distance: 0.0015,
        target_distance: 0.003,
        sizing_scale: 1.0,
        regime: Regime::Ranging,
        reference_price: 1.0,
        atr: 0.001,
        candle_time: at(10),
    }
}

// ──────────────────────────────────────────────
// Validity
// ──────────────────────────────────────────────

#[test]
fn low_confluence_high_probability_boosts() {
    let scorer = ConfluenceScorer::new(ScoringConfig::default());
    // Higher timeframe up + model probability: two points.
    let mut f = flat_features();
    f.higher_trend = Trend::Up;
    let card = scorer.score(&f, &bundle(0.90));
    let best = card.best();
    assert_eq!(best.direction, Direction::Buy);
    assert_eq!(best.confluence, 2);
    assert!((best.probability - 0.90).abs() < 1e-12);

    assert_eq!(scorer.setup_basis(best.confluence, best.probability, 5), Some(SetupBasis::ProbabilityBoost));
    assert!(scorer.is_valid_setup(&candidate("GBPUSD", 2, best.ensemble, 0.90), 5));
    assert!(!scorer.is_valid_setup(&candidate("GBPUSD", 2, best.ensemble, 0.85), 5));
    assert!(!scorer.is_valid_setup(&candidate("GBPUSD", 1, best.ensemble, 0.95), 5));
}

#[test]
fn threshold_is_inclusive() {
    let scorer = ConfluenceScorer::new(ScoringConfig::default());
    assert_eq!(scorer.setup_basis(5, 0.6, 5), Some(SetupBasis::Threshold));
    assert_eq!(scorer.setup_basis(4, 0.6, 5), None);
}

#[test]
fn session_phase_moves_threshold() {
    let sessions = SessionSchedule::new(SessionConfig::default());
    let base = ScoringConfig::default().base_threshold;
    assert_eq!(sessions.adaptive_threshold(base, at(14)), base - 1);
    assert_eq!(sessions.adaptive_threshold(base, at(3)), base);
    assert_eq!(sessions.adaptive_threshold(base, at(22)), base + 1);
}

#[test]
fn sell_uses_complement_probability() {
    let scorer = ConfluenceScorer::new(ScoringConfig::default());
    let mut f = flat_features();
    f.higher_trend = Trend::Down;
    f.intermediate_trend = Trend::Down;
    let mut b = bundle(0.2);
    b.ai = AiSignal { sentiment: Sentiment::Bearish, confidence: 75.0, reason: "risk-off".into() };
    let card = scorer.score(&f, &b);
    assert_eq!(card.chosen, Direction::Sell);
    assert!((card.sell.probability - 0.8).abs() < 1e-12);
    assert_eq!(card.sell.confluence, 4);
    assert!(card.sell.factors[&Factor::AiAgreement].satisfied);
}

// ──────────────────────────────────────────────
// Ranking
// ──────────────────────────────────────────────

#[test]
fn ranking_keys_in_order() {
    let mut cs = vec![
        candidate("AUDUSD", 5, 0.70, 0.60),
        candidate("EURUSD", 4, 0.80, 0.60),
        candidate("GBPUSD", 6, 0.70, 0.60),
        candidate("USDJPY", 6, 0.70, 0.75),
        candidate("NZDUSD", 6, 0.70, 0.75),
    ];
    rank_candidates(&mut cs);
    let order: Vec<&str> = cs.iter().map(|c| c.symbol.as_str()).collect();
    assert_eq!(order, vec!["EURUSD", "NZDUSD", "USDJPY", "GBPUSD", "AUDUSD"]);
}
