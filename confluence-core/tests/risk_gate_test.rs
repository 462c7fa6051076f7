//! Integration tests for the portfolio risk gates.
//!
//! Tests:
//! 1. Correlation: open BUY EURUSD blocks BUY EURGBP, allows BUY USDCAD
//! 2. Inverse pairs block opposite directions
//! 3. Pre-scan ordering: cooldown is reported before news
//! 4. Breaker beats the daily cap, the cap beats cooldown
//! 5. Counters move only on confirmation; cooldown starts at confirmation
//! 6. A calendar swapped in at runtime blocks and unblocks immediately

use chrono::{DateTime, Duration, TimeZone, Utc};

use confluence_core::config::{CorrelationConfig, NewsConfig, RiskConfig};
use confluence_core::domain::{Candidate, Direction, FactorMap, Instrument, OpenPosition, Ticket};
use confluence_core::regime::Regime;
use confluence_core::risk::{GateReason, Impact, NewsEvent, Relation, RiskManager};
use confluence_core::terminal::Quote;

// ──────────────────────────────────────────────
// Helpers
// ──────────────────────────────────────────────

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap()
}

fn manager_with(risk: RiskConfig, news: NewsConfig) -> RiskManager {
    RiskManager::new(risk, &CorrelationConfig::default(), &news, now())
}

fn manager() -> RiskManager {
    manager_with(RiskConfig::default(), NewsConfig::default())
}

fn open(ticket: u64, symbol: &str, direction: Direction) -> OpenPosition {
    OpenPosition {
        ticket: Ticket(ticket),
        symbol: symbol.into(),
        direction,
        entry_price: 1.1,
        stop_loss: Some(1.09),
        take_profit: Some(1.12),
        volume: 0.1,
        opened_at: now() - Duration::hours(1),
        current_price: 1.1,
        profit: 0.0,
    }
}

fn candidate(symbol: &str, direction: Direction) -> Candidate {
    Candidate {
        symbol: symbol.into(),
        direction,
        confluence: 5,
        ensemble: 0.72,
        probability: 0.68,
        factors: FactorMap::new(),
        stop_distance: 0.0015,
        target_distance: 0.003,
        sizing_scale: 1.0,
        regime: Regime::TrendingUp,
        reference_price: 1.1,
        atr: 0.001,
        candle_time: now(),
    }
}

fn tight_quote() -> Quote {
    Quote { bid: 1.10000, ask: 1.10010, time: now() }
}

// ──────────────────────────────────────────────
// Correlation
// ──────────────────────────────────────────────

#[test]
fn direct_correlation_blocks_same_direction() {
    let rm = manager();
    let live = vec![open(1, "EURUSD", Direction::Buy)];

    let blocked = rm.pre_execution_gate(&candidate("EURGBP", Direction::Buy), &live);
    assert!(!blocked.allowed);
    assert_eq!(
        blocked.reason,
        GateReason::CorrelationConflict {
            with: "EURUSD".into(),
            relation: Relation::Direct,
            open_direction: Direction::Buy,
        }
    );

    assert!(rm.pre_execution_gate(&candidate("EURGBP", Direction::Sell), &live).allowed);
}

#[test]
fn inverse_correlation_allows_same_direction_blocks_opposite() {
    let rm = manager();
    let live = vec![open(1, "EURUSD", Direction::Buy)];
    assert!(rm.pre_execution_gate(&candidate("USDCAD", Direction::Buy), &live).allowed);

    let blocked = rm.pre_execution_gate(&candidate("USDCAD", Direction::Sell), &live);
    assert!(matches!(blocked.reason, GateReason::CorrelationConflict { relation: Relation::Inverse, .. }));
}

#[test]
fn authorize_uses_the_live_snapshot() {
    let rm = manager();
    let live = vec![open(1, "EURUSD", Direction::Buy)];
    let err = rm.authorize(&candidate("EURGBP", Direction::Buy), &live, now()).unwrap_err();
    assert!(matches!(err.reason, GateReason::CorrelationConflict { .. }));
    assert_eq!(rm.snapshot().pending, 0);

    // Same candidate once EURUSD is gone.
    rm.authorize(&candidate("EURGBP", Direction::Buy), &[], now()).unwrap().confirm(now());
    assert_eq!(rm.daily_count(), 1);
}

#[test]
fn duplicate_symbol_direction_rejected() {
    let rm = manager();
    let live = vec![open(1, "USDJPY", Direction::Sell)];
    let d = rm.pre_execution_gate(&candidate("USDJPY", Direction::Sell), &live);
    assert_eq!(d.reason, GateReason::DuplicatePosition { direction: Direction::Sell });
}

// ──────────────────────────────────────────────
// Pre-scan ordering
// ──────────────────────────────────────────────

#[test]
fn cooldown_reported_before_news() {
    let news = NewsConfig {
        events: vec![NewsEvent {
            currency: "USD".into(),
            time: now() + Duration::minutes(10),
            impact: Impact::High,
            title: "CPI".into(),
        }],
        ..NewsConfig::default()
    };
    let rm = manager_with(RiskConfig::default(), news);
    let eurusd = Instrument::forex("EURUSD", 0.0001);

    // News alone blocks.
    let d = rm.pre_scan_gate(&eurusd, &tight_quote(), now());
    assert!(matches!(d.reason, GateReason::NewsBlackout { .. }));

    // A fresh trade adds a cooldown, which wins.
    rm.authorize(&candidate("EURUSD", Direction::Buy), &[], now()).unwrap().confirm(now());
    let d = rm.pre_scan_gate(&eurusd, &tight_quote(), now() + Duration::minutes(1));
    assert_eq!(d.reason, GateReason::Cooldown { remaining_secs: 14 * 60 });
}

#[test]
fn calendar_update_takes_effect_at_once() {
    let rm = manager();
    let usdjpy = Instrument::forex("USDJPY", 0.01);
    let quote = Quote { bid: 150.00, ask: 150.01, time: now() };
    assert!(rm.pre_scan_gate(&usdjpy, &quote, now()).allowed);

    rm.set_news_events(vec![NewsEvent {
        currency: "JPY".into(),
        time: now() + Duration::minutes(5),
        impact: Impact::High,
        title: "BoJ rate decision".into(),
    }]);
    let d = rm.pre_scan_gate(&usdjpy, &quote, now());
    assert!(matches!(d.reason, GateReason::NewsBlackout { .. }));
    assert!(rm.pre_scan_gate(&Instrument::forex("EURUSD", 0.0001), &tight_quote(), now()).allowed);

    rm.set_news_events(Vec::new());
    assert!(rm.pre_scan_gate(&usdjpy, &quote, now()).allowed);
}

#[test]
fn breaker_then_cap_then_cooldown() {
    let risk = RiskConfig { daily_trade_cap: 1, ..RiskConfig::default() };
    let rm = manager_with(risk, NewsConfig::default());
    let eurusd = Instrument::forex("EURUSD", 0.0001);

    rm.authorize(&candidate("EURUSD", Direction::Buy), &[], now()).unwrap().confirm(now());
    let d = rm.pre_scan_gate(&eurusd, &tight_quote(), now());
    assert_eq!(d.reason, GateReason::DailyCapReached { count: 1, cap: 1 });

    rm.trip_breaker("manual", now());
    let d = rm.pre_scan_gate(&eurusd, &tight_quote(), now());
    assert!(matches!(d.reason, GateReason::CircuitBreaker { .. }));
}

#[test]
fn spread_checked_after_cooldown() {
    let rm = manager();
    let eurusd = Instrument::forex("EURUSD", 0.0001);
    let wide = Quote { bid: 1.1000, ask: 1.1010, time: now() };
    let d = rm.pre_scan_gate(&eurusd, &wide, now());
    assert!(matches!(d.reason, GateReason::SpreadTooWide { .. }));

    rm.authorize(&candidate("EURUSD", Direction::Buy), &[], now()).unwrap().confirm(now());
    assert!(matches!(rm.pre_scan_gate(&eurusd, &wide, now()).reason, GateReason::Cooldown { .. }));
}

// ──────────────────────────────────────────────
// Counters
// ──────────────────────────────────────────────

#[test]
fn failed_execution_leaves_counters_untouched() {
    let rm = manager();
    let eurusd = Instrument::forex("EURUSD", 0.0001);
    {
        let _permit = rm.authorize(&candidate("EURUSD", Direction::Buy), &[], now()).unwrap();
        // terminal rejected the order: permit dropped unconfirmed
    }
    let snap = rm.snapshot();
    assert_eq!(snap.daily_count, 0);
    assert_eq!(snap.pending, 0);
    assert!(rm.pre_scan_gate(&eurusd, &tight_quote(), now()).allowed);
}

#[test]
fn day_roll_resets_counter_but_keeps_idempotency() {
    let risk = RiskConfig { daily_trade_cap: 1, ..RiskConfig::default() };
    let rm = manager_with(risk, NewsConfig::default());
    rm.authorize(&candidate("EURUSD", Direction::Buy), &[], now()).unwrap().confirm(now());
    rm.mark_breakeven(Ticket(3));
    assert!(!rm.portfolio_gate(now()).allowed);

    let next_day = Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 1).unwrap();
    assert!(rm.portfolio_gate(next_day).allowed);
    assert_eq!(rm.daily_count(), 0);
    assert!(rm.is_breakeven_applied(Ticket(3)));
}
