//! Integration tests for the cycle scheduler against a scripted terminal.
//!
//! Scoring is pinned so every scan lands on a known confluence: trend
//! strength always counts (ADX threshold 0), the zone factor never does
//! (negative ATR multiple), and the bars trend up on every timeframe.
//!
//! Tests:
//! 1. Confluence 5 at threshold 5 executes exactly one order, journaled with the fingerprint
//! 2. A second cycle on the same candle places nothing
//! 3. Confluence 4 at threshold 5 is below threshold; no slot is consumed
//! 4. A rejected order leaves counters, cooldown and journal untouched
//! 5. Correlation and duplicate gates leave nothing to execute
//! 6. Weekends are outside the trading window
//! 7. An unreachable terminal halts the cycle with a fatal error
//! 8. A vanished position is journaled and booked against the agent and the day
//! 9. `run` honours shutdown and the cycle limit
//! 10. A rejected order is retried on the same candle and placed once
//! 11. A regime conflict force-closes a position while open positions are at the maximum
//! 12. A paused agent's position is still force-closed

use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use confluence_core::clock::ManualClock;
use confluence_core::config::BotConfig;
use confluence_core::domain::{Bar, ClosedTrade, Direction, Instrument, OpenPosition, Ticket, Timeframe};
use confluence_core::error::{DataError, ExecutionError};
use confluence_core::features::FeatureSnapshot;
use confluence_core::lifecycle::LifecycleAction;
use confluence_core::regime::{AdxEmaRegime, Regime, RegimeDetector, RegimeView};
use confluence_core::signals::{
    AiAdvisor, AiSignal, Prediction, ProviderError, ProviderSet, Sentiment, SignalProvider,
};
use confluence_core::terminal::{
    AccountInfo, CloseReceipt, ExecutionClient, MarketDataSource, OrderReceipt, OrderRequest, Quote,
};
use confluence_runner::{
    shutdown_channel, CycleOutcome, MemoryJournal, NoTradeReason, Scheduler, SchedulerError,
};

// ──────────────────────────────────────────────
// Scripted market
// ──────────────────────────────────────────────

const BARS: usize = 200;

fn close_at(i: usize) -> f64 {
    1.10 + 0.0005 * i as f64 + 0.0002 * ((i as f64) * 1.3).sin()
}

/// Same steady uptrend for every symbol and timeframe.
struct ScriptedMarket;

impl MarketDataSource for ScriptedMarket {
    fn get_bars(&self, _: &str, timeframe: Timeframe, count: usize) -> Result<Vec<Bar>, DataError> {
        let start = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        Ok((0..count.min(BARS))
            .map(|i| {
                let open = if i == 0 { close_at(0) } else { close_at(i - 1) };
                let close = close_at(i);
                Bar::new(
                    start + timeframe.duration() * i as i32,
                    open,
                    open.max(close) + 0.0003,
                    open.min(close) - 0.0003,
                    close,
                    1_000.0,
                )
            })
            .collect())
    }

    fn quote(&self, _: &str) -> Result<Quote, DataError> {
        let bid = close_at(BARS - 1);
        Ok(Quote { bid, ask: bid + 0.0001, time: now() })
    }
}

// ──────────────────────────────────────────────
// Scripted execution
// ──────────────────────────────────────────────

#[derive(Default)]
struct ScriptedExec {
    positions: Mutex<HashMap<Ticket, OpenPosition>>,
    orders: Mutex<Vec<OrderRequest>>,
    closed: Mutex<HashMap<Ticket, ClosedTrade>>,
    reject_orders: Mutex<bool>,
    unreachable: Mutex<bool>,
    next_ticket: Mutex<u64>,
}

impl ScriptedExec {
    fn open(&self, ticket: u64, symbol: &str, direction: Direction) {
        let pos = OpenPosition {
            ticket: Ticket(ticket),
            symbol: symbol.into(),
            direction,
            entry_price: 1.1,
            stop_loss: Some(1.09),
            take_profit: Some(1.12),
            volume: 0.1,
            opened_at: now() - Duration::hours(2),
            current_price: 1.1,
            profit: 0.0,
        };
        self.positions.lock().insert(pos.ticket, pos);
    }

    /// Drop the position and leave a close record behind.
    fn stop_out(&self, ticket: u64, profit: f64) {
        let pos = self.positions.lock().remove(&Ticket(ticket)).unwrap();
        self.closed.lock().insert(
            pos.ticket,
            ClosedTrade {
                ticket: pos.ticket,
                symbol: pos.symbol,
                direction: pos.direction,
                exit_price: 1.09,
                profit,
                closed_at: now() + Duration::minutes(5),
            },
        );
    }

    fn order_count(&self) -> usize {
        self.orders.lock().len()
    }

    fn check_link(&self) -> Result<(), ExecutionError> {
        if *self.unreachable.lock() {
            Err(ExecutionError::Unreachable("link down".into()))
        } else {
            Ok(())
        }
    }
}

impl ExecutionClient for ScriptedExec {
    fn place_order(&self, request: &OrderRequest) -> Result<OrderReceipt, ExecutionError> {
        self.check_link()?;
        if *self.reject_orders.lock() {
            return Err(ExecutionError::Rejected { reason: "market closed".into() });
        }
        let ticket = {
            let mut next = self.next_ticket.lock();
            *next += 1;
            Ticket(100 + *next)
        };
        self.orders.lock().push(request.clone());
        let fill = close_at(BARS - 1) + 0.0001;
        self.positions.lock().insert(
            ticket,
            OpenPosition {
                ticket,
                symbol: request.symbol.clone(),
                direction: request.direction,
                entry_price: fill,
                stop_loss: Some(request.stop_loss),
                take_profit: Some(request.take_profit),
                volume: request.volume,
                opened_at: now(),
                current_price: fill,
                profit: 0.0,
            },
        );
        Ok(OrderReceipt { ticket, fill_price: fill, volume: request.volume, time: now() })
    }

    fn modify_position(&self, _: Ticket, _: Option<f64>, _: Option<f64>) -> Result<(), ExecutionError> {
        self.check_link()
    }

    fn partial_close(&self, ticket: Ticket, _: f64) -> Result<CloseReceipt, ExecutionError> {
        Err(ExecutionError::UnknownTicket(ticket))
    }

    fn close_position(&self, ticket: Ticket) -> Result<CloseReceipt, ExecutionError> {
        self.check_link()?;
        let pos = self.positions.lock().remove(&ticket).ok_or(ExecutionError::UnknownTicket(ticket))?;
        self.closed.lock().insert(
            ticket,
            ClosedTrade {
                ticket,
                symbol: pos.symbol,
                direction: pos.direction,
                exit_price: pos.current_price,
                profit: -5.0,
                closed_at: now(),
            },
        );
        Ok(CloseReceipt { ticket, price: pos.current_price, volume_closed: pos.volume, profit: -5.0 })
    }

    fn get_positions(&self, symbol: &str) -> Result<Vec<OpenPosition>, ExecutionError> {
        self.check_link()?;
        Ok(self.positions.lock().values().filter(|p| p.symbol == symbol).cloned().collect())
    }

    fn all_positions(&self) -> Result<Vec<OpenPosition>, ExecutionError> {
        self.check_link()?;
        Ok(self.positions.lock().values().cloned().collect())
    }

    fn account(&self) -> Result<AccountInfo, ExecutionError> {
        self.check_link()?;
        Ok(AccountInfo { balance: 10_000.0, equity: 10_000.0 })
    }

    fn closed_trade(&self, ticket: Ticket) -> Result<Option<ClosedTrade>, ExecutionError> {
        self.check_link()?;
        Ok(self.closed.lock().get(&ticket).cloned())
    }
}

// ──────────────────────────────────────────────
// Fixed providers
// ──────────────────────────────────────────────

struct FixedModel(f64);

impl SignalProvider for FixedModel {
    fn name(&self) -> &str {
        "fixed"
    }

    fn predict(&self, _: &FeatureSnapshot) -> Result<Prediction, ProviderError> {
        Ok(Prediction::from_probability(self.0))
    }
}

struct FixedAdvisor(Sentiment, f64);

impl AiAdvisor for FixedAdvisor {
    fn analyze(
        &self,
        _: &str,
        _: Timeframe,
        _: &std::collections::BTreeMap<String, f64>,
    ) -> Result<AiSignal, ProviderError> {
        Ok(AiSignal { sentiment: self.0, confidence: self.1, reason: "scripted".into() })
    }
}

fn providers(probability: f64, sentiment: Sentiment) -> Arc<ProviderSet> {
    let set = ProviderSet::default();
    set.ensemble.swap(Arc::new(FixedModel(probability)));
    set.advisor.swap(Arc::new(FixedAdvisor(sentiment, 80.0)));
    Arc::new(set)
}

/// Every symbol reads as a downtrend, whatever the bars say.
struct AlwaysDown;

impl RegimeDetector for AlwaysDown {
    fn classify(&self, _: &FeatureSnapshot) -> RegimeView {
        RegimeView { regime: Regime::TrendingDown, scale: 1.0 }
    }
}

// ──────────────────────────────────────────────
// Helpers
// ──────────────────────────────────────────────

/// Monday 03:15 UTC: Tokyo only, a single session, threshold 5.
fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, 3, 15, 0).unwrap()
}

fn config(symbols: &[&str]) -> BotConfig {
    let mut cfg = BotConfig::with_instruments(symbols.iter().map(|s| Instrument::forex(s, 0.0001)).collect());
    cfg.scoring.adx_threshold = 0.0;
    cfg.scoring.zone_atr_multiple = -1.0;
    cfg
}

struct Rig {
    scheduler: Scheduler,
    exec: Arc<ScriptedExec>,
    journal: Arc<MemoryJournal>,
    clock: Arc<ManualClock>,
}

fn rig_at(cfg: BotConfig, providers: Arc<ProviderSet>, exec: ScriptedExec, at: DateTime<Utc>) -> Rig {
    rig_with_regime(cfg, providers, exec, at, Arc::new(AdxEmaRegime::default()))
}

fn rig_with_regime(
    cfg: BotConfig,
    providers: Arc<ProviderSet>,
    exec: ScriptedExec,
    at: DateTime<Utc>,
    regime: Arc<dyn RegimeDetector>,
) -> Rig {
    let exec = Arc::new(exec);
    let journal = Arc::new(MemoryJournal::new());
    let clock = Arc::new(ManualClock::new(at));
    let scheduler = Scheduler::builder(cfg)
        .market(Arc::new(ScriptedMarket))
        .execution(exec.clone())
        .journal(journal.clone())
        .providers(providers)
        .clock(clock.clone())
        .regime(regime)
        .build()
        .unwrap();
    Rig { scheduler, exec, journal, clock }
}

fn rig(symbols: &[&str], providers: Arc<ProviderSet>, exec: ScriptedExec) -> Rig {
    rig_at(config(symbols), providers, exec, now())
}

// ──────────────────────────────────────────────
// Execution
// ──────────────────────────────────────────────

#[tokio::test]
async fn confluence_at_threshold_executes_once() {
    let mut r = rig(&["EURUSD"], providers(0.9, Sentiment::Bullish), ScriptedExec::default());

    let report = r.scheduler.run_cycle().await.unwrap();
    assert_eq!(report.threshold, 5);
    assert_eq!(report.scanned, vec!["EURUSD".to_string()]);
    let order = report.executed().expect("one order");
    assert_eq!(order.symbol, "EURUSD");
    assert_eq!(order.direction, Direction::Buy);
    assert_eq!(order.confluence, 5);
    assert!(order.stop_loss < order.entry_price && order.entry_price < order.take_profit);

    assert_eq!(r.exec.order_count(), 1);
    assert_eq!(r.scheduler.risk().daily_count(), 1);
    assert_eq!(r.scheduler.risk().snapshot().pending, 0);

    let entries = r.journal.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].ticket, order.ticket);
    assert_eq!(entries[0].config_fingerprint, r.scheduler.fingerprint().to_string());
    assert_eq!(entries[0].confluence, 5);
}

#[tokio::test]
async fn same_candle_is_not_traded_twice() {
    let mut r = rig(&["EURUSD"], providers(0.9, Sentiment::Bullish), ScriptedExec::default());
    assert!(r.scheduler.run_cycle().await.unwrap().executed().is_some());

    r.clock.advance(Duration::seconds(60));
    let report = r.scheduler.run_cycle().await.unwrap();
    assert!(report.executed().is_none());
    assert_eq!(report.managed, 1);
    assert_eq!(r.exec.order_count(), 1);
    assert_eq!(r.scheduler.risk().daily_count(), 1);
}

#[tokio::test]
async fn confluence_below_threshold_consumes_nothing() {
    // AI neutral: trends, probability and ADX only.
    let mut r = rig(&["EURUSD"], providers(0.7, Sentiment::Neutral), ScriptedExec::default());

    let report = r.scheduler.run_cycle().await.unwrap();
    assert_eq!(
        report.outcome,
        CycleOutcome::NoTrade(NoTradeReason::BelowThreshold { symbol: "EURUSD".into(), confluence: 4, threshold: 5 })
    );
    assert_eq!(report.candidates.len(), 1);
    assert_eq!(r.exec.order_count(), 0);
    assert_eq!(r.scheduler.risk().daily_count(), 0);
    assert_eq!(r.scheduler.risk().snapshot().pending, 0);
    assert!(r.journal.entries().is_empty());
}

#[tokio::test]
async fn rejected_order_leaves_state_untouched() {
    let exec = ScriptedExec::default();
    *exec.reject_orders.lock() = true;
    let mut r = rig(&["EURUSD"], providers(0.9, Sentiment::Bullish), exec);

    let report = r.scheduler.run_cycle().await.unwrap();
    assert!(matches!(
        report.outcome,
        CycleOutcome::NoTrade(NoTradeReason::ExecutionFailed { ref symbol, .. }) if symbol == "EURUSD"
    ));
    let state = r.scheduler.risk().snapshot();
    assert_eq!(state.daily_count, 0);
    assert_eq!(state.pending, 0);
    assert!(state.last_trade.is_empty());
    assert!(r.journal.entries().is_empty());
    assert!(r.scheduler.agent("EURUSD").unwrap().state().last_trade.is_none());
}

#[tokio::test]
async fn rejected_order_is_retried_on_the_same_candle() {
    let exec = ScriptedExec::default();
    *exec.reject_orders.lock() = true;
    let mut r = rig(&["EURUSD"], providers(0.9, Sentiment::Bullish), exec);

    let first = r.scheduler.run_cycle().await.unwrap();
    assert!(matches!(first.outcome, CycleOutcome::NoTrade(NoTradeReason::ExecutionFailed { .. })));
    assert_eq!(r.scheduler.agent("EURUSD").unwrap().state().last_candle, None);

    *r.exec.reject_orders.lock() = false;
    r.clock.advance(Duration::seconds(60));
    let second = r.scheduler.run_cycle().await.unwrap();
    assert!(second.skipped.is_empty());
    assert_eq!(second.executed().expect("retried order").symbol, "EURUSD");

    r.clock.advance(Duration::seconds(60));
    let third = r.scheduler.run_cycle().await.unwrap();
    assert!(third.executed().is_none());
    assert_eq!(r.exec.order_count(), 1);
    assert_eq!(r.scheduler.risk().daily_count(), 1);
    assert_eq!(r.journal.entries().len(), 1);
}

// ──────────────────────────────────────────────
// Management
// ──────────────────────────────────────────────

#[tokio::test]
async fn regime_exit_runs_with_open_positions_at_maximum() {
    let exec = ScriptedExec::default();
    exec.open(7, "EURUSD", Direction::Buy);
    exec.open(8, "GBPUSD", Direction::Sell);
    let mut cfg = config(&["EURUSD", "GBPUSD"]);
    cfg.scheduler.max_open_positions = 1;
    let mut r = rig_with_regime(cfg, providers(0.9, Sentiment::Bullish), exec, now(), Arc::new(AlwaysDown));

    let report = r.scheduler.run_cycle().await.unwrap();
    assert_eq!(report.outcome, CycleOutcome::NoTrade(NoTradeReason::MaxOpenPositions { open: 1, max: 1 }));
    assert!(report.scanned.is_empty());
    assert!(matches!(
        report.actions.as_slice(),
        [LifecycleAction::ForcedExit { ticket: Ticket(7), regime: Regime::TrendingDown, .. }]
    ));
    assert_eq!(r.scheduler.agent("EURUSD").unwrap().last_regime(), Some(Regime::TrendingDown));
    assert!(!r.exec.positions.lock().contains_key(&Ticket(7)));
    assert!(r.exec.positions.lock().contains_key(&Ticket(8)));

    // The close is booked through reconciliation next cycle.
    r.clock.advance(Duration::minutes(1));
    let next = r.scheduler.run_cycle().await.unwrap();
    assert_eq!(next.closed.len(), 1);
    assert_eq!(next.closed[0].ticket, Ticket(7));
    assert!(next.actions.is_empty());
}

#[tokio::test]
async fn paused_agent_still_exits_on_regime_conflict() {
    let exec = ScriptedExec::default();
    exec.open(7, "EURUSD", Direction::Buy);
    let mut r = rig_with_regime(
        config(&["EURUSD"]),
        providers(0.9, Sentiment::Bullish),
        exec,
        now(),
        Arc::new(AlwaysDown),
    );
    let agent = r.scheduler.agent("EURUSD").unwrap().clone();
    for _ in 0..3 {
        agent.update_performance(-10.0, now());
    }
    assert!(!agent.is_active(now()));

    let report = r.scheduler.run_cycle().await.unwrap();
    assert!(report
        .actions
        .iter()
        .any(|a| matches!(a, LifecycleAction::ForcedExit { ticket: Ticket(7), .. })));
    assert!(report.skipped.iter().any(|n| n.symbol == "EURUSD" && n.reason.contains("paused")));
    assert_eq!(r.exec.order_count(), 0);
}

// ──────────────────────────────────────────────
// Gates
// ──────────────────────────────────────────────

#[tokio::test]
async fn correlated_and_duplicate_candidates_are_all_gated() {
    let exec = ScriptedExec::default();
    exec.open(7, "EURUSD", Direction::Buy);
    let mut r = rig(&["EURUSD", "GBPUSD"], providers(0.9, Sentiment::Bullish), exec);

    let report = r.scheduler.run_cycle().await.unwrap();
    assert_eq!(report.outcome, CycleOutcome::NoTrade(NoTradeReason::AllGated));
    assert_eq!(report.candidates.len(), 2);
    assert!(report.skipped.iter().any(|n| n.symbol == "GBPUSD" && n.reason.contains("correlated")));
    assert!(report.skipped.iter().any(|n| n.symbol == "EURUSD" && n.reason.contains("already")));
    assert_eq!(r.exec.order_count(), 0);
    assert_eq!(r.scheduler.risk().snapshot().pending, 0);
}

#[tokio::test]
async fn weekend_is_outside_the_trading_window() {
    let saturday = Utc.with_ymd_and_hms(2024, 3, 9, 10, 0, 0).unwrap();
    let mut r = rig_at(config(&["EURUSD"]), providers(0.9, Sentiment::Bullish), ScriptedExec::default(), saturday);

    let report = r.scheduler.run_cycle().await.unwrap();
    assert_eq!(report.outcome, CycleOutcome::NoTrade(NoTradeReason::OutsideSession));
    assert!(report.scanned.is_empty());
    assert_eq!(r.exec.order_count(), 0);
}

#[tokio::test]
async fn unreachable_terminal_is_fatal() {
    let exec = ScriptedExec::default();
    *exec.unreachable.lock() = true;
    let mut r = rig(&["EURUSD"], providers(0.9, Sentiment::Bullish), exec);

    let err = r.scheduler.run_cycle().await.unwrap_err();
    assert!(matches!(err, SchedulerError::Fatal(_)));
}

// ──────────────────────────────────────────────
// Reconciliation
// ──────────────────────────────────────────────

#[tokio::test]
async fn closed_position_is_journaled_and_booked() {
    // Saturday: reconciliation and management still run, scanning does not.
    let saturday = Utc.with_ymd_and_hms(2024, 3, 9, 10, 0, 0).unwrap();
    let exec = ScriptedExec::default();
    exec.open(900, "EURUSD", Direction::Buy);
    let mut r = rig_at(config(&["EURUSD"]), providers(0.9, Sentiment::Bullish), exec, saturday);

    let first = r.scheduler.run_cycle().await.unwrap();
    assert_eq!(first.managed, 1);
    assert!(first.closed.is_empty());

    r.exec.stop_out(900, -50.0);
    r.clock.advance(Duration::minutes(10));
    let second = r.scheduler.run_cycle().await.unwrap();
    assert_eq!(second.closed.len(), 1);
    assert_eq!(second.closed[0].ticket, Ticket(900));

    let exits = r.journal.exits();
    assert_eq!(exits.len(), 1);
    assert_eq!(exits[0].profit, -50.0);
    assert_eq!(r.scheduler.agent("EURUSD").unwrap().state().consecutive_losses, 1);
    assert_eq!(r.scheduler.risk().snapshot().realized_pnl, -50.0);

    // Booked once only.
    r.clock.advance(Duration::minutes(10));
    let third = r.scheduler.run_cycle().await.unwrap();
    assert!(third.closed.is_empty());
    assert_eq!(r.journal.exits().len(), 1);
}

// ──────────────────────────────────────────────
// Run loop
// ──────────────────────────────────────────────

#[tokio::test]
async fn run_stops_on_shutdown_and_cycle_limit() {
    let mut r = rig(&["EURUSD"], providers(0.7, Sentiment::Neutral), ScriptedExec::default());

    let (handle, signal) = shutdown_channel();
    let limited = r.scheduler.run(signal.clone(), Some(1)).await.unwrap();
    assert_eq!(limited, 1);
    assert_eq!(r.scheduler.cycles_run(), 1);

    handle.trigger();
    let stopped = r.scheduler.run(signal, None).await.unwrap();
    assert_eq!(stopped, 0);
    assert_eq!(r.scheduler.cycles_run(), 1);
}
