//! Portfolio risk: gates, correlation exposure, news blackout, sizing and the
//! shared mutable state behind them.
//!
//! Every trade passes through [`RiskManager`] twice:
//! - [`RiskManager::pre_scan_gate`] before an instrument is fetched and scored
//!   (breaker → daily cap → cooldown → spread → news, first failure wins)
//! - [`RiskManager::authorize`] at execution time against the live position
//!   snapshot; success reserves a daily slot and returns an [`ExecutionPermit`]
//!
//! The daily counter and last-trade timestamps only move when a permit is
//! confirmed after the terminal accepted the order.

pub mod correlation;
pub mod gate;
pub mod news;
pub mod sizing;
pub mod state;

pub use correlation::{CorrelationTable, Relation};
pub use gate::{GateDecision, GateReason};
pub use news::{Impact, NewsCalendar, NewsEvent};
pub use sizing::{PositionSizer, SizeDecision};
pub use state::{BreakerTrip, PortfolioRiskState};

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use crate::config::{BotConfig, CorrelationConfig, NewsConfig, RiskConfig};
use crate::domain::{Candidate, Instrument, OpenPosition, Ticket};
use crate::terminal::Quote;

#[derive(Debug)]
pub struct RiskManager {
    cfg: RiskConfig,
    correlations: CorrelationTable,
    sizer: PositionSizer,
    news: RwLock<NewsCalendar>,
    state: Mutex<PortfolioRiskState>,
}

impl RiskManager {
    pub fn new(cfg: RiskConfig, correlation: &CorrelationConfig, news: &NewsConfig, now: DateTime<Utc>) -> Self {
        let calendar = NewsCalendar::new(
            news.events.clone(),
            Duration::minutes(news.block_before_mins),
            Duration::minutes(news.block_after_mins),
        );
        Self {
            sizer: PositionSizer::new(cfg.clone()),
            cfg,
            correlations: CorrelationTable::from_config(correlation),
            news: RwLock::new(calendar),
            state: Mutex::new(PortfolioRiskState::new(now)),
        }
    }

    pub fn from_config(cfg: &BotConfig, now: DateTime<Utc>) -> Self {
        Self::new(cfg.risk.clone(), &cfg.correlation, &cfg.news, now)
    }

    pub fn config(&self) -> &RiskConfig {
        &self.cfg
    }

    pub fn correlations(&self) -> &CorrelationTable {
        &self.correlations
    }

    /// Apply the UTC day roll if due. Returns true when counters were reset.
    pub fn roll_day(&self, now: DateTime<Utc>) -> bool {
        let rolled = self.state.lock().roll_day(now);
        if rolled {
            info!(day = %now.date_naive(), "risk: new trading day, daily counters reset");
        }
        rolled
    }

    /// Breaker and daily cap only. Used as the scheduler's pre-flight check.
    pub fn portfolio_gate(&self, now: DateTime<Utc>) -> GateDecision {
        let mut state = self.state.lock();
        state.roll_day(now);
        self.check_portfolio(&state)
    }

    fn check_portfolio(&self, state: &PortfolioRiskState) -> GateDecision {
        if let Some(trip) = &state.breaker {
            return GateDecision::deny(GateReason::CircuitBreaker { reason: trip.reason.clone() });
        }
        let cap = self.cfg.daily_trade_cap;
        if state.committed() >= cap {
            return GateDecision::deny(GateReason::DailyCapReached { count: state.committed(), cap });
        }
        GateDecision::allow()
    }

    /// Cheap per-instrument gate run before any data is fetched.
    pub fn pre_scan_gate(&self, instrument: &Instrument, quote: &Quote, now: DateTime<Utc>) -> GateDecision {
        {
            let mut state = self.state.lock();
            state.roll_day(now);
            let portfolio = self.check_portfolio(&state);
            if !portfolio.allowed {
                return portfolio;
            }
            if let Some(left) = state.cooldown_remaining(&instrument.symbol, now, self.cfg.cooldown()) {
                return GateDecision::deny(GateReason::Cooldown { remaining_secs: left.num_seconds() });
            }
        }

        let spread_pips = quote.spread_pips(instrument);
        let limit_pips = instrument
            .max_spread_pips
            .unwrap_or_else(|| self.cfg.spread_limits.limit_for(instrument.asset_class));
        if !spread_pips.is_finite() || spread_pips > limit_pips {
            return GateDecision::deny(GateReason::SpreadTooWide { spread_pips, limit_pips });
        }

        if let Some(event) = self.news.read().blackout(&instrument.currencies, now) {
            return GateDecision::deny(GateReason::NewsBlackout {
                currency: event.currency.clone(),
                title: event.title.clone(),
            });
        }
        GateDecision::allow()
    }

    /// Exposure check against the live snapshot. Does not touch state.
    pub fn pre_execution_gate(&self, candidate: &Candidate, open: &[OpenPosition]) -> GateDecision {
        if open.iter().any(|p| p.symbol == candidate.symbol && p.direction == candidate.direction) {
            return GateDecision::deny(GateReason::DuplicatePosition { direction: candidate.direction });
        }
        if let Some((pos, relation)) = self.correlations.find_conflict(&candidate.symbol, candidate.direction, open) {
            return GateDecision::deny(GateReason::CorrelationConflict {
                with: pos.symbol.clone(),
                relation,
                open_direction: pos.direction,
            });
        }
        GateDecision::allow()
    }

    /// Re-check the portfolio and exposure gates and reserve one daily slot.
    ///
    /// The check and the reservation happen under one lock acquisition, so
    /// concurrent callers can never push the committed count past the cap.
    pub fn authorize(
        &self,
        candidate: &Candidate,
        open: &[OpenPosition],
        now: DateTime<Utc>,
    ) -> Result<ExecutionPermit<'_>, GateDecision> {
        let mut state = self.state.lock();
        state.roll_day(now);
        let portfolio = self.check_portfolio(&state);
        if !portfolio.allowed {
            return Err(portfolio);
        }
        let exposure = self.pre_execution_gate(candidate, open);
        if !exposure.allowed {
            return Err(exposure);
        }
        state.pending += 1;
        Ok(ExecutionPermit { manager: self, symbol: candidate.symbol.clone(), settled: false })
    }

    pub fn size(&self, candidate: &Candidate, instrument: &Instrument, equity: f64) -> SizeDecision {
        self.sizer.size(candidate, instrument, equity)
    }

    /// Book a closed trade's profit against today's P&L.
    ///
    /// Trips the breaker once the day's realized loss reaches
    /// `max_daily_loss_pct` of `equity`. Returns true when this call tripped it.
    pub fn record_realized(&self, profit: f64, equity: f64, now: DateTime<Utc>) -> bool {
        let mut state = self.state.lock();
        state.roll_day(now);
        state.realized_pnl += profit;
        if state.breaker.is_some() || equity <= 0.0 {
            return false;
        }
        let limit = equity * self.cfg.max_daily_loss_pct / 100.0;
        if -state.realized_pnl >= limit {
            let reason = format!("daily loss {:.2} reached limit {:.2}", -state.realized_pnl, limit);
            warn!(%reason, "risk: portfolio circuit breaker tripped");
            state.breaker = Some(BreakerTrip { reason, at: now });
            return true;
        }
        false
    }

    pub fn trip_breaker(&self, reason: impl Into<String>, now: DateTime<Utc>) {
        let reason = reason.into();
        warn!(%reason, "risk: circuit breaker tripped manually");
        self.state.lock().breaker = Some(BreakerTrip { reason, at: now });
    }

    pub fn reset_breaker(&self) {
        if self.state.lock().breaker.take().is_some() {
            info!("risk: circuit breaker reset");
        }
    }

    pub fn breaker(&self) -> Option<BreakerTrip> {
        self.state.lock().breaker.clone()
    }

    /// Insert into the breakeven set. False when the ticket was already there.
    pub fn mark_breakeven(&self, ticket: Ticket) -> bool {
        self.state.lock().breakeven_applied.insert(ticket)
    }

    pub fn mark_partial(&self, ticket: Ticket) -> bool {
        self.state.lock().partially_closed.insert(ticket)
    }

    pub fn is_breakeven_applied(&self, ticket: Ticket) -> bool {
        self.state.lock().breakeven_applied.contains(&ticket)
    }

    pub fn is_partially_closed(&self, ticket: Ticket) -> bool {
        self.state.lock().partially_closed.contains(&ticket)
    }

    pub fn daily_count(&self) -> u32 {
        self.state.lock().daily_count
    }

    pub fn snapshot(&self) -> PortfolioRiskState {
        self.state.lock().clone()
    }

    pub fn set_news_events(&self, events: Vec<NewsEvent>) {
        self.news.write().replace_events(events);
    }
}

/// One reserved daily slot.
///
/// [`confirm`](Self::confirm) after the terminal accepted the order; dropping
/// the permit without confirming releases the slot untouched.
#[derive(Debug)]
#[must_use = "dropping a permit releases its reserved slot"]
pub struct ExecutionPermit<'a> {
    manager: &'a RiskManager,
    symbol: String,
    settled: bool,
}

impl ExecutionPermit<'_> {
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn confirm(mut self, now: DateTime<Utc>) {
        let mut state = self.manager.state.lock();
        state.pending = state.pending.saturating_sub(1);
        state.daily_count += 1;
        state.last_trade.insert(self.symbol.clone(), now);
        self.settled = true;
    }
}

impl Drop for ExecutionPermit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            let mut state = self.manager.state.lock();
            state.pending = state.pending.saturating_sub(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AssetClass, Direction, FactorMap};
    use crate::regime::Regime;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap()
    }

    fn manager(cap: u32) -> RiskManager {
        let cfg = RiskConfig { daily_trade_cap: cap, ..RiskConfig::default() };
        RiskManager::new(cfg, &CorrelationConfig::default(), &NewsConfig::default(), now())
    }

    fn quote(bid: f64, ask: f64) -> Quote {
        Quote { bid, ask, time: now() }
    }

    fn candidate(symbol: &str, direction: Direction) -> Candidate {
        Candidate {
            symbol: symbol.into(),
            direction,
            confluence: 5,
            ensemble: 0.7,
            probability: 0.7,
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

    #[test]
    fn permit_confirm_counts_and_drop_releases() {
        let rm = manager(2);
        let c = candidate("EURUSD", Direction::Buy);

        let permit = rm.authorize(&c, &[], now()).unwrap();
        assert_eq!(rm.snapshot().pending, 1);
        drop(permit);
        assert_eq!(rm.snapshot().pending, 0);
        assert_eq!(rm.daily_count(), 0);
        assert!(rm.snapshot().last_trade.is_empty());

        rm.authorize(&c, &[], now()).unwrap().confirm(now());
        assert_eq!(rm.daily_count(), 1);
        assert_eq!(rm.snapshot().last_trade.get("EURUSD"), Some(&now()));
    }

    #[test]
    fn reservations_count_toward_cap() {
        let rm = manager(1);
        let c = candidate("EURUSD", Direction::Buy);
        let _held = rm.authorize(&c, &[], now()).unwrap();
        let denied = rm.authorize(&candidate("USDJPY", Direction::Buy), &[], now()).unwrap_err();
        assert_eq!(denied.reason, GateReason::DailyCapReached { count: 1, cap: 1 });
    }

    #[test]
    fn spread_uses_asset_class_limit_and_override() {
        let rm = manager(10);
        let eurusd = Instrument::forex("EURUSD", 0.0001);
        assert!(rm.pre_scan_gate(&eurusd, &quote(1.1000, 1.1002), now()).allowed);
        let wide = rm.pre_scan_gate(&eurusd, &quote(1.1000, 1.1005), now());
        assert!(matches!(wide.reason, GateReason::SpreadTooWide { .. }));

        let tight = Instrument { max_spread_pips: Some(1.0), ..eurusd.clone() };
        assert!(!rm.pre_scan_gate(&tight, &quote(1.1000, 1.1002), now()).allowed);

        let gold = Instrument { asset_class: AssetClass::Metal, ..Instrument::forex("XAUUSD", 0.01) };
        assert!(rm.pre_scan_gate(&gold, &quote(2000.00, 2000.30), now()).allowed);
    }

    #[test]
    fn daily_loss_trips_breaker_until_roll() {
        let rm = manager(10);
        assert!(!rm.record_realized(-200.0, 10_000.0, now()));
        assert!(rm.record_realized(-100.0, 10_000.0, now()));
        let eurusd = Instrument::forex("EURUSD", 0.0001);
        let d = rm.pre_scan_gate(&eurusd, &quote(1.1, 1.1001), now());
        assert!(matches!(d.reason, GateReason::CircuitBreaker { .. }));

        let tomorrow = now() + Duration::days(1);
        assert!(rm.pre_scan_gate(&eurusd, &quote(1.1, 1.1001), tomorrow).allowed);
    }

    #[test]
    fn manual_breaker_and_reset() {
        let rm = manager(10);
        rm.trip_breaker("operator halt", now());
        assert!(!rm.portfolio_gate(now()).allowed);
        rm.reset_breaker();
        assert!(rm.portfolio_gate(now()).allowed);
    }

    #[test]
    fn idempotency_marks_once() {
        let rm = manager(10);
        assert!(rm.mark_breakeven(Ticket(1)));
        assert!(!rm.mark_breakeven(Ticket(1)));
        assert!(rm.is_breakeven_applied(Ticket(1)));
        assert!(!rm.is_partially_closed(Ticket(1)));
    }
}
