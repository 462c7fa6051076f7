//! Portfolio-wide mutable risk state.
//!
//! Only [`RiskManager`](super::RiskManager) touches this, always under its
//! mutex. Everything here is plain data so a snapshot can be cloned out for
//! reports and tests.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::domain::Ticket;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerTrip {
    pub reason: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioRiskState {
    /// UTC trading day the counters belong to.
    pub day: NaiveDate,
    /// Confirmed executions today.
    pub daily_count: u32,
    /// Slots reserved by outstanding permits.
    pub pending: u32,
    pub last_trade: HashMap<String, DateTime<Utc>>,
    pub breaker: Option<BreakerTrip>,
    pub realized_pnl: f64,
    pub breakeven_applied: HashSet<Ticket>,
    pub partially_closed: HashSet<Ticket>,
}

impl PortfolioRiskState {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            day: now.date_naive(),
            daily_count: 0,
            pending: 0,
            last_trade: HashMap::new(),
            breaker: None,
            realized_pnl: 0.0,
            breakeven_applied: HashSet::new(),
            partially_closed: HashSet::new(),
        }
    }

    /// Reset the daily fields when `now` falls on a later UTC day.
    ///
    /// Idempotency sets and the last-trade map survive the roll. Returns true
    /// when a roll happened.
    pub fn roll_day(&mut self, now: DateTime<Utc>) -> bool {
        let today = now.date_naive();
        if today <= self.day {
            return false;
        }
        self.day = today;
        self.daily_count = 0;
        self.pending = 0;
        self.realized_pnl = 0.0;
        self.breaker = None;
        true
    }

    /// Confirmed plus reserved slots.
    pub fn committed(&self) -> u32 {
        self.daily_count + self.pending
    }

    pub fn cooldown_remaining(&self, symbol: &str, now: DateTime<Utc>, cooldown: Duration) -> Option<Duration> {
        let last = self.last_trade.get(symbol)?;
        let remaining = *last + cooldown - now;
        (remaining > Duration::zero()).then_some(remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn roll_resets_daily_fields_only() {
        let mut s = PortfolioRiskState::new(at(4, 10));
        s.daily_count = 7;
        s.pending = 1;
        s.realized_pnl = -120.0;
        s.breaker = Some(BreakerTrip { reason: "loss".into(), at: at(4, 12) });
        s.breakeven_applied.insert(Ticket(9));
        s.last_trade.insert("EURUSD".into(), at(4, 23));

        assert!(!s.roll_day(at(4, 23)));
        assert_eq!(s.daily_count, 7);

        assert!(s.roll_day(at(5, 0)));
        assert_eq!(s.committed(), 0);
        assert_eq!(s.realized_pnl, 0.0);
        assert!(s.breaker.is_none());
        assert!(s.breakeven_applied.contains(&Ticket(9)));
        assert!(s.last_trade.contains_key("EURUSD"));
    }

    #[test]
    fn cooldown_counts_down() {
        let mut s = PortfolioRiskState::new(at(4, 10));
        s.last_trade.insert("EURUSD".into(), at(4, 10));
        let cd = Duration::minutes(15);
        let left = s.cooldown_remaining("EURUSD", at(4, 10) + Duration::minutes(5), cd);
        assert_eq!(left, Some(Duration::minutes(10)));
        assert_eq!(s.cooldown_remaining("EURUSD", at(4, 10) + cd, cd), None);
        assert_eq!(s.cooldown_remaining("GBPUSD", at(4, 10), cd), None);
    }
}
