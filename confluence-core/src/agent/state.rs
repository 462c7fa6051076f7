//! Per-instrument circuit breaker and scan bookkeeping.
//!
//! The agent trips after `max_consecutive_losses` losing trades in a row and
//! refuses to emit candidates until the cool-off expires or an operator resets
//! it. Position management keeps running while paused.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::regime::Regime;

/// State of the agent's breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentStatus {
    /// Normal operation, candidates allowed.
    Active,
    /// Tripped, no candidates until the cool-off expires.
    Paused { since: DateTime<Utc> },
}

/// ATR value and when it was computed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CachedAtr {
    pub value: f64,
    pub computed_at: DateTime<Utc>,
}

impl CachedAtr {
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.computed_at
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentAgentState {
    pub status: AgentStatus,
    pub consecutive_losses: u32,
    pub last_trade: Option<DateTime<Utc>>,
    /// Open time of the last entry-timeframe candle that was scored.
    pub last_candle: Option<DateTime<Utc>>,
    pub cached_atr: Option<CachedAtr>,
    pub last_regime: Option<Regime>,
}

impl Default for InstrumentAgentState {
    fn default() -> Self {
        Self {
            status: AgentStatus::Active,
            consecutive_losses: 0,
            last_trade: None,
            last_candle: None,
            cached_atr: None,
            last_regime: None,
        }
    }
}

impl InstrumentAgentState {
    /// Whether candidates are allowed. Resumes on its own once `cooloff` has
    /// passed since the trip.
    pub fn is_active(&mut self, now: DateTime<Utc>, cooloff: Duration) -> bool {
        match self.status {
            AgentStatus::Active => true,
            AgentStatus::Paused { since } => {
                if now - since >= cooloff {
                    // Cool-off expired, back to active
                    self.status = AgentStatus::Active;
                    self.consecutive_losses = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Book one closed trade. Returns true when this trade tripped the breaker.
    ///
    /// A win resets the loss streak, a loss extends it, a flat trade leaves it.
    pub fn record_result(&mut self, profit: f64, threshold: u32, now: DateTime<Utc>) -> bool {
        if profit > 0.0 {
            self.consecutive_losses = 0;
            return false;
        }
        if profit < 0.0 {
            self.consecutive_losses += 1;
            if self.consecutive_losses >= threshold && self.status == AgentStatus::Active {
                self.status = AgentStatus::Paused { since: now };
                return true;
            }
        }
        false
    }

    /// Manual reset back to active.
    pub fn reset(&mut self) {
        self.status = AgentStatus::Active;
        self.consecutive_losses = 0;
    }

    /// Remaining cool-off (zero if not paused).
    pub fn remaining_cooloff(&self, now: DateTime<Utc>, cooloff: Duration) -> Duration {
        match self.status {
            AgentStatus::Active => Duration::zero(),
            AgentStatus::Paused { since } => (since + cooloff - now).max(Duration::zero()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap()
    }

    #[test]
    fn starts_active() {
        let mut s = InstrumentAgentState::default();
        assert!(s.is_active(t0(), Duration::hours(4)));
    }

    #[test]
    fn trips_after_threshold_losses() {
        let mut s = InstrumentAgentState::default();
        assert!(!s.record_result(-10.0, 3, t0()));
        assert!(!s.record_result(-10.0, 3, t0()));
        assert!(s.is_active(t0(), Duration::hours(4))); // 2 < 3
        assert!(s.record_result(-10.0, 3, t0()));
        assert!(!s.is_active(t0(), Duration::hours(4))); // 3 >= 3, tripped
    }

    #[test]
    fn win_resets_streak_and_flat_leaves_it() {
        let mut s = InstrumentAgentState::default();
        s.record_result(-1.0, 3, t0());
        s.record_result(-1.0, 3, t0());
        s.record_result(0.0, 3, t0());
        assert_eq!(s.consecutive_losses, 2);
        s.record_result(5.0, 3, t0());
        assert_eq!(s.consecutive_losses, 0);
    }

    #[test]
    fn cooloff_expiry_resumes() {
        let mut s = InstrumentAgentState::default();
        for _ in 0..3 {
            s.record_result(-1.0, 3, t0());
        }
        let cooloff = Duration::hours(4);
        assert_eq!(s.remaining_cooloff(t0() + Duration::hours(1), cooloff), Duration::hours(3));
        assert!(!s.is_active(t0() + Duration::hours(3), cooloff));
        assert!(s.is_active(t0() + cooloff, cooloff));
        assert_eq!(s.consecutive_losses, 0);
    }

    #[test]
    fn manual_reset() {
        let mut s = InstrumentAgentState::default();
        s.status = AgentStatus::Paused { since: t0() };
        s.reset();
        assert!(s.is_active(t0(), Duration::hours(4)));
    }
}
