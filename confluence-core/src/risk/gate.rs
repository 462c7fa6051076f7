//! Structured gate outcomes.
//!
//! A rejection is a normal result, not an error: callers log the reason and
//! move on to the next instrument or candidate.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::correlation::Relation;
use crate::domain::Direction;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateReason {
    Clear,
    CircuitBreaker { reason: String },
    AgentPaused,
    DailyCapReached { count: u32, cap: u32 },
    Cooldown { remaining_secs: i64 },
    SpreadTooWide { spread_pips: f64, limit_pips: f64 },
    NewsBlackout { currency: String, title: String },
    CorrelationConflict { with: String, relation: Relation, open_direction: Direction },
    DuplicatePosition { direction: Direction },
}

impl fmt::Display for GateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateReason::Clear => f.write_str("clear"),
            GateReason::CircuitBreaker { reason } => write!(f, "circuit breaker: {reason}"),
            GateReason::AgentPaused => f.write_str("agent paused"),
            GateReason::DailyCapReached { count, cap } => write!(f, "daily cap reached ({count}/{cap})"),
            GateReason::Cooldown { remaining_secs } => write!(f, "cooldown ({remaining_secs}s left)"),
            GateReason::SpreadTooWide { spread_pips, limit_pips } => {
                write!(f, "spread {spread_pips:.1} pips > {limit_pips:.1}")
            }
            GateReason::NewsBlackout { currency, title } => write!(f, "news blackout {currency}: {title}"),
            GateReason::CorrelationConflict { with, relation, open_direction } => {
                write!(f, "{relation} correlated with open {open_direction} {with}")
            }
            GateReason::DuplicatePosition { direction } => write!(f, "already {direction}"),
        }
    }
}

/// (allowed, reason) pair returned by every gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateDecision {
    pub allowed: bool,
    pub reason: GateReason,
}

impl GateDecision {
    pub fn allow() -> Self {
        Self { allowed: true, reason: GateReason::Clear }
    }

    pub fn deny(reason: GateReason) -> Self {
        Self { allowed: false, reason }
    }

    pub fn is_allowed(&self) -> bool {
        self.allowed
    }
}

impl fmt::Display for GateDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.allowed {
            f.write_str("allowed")
        } else {
            write!(f, "blocked: {}", self.reason)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_reads_naturally() {
        let d = GateDecision::deny(GateReason::DailyCapReached { count: 10, cap: 10 });
        assert_eq!(d.to_string(), "blocked: daily cap reached (10/10)");
        assert_eq!(GateDecision::allow().to_string(), "allowed");
    }

    #[test]
    fn reason_serializes_tagged() {
        let json = serde_json::to_string(&GateReason::AgentPaused).unwrap();
        assert_eq!(json, r#"{"type":"AGENT_PAUSED"}"#);
    }
}
