//! What one cycle did, for logs and tests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use confluence_core::domain::{Direction, Ticket};
use confluence_core::lifecycle::LifecycleAction;
use confluence_core::risk::GateReason;
use confluence_core::session::SessionPhase;
use confluence_core::terminal::ExitRecord;

/// Symbol plus a human-readable reason it dropped out of the cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolNote {
    pub symbol: String,
    pub reason: String,
}

impl SymbolNote {
    pub fn new(symbol: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self { symbol: symbol.into(), reason: reason.to_string() }
    }
}

/// Ranked candidate as seen in the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSummary {
    pub symbol: String,
    pub direction: Direction,
    pub confluence: u8,
    pub ensemble: f64,
    pub probability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutedOrder {
    pub ticket: Ticket,
    pub symbol: String,
    pub direction: Direction,
    pub volume: f64,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub confluence: u8,
    pub threshold: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NoTradeReason {
    OutsideSession,
    /// Positions or account could not be read; nothing was managed or scanned.
    SnapshotFailed { error: String },
    Portfolio { reason: GateReason },
    MaxOpenPositions { open: usize, max: usize },
    NoCandidates,
    /// Every candidate failed the pre-execution gate.
    AllGated,
    BelowThreshold { symbol: String, confluence: u8, threshold: u8 },
    ZeroVolume { symbol: String },
    ExecutionFailed { symbol: String, error: String },
}

impl fmt::Display for NoTradeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoTradeReason::OutsideSession => f.write_str("outside trading window"),
            NoTradeReason::SnapshotFailed { error } => write!(f, "terminal snapshot failed: {error}"),
            NoTradeReason::Portfolio { reason } => write!(f, "portfolio gate: {reason}"),
            NoTradeReason::MaxOpenPositions { open, max } => write!(f, "open positions at maximum ({open}/{max})"),
            NoTradeReason::NoCandidates => f.write_str("no candidates"),
            NoTradeReason::AllGated => f.write_str("all candidates gated"),
            NoTradeReason::BelowThreshold { symbol, confluence, threshold } => {
                write!(f, "{symbol} confluence {confluence} below threshold {threshold}")
            }
            NoTradeReason::ZeroVolume { symbol } => write!(f, "{symbol} sized to zero volume"),
            NoTradeReason::ExecutionFailed { symbol, error } => write!(f, "{symbol} order failed: {error}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    Executed(ExecutedOrder),
    NoTrade(NoTradeReason),
}

impl CycleOutcome {
    pub fn executed(&self) -> Option<&ExecutedOrder> {
        match self {
            CycleOutcome::Executed(order) => Some(order),
            CycleOutcome::NoTrade(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle: u64,
    pub started_at: DateTime<Utc>,
    pub phase: SessionPhase,
    pub threshold: u8,
    /// Open positions that went through the lifecycle pass.
    pub managed: usize,
    pub actions: Vec<LifecycleAction>,
    /// Positions found closed since the previous cycle.
    pub closed: Vec<ExitRecord>,
    pub scanned: Vec<String>,
    pub skipped: Vec<SymbolNote>,
    pub failed: Vec<SymbolNote>,
    /// Ranked, best first.
    pub candidates: Vec<CandidateSummary>,
    pub outcome: CycleOutcome,
}

impl CycleReport {
    pub fn new(cycle: u64, started_at: DateTime<Utc>, phase: SessionPhase, threshold: u8) -> Self {
        Self {
            cycle,
            started_at,
            phase,
            threshold,
            managed: 0,
            actions: Vec::new(),
            closed: Vec::new(),
            scanned: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
            candidates: Vec::new(),
            outcome: CycleOutcome::NoTrade(NoTradeReason::NoCandidates),
        }
    }

    pub fn executed(&self) -> Option<&ExecutedOrder> {
        self.outcome.executed()
    }
}

impl fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleOutcome::Executed(o) => write!(
                f,
                "{} {} {} lots @ {:.5} (ticket {})",
                o.direction, o.symbol, o.volume, o.entry_price, o.ticket
            ),
            CycleOutcome::NoTrade(reason) => write!(f, "no trade: {reason}"),
        }
    }
}
