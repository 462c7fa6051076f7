//! Error taxonomy for collaborator failures.
//!
//! - `DataError`: market data missing or unusable; the instrument is skipped.
//! - `ExecutionError`: the terminal refused or failed a command; logged, no state mutation.
//! - `JournalError`: the trade journal could not be written.
//!
//! Signal-provider failures live in `signals::ProviderError` and never
//! propagate past the gateway. Gate rejections are values, not errors
//! (`risk::GateDecision`).

use crate::domain::{Ticket, Timeframe};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DataError {
    #[error("{symbol} {timeframe}: no bars returned")]
    Unavailable { symbol: String, timeframe: Timeframe },

    #[error("{symbol}: need {needed} bars, have {have}")]
    Insufficient { symbol: String, needed: usize, have: usize },

    #[error("{symbol}: no quote")]
    NoQuote { symbol: String },

    #[error("{symbol}: {reason}")]
    Invalid { symbol: String, reason: String },

    #[error("terminal error: {0}")]
    Terminal(String),

    /// Terminal connection lost. Halts the scheduler.
    #[error("terminal unreachable: {0}")]
    Unreachable(String),
}

impl DataError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, DataError::Unreachable(_))
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("order rejected: {reason}")]
    Rejected { reason: String },

    #[error("invalid volume {0}")]
    InvalidVolume(f64),

    #[error("unknown ticket {0}")]
    UnknownTicket(Ticket),

    #[error("terminal unreachable: {0}")]
    Unreachable(String),
}

impl ExecutionError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ExecutionError::Unreachable(_))
    }
}

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("journal write failed: {0}")]
    Write(String),
}
