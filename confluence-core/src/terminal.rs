//! Collaborator traits for the broker terminal and the trade journal.
//!
//! The terminal API is not safe for concurrent use. Implementations only need
//! `Send + Sync` so they can be shared behind an `Arc`; the scheduler
//! guarantees calls are issued one at a time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Bar, ClosedTrade, Direction, FactorMap, Instrument, OpenPosition, Ticket, Timeframe};
use crate::error::{DataError, ExecutionError, JournalError};
use crate::regime::Regime;

/// Top-of-book quote.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub bid: f64,
    pub ask: f64,
    pub time: DateTime<Utc>,
}

impl Quote {
    pub fn spread(&self) -> f64 {
        self.ask - self.bid
    }

    pub fn spread_pips(&self, instrument: &Instrument) -> f64 {
        instrument.to_pips(self.spread())
    }

    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }

    /// Price a new position in `direction` fills at.
    pub fn entry_price(&self, direction: Direction) -> f64 {
        match direction {
            Direction::Buy => self.ask,
            Direction::Sell => self.bid,
        }
    }

    /// Price an open position in `direction` closes at.
    pub fn exit_price(&self, direction: Direction) -> f64 {
        match direction {
            Direction::Buy => self.bid,
            Direction::Sell => self.ask,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub balance: f64,
    pub equity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub direction: Direction,
    pub volume: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderReceipt {
    pub ticket: Ticket,
    pub fill_price: f64,
    pub volume: f64,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloseReceipt {
    pub ticket: Ticket,
    pub price: f64,
    pub volume_closed: f64,
    pub profit: f64,
}

/// Source of bars and quotes.
pub trait MarketDataSource: Send + Sync {
    /// Most recent `count` bars, oldest first. An absent series is
    /// `DataError::Unavailable`.
    fn get_bars(&self, symbol: &str, timeframe: Timeframe, count: usize) -> Result<Vec<Bar>, DataError>;

    fn quote(&self, symbol: &str) -> Result<Quote, DataError>;
}

/// Order placement and position management.
pub trait ExecutionClient: Send + Sync {
    fn place_order(&self, request: &OrderRequest) -> Result<OrderReceipt, ExecutionError>;

    fn modify_position(
        &self,
        ticket: Ticket,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    ) -> Result<(), ExecutionError>;

    /// Close `fraction` (0, 1) of the position's volume.
    fn partial_close(&self, ticket: Ticket, fraction: f64) -> Result<CloseReceipt, ExecutionError>;

    fn close_position(&self, ticket: Ticket) -> Result<CloseReceipt, ExecutionError>;

    fn get_positions(&self, symbol: &str) -> Result<Vec<OpenPosition>, ExecutionError>;

    fn all_positions(&self) -> Result<Vec<OpenPosition>, ExecutionError>;

    fn account(&self) -> Result<AccountInfo, ExecutionError>;

    /// Final result of a position that is no longer open, if the terminal knows it.
    fn closed_trade(&self, ticket: Ticket) -> Result<Option<ClosedTrade>, ExecutionError>;
}

/// Row written when an order is confirmed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryRecord {
    pub ticket: Ticket,
    pub symbol: String,
    pub direction: Direction,
    pub volume: f64,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub confluence: u8,
    pub ensemble: f64,
    pub probability: f64,
    pub regime: Regime,
    pub factors: FactorMap,
    pub config_fingerprint: String,
    pub opened_at: DateTime<Utc>,
}

/// Row written when a position is seen closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitRecord {
    pub ticket: Ticket,
    pub symbol: String,
    pub exit_price: f64,
    pub profit: f64,
    pub closed_at: DateTime<Utc>,
}

impl From<&ClosedTrade> for ExitRecord {
    fn from(trade: &ClosedTrade) -> Self {
        Self {
            ticket: trade.ticket,
            symbol: trade.symbol.clone(),
            exit_price: trade.exit_price,
            profit: trade.profit,
            closed_at: trade.closed_at,
        }
    }
}

/// Write-only trade journal.
pub trait Journal: Send + Sync {
    fn log_entry(&self, entry: &EntryRecord) -> Result<(), JournalError>;
    fn log_exit(&self, exit: &ExitRecord) -> Result<(), JournalError>;
}
