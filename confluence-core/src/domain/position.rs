use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Direction, Ticket};

/// Snapshot of a live broker position.
///
/// Owned by the execution collaborator; the core reads a fresh snapshot each
/// cycle and issues commands against the ticket. Lifecycle progress is not
/// stored here (see `risk::PortfolioRiskState`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub ticket: Ticket,
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub volume: f64,
    pub opened_at: DateTime<Utc>,
    /// Price the position would close at right now (bid for longs, ask for shorts).
    pub current_price: f64,
    /// Floating profit in account currency as reported by the terminal.
    pub profit: f64,
}

impl OpenPosition {
    /// Favourable price distance from entry at `current_price`.
    pub fn unrealized_move(&self) -> f64 {
        self.direction.favorable_move(self.entry_price, self.current_price)
    }

    /// Initial risk: entry-to-stop distance when the stop is on the losing side.
    ///
    /// `None` when there is no stop or it already sits at/through entry.
    pub fn initial_risk(&self) -> Option<f64> {
        let stop = self.stop_loss?;
        let risk = self.direction.favorable_move(stop, self.entry_price);
        (risk > 0.0).then_some(risk)
    }

    /// Entry-to-target distance when the target is on the winning side.
    pub fn target_distance(&self) -> Option<f64> {
        let tp = self.take_profit?;
        let dist = self.direction.favorable_move(self.entry_price, tp);
        (dist > 0.0).then_some(dist)
    }
}

/// A position the terminal reports as closed (stop, target, manual or forced).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub ticket: Ticket,
    pub symbol: String,
    pub direction: Direction,
    pub exit_price: f64,
    pub profit: f64,
    pub closed_at: DateTime<Utc>,
}
