//! Position lifecycle: `OPENED → BREAKEVEN_ARMED → PARTIAL_TAKEN → TRAILING`.
//!
//! Each cycle every open position is walked through, in order:
//! 1. forced exit when the latest regime fights the position (ends the pass)
//! 2. breakeven once unrealized profit reaches `R × initial risk`
//! 3. partial close once profit reaches a fraction of the target distance
//! 4. trailing once profit passes the activation distance
//!
//! [`PositionLifecycleManager::plan`] is pure; [`PositionLifecycleManager::manage`]
//! executes the plan and records breakeven/partial progress in the portfolio
//! idempotency sets only after the terminal confirmed the command.

pub mod ratchet;

pub use ratchet::StopRatchet;

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

use crate::config::LifecycleConfig;
use crate::domain::{Instrument, OpenPosition, Ticket, PRICE_EPSILON};
use crate::error::ExecutionError;
use crate::regime::Regime;
use crate::risk::RiskManager;
use crate::terminal::ExecutionClient;

/// Stage a position has reached, derived from the idempotency sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleStage {
    Opened,
    BreakevenArmed,
    PartialTaken,
}

/// Which one-shot actions a ticket has already had.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    pub breakeven_applied: bool,
    pub partially_closed: bool,
}

impl Progress {
    pub fn of(ticket: Ticket, risk: &RiskManager) -> Self {
        Self {
            breakeven_applied: risk.is_breakeven_applied(ticket),
            partially_closed: risk.is_partially_closed(ticket),
        }
    }

    pub fn stage(self) -> LifecycleStage {
        if self.partially_closed {
            LifecycleStage::PartialTaken
        } else if self.breakeven_applied {
            LifecycleStage::BreakevenArmed
        } else {
            LifecycleStage::Opened
        }
    }
}

/// One command the lifecycle wants sent for a position.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleStep {
    Close { regime: Regime },
    /// `stop` is `None` when the current stop already sits at or past the
    /// breakeven level; the ticket is only marked.
    Breakeven { stop: Option<f64> },
    PartialClose { fraction: f64 },
    Trail { from: Option<f64>, to: f64 },
}

/// What actually happened, for the cycle report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum LifecycleAction {
    ForcedExit { ticket: Ticket, symbol: String, regime: Regime, price: f64, profit: f64 },
    Breakeven { ticket: Ticket, symbol: String, stop: Option<f64> },
    PartialClose { ticket: Ticket, symbol: String, volume_closed: f64, profit: f64 },
    Trail { ticket: Ticket, symbol: String, from: Option<f64>, to: f64 },
}

impl LifecycleAction {
    pub fn ticket(&self) -> Ticket {
        match self {
            LifecycleAction::ForcedExit { ticket, .. }
            | LifecycleAction::Breakeven { ticket, .. }
            | LifecycleAction::PartialClose { ticket, .. }
            | LifecycleAction::Trail { ticket, .. } => *ticket,
        }
    }
}

impl fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleAction::ForcedExit { ticket, symbol, regime, .. } => {
                write!(f, "{symbol} {ticket}: forced exit ({regime})")
            }
            LifecycleAction::Breakeven { ticket, symbol, stop: Some(stop) } => {
                write!(f, "{symbol} {ticket}: stop to breakeven {stop:.5}")
            }
            LifecycleAction::Breakeven { ticket, symbol, stop: None } => {
                write!(f, "{symbol} {ticket}: breakeven already covered")
            }
            LifecycleAction::PartialClose { ticket, symbol, volume_closed, .. } => {
                write!(f, "{symbol} {ticket}: partial close {volume_closed}")
            }
            LifecycleAction::Trail { ticket, symbol, to, .. } => write!(f, "{symbol} {ticket}: trail stop to {to:.5}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PositionLifecycleManager {
    cfg: LifecycleConfig,
}

impl PositionLifecycleManager {
    pub fn new(cfg: LifecycleConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.cfg
    }

    /// Commands due for `position` this cycle. Pure.
    ///
    /// `regime` is the latest classification for the symbol, if one is known.
    /// Breakeven and partial are skipped once `done` records them.
    /// Later steps see the stop as earlier steps would leave it.
    pub fn plan(
        &self,
        position: &OpenPosition,
        instrument: &Instrument,
        regime: Option<Regime>,
        done: Progress,
    ) -> Vec<LifecycleStep> {
        let direction = position.direction;
        if let Some(regime) = regime {
            if self.cfg.forced_exit_on_regime_conflict && regime.conflicts_with(direction) {
                return vec![LifecycleStep::Close { regime }];
            }
        }

        let mut steps = Vec::new();
        let gained = position.unrealized_move();
        let mut stop = position.stop_loss;

        if !done.breakeven_applied {
            if let Some(risk) = position.initial_risk() {
                if gained + PRICE_EPSILON >= risk * self.cfg.breakeven_r_multiple {
                    let level = direction.ahead_of(position.entry_price, instrument.pips(self.cfg.breakeven_buffer_pips));
                    if direction.is_tighter_stop(level, stop) {
                        stop = Some(level);
                        steps.push(LifecycleStep::Breakeven { stop: Some(level) });
                    } else {
                        steps.push(LifecycleStep::Breakeven { stop: None });
                    }
                }
            }
        }

        if !done.partially_closed {
            if let Some(target) = position.target_distance() {
                if gained + PRICE_EPSILON >= target * self.cfg.partial_target_fraction {
                    steps.push(LifecycleStep::PartialClose { fraction: self.cfg.partial_close_fraction });
                }
            }
        }

        if instrument.to_pips(gained) > self.cfg.trailing_activation_pips {
            let candidate = direction.behind(position.current_price, instrument.pips(self.cfg.trailing_distance_pips));
            let mut ratchet = StopRatchet::new(direction, stop, instrument.pips(self.cfg.trailing_step_pips));
            if let Some(to) = ratchet.propose(candidate) {
                steps.push(LifecycleStep::Trail { from: stop, to });
            }
        }

        steps
    }

    /// Run the plan for one position against the terminal.
    ///
    /// A rejected command is logged and ends this position's pass; the step is
    /// retried next cycle. Only fatal terminal errors are returned.
    pub fn manage(
        &self,
        position: &OpenPosition,
        instrument: &Instrument,
        regime: Option<Regime>,
        risk: &RiskManager,
        exec: &dyn ExecutionClient,
    ) -> Result<Vec<LifecycleAction>, ExecutionError> {
        let ticket = position.ticket;
        let done = Progress::of(ticket, risk);
        let mut actions = Vec::new();

        for step in self.plan(position, instrument, regime, done) {
            let symbol = position.symbol.clone();
            let outcome = match step {
                LifecycleStep::Close { regime } => exec.close_position(ticket).map(|receipt| {
                    info!(symbol = %symbol, %ticket, %regime, profit = receipt.profit, "lifecycle: forced exit");
                    LifecycleAction::ForcedExit { ticket, symbol, regime, price: receipt.price, profit: receipt.profit }
                }),
                LifecycleStep::Breakeven { stop } => {
                    let sent = match stop {
                        Some(level) => exec.modify_position(ticket, Some(level), position.take_profit),
                        None => Ok(()),
                    };
                    sent.map(|()| {
                        risk.mark_breakeven(ticket);
                        info!(symbol = %symbol, %ticket, ?stop, "lifecycle: breakeven armed");
                        LifecycleAction::Breakeven { ticket, symbol, stop }
                    })
                }
                LifecycleStep::PartialClose { fraction } => exec.partial_close(ticket, fraction).map(|receipt| {
                    risk.mark_partial(ticket);
                    info!(symbol = %symbol, %ticket, volume = receipt.volume_closed, "lifecycle: partial close");
                    LifecycleAction::PartialClose {
                        ticket,
                        symbol,
                        volume_closed: receipt.volume_closed,
                        profit: receipt.profit,
                    }
                }),
                LifecycleStep::Trail { from, to } => {
                    exec.modify_position(ticket, Some(to), position.take_profit).map(|()| {
                        info!(symbol = %symbol, %ticket, ?from, to, "lifecycle: trailing stop moved");
                        LifecycleAction::Trail { ticket, symbol, from, to }
                    })
                }
            };

            match outcome {
                Ok(action) => {
                    let closed = matches!(action, LifecycleAction::ForcedExit { .. });
                    actions.push(action);
                    if closed {
                        break;
                    }
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(symbol = %position.symbol, %ticket, error = %e, "lifecycle: command failed, retrying next cycle");
                    break;
                }
            }
        }
        Ok(actions)
    }
}
