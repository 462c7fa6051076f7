//! Confluence Runner: the async side of the trading bot.
//!
//! This crate builds on `confluence-core` to provide:
//! - The cycle scheduler (snapshot, reconcile, manage, scan, rank, execute)
//! - A provider gateway that bounds every external signal call with a timeout
//! - Interval ticking and cooperative shutdown
//! - CSV and in-memory trade journals
//! - A deterministic paper terminal and heuristic stand-in providers
//! - Per-cycle reports

pub mod error;
pub mod gateway;
pub mod heuristics;
pub mod journal;
pub mod paper;
pub mod report;
pub mod scheduler;
pub mod ticker;

pub use error::{BuildError, SchedulerError};
pub use gateway::ProviderGateway;
pub use heuristics::{HeuristicAdvisor, HeuristicProvider};
pub use journal::{CsvJournal, MemoryJournal};
pub use paper::{PaperConfig, PaperTerminal};
pub use report::{CandidateSummary, CycleOutcome, CycleReport, ExecutedOrder, NoTradeReason, SymbolNote};
pub use scheduler::{Scheduler, SchedulerBuilder};
pub use ticker::{shutdown_channel, ShutdownHandle, ShutdownSignal, Ticker};
