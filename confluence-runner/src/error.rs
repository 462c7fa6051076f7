//! Runner error types.
//!
//! Everything recoverable is absorbed inside a cycle and shows up in the
//! `CycleReport`. Only fatal conditions leave `run_cycle` as an error.

use confluence_core::config::ConfigError;
use confluence_core::error::{DataError, ExecutionError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The terminal is gone or a worker died; the loop halts.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl SchedulerError {
    pub fn fatal(context: &str, err: impl std::fmt::Display) -> Self {
        SchedulerError::Fatal(format!("{context}: {err}"))
    }
}

impl From<DataError> for SchedulerError {
    fn from(err: DataError) -> Self {
        SchedulerError::fatal("market data", err)
    }
}

impl From<ExecutionError> for SchedulerError {
    fn from(err: ExecutionError) -> Self {
        SchedulerError::fatal("execution", err)
    }
}

impl From<tokio::task::JoinError> for SchedulerError {
    fn from(err: tokio::task::JoinError) -> Self {
        SchedulerError::fatal("blocking task", err)
    }
}

/// Assembly failures from `SchedulerBuilder::build`.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("missing collaborator: {0}")]
    Missing(&'static str),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("no instruments configured")]
    NoInstruments,
}
