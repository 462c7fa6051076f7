//! Confluence Core: the synchronous decision and risk core of the trading bot.
//!
//! This crate holds everything that can be reasoned about without a runtime:
//! - Domain types (bars, instruments, candidates, positions, tickets)
//! - Indicators and the per-candle feature snapshot
//! - Regime classification and session-adaptive thresholds
//! - Confluence scoring, ensemble voting and candidate ranking
//! - Portfolio risk gates, correlation exposure, news blackout, sizing
//! - The position lifecycle state machine (breakeven, partial, trailing, forced exit)
//! - Per-instrument agents with loss-streak breakers
//! - Collaborator traits for market data, execution, journal and signal providers
//!
//! Async orchestration lives in `confluence-runner`.

pub mod agent;
pub mod cache;
pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod features;
pub mod hot_swap;
pub mod indicators;
pub mod lifecycle;
pub mod regime;
pub mod risk;
pub mod scoring;
pub mod session;
pub mod signals;
pub mod terminal;
