//! Domain types shared by every layer of the bot.

pub mod bar;
pub mod candidate;
pub mod direction;
pub mod ids;
pub mod instrument;
pub mod position;

pub use bar::{Bar, Timeframe};
pub use candidate::{Candidate, Factor, FactorDetail, FactorMap};
pub use direction::Direction;
pub use ids::{ConfigFingerprint, Ticket};
pub use instrument::{AssetClass, Instrument, InstrumentError};
pub use position::{ClosedTrade, OpenPosition};

/// Tolerance for price comparisons (pip fractions are far above this).
pub const PRICE_EPSILON: f64 = 1e-9;
