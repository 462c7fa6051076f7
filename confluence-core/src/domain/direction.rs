//! Trade direction and the sign conventions that hang off it.
//!
//! Every price comparison in the lifecycle and risk code goes through these
//! helpers so BUY and SELL mirror each other in exactly one place.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of a position or candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    pub const BOTH: [Direction; 2] = [Direction::Buy, Direction::Sell];

    /// +1.0 for Buy, -1.0 for Sell.
    pub fn sign(self) -> f64 {
        match self {
            Direction::Buy => 1.0,
            Direction::Sell => -1.0,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Direction::Buy => Direction::Sell,
            Direction::Sell => Direction::Buy,
        }
    }

    /// Signed distance the market has moved in our favour since `entry`.
    pub fn favorable_move(self, entry: f64, price: f64) -> f64 {
        self.sign() * (price - entry)
    }

    /// Price `distance` away from `price` in the favourable direction.
    pub fn ahead_of(self, price: f64, distance: f64) -> f64 {
        price + self.sign() * distance
    }

    /// Price `distance` away from `price` in the adverse direction (where stops live).
    pub fn behind(self, price: f64, distance: f64) -> f64 {
        price - self.sign() * distance
    }

    /// True if `proposed` is a strictly tighter stop than `current`.
    ///
    /// Long stops may only rise; short stops may only fall. A missing current
    /// stop is always loosest.
    pub fn is_tighter_stop(self, proposed: f64, current: Option<f64>) -> bool {
        match current {
            None => true,
            Some(cur) => match self {
                Direction::Buy => proposed > cur,
                Direction::Sell => proposed < cur,
            },
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Buy => f.write_str("BUY"),
            Direction::Sell => f.write_str("SELL"),
        }
    }
}
