//! Market regime classification.
//!
//! The regime does two jobs: it scales the risk percentage at sizing time and
//! it forces an exit when an open position fights it. `RegimeDetector` is the
//! seam for an external classifier; `AdxEmaRegime` is the built-in one.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::Direction;
use crate::features::FeatureSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    TrendingUp,
    TrendingDown,
    Ranging,
    Volatile,
}

impl Regime {
    /// True when holding a position in `direction` fights this regime.
    pub fn conflicts_with(self, direction: Direction) -> bool {
        matches!(
            (self, direction),
            (Regime::TrendingUp, Direction::Sell) | (Regime::TrendingDown, Direction::Buy)
        )
    }
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Regime::TrendingUp => "trending_up",
            Regime::TrendingDown => "trending_down",
            Regime::Ranging => "ranging",
            Regime::Volatile => "volatile",
        };
        f.write_str(s)
    }
}

/// Regime plus the multiplier applied to the sizing risk percentage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeView {
    pub regime: Regime,
    pub scale: f64,
}

pub trait RegimeDetector: Send + Sync {
    fn classify(&self, features: &FeatureSnapshot) -> RegimeView;
}

/// ADX for trend strength, slow-EMA slope for direction, ATR expansion for
/// volatility.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AdxEmaRegime {
    pub trend_adx: f64,
    /// ATR over its recent mean at or above which the market is Volatile.
    pub volatile_expansion: f64,
    pub trending_scale: f64,
    pub ranging_scale: f64,
    pub volatile_scale: f64,
}

impl Default for AdxEmaRegime {
    fn default() -> Self {
        Self {
            trend_adx: 25.0,
            volatile_expansion: 1.5,
            trending_scale: 1.0,
            ranging_scale: 0.75,
            volatile_scale: 0.5,
        }
    }
}

impl RegimeDetector for AdxEmaRegime {
    fn classify(&self, f: &FeatureSnapshot) -> RegimeView {
        let (regime, scale) = if f.atr_expansion >= self.volatile_expansion {
            (Regime::Volatile, self.volatile_scale)
        } else if f.adx >= self.trend_adx && f.ema_slope > 0.0 {
            (Regime::TrendingUp, self.trending_scale)
        } else if f.adx >= self.trend_adx && f.ema_slope < 0.0 {
            (Regime::TrendingDown, self.trending_scale)
        } else {
            (Regime::Ranging, self.ranging_scale)
        };
        RegimeView { regime, scale }
    }
}
