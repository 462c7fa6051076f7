//! Structural price zones: swing highs/lows plus the window extremes.
//!
//! A swing high is a bar whose high is strictly above the highs of the
//! `strength` bars on either side (swing low mirrors). Only fully confirmed
//! pivots count, so the last `strength` bars never produce a level.

use crate::domain::Bar;

/// Candidate support and resistance prices, unsorted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ZoneLevels {
    pub supports: Vec<f64>,
    pub resistances: Vec<f64>,
}

/// Swing levels within the last `lookback` bars.
///
/// The window's lowest low and highest high are always included so a trending
/// series without pivots still has a floor and a ceiling.
pub fn swing_levels(bars: &[Bar], lookback: usize, strength: usize) -> ZoneLevels {
    let start = bars.len().saturating_sub(lookback);
    let window = &bars[start..];
    let mut levels = ZoneLevels::default();
    if window.is_empty() {
        return levels;
    }

    if window.len() > 2 * strength {
        for i in strength..window.len() - strength {
            let bar = &window[i];
            let neighbours = window[i - strength..i].iter().chain(&window[i + 1..=i + strength]);
            let (mut is_high, mut is_low) = (true, true);
            for other in neighbours {
                is_high &= bar.high > other.high;
                is_low &= bar.low < other.low;
            }
            if is_high {
                levels.resistances.push(bar.high);
            }
            if is_low {
                levels.supports.push(bar.low);
            }
        }
    }

    let hi = window.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
    let lo = window.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
    if hi.is_finite() {
        levels.resistances.push(hi);
    }
    if lo.is_finite() {
        levels.supports.push(lo);
    }
    levels
}

/// Nearest support at or below `price` and nearest resistance at or above it.
pub fn nearest_zones(price: f64, levels: &ZoneLevels) -> (Option<f64>, Option<f64>) {
    let support = levels
        .supports
        .iter()
        .chain(&levels.resistances)
        .copied()
        .filter(|&l| l <= price)
        .max_by(f64::total_cmp);
    let resistance = levels
        .resistances
        .iter()
        .chain(&levels.supports)
        .copied()
        .filter(|&l| l >= price)
        .min_by(f64::total_cmp);
    (support, resistance)
}
