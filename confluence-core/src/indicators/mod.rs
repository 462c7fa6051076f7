//! Technical indicators over bar series.
//!
//! Every indicator is a pure function from a bar slice to a series of the same
//! length, with `f64::NAN` during warmup. The feature builder only reads the
//! last value of each series, but keeping whole series makes the look-ahead
//! guard testable: a value at index t never depends on bars after t.

pub mod adx;
pub mod atr;
pub mod ema;
pub mod rsi;
pub mod zones;

pub use adx::Adx;
pub use atr::Atr;
pub use ema::Ema;
pub use rsi::Rsi;
pub use zones::{nearest_zones, swing_levels, ZoneLevels};

use crate::domain::Bar;

pub trait Indicator: Send + Sync {
    /// Human-readable name (e.g., "ema_20", "atr_14").
    fn name(&self) -> &str;

    /// Number of leading NaN values.
    fn lookback(&self) -> usize;

    fn compute(&self, bars: &[Bar]) -> Vec<f64>;

    /// Value on the last bar, `None` during warmup.
    fn latest(&self, bars: &[Bar]) -> Option<f64> {
        self.compute(bars).last().copied().filter(|v| v.is_finite())
    }
}

/// Value `back` bars before the last, `None` when out of range or NaN.
pub fn value_back(series: &[f64], back: usize) -> Option<f64> {
    let idx = series.len().checked_sub(1 + back)?;
    series.get(idx).copied().filter(|v| v.is_finite())
}

/// Synthetic bars from closes: open = previous close, high/low one
/// `spread` outside the body.
#[cfg(test)]
pub fn make_bars(closes: &[f64], spread: f64) -> Vec<Bar> {
    use chrono::TimeZone;
    let start = chrono::Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Bar::new(
                start + chrono::Duration::minutes(15 * i as i64),
                open,
                open.max(close) + spread,
                open.min(close) - spread,
                close,
                1_000.0,
            )
        })
        .collect()
}

/// Bars from explicit (open, high, low, close) tuples.
#[cfg(test)]
pub fn make_ohlc_bars(data: &[(f64, f64, f64, f64)]) -> Vec<Bar> {
    use chrono::TimeZone;
    let start = chrono::Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    data.iter()
        .enumerate()
        .map(|(i, &(open, high, low, close))| {
            Bar::new(start + chrono::Duration::minutes(15 * i as i64), open, high, low, close, 1_000.0)
        })
        .collect()
}

#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
