//! Average True Range (Wilder).
//!
//! TR[t] = max(high-low, |high-prev_close|, |low-prev_close|); TR[0] is
//! undefined. ATR seeds with the mean of the first `period` true ranges and
//! then smooths with alpha = 1/period. Lookback: period.

use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Atr {
    period: usize,
    name: String,
}

impl Atr {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "ATR period must be >= 1");
        Self { period, name: format!("atr_{period}") }
    }
}

impl Indicator for Atr {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let mut tr = true_range(bars);
        if let Some(first) = tr.first_mut() {
            *first = f64::NAN;
        }
        wilder_smooth(&tr, self.period)
    }
}

/// True range per bar. The first bar only has its high-low range.
pub fn true_range(bars: &[Bar]) -> Vec<f64> {
    let mut out = Vec::with_capacity(bars.len());
    for (i, bar) in bars.iter().enumerate() {
        let range = bar.high - bar.low;
        let tr = match i.checked_sub(1).map(|p| bars[p].close) {
            None => range,
            Some(pc) => range.max((bar.high - pc).abs()).max((bar.low - pc).abs()),
        };
        out.push(tr);
    }
    out
}

/// Wilder smoothing (alpha = 1/period).
///
/// Seeds on the first `period` consecutive finite values; a NaN after the seed
/// poisons the rest of the series.
pub fn wilder_smooth(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    if period == 0 || n < period {
        return out;
    }

    let mut run = 0;
    let mut seed_end = None;
    for (i, v) in values.iter().enumerate() {
        if v.is_finite() {
            run += 1;
            if run == period {
                seed_end = Some(i);
                break;
            }
        } else {
            run = 0;
        }
    }
    let Some(seed_end) = seed_end else {
        return out;
    };

    let p = period as f64;
    let mut prev = values[seed_end + 1 - period..=seed_end].iter().sum::<f64>() / p;
    out[seed_end] = prev;
    for i in seed_end + 1..n {
        if !values[i].is_finite() {
            break;
        }
        prev += (values[i] - prev) / p;
        out[i] = prev;
    }
    out
}
