//! Exponential Moving Average of closes.
//!
//! Seed: SMA of the first `period` closes. Then EMA[t] = EMA[t-1] + alpha *
//! (close[t] - EMA[t-1]) with alpha = 2/(period+1). Lookback: period - 1.

use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
    name: String,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "EMA period must be >= 1");
        Self { period, name: format!("ema_{period}") }
    }
}

impl Indicator for Ema {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period.saturating_sub(1)
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        ema_of_series(&closes, self.period)
    }
}

/// EMA of an arbitrary series. A NaN in the seed window yields all NaN; a NaN
/// after the seed poisons the remainder.
pub fn ema_of_series(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    if period == 0 || n < period {
        return out;
    }
    let seed_window = &values[..period];
    if seed_window.iter().any(|v| !v.is_finite()) {
        return out;
    }

    let alpha = 2.0 / (period as f64 + 1.0);
    let mut prev = seed_window.iter().sum::<f64>() / period as f64;
    out[period - 1] = prev;
    for i in period..n {
        if !values[i].is_finite() {
            break;
        }
        prev += alpha * (values[i] - prev);
        out[i] = prev;
    }
    out
}
