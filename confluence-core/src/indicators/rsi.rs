//! Relative Strength Index with Wilder-smoothed gains and losses.
//!
//! RSI = 100 − 100 / (1 + avg_gain / avg_loss). Flat input reads 50.
//! Lookback: period.

use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
    name: String,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "RSI period must be >= 1");
        Self { period, name: format!("rsi_{period}") }
    }
}

impl Indicator for Rsi {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let n = bars.len();
        let mut out = vec![f64::NAN; n];
        if n <= self.period {
            return out;
        }

        let change = |i: usize| bars[i].close - bars[i - 1].close;
        let p = self.period as f64;

        let (mut gain, mut loss) = (0.0, 0.0);
        for i in 1..=self.period {
            let ch = change(i);
            if ch.is_nan() {
                return out;
            }
            gain += ch.max(0.0);
            loss += (-ch).max(0.0);
        }
        gain /= p;
        loss /= p;
        out[self.period] = rsi_value(gain, loss);

        for i in self.period + 1..n {
            let ch = change(i);
            if ch.is_nan() {
                break;
            }
            gain += (ch.max(0.0) - gain) / p;
            loss += ((-ch).max(0.0) - loss) / p;
            out[i] = rsi_value(gain, loss);
        }
        out
    }
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    match (avg_gain > 0.0, avg_loss > 0.0) {
        (false, false) => 50.0,
        (true, false) => 100.0,
        (false, true) => 0.0,
        (true, true) => 100.0 - 100.0 / (1.0 + avg_gain / avg_loss),
    }
}
