//! Confluence-scaled fixed-fractional sizing.
//!
//! # Formula
//! ```text
//! risk_pct    = base | mid | max   by confluence (≤4 | 5 | ≥6)
//! risk_amount = equity × risk_pct / 100 × regime_scale
//! volume      = risk_amount / (stop_pips × pip_value_per_lot)
//! ```
//! then rounded down to the volume step and clamped to the lot limits.
//!
//! # Example
//! - Equity 10,000, confluence 5 → 0.75% → 75.00 at risk
//! - Stop 15 pips on EURUSD at 10.00 per pip per lot
//! - Volume: 75 / 150 = 0.50 lots

use serde::{Deserialize, Serialize};

use crate::config::RiskConfig;
use crate::domain::{Candidate, Instrument};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SizeDecision {
    pub volume: f64,
    pub risk_pct: f64,
    pub risk_amount: f64,
    pub stop_pips: f64,
}

impl SizeDecision {
    pub fn zero() -> Self {
        Self { volume: 0.0, risk_pct: 0.0, risk_amount: 0.0, stop_pips: 0.0 }
    }

    pub fn is_tradeable(&self) -> bool {
        self.volume > 0.0
    }
}

#[derive(Debug, Clone)]
pub struct PositionSizer {
    cfg: RiskConfig,
}

impl PositionSizer {
    pub fn new(cfg: RiskConfig) -> Self {
        Self { cfg }
    }

    pub fn risk_pct(&self, confluence: u8) -> f64 {
        match confluence {
            0..=4 => self.cfg.base_risk_pct,
            5 => self.cfg.mid_risk_pct,
            _ => self.cfg.max_risk_pct,
        }
    }

    pub fn size(&self, candidate: &Candidate, instrument: &Instrument, equity: f64) -> SizeDecision {
        let stop_pips = instrument.to_pips(candidate.stop_distance);
        let scale = candidate.sizing_scale;
        let pip_value = instrument.pip_value_per_lot;
        if !(equity > 0.0 && stop_pips > 0.0 && scale > 0.0 && pip_value > 0.0) {
            return SizeDecision::zero();
        }

        let risk_pct = self.risk_pct(candidate.confluence);
        let risk_amount = equity * risk_pct / 100.0 * scale;
        let raw = risk_amount / (stop_pips * pip_value);
        SizeDecision { volume: instrument.normalize_volume(raw), risk_pct, risk_amount, stop_pips }
    }
}
