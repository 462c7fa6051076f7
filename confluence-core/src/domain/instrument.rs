use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Broad asset class; selects the spread ceiling applied by the pre-scan gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetClass {
    Forex,
    Metal,
    Index,
    Energy,
    Crypto,
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AssetClass::Forex => "forex",
            AssetClass::Metal => "metal",
            AssetClass::Index => "index",
            AssetClass::Energy => "energy",
            AssetClass::Crypto => "crypto",
        };
        f.write_str(s)
    }
}

/// Instrument metadata: pip size, volume rules, spread/volatility limits.
///
/// Immutable once loaded from config.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Instrument {
    pub symbol: String,
    pub asset_class: AssetClass,
    /// Price increment of one pip (0.0001 for EURUSD, 0.01 for USDJPY/XAUUSD).
    pub pip_size: f64,
    /// Account-currency value of a one-pip move for one lot.
    #[serde(default = "default_pip_value")]
    pub pip_value_per_lot: f64,
    /// Currencies whose high-impact news blocks this symbol.
    #[serde(default)]
    pub currencies: Vec<String>,
    /// Overrides the asset-class spread ceiling, in pips.
    #[serde(default)]
    pub max_spread_pips: Option<f64>,
    /// Skip scanning when ATR on the entry timeframe exceeds this many pips.
    #[serde(default)]
    pub max_atr_pips: Option<f64>,
    #[serde(default = "default_min_volume")]
    pub min_volume: f64,
    #[serde(default = "default_max_volume")]
    pub max_volume: f64,
    #[serde(default = "default_volume_step")]
    pub volume_step: f64,
}

fn default_pip_value() -> f64 {
    10.0
}

fn default_min_volume() -> f64 {
    0.01
}

fn default_max_volume() -> f64 {
    5.0
}

fn default_volume_step() -> f64 {
    0.01
}

impl Instrument {
    /// Forex pair with the usual retail lot rules; currencies derived from the symbol.
    pub fn forex(symbol: &str, pip_size: f64) -> Self {
        let currencies = if symbol.len() == 6 {
            vec![symbol[..3].to_string(), symbol[3..].to_string()]
        } else {
            Vec::new()
        };
        Self {
            symbol: symbol.to_string(),
            asset_class: AssetClass::Forex,
            pip_size,
            pip_value_per_lot: default_pip_value(),
            currencies,
            max_spread_pips: None,
            max_atr_pips: None,
            min_volume: default_min_volume(),
            max_volume: default_max_volume(),
            volume_step: default_volume_step(),
        }
    }

    /// Convert a price distance to pips.
    pub fn to_pips(&self, distance: f64) -> f64 {
        distance / self.pip_size
    }

    /// Convert pips to a price distance.
    pub fn pips(&self, pips: f64) -> f64 {
        pips * self.pip_size
    }

    /// Round a raw volume down to the volume step and clamp to [min, max].
    ///
    /// Returns 0.0 when the raw volume is below the minimum lot: the trade is
    /// too small to place rather than silently upsized.
    pub fn normalize_volume(&self, raw: f64) -> f64 {
        if !raw.is_finite() || raw <= 0.0 {
            return 0.0;
        }
        let steps = (raw / self.volume_step + 1e-9).floor();
        let stepped = steps * self.volume_step;
        if stepped + 1e-12 < self.min_volume {
            return 0.0;
        }
        // Re-round to kill float dust like 0.30000000000000004.
        let clamped = stepped.min(self.max_volume);
        (clamped / self.volume_step).round() * self.volume_step
    }

    pub fn validate(&self) -> Result<(), InstrumentError> {
        if self.symbol.trim().is_empty() {
            return Err(InstrumentError::EmptySymbol);
        }
        if !(self.pip_size > 0.0) {
            return Err(InstrumentError::InvalidPipSize {
                symbol: self.symbol.clone(),
                pip_size: self.pip_size,
            });
        }
        if !(self.volume_step > 0.0) || self.min_volume > self.max_volume {
            return Err(InstrumentError::InvalidVolumeRules { symbol: self.symbol.clone() });
        }
        Ok(())
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum InstrumentError {
    #[error("instrument symbol is empty")]
    EmptySymbol,

    #[error("{symbol}: pip_size {pip_size} must be positive")]
    InvalidPipSize { symbol: String, pip_size: f64 },

    #[error("{symbol}: volume_step must be positive and min_volume <= max_volume")]
    InvalidVolumeRules { symbol: String },
}
