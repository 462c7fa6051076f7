//! Feature snapshot: everything the scorer and the signal providers see about
//! one instrument at one candle.
//!
//! Built from three timeframes (entry, intermediate, higher). The entry
//! timeframe must be fully warmed up; the two context timeframes degrade to
//! `Trend::Flat` when short, so a missing input scores zero rather than
//! failing the instrument.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::FeatureConfig;
use crate::domain::{Bar, Direction, Timeframe};
use crate::error::DataError;
use crate::indicators::{ema::ema_of_series, nearest_zones, swing_levels, value_back, Adx, Atr, Indicator, Rsi};

/// Swing pivots need this many bars on each side.
const PIVOT_STRENGTH: usize = 2;

/// Bars averaged for the ATR expansion baseline.
const ATR_BASELINE: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Flat,
}

impl Trend {
    pub fn aligned_with(self, direction: Direction) -> bool {
        matches!((self, direction), (Trend::Up, Direction::Buy) | (Trend::Down, Direction::Sell))
    }

    /// Up when close and fast EMA both sit above the slow EMA; Down mirrors.
    fn classify(close: f64, fast: f64, slow: f64) -> Self {
        if close > slow && fast > slow {
            Trend::Up
        } else if close < slow && fast < slow {
            Trend::Down
        } else {
            Trend::Flat
        }
    }
}

/// Bar series for one symbol on the three scanning timeframes.
///
/// `Arc` so the cache, the scoring task and the snapshot share one copy.
#[derive(Debug, Clone)]
pub struct TimeframeBars {
    pub entry_timeframe: Timeframe,
    pub entry: Arc<Vec<Bar>>,
    pub intermediate: Arc<Vec<Bar>>,
    pub higher: Arc<Vec<Bar>>,
}

impl TimeframeBars {
    /// Open time of the most recent entry-timeframe candle.
    pub fn last_candle_time(&self) -> Option<DateTime<Utc>> {
        self.entry.last().map(|b| b.time)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSnapshot {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub candle_time: DateTime<Utc>,
    pub close: f64,
    pub atr: f64,
    /// Current ATR over its recent average; > 1 means expanding volatility.
    pub atr_expansion: f64,
    pub adx: f64,
    pub rsi: f64,
    pub ema_fast: f64,
    pub ema_slow: f64,
    /// Slow-EMA change over `slope_lookback` bars, in ATRs per bar.
    pub ema_slope: f64,
    pub entry_trend: Trend,
    pub intermediate_trend: Trend,
    pub higher_trend: Trend,
    pub nearest_support: Option<f64>,
    pub nearest_resistance: Option<f64>,
}

impl FeatureSnapshot {
    pub fn compute(symbol: &str, bars: &TimeframeBars, cfg: &FeatureConfig) -> Result<Self, DataError> {
        let entry = bars.entry.as_slice();
        let needed = cfg.min_bars();
        if entry.len() < needed {
            return Err(DataError::Insufficient { symbol: symbol.to_string(), needed, have: entry.len() });
        }
        let last = entry.last().ok_or_else(|| DataError::Insufficient {
            symbol: symbol.to_string(),
            needed,
            have: 0,
        })?;
        if !last.is_sane() {
            return Err(DataError::Invalid { symbol: symbol.to_string(), reason: "last bar fails OHLC sanity".into() });
        }

        let closes: Vec<f64> = entry.iter().map(|b| b.close).collect();
        let fast_series = ema_of_series(&closes, cfg.ema_fast);
        let slow_series = ema_of_series(&closes, cfg.ema_slow);
        let atr_series = Atr::new(cfg.atr_period).compute(entry);

        let missing = |what: &str| DataError::Invalid {
            symbol: symbol.to_string(),
            reason: format!("{what} undefined on last bar"),
        };
        let ema_fast = value_back(&fast_series, 0).ok_or_else(|| missing("fast EMA"))?;
        let ema_slow = value_back(&slow_series, 0).ok_or_else(|| missing("slow EMA"))?;
        let atr = value_back(&atr_series, 0).filter(|a| *a > 0.0).ok_or_else(|| missing("ATR"))?;
        let adx = Adx::new(cfg.adx_period).latest(entry).ok_or_else(|| missing("ADX"))?;
        let rsi = Rsi::new(cfg.rsi_period).latest(entry).ok_or_else(|| missing("RSI"))?;

        let slope_back = value_back(&slow_series, cfg.slope_lookback).unwrap_or(ema_slow);
        let ema_slope = (ema_slow - slope_back) / (cfg.slope_lookback.max(1) as f64 * atr);

        let baseline: Vec<f64> = atr_series.iter().rev().take(ATR_BASELINE).copied().filter(|v| v.is_finite()).collect();
        let atr_expansion = if baseline.is_empty() {
            1.0
        } else {
            atr / (baseline.iter().sum::<f64>() / baseline.len() as f64)
        };

        let levels = swing_levels(entry, cfg.zone_lookback, PIVOT_STRENGTH);
        let (nearest_support, nearest_resistance) = nearest_zones(last.close, &levels);

        Ok(Self {
            symbol: symbol.to_string(),
            timeframe: bars.entry_timeframe,
            candle_time: last.time,
            close: last.close,
            atr,
            atr_expansion,
            adx,
            rsi,
            ema_fast,
            ema_slow,
            ema_slope,
            entry_trend: Trend::classify(last.close, ema_fast, ema_slow),
            intermediate_trend: context_trend(&bars.intermediate, cfg),
            higher_trend: context_trend(&bars.higher, cfg),
            nearest_support,
            nearest_resistance,
        })
    }

    /// Distance from the close to the zone a trade in `direction` leans on
    /// (support for BUY, resistance for SELL).
    pub fn zone_distance(&self, direction: Direction) -> Option<f64> {
        match direction {
            Direction::Buy => self.nearest_support.map(|s| self.close - s),
            Direction::Sell => self.nearest_resistance.map(|r| r - self.close),
        }
    }

    /// Fixed-order numeric vector handed to ML providers.
    pub fn as_vector(&self) -> Vec<f64> {
        let trend = |t: Trend| match t {
            Trend::Up => 1.0,
            Trend::Down => -1.0,
            Trend::Flat => 0.0,
        };
        let zone = |d: Option<f64>| d.map(|d| d / self.atr).unwrap_or(-1.0);
        vec![
            self.rsi / 100.0,
            self.adx / 100.0,
            self.ema_slope,
            (self.close - self.ema_slow) / self.atr,
            (self.ema_fast - self.ema_slow) / self.atr,
            self.atr_expansion,
            trend(self.entry_trend),
            trend(self.intermediate_trend),
            trend(self.higher_trend),
            zone(self.zone_distance(Direction::Buy)),
            zone(self.zone_distance(Direction::Sell)),
        ]
    }

    /// Named indicator values for the AI advisor prompt.
    pub fn indicator_map(&self) -> BTreeMap<String, f64> {
        let mut map = BTreeMap::new();
        map.insert("close".to_string(), self.close);
        map.insert("atr".to_string(), self.atr);
        map.insert("adx".to_string(), self.adx);
        map.insert("rsi".to_string(), self.rsi);
        map.insert("ema_fast".to_string(), self.ema_fast);
        map.insert("ema_slow".to_string(), self.ema_slow);
        map.insert("ema_slope".to_string(), self.ema_slope);
        if let Some(s) = self.nearest_support {
            map.insert("support".to_string(), s);
        }
        if let Some(r) = self.nearest_resistance {
            map.insert("resistance".to_string(), r);
        }
        map
    }
}

/// Trend on a context timeframe; Flat when there is not enough history.
fn context_trend(bars: &[Bar], cfg: &FeatureConfig) -> Trend {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let fast = value_back(&ema_of_series(&closes, cfg.ema_fast), 0);
    let slow = value_back(&ema_of_series(&closes, cfg.ema_slow), 0);
    match (closes.last(), fast, slow) {
        (Some(&close), Some(fast), Some(slow)) => Trend::classify(close, fast, slow),
        _ => Trend::Flat,
    }
}
