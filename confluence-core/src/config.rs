//! Bot configuration: one TOML file, one `BotConfig`.
//!
//! Every section has a `Default` so a minimal file only needs the instrument
//! list. `BotConfig::load` parses and validates; `fingerprint()` hashes the
//! canonical JSON form so log lines and journal rows can be traced back to the
//! exact parameter set.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::domain::{AssetClass, ConfigFingerprint, Instrument, InstrumentError, Timeframe};
use crate::risk::news::NewsEvent;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error(transparent)]
    Instrument(#[from] InstrumentError),
}

/// Complete bot configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct BotConfig {
    pub scheduler: SchedulerConfig,
    pub features: FeatureConfig,
    pub scoring: ScoringConfig,
    pub risk: RiskConfig,
    pub lifecycle: LifecycleConfig,
    pub agent: AgentConfig,
    pub sessions: SessionConfig,
    pub correlation: CorrelationConfig,
    pub news: NewsConfig,
    pub instruments: Vec<Instrument>,
}

impl BotConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: BotConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Default sections with the given instruments.
    pub fn with_instruments(instruments: Vec<Instrument>) -> Self {
        Self { instruments, ..Self::default() }
    }

    pub fn instrument(&self, symbol: &str) -> Option<&Instrument> {
        self.instruments.iter().find(|i| i.symbol == symbol)
    }

    /// BLAKE3 of the canonical JSON serialization.
    pub fn fingerprint(&self) -> ConfigFingerprint {
        let json = serde_json::to_string(self).expect("BotConfig must serialize");
        ConfigFingerprint::from_bytes(json.as_bytes())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.instruments.is_empty() {
            return Err(invalid("at least one instrument is required"));
        }
        let mut seen = HashSet::new();
        for inst in &self.instruments {
            inst.validate()?;
            if !seen.insert(inst.symbol.as_str()) {
                return Err(invalid(format!("duplicate instrument {}", inst.symbol)));
            }
        }

        let s = &self.scheduler;
        if s.max_workers == 0 {
            return Err(invalid("scheduler.max_workers must be >= 1"));
        }
        if s.cycle_interval_secs == 0 {
            return Err(invalid("scheduler.cycle_interval_secs must be >= 1"));
        }
        self.features.validate()?;
        let min_bars = self.features.min_bars();
        if s.bar_count < min_bars {
            return Err(invalid(format!(
                "scheduler.bar_count {} is below the {min_bars} bars the indicators need",
                s.bar_count
            )));
        }

        self.scoring.validate()?;
        self.risk.validate()?;
        self.lifecycle.validate()?;
        self.sessions.validate()?;

        if self.agent.max_consecutive_losses == 0 {
            return Err(invalid("agent.max_consecutive_losses must be >= 1"));
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}

// ── Scheduler ──

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    pub cycle_interval_secs: u64,
    /// Concurrent scoring tasks in phase 2.
    pub max_workers: usize,
    pub provider_timeout_ms: u64,
    pub max_open_positions: usize,
    /// Bars requested per timeframe.
    pub bar_count: usize,
    pub entry_timeframe: Timeframe,
    pub intermediate_timeframe: Timeframe,
    pub higher_timeframe: Timeframe,
    pub cache_ttl_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cycle_interval_secs: 60,
            max_workers: 4,
            provider_timeout_ms: 3_000,
            max_open_positions: 5,
            bar_count: 200,
            entry_timeframe: Timeframe::M15,
            intermediate_timeframe: Timeframe::H1,
            higher_timeframe: Timeframe::H4,
            cache_ttl_secs: 30,
        }
    }
}

impl SchedulerConfig {
    pub fn cycle_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cycle_interval_secs)
    }

    pub fn provider_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.provider_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::seconds(self.cache_ttl_secs as i64)
    }

    pub fn timeframes(&self) -> [Timeframe; 3] {
        [self.entry_timeframe, self.intermediate_timeframe, self.higher_timeframe]
    }
}

// ── Features ──

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FeatureConfig {
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub atr_period: usize,
    pub adx_period: usize,
    pub rsi_period: usize,
    /// Bars scanned for swing highs/lows.
    pub zone_lookback: usize,
    /// Bars over which the slow EMA slope is measured.
    pub slope_lookback: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            ema_fast: 20,
            ema_slow: 50,
            atr_period: 14,
            adx_period: 14,
            rsi_period: 14,
            zone_lookback: 50,
            slope_lookback: 5,
        }
    }
}

impl FeatureConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let periods = [
            ("ema_fast", self.ema_fast),
            ("ema_slow", self.ema_slow),
            ("atr_period", self.atr_period),
            ("adx_period", self.adx_period),
            ("rsi_period", self.rsi_period),
            ("zone_lookback", self.zone_lookback),
            ("slope_lookback", self.slope_lookback),
        ];
        if let Some((name, _)) = periods.iter().find(|(_, period)| *period == 0) {
            return Err(invalid(format!("features.{name} must be >= 1")));
        }
        if self.ema_fast >= self.ema_slow {
            return Err(invalid("features.ema_fast must be shorter than features.ema_slow"));
        }
        Ok(())
    }

    /// Shortest series for which every indicator has a value on the last bar.
    pub fn min_bars(&self) -> usize {
        let ema = self.ema_slow + self.slope_lookback;
        let adx = 2 * self.adx_period + 1;
        ema.max(adx).max(self.atr_period + 1).max(self.rsi_period + 1).max(self.zone_lookback)
    }
}

// ── Scoring ──

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct EnsembleWeights {
    pub probability: f64,
    pub ai: f64,
    pub confluence: f64,
}

impl Default for EnsembleWeights {
    fn default() -> Self {
        Self { probability: 0.4, ai: 0.2, confluence: 0.4 }
    }
}

impl EnsembleWeights {
    pub fn sum(&self) -> f64 {
        self.probability + self.ai + self.confluence
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: EnsembleWeights,
    /// Directional model probability needed for the probability point.
    pub probability_threshold: f64,
    /// AI confidence (0–100) needed for the agreement point.
    pub ai_min_confidence: f64,
    /// ADX level for the trend-strength point.
    pub adx_threshold: f64,
    /// Max distance to a structural zone, in ATRs.
    pub zone_atr_multiple: f64,
    /// Confluence needed to trade during single-session hours.
    pub base_threshold: u8,
    pub boost_min_confluence: u8,
    pub boost_probability: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: EnsembleWeights::default(),
            probability_threshold: 0.6,
            ai_min_confidence: 60.0,
            adx_threshold: 25.0,
            zone_atr_multiple: 0.5,
            base_threshold: 5,
            boost_min_confluence: 2,
            boost_probability: 0.85,
        }
    }
}

impl ScoringConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let w = &self.weights;
        if w.probability < 0.0 || w.ai < 0.0 || w.confluence < 0.0 {
            return Err(invalid("scoring.weights must be non-negative"));
        }
        if (w.sum() - 1.0).abs() > 1e-6 {
            return Err(invalid(format!("scoring.weights must sum to 1.0, got {}", w.sum())));
        }
        if !(1..=6).contains(&self.base_threshold) {
            return Err(invalid("scoring.base_threshold must be in 1..=6"));
        }
        if !(0.5..=1.0).contains(&self.probability_threshold) {
            return Err(invalid("scoring.probability_threshold must be in [0.5, 1.0]"));
        }
        if !(0.0..=100.0).contains(&self.ai_min_confidence) {
            return Err(invalid("scoring.ai_min_confidence must be in [0, 100]"));
        }
        Ok(())
    }
}

// ── Risk ──

/// Spread ceilings per asset class, in pips.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SpreadLimits {
    pub forex: f64,
    pub metal: f64,
    pub index: f64,
    pub energy: f64,
    pub crypto: f64,
}

impl Default for SpreadLimits {
    fn default() -> Self {
        Self { forex: 3.0, metal: 50.0, index: 30.0, energy: 10.0, crypto: 200.0 }
    }
}

impl SpreadLimits {
    pub fn limit_for(&self, class: AssetClass) -> f64 {
        match class {
            AssetClass::Forex => self.forex,
            AssetClass::Metal => self.metal,
            AssetClass::Index => self.index,
            AssetClass::Energy => self.energy,
            AssetClass::Crypto => self.crypto,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RiskConfig {
    pub daily_trade_cap: u32,
    /// Minimum time between two trades on the same symbol.
    pub cooldown_secs: u64,
    pub spread_limits: SpreadLimits,
    /// Risk per trade in percent of equity, by confluence quality.
    pub base_risk_pct: f64,
    pub mid_risk_pct: f64,
    pub max_risk_pct: f64,
    /// Realized daily loss (percent of equity) that trips the portfolio breaker.
    pub max_daily_loss_pct: f64,
    pub sl_atr_mult: f64,
    pub tp_atr_mult: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            daily_trade_cap: 10,
            cooldown_secs: 900,
            spread_limits: SpreadLimits::default(),
            base_risk_pct: 0.5,
            mid_risk_pct: 0.75,
            max_risk_pct: 1.0,
            max_daily_loss_pct: 3.0,
            sl_atr_mult: 1.5,
            tp_atr_mult: 3.0,
        }
    }
}

impl RiskConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::seconds(self.cooldown_secs as i64)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.daily_trade_cap == 0 {
            return Err(invalid("risk.daily_trade_cap must be >= 1"));
        }
        if !(self.base_risk_pct > 0.0
            && self.base_risk_pct <= self.mid_risk_pct
            && self.mid_risk_pct <= self.max_risk_pct)
        {
            return Err(invalid("risk percentages must satisfy 0 < base <= mid <= max"));
        }
        if !(self.sl_atr_mult > 0.0 && self.tp_atr_mult > 0.0) {
            return Err(invalid("risk.sl_atr_mult and risk.tp_atr_mult must be positive"));
        }
        if !(self.max_daily_loss_pct > 0.0) {
            return Err(invalid("risk.max_daily_loss_pct must be positive"));
        }
        Ok(())
    }
}

// ── Lifecycle ──

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Profit, in multiples of initial risk, that arms breakeven.
    pub breakeven_r_multiple: f64,
    pub breakeven_buffer_pips: f64,
    /// Fraction of the entry-to-target distance that triggers the partial close.
    pub partial_target_fraction: f64,
    /// Fraction of volume closed at the partial.
    pub partial_close_fraction: f64,
    pub trailing_activation_pips: f64,
    pub trailing_distance_pips: f64,
    pub trailing_step_pips: f64,
    pub forced_exit_on_regime_conflict: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            breakeven_r_multiple: 0.8,
            breakeven_buffer_pips: 1.0,
            partial_target_fraction: 0.5,
            partial_close_fraction: 0.5,
            trailing_activation_pips: 20.0,
            trailing_distance_pips: 15.0,
            trailing_step_pips: 5.0,
            forced_exit_on_regime_conflict: true,
        }
    }
}

impl LifecycleConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.breakeven_r_multiple > 0.0) {
            return Err(invalid("lifecycle.breakeven_r_multiple must be positive"));
        }
        if !(self.partial_close_fraction > 0.0 && self.partial_close_fraction < 1.0) {
            return Err(invalid("lifecycle.partial_close_fraction must be in (0, 1)"));
        }
        if !(self.partial_target_fraction > 0.0 && self.partial_target_fraction <= 1.0) {
            return Err(invalid("lifecycle.partial_target_fraction must be in (0, 1]"));
        }
        if !(self.trailing_step_pips > 0.0 && self.trailing_distance_pips > 0.0) {
            return Err(invalid("lifecycle trailing distance and step must be positive"));
        }
        Ok(())
    }
}

// ── Agent ──

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    pub max_consecutive_losses: u32,
    /// Paused agents resume on their own after this long.
    pub cooloff_secs: u64,
    pub atr_cache_ttl_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_consecutive_losses: 3,
            cooloff_secs: 4 * 60 * 60,
            atr_cache_ttl_secs: 300,
        }
    }
}

impl AgentConfig {
    pub fn cooloff(&self) -> Duration {
        Duration::seconds(self.cooloff_secs as i64)
    }

    pub fn atr_cache_ttl(&self) -> Duration {
        Duration::seconds(self.atr_cache_ttl_secs as i64)
    }
}

// ── Sessions ──

/// UTC hour range `[start_hour, end_hour)`. Wraps midnight when start > end.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct HourRange {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl HourRange {
    pub fn new(start_hour: u32, end_hour: u32) -> Self {
        Self { start_hour, end_hour }
    }

    pub fn contains(&self, hour: u32) -> bool {
        if self.start_hour <= self.end_hour {
            hour >= self.start_hour && hour < self.end_hour
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }

    fn is_valid(&self) -> bool {
        self.start_hour <= 23 && self.end_hour <= 24
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionWindow {
    pub name: String,
    #[serde(flatten)]
    pub hours: HourRange,
    /// Major sessions count toward an overlap.
    #[serde(default)]
    pub major: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    pub windows: Vec<SessionWindow>,
    /// Scanning happens only inside this range.
    pub trading_window: HourRange,
    pub trade_weekends: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            windows: vec![
                SessionWindow { name: "tokyo".into(), hours: HourRange::new(0, 9), major: false },
                SessionWindow { name: "london".into(), hours: HourRange::new(7, 16), major: true },
                SessionWindow { name: "new_york".into(), hours: HourRange::new(12, 21), major: true },
            ],
            trading_window: HourRange::new(0, 24),
            trade_weekends: false,
        }
    }
}

impl SessionConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !self.trading_window.is_valid() {
            return Err(invalid("sessions.trading_window hours out of range"));
        }
        for w in &self.windows {
            if !w.hours.is_valid() {
                return Err(invalid(format!("session window {} hours out of range", w.name)));
            }
        }
        Ok(())
    }
}

// ── Correlation ──

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CorrelationConfig {
    /// Groups of symbols that move together.
    pub direct: Vec<Vec<String>>,
    /// Pairs of symbols that move against each other.
    pub inverse: Vec<[String; 2]>,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        let group = |syms: &[&str]| syms.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let pair = |a: &str, b: &str| [a.to_string(), b.to_string()];
        Self {
            direct: vec![
                group(&["EURUSD", "GBPUSD", "EURGBP"]),
                group(&["AUDUSD", "NZDUSD"]),
                group(&["XAUUSD", "XAGUSD"]),
            ],
            inverse: vec![
                pair("EURUSD", "USDCHF"),
                pair("EURUSD", "USDCAD"),
                pair("GBPUSD", "USDCHF"),
            ],
        }
    }
}

// ── News ──

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NewsConfig {
    pub block_before_mins: i64,
    pub block_after_mins: i64,
    pub events: Vec<NewsEvent>,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self { block_before_mins: 30, block_after_mins: 30, events: Vec::new() }
    }
}
