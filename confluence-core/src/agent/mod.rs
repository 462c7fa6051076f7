//! One agent per symbol.
//!
//! The agent owns the symbol's loss-streak breaker, new-candle guard and ATR
//! cache. A scan is split so the async scheduler can put the provider calls
//! between the halves:
//! - [`InstrumentAgent::prepare`] computes features and the regime (pure CPU)
//! - [`InstrumentAgent::evaluate`] scores them against a [`SignalBundle`] and
//!   builds the [`Candidate`]
//!
//! [`InstrumentAgent::scan`] runs both with blocking provider calls.

pub mod state;

pub use state::{AgentStatus, CachedAtr, InstrumentAgentState};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{AgentConfig, BotConfig, FeatureConfig, RiskConfig};
use crate::domain::{Candidate, Instrument};
use crate::error::DataError;
use crate::features::{FeatureSnapshot, TimeframeBars};
use crate::regime::{Regime, RegimeDetector, RegimeView};
use crate::risk::{GateDecision, GateReason};
use crate::scoring::ConfluenceScorer;
use crate::signals::{ProviderSnapshot, SignalBundle};

/// Why a scan produced no candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SkipReason {
    Paused,
    /// The last entry-timeframe candle was already scored.
    SameCandle,
    VolatilityTooHigh { atr_pips: f64, limit_pips: f64 },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Paused => f.write_str("agent paused"),
            SkipReason::SameCandle => f.write_str("candle already analyzed"),
            SkipReason::VolatilityTooHigh { atr_pips, limit_pips } => {
                write!(f, "ATR {atr_pips:.1} pips > {limit_pips:.1}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    Candidate(Candidate),
    Skipped(SkipReason),
}

impl ScanOutcome {
    pub fn candidate(self) -> Option<Candidate> {
        match self {
            ScanOutcome::Candidate(c) => Some(c),
            ScanOutcome::Skipped(_) => None,
        }
    }
}

/// Features and regime for a fresh candle, ready for the provider calls.
#[derive(Debug, Clone)]
pub struct PreparedScan {
    pub features: FeatureSnapshot,
    pub regime: RegimeView,
    /// ATR used for stop and target distances (cached or fresh).
    pub atr: f64,
}

pub struct InstrumentAgent {
    instrument: Instrument,
    cfg: AgentConfig,
    features: FeatureConfig,
    sl_atr_mult: f64,
    tp_atr_mult: f64,
    scorer: ConfluenceScorer,
    regime: Arc<dyn RegimeDetector>,
    state: Mutex<InstrumentAgentState>,
}

impl fmt::Debug for InstrumentAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentAgent")
            .field("symbol", &self.instrument.symbol)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

impl InstrumentAgent {
    pub fn new(
        instrument: Instrument,
        cfg: AgentConfig,
        features: FeatureConfig,
        risk: &RiskConfig,
        scorer: ConfluenceScorer,
        regime: Arc<dyn RegimeDetector>,
    ) -> Self {
        Self {
            instrument,
            cfg,
            features,
            sl_atr_mult: risk.sl_atr_mult,
            tp_atr_mult: risk.tp_atr_mult,
            scorer,
            regime,
            state: Mutex::new(InstrumentAgentState::default()),
        }
    }

    pub fn from_config(instrument: Instrument, cfg: &BotConfig, regime: Arc<dyn RegimeDetector>) -> Self {
        Self::new(
            instrument,
            cfg.agent.clone(),
            cfg.features.clone(),
            &cfg.risk,
            ConfluenceScorer::new(cfg.scoring.clone()),
            regime,
        )
    }

    pub fn symbol(&self) -> &str {
        &self.instrument.symbol
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    pub fn scorer(&self) -> &ConfluenceScorer {
        &self.scorer
    }

    /// Agent-level gate: a paused agent emits nothing.
    pub fn pre_scan(&self, now: DateTime<Utc>) -> GateDecision {
        if self.state.lock().is_active(now, self.cfg.cooloff()) {
            GateDecision::allow()
        } else {
            GateDecision::deny(GateReason::AgentPaused)
        }
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.state.lock().is_active(now, self.cfg.cooloff())
    }

    /// Features and regime for the newest candle.
    ///
    /// `Ok(Err(reason))` when the scan should stop here for a non-error reason.
    pub fn prepare(
        &self,
        bars: &TimeframeBars,
        now: DateTime<Utc>,
    ) -> Result<Result<PreparedScan, SkipReason>, DataError> {
        if !self.is_active(now) {
            return Ok(Err(SkipReason::Paused));
        }
        let candle = bars.last_candle_time();
        if candle.is_some() && self.state.lock().last_candle == candle {
            return Ok(Err(SkipReason::SameCandle));
        }

        let features = FeatureSnapshot::compute(&self.instrument.symbol, bars, &self.features)?;
        let regime = self.classify(&features);
        let atr = self.current_atr(features.atr, now);

        if let Some(limit_pips) = self.instrument.max_atr_pips {
            let atr_pips = self.instrument.to_pips(atr);
            if atr_pips > limit_pips {
                return Ok(Err(SkipReason::VolatilityTooHigh { atr_pips, limit_pips }));
            }
        }
        Ok(Ok(PreparedScan { features, regime, atr }))
    }

    /// Classify the regime from fresh bars without scoring.
    ///
    /// Runs in the management pass for every symbol with open positions, so
    /// the forced exit sees a current regime even when scanning is gated.
    pub fn refresh_regime(&self, bars: &TimeframeBars) -> Result<RegimeView, DataError> {
        let features = FeatureSnapshot::compute(&self.instrument.symbol, bars, &self.features)?;
        Ok(self.classify(&features))
    }

    fn classify(&self, features: &FeatureSnapshot) -> RegimeView {
        let view = self.regime.classify(features);
        self.state.lock().last_regime = Some(view.regime);
        view
    }

    /// Cached ATR while younger than the TTL, otherwise `fresh` (and cache it).
    fn current_atr(&self, fresh: f64, now: DateTime<Utc>) -> f64 {
        let mut state = self.state.lock();
        match state.cached_atr {
            Some(cached) if cached.age(now) < self.cfg.atr_cache_ttl() => cached.value,
            _ => {
                state.cached_atr = Some(CachedAtr { value: fresh, computed_at: now });
                fresh
            }
        }
    }

    /// Score a prepared scan and build the candidate.
    ///
    /// The candle is not marked here: the scheduler calls
    /// [`InstrumentAgent::mark_analyzed`] once the candidate is settled, so a
    /// rejected or untried candidate is scored again next cycle.
    pub fn evaluate(&self, prepared: &PreparedScan, signals: &SignalBundle) -> ScanOutcome {
        let card = self.scorer.score(&prepared.features, signals);
        let best = card.into_best();

        debug!(
            symbol = %self.instrument.symbol,
            direction = %best.direction,
            confluence = best.confluence,
            ensemble = best.ensemble,
            regime = %prepared.regime.regime,
            degraded = signals.is_degraded(),
            "agent: scored"
        );

        ScanOutcome::Candidate(Candidate {
            symbol: self.instrument.symbol.clone(),
            direction: best.direction,
            confluence: best.confluence,
            ensemble: best.ensemble,
            probability: best.probability,
            factors: best.factors,
            stop_distance: prepared.atr * self.sl_atr_mult,
            target_distance: prepared.atr * self.tp_atr_mult,
            sizing_scale: prepared.regime.scale,
            regime: prepared.regime.regime,
            reference_price: prepared.features.close,
            atr: prepared.atr,
            candle_time: prepared.features.candle_time,
        })
    }

    /// Full scan with the providers called inline.
    pub fn scan(
        &self,
        bars: &TimeframeBars,
        providers: &ProviderSnapshot,
        now: DateTime<Utc>,
    ) -> Result<ScanOutcome, DataError> {
        match self.prepare(bars, now)? {
            Ok(prepared) => {
                let signals = providers.gather_blocking(&prepared.features);
                Ok(self.evaluate(&prepared, &signals))
            }
            Err(reason) => Ok(ScanOutcome::Skipped(reason)),
        }
    }

    /// Book a closed trade's result against the loss streak.
    pub fn update_performance(&self, profit: f64, now: DateTime<Utc>) {
        let mut state = self.state.lock();
        if state.record_result(profit, self.cfg.max_consecutive_losses, now) {
            warn!(
                symbol = %self.instrument.symbol,
                losses = state.consecutive_losses,
                cooloff_secs = self.cfg.cooloff_secs,
                "agent: paused after consecutive losses"
            );
        }
    }

    /// The new-candle guard skips `candle` from now on.
    pub fn mark_analyzed(&self, candle: DateTime<Utc>) {
        self.state.lock().last_candle = Some(candle);
    }

    pub fn record_trade(&self, now: DateTime<Utc>) {
        self.state.lock().last_trade = Some(now);
    }

    /// Manual reset back to active.
    pub fn reset(&self) {
        self.state.lock().reset();
        info!(symbol = %self.instrument.symbol, "agent: reset to active");
    }

    /// Latest regime seen for this symbol, for the lifecycle's forced exit.
    pub fn last_regime(&self) -> Option<Regime> {
        self.state.lock().last_regime
    }

    pub fn state(&self) -> InstrumentAgentState {
        self.state.lock().clone()
    }
}
