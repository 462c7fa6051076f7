use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{AiSignal, PatternRecall, Prediction, ProviderError, RlAction, SignalKind};

/// A provider that failed this cycle and was replaced by its neutral value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Degraded {
    pub kind: SignalKind,
    pub reason: String,
}

/// Fixed-schema result of asking every provider about one instrument.
///
/// `None` means the provider had no answer (failed or not configured).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalBundle {
    pub technical: Option<Prediction>,
    pub ensemble: Option<Prediction>,
    pub ai: AiSignal,
    pub pattern: Option<PatternRecall>,
    pub rl: RlAction,
    pub degraded: Vec<Degraded>,
}

impl SignalBundle {
    pub fn neutral() -> Self {
        Self {
            technical: None,
            ensemble: None,
            ai: AiSignal::neutral(),
            pattern: None,
            rl: RlAction::Hold,
            degraded: Vec::new(),
        }
    }

    /// The prediction the scorer uses: ensemble, else technical, else neutral.
    pub fn model(&self) -> Prediction {
        self.ensemble.or(self.technical).unwrap_or_else(Prediction::neutral)
    }

    pub fn model_probability(&self) -> f64 {
        self.model().probability
    }

    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }

    fn degrade(&mut self, kind: SignalKind, err: ProviderError) {
        if err == ProviderError::NotConfigured {
            return;
        }
        debug!(%kind, error = %err, "signal degraded to neutral");
        self.degraded.push(Degraded { kind, reason: err.to_string() });
    }

    pub fn absorb_technical(&mut self, result: Result<Prediction, ProviderError>) {
        match result {
            Ok(p) => self.technical = Some(p),
            Err(e) => self.degrade(SignalKind::Technical, e),
        }
    }

    pub fn absorb_ensemble(&mut self, result: Result<Prediction, ProviderError>) {
        match result {
            Ok(p) => self.ensemble = Some(p),
            Err(e) => self.degrade(SignalKind::Ensemble, e),
        }
    }

    pub fn absorb_ai(&mut self, result: Result<AiSignal, ProviderError>) {
        match result {
            Ok(ai) => self.ai = ai,
            Err(e) => self.degrade(SignalKind::Ai, e),
        }
    }

    pub fn absorb_pattern(&mut self, result: Result<Option<PatternRecall>, ProviderError>) {
        match result {
            Ok(recall) => self.pattern = recall,
            Err(e) => self.degrade(SignalKind::Pattern, e),
        }
    }

    pub fn absorb_rl(&mut self, result: Result<RlAction, ProviderError>) {
        match result {
            Ok(action) => self.rl = action,
            Err(e) => self.degrade(SignalKind::Rl, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn model_prefers_ensemble_then_technical() {
        let mut b = SignalBundle::neutral();
        assert_eq!(b.model_probability(), 0.5);
        b.absorb_technical(Ok(Prediction::from_probability(0.7)));
        assert_eq!(b.model_probability(), 0.7);
        b.absorb_ensemble(Ok(Prediction::from_probability(0.4)));
        assert_eq!(b.model_probability(), 0.4);
    }

    #[test]
    fn failures_are_recorded_and_neutral() {
        let mut b = SignalBundle::neutral();
        b.absorb_ensemble(Err(ProviderError::Timeout(Duration::from_millis(3000))));
        b.absorb_ai(Err(ProviderError::MissingCredentials));
        b.absorb_rl(Err(ProviderError::NotConfigured));
        assert_eq!(b.ensemble, None);
        assert_eq!(b.ai, AiSignal::neutral());
        assert_eq!(b.degraded.len(), 2);
        assert_eq!(b.degraded[0].kind, SignalKind::Ensemble);
        assert!(b.degraded[0].reason.contains("timed out"));
    }
}
