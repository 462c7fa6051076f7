//! Bounded, concurrent provider calls for one scoring task.
//!
//! Every provider runs on the blocking pool under its own timeout. The five
//! calls are awaited together, so a slow provider costs at most one timeout
//! per task. Timeouts, panics and provider errors all land in the bundle as
//! neutral values plus a `Degraded` note.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinError;

use confluence_core::features::FeatureSnapshot;
use confluence_core::signals::{AiSignal, Prediction, ProviderError, ProviderSnapshot, SignalBundle};

#[derive(Debug, Clone, Copy)]
pub struct ProviderGateway {
    timeout: Duration,
}

impl ProviderGateway {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn gather(&self, providers: ProviderSnapshot, features: Arc<FeatureSnapshot>) -> SignalBundle {
        let technical = {
            let (p, f) = (providers.technical.clone(), features.clone());
            self.call(move || p.predict(&f).and_then(Prediction::validate))
        };
        let ensemble = {
            let (p, f) = (providers.ensemble.clone(), features.clone());
            self.call(move || p.predict(&f).and_then(Prediction::validate))
        };
        let ai = {
            let (p, f) = (providers.advisor.clone(), features.clone());
            self.call(move || p.analyze(&f.symbol, f.timeframe, &f.indicator_map()).and_then(AiSignal::validate))
        };
        let pattern = {
            let (p, f) = (providers.pattern.clone(), features.clone());
            self.call(move || p.recall(&f))
        };
        let rl = {
            let (p, f) = (providers.rl.clone(), features);
            self.call(move || p.act(&f))
        };

        let (technical, ensemble, ai, pattern, rl) = tokio::join!(technical, ensemble, ai, pattern, rl);

        let mut bundle = SignalBundle::neutral();
        bundle.absorb_technical(technical);
        bundle.absorb_ensemble(ensemble);
        bundle.absorb_ai(ai);
        bundle.absorb_pattern(pattern);
        bundle.absorb_rl(rl);
        bundle
    }

    /// One provider call on the blocking pool. A timed-out call keeps running
    /// on its thread; only its result is dropped.
    async fn call<T, F>(&self, f: F) -> Result<T, ProviderError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, ProviderError> + Send + 'static,
    {
        match tokio::time::timeout(self.timeout, tokio::task::spawn_blocking(f)).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(join_failure(join)),
            Err(_) => Err(ProviderError::Timeout(self.timeout)),
        }
    }
}

fn join_failure(err: JoinError) -> ProviderError {
    if err.is_panic() {
        ProviderError::Panicked
    } else {
        ProviderError::Unavailable(err.to_string())
    }
}
