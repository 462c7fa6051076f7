//! Built-in stand-ins for the external signal providers.
//!
//! The paper setup has no ML model or LLM behind it. These derive a
//! probability and a sentiment from the same features the scorer sees, so the
//! whole pipeline runs end to end. Deterministic and cheap.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use confluence_core::domain::Timeframe;
use confluence_core::features::{FeatureSnapshot, Trend};
use confluence_core::signals::{AiAdvisor, AiSignal, Prediction, ProviderError, Sentiment, SignalProvider};

fn logistic(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn trend_vote(t: Trend) -> f64 {
    match t {
        Trend::Up => 1.0,
        Trend::Down => -1.0,
        Trend::Flat => 0.0,
    }
}

/// Logistic blend of EMA slope, RSI and timeframe alignment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HeuristicProvider {
    pub slope_weight: f64,
    pub rsi_weight: f64,
    pub trend_weight: f64,
}

impl Default for HeuristicProvider {
    fn default() -> Self {
        Self { slope_weight: 4.0, rsi_weight: 0.8, trend_weight: 0.35 }
    }
}

impl SignalProvider for HeuristicProvider {
    fn name(&self) -> &str {
        "heuristic"
    }

    fn predict(&self, f: &FeatureSnapshot) -> Result<Prediction, ProviderError> {
        let trends = trend_vote(f.entry_trend) + trend_vote(f.intermediate_trend) + trend_vote(f.higher_trend);
        let x = self.slope_weight * f.ema_slope + self.rsi_weight * (f.rsi - 50.0) / 10.0 + self.trend_weight * trends;
        if !x.is_finite() {
            return Err(ProviderError::InvalidOutput(format!("non-finite input for {}", f.symbol)));
        }
        Ok(Prediction::from_probability(logistic(x)))
    }
}

/// Rule-based advisor: sentiment from slope and RSI, confidence from ADX.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HeuristicAdvisor {
    /// RSI beyond which the advisor calls the move stretched and stays neutral.
    pub overbought: f64,
    pub oversold: f64,
}

impl Default for HeuristicAdvisor {
    fn default() -> Self {
        Self { overbought: 75.0, oversold: 25.0 }
    }
}

impl AiAdvisor for HeuristicAdvisor {
    fn analyze(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        indicators: &BTreeMap<String, f64>,
    ) -> Result<AiSignal, ProviderError> {
        let get = |key: &str| {
            indicators
                .get(key)
                .copied()
                .ok_or_else(|| ProviderError::InvalidOutput(format!("{symbol}: missing {key}")))
        };
        let (slope, rsi, adx) = (get("ema_slope")?, get("rsi")?, get("adx")?);

        let sentiment = if rsi >= self.overbought || rsi <= self.oversold {
            Sentiment::Neutral
        } else if slope > 0.0 && rsi > 50.0 {
            Sentiment::Bullish
        } else if slope < 0.0 && rsi < 50.0 {
            Sentiment::Bearish
        } else {
            Sentiment::Neutral
        };
        let confidence = (adx * 2.0 + 20.0).clamp(0.0, 100.0);
        let reason = format!("{symbol} {timeframe}: slope {slope:+.3}, RSI {rsi:.1}, ADX {adx:.1}");
        Ok(AiSignal { sentiment, confidence, reason })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn snapshot(slope: f64, rsi: f64, trend: Trend) -> FeatureSnapshot {
        FeatureSnapshot {
            symbol: "EURUSD".into(),
            timeframe: Timeframe::M15,
            candle_time: Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap(),
            close: 1.1,
            atr: 0.001,
            atr_expansion: 1.0,
            adx: 32.0,
            rsi,
            ema_fast: 1.1,
            ema_slow: 1.1,
            ema_slope: slope,
            entry_trend: trend,
            intermediate_trend: trend,
            higher_trend: trend,
            nearest_support: None,
            nearest_resistance: None,
        }
    }

    #[test]
    fn uptrend_leans_up_and_downtrend_mirrors() {
        let p = HeuristicProvider::default();
        let up = p.predict(&snapshot(0.2, 62.0, Trend::Up)).unwrap();
        let down = p.predict(&snapshot(-0.2, 38.0, Trend::Down)).unwrap();
        assert!(up.probability > 0.8);
        assert!((up.probability + down.probability - 1.0).abs() < 1e-12);
        assert_eq!(up.class, 1);
        assert_eq!(down.class, 0);
    }

    #[test]
    fn flat_market_is_a_coin_flip() {
        let p = HeuristicProvider::default().predict(&snapshot(0.0, 50.0, Trend::Flat)).unwrap();
        assert!((p.probability - 0.5).abs() < 1e-12);
    }

    #[test]
    fn advisor_reads_the_indicator_map() {
        let advisor = HeuristicAdvisor::default();
        let f = snapshot(0.15, 60.0, Trend::Up);
        let ai = advisor.analyze(&f.symbol, f.timeframe, &f.indicator_map()).unwrap();
        assert_eq!(ai.sentiment, Sentiment::Bullish);
        assert!((ai.confidence - 84.0).abs() < 1e-9);

        let stretched = snapshot(0.15, 80.0, Trend::Up);
        let ai = advisor.analyze("EURUSD", Timeframe::M15, &stretched.indicator_map()).unwrap();
        assert_eq!(ai.sentiment, Sentiment::Neutral);
    }

    #[test]
    fn advisor_rejects_incomplete_input() {
        let err = HeuristicAdvisor::default().analyze("EURUSD", Timeframe::M15, &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidOutput(_)));
    }
}
