//! Criterion benchmarks for the per-cycle hot paths.
//!
//! Benchmarks:
//! 1. Feature snapshot from three timeframes of bars
//! 2. Confluence scoring of one snapshot (both directions)
//! 3. Ranking a full watchlist of candidates

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;

use confluence_core::config::{FeatureConfig, ScoringConfig};
use confluence_core::domain::{Bar, Candidate, Direction, FactorMap, Timeframe};
use confluence_core::features::{FeatureSnapshot, TimeframeBars};
use confluence_core::regime::Regime;
use confluence_core::scoring::{rank_candidates, ConfluenceScorer};
use confluence_core::signals::{AiSignal, Prediction, Sentiment, SignalBundle};

// ── Helpers ──────────────────────────────────────────────────────────

fn make_bars(n: usize, minutes: i64) -> Vec<Bar> {
    let start = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    (0..n)
        .map(|i| {
            let close = 1.10 + (i as f64 * 0.1).sin() * 0.01 + i as f64 * 0.0001;
            let open = close - 0.0002;
            Bar::new(start + Duration::minutes(minutes * i as i64), open, close + 0.0008, open - 0.0008, close, 1_000.0)
        })
        .collect()
}

fn timeframe_bars(n: usize) -> TimeframeBars {
    TimeframeBars {
        entry_timeframe: Timeframe::M15,
        entry: Arc::new(make_bars(n, 15)),
        intermediate: Arc::new(make_bars(n, 60)),
        higher: Arc::new(make_bars(n, 240)),
    }
}

fn signals() -> SignalBundle {
    let mut b = SignalBundle::neutral();
    b.ensemble = Some(Prediction::from_probability(0.67));
    b.ai = AiSignal { sentiment: Sentiment::Bullish, confidence: 72.0, reason: String::new() };
    b
}

// ── Benchmarks ───────────────────────────────────────────────────────

fn bench_features(c: &mut Criterion) {
    let cfg = FeatureConfig::default();
    let mut group = c.benchmark_group("features");
    for n in [100usize, 200, 500] {
        let bars = timeframe_bars(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &bars, |b, bars| {
            b.iter(|| FeatureSnapshot::compute("EURUSD", black_box(bars), &cfg))
        });
    }
    group.finish();
}

fn bench_score(c: &mut Criterion) {
    let scorer = ConfluenceScorer::new(ScoringConfig::default());
    let features = FeatureSnapshot::compute("EURUSD", &timeframe_bars(200), &FeatureConfig::default())
        .expect("bench bars cover the warmup");
    let signals = signals();
    c.bench_function("score_both_directions", |b| {
        b.iter(|| scorer.score(black_box(&features), black_box(&signals)))
    });
}

fn bench_rank(c: &mut Criterion) {
    let base: Vec<Candidate> = (0..40)
        .map(|i| Candidate {
            symbol: format!("SYM{i:02}"),
            direction: Direction::Buy,
            confluence: (i % 7) as u8,
            ensemble: ((i * 37) % 100) as f64 / 100.0,
            probability: 0.5 + ((i * 13) % 50) as f64 / 100.0,
            factors: FactorMap::new(),
            stop_distance: 0.0015,
            target_distance: 0.003,
            sizing_scale: 1.0,
            regime: Regime::Ranging,
            reference_price: 1.1,
            atr: 0.001,
            candle_time: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
        })
        .collect();
    c.bench_function("rank_40_candidates", |b| {
        b.iter(|| {
            let mut cs = base.clone();
            rank_candidates(black_box(&mut cs));
            cs
        })
    });
}

criterion_group!(benches, bench_features, bench_score, bench_rank);
criterion_main!(benches);
