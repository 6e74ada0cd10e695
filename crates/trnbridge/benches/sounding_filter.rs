// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sounding filter throughput: full-width ping through swath trim,
//! decimation, and a 3x5 median window.

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};

use trnbridge::filter::{self, FilterParams};
use trnbridge::ping::{Ping, PingExtractor, MAX_BEAMS};
use trnbridge::record::s7k::{
    build_raw_detection, build_sonar_settings, Detection, RawDetectionView, SonarSettingsView,
};
use trnbridge::ring::PingRing;

fn wide_ping(extractor: &mut PingExtractor, n: u32) -> Ping {
    let detections: Vec<Detection> = (0..MAX_BEAMS)
        .map(|j| Detection {
            valid: true,
            sonar_flagged: false,
            depth_m: 100.0,
            across_m: (j as f32 - 256.0) * 0.5,
            along_m: 0.4,
            quality: 0.8,
        })
        .collect();
    let record = build_raw_detection(n, 36.7, -122.0, 45.0, 10.0, &detections);
    extractor.extract_s7k(&RawDetectionView::new(&record), f64::from(n))
}

fn loaded_ring(depth: usize) -> PingRing {
    let mut extractor = PingExtractor::default();
    let settings = build_sonar_settings(0, 210.0, 0.001, 30.0);
    extractor.note_s7k_settings(&SonarSettingsView::new(&settings));

    let mut ring = PingRing::new(depth);
    for n in 1..=depth as u32 {
        ring.push(wide_ping(&mut extractor, n));
    }
    ring
}

fn bench_filter(c: &mut Criterion) {
    let params = FilterParams {
        swath_deg: 120.0,
        n_out: 101,
        n_across: 3,
        n_along: 5,
        threshold: 0.1,
    };

    c.bench_function("filter_512_beams_3x5_median", |b| {
        b.iter_batched(
            || loaded_ring(5),
            |mut ring| filter::apply(&params, &mut ring),
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_filter);
criterion_main!(benches);
