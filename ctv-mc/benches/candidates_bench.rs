//! Candidate Filtering Performance Benchmark
//!
//! Measures how long an editor waits for a phase's track candidates as the
//! library grows.
//!
//! **Goal:** 10k-track library evaluated well under one UI frame

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ctv_mc::compat::{
    evaluate_candidates, natural_ending_candidates, rise_from_rest_candidates, CandidateQuery,
};
use ctv_mc::library::{Energy, Segment, Track};
use ctv_mc::phases::{exercise_count, generate_phases};
use ctv_mc::template::{RoundPlan, RoundTemplate, RoundType};
use ctv_mc::timing::TimingCalculator;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;

fn synthetic_library(size: usize) -> Vec<Track> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..size)
        .map(|i| {
            let duration_sec = rng.gen_range(90..420);
            let mut segments = Vec::new();
            let mut ts = 0.0;
            while ts < duration_sec as f64 {
                let energy = match rng.gen_range(0..3) {
                    0 => Energy::Low,
                    1 => Energy::Medium,
                    _ => Energy::High,
                };
                segments.push(Segment {
                    timestamp_sec: ts,
                    energy,
                    buildup_duration_sec: (energy == Energy::High).then_some(8.0),
                });
                ts += rng.gen_range(15.0..60.0);
            }

            Track {
                id: format!("track-{}", i),
                name: format!("Track {}", i),
                artist: format!("Artist {}", i % 97),
                duration_ms: duration_sec * 1000,
                segments,
            }
        })
        .collect()
}

fn plan() -> RoundPlan {
    RoundPlan {
        template: RoundTemplate {
            round_number: 1,
            round_type: RoundType::Circuit,
            exercises_per_round: 6,
            work_duration_sec: 40.0,
            rest_duration_sec: 20.0,
            repeat_count: 3,
            amrap_duration_sec: None,
        },
        exercises: vec![],
    }
}

fn bench_candidates(c: &mut Criterion) {
    let mut group = c.benchmark_group("candidates");
    let plan = plan();
    let phases = generate_phases(Some(&plan));
    let timing = TimingCalculator::default();
    // second exercise: both natural ending and rise from rest apply
    let phase = &phases[3];

    for size in [100usize, 1_000, 10_000] {
        let tracks = synthetic_library(size);
        let used: HashSet<String> = tracks.iter().step_by(10).map(|t| t.id.clone()).collect();
        let query = CandidateQuery {
            phase,
            template: &plan.template,
            exercise_count: exercise_count(&plan),
            timing: &timing,
            used_elsewhere: &used,
        };

        group.bench_with_input(BenchmarkId::new("evaluate_all", size), &tracks, |b, tracks| {
            b.iter(|| black_box(evaluate_candidates(black_box(tracks), &query)));
        });

        group.bench_with_input(
            BenchmarkId::new("natural_ending_only", size),
            &tracks,
            |b, tracks| {
                b.iter(|| {
                    black_box(natural_ending_candidates(
                        black_box(tracks),
                        phase,
                        &plan.template,
                        exercise_count(&plan),
                        &timing,
                    ))
                });
            },
        );

        group.bench_with_input(
            BenchmarkId::new("rise_from_rest_only", size),
            &tracks,
            |b, tracks| {
                b.iter(|| {
                    black_box(rise_from_rest_candidates(
                        black_box(tracks),
                        plan.template.rest_duration_sec,
                        &used,
                    ))
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_candidates);
criterion_main!(benches);
