//! # Tracker Benchmarks
//!
//! Performance benchmarks for flow construction and snapshot processing.
//!
//! Run with: `cargo bench -p calibra-core`

use calibra_core::{
    CalibrationSession, DeviceId, DeviceProfile, DeviceState, MemoryStore, ProgressState,
    Selection, StatusSnapshot, build_flow, step_statuses, transition,
};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;

/// A synthetic run walking every calibration stage, then going idle.
fn full_run(len: usize) -> Vec<StatusSnapshot> {
    const CODES: [i32; 11] = [13, 29, 1, 47, 25, 31, 3, 48, 39, 40, 43];
    let mut snapshots: Vec<StatusSnapshot> = (0..len)
        .map(|i| StatusSnapshot::new(DeviceState::Running, CODES[i % CODES.len()]))
        .collect();
    snapshots.push(StatusSnapshot::new(DeviceState::Idle, 0));
    snapshots
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_build_flow(c: &mut Criterion) {
    let all = Selection {
        high_temp_heatbed: true,
        ..Selection::defaults_for(true)
    };
    c.bench_function("build_flow_all_options", |b| {
        b.iter(|| build_flow(black_box(&all), black_box(true)));
    });
}

fn bench_transition(c: &mut Criterion) {
    let mut group = c.benchmark_group("transition");
    let flow = build_flow(&Selection::defaults_for(true), true);

    for size in [10, 100, 1000] {
        let snapshots = full_run(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &snapshots, |b, snaps| {
            b.iter(|| {
                let mut state = ProgressState::idle();
                for snapshot in snaps {
                    state = transition(state, &flow, black_box(snapshot)).state;
                }
                state
            });
        });
    }

    group.finish();
}

fn bench_step_statuses(c: &mut Criterion) {
    let flow = build_flow(&Selection::defaults_for(true), true);
    let state = ProgressState::resumed();
    let code = flow.steps().last().and_then(|s| s.stage_codes.iter().next().copied());

    c.bench_function("step_statuses", |b| {
        b.iter(|| step_statuses(black_box(&state), &flow, black_box(code)));
    });
}

fn bench_session_view(c: &mut Criterion) {
    let device = DeviceProfile::new(DeviceId::new("bench").expect("id"), true);
    let mut session = CalibrationSession::open(
        device,
        MemoryStore::new(),
        &StatusSnapshot::new(DeviceState::Running, 3),
    )
    .expect("open");
    session
        .observe(&StatusSnapshot::new(DeviceState::Running, 48))
        .expect("observe");

    c.bench_function("session_view", |b| {
        b.iter(|| black_box(session.view()));
    });
}

criterion_group!(
    benches,
    bench_build_flow,
    bench_transition,
    bench_step_statuses,
    bench_session_view
);
criterion_main!(benches);
