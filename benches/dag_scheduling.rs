//! Benchmarks for `StageDag` construction and the ready-set / tie-break
//! path the orchestrator owner runs on every tick (§4.1).

use std::collections::HashSet;
use uuid::Uuid;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use scanorc::domain::models::{Stage, StageDag};

/// Builds a chain-of-waves DAG: `width` independent stages per wave,
/// `depth` waves, each wave depending on the entire previous wave.
fn build_wave_stages(orchestration_id: Uuid, depth: usize, width: usize) -> Vec<Stage> {
    let mut stages = Vec::with_capacity(depth * width);
    let mut previous_wave: Vec<Uuid> = Vec::new();

    for wave in 0..depth {
        let mut current_wave = Vec::with_capacity(width);
        for i in 0..width {
            let mut stage = Stage::new(orchestration_id, format!("wave{wave}-stage{i}"), "scan");
            stage.depends_on = previous_wave.clone();
            current_wave.push(stage.id);
            stages.push(stage);
        }
        previous_wave = current_wave;
    }

    stages
}

fn bench_dag_construction(c: &mut Criterion) {
    let orchestration_id = Uuid::new_v4();
    let mut group = c.benchmark_group("dag_from_stages");

    for (depth, width) in [(5, 5), (20, 10), (50, 20)] {
        let stages = build_wave_stages(orchestration_id, depth, width);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{depth}x{width}")),
            &stages,
            |b, stages| {
                b.iter(|| black_box(StageDag::from_stages(black_box(stages)).unwrap()));
            },
        );
    }

    group.finish();
}

fn bench_topological_sort(c: &mut Criterion) {
    let orchestration_id = Uuid::new_v4();
    let stages = build_wave_stages(orchestration_id, 30, 15);
    let dag = StageDag::from_stages(&stages).unwrap();

    c.bench_function("dag_topological_sort", |b| {
        b.iter(|| black_box(dag.topological_sort()));
    });
}

fn bench_execution_waves(c: &mut Criterion) {
    let orchestration_id = Uuid::new_v4();
    let stages = build_wave_stages(orchestration_id, 30, 15);
    let dag = StageDag::from_stages(&stages).unwrap();

    c.bench_function("dag_execution_waves", |b| {
        b.iter(|| black_box(dag.execution_waves()));
    });
}

fn bench_ready_set_rescan(c: &mut Criterion) {
    let orchestration_id = Uuid::new_v4();
    let stages = build_wave_stages(orchestration_id, 30, 15);
    let dag = StageDag::from_stages(&stages).unwrap();
    let all_ids: Vec<Uuid> = stages.iter().map(|s| s.id).collect();

    let mut group = c.benchmark_group("dag_ready_set");
    for completed_fraction in [0, 25, 50, 75] {
        let completed_count = all_ids.len() * completed_fraction / 100;
        let completed: HashSet<Uuid> = all_ids.iter().take(completed_count).copied().collect();

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{completed_fraction}pct_done")),
            &completed,
            |b, completed| {
                b.iter(|| black_box(dag.ready_set(black_box(completed))));
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_dag_construction,
    bench_topological_sort,
    bench_execution_waves,
    bench_ready_set_rescan
);
criterion_main!(benches);
