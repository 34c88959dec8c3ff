//! Criterion benchmarks for schedule compilation and tape playback.
//!
//! Two axes:
//!
//! - **Compile**: tree walk, LCM/GCD reduction and tape/skip-index fill
//! - **Playback**: one simulated second, dense tape vs sparse tape with and
//!   without the skip index
//!
//! Run with: `cargo bench -p quartz-core -- scheduler/`
#![allow(missing_docs)]

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use quartz_core::{
    ClockNode, ClockTree, CompileOptions, DEFAULT_CONSUMED_CYCLES, PlaybackEngine, SparseMode,
    compile,
};

const MASTER_HZ: u64 = 1_000_000;

// ---------------------------------------------------------------------------
// Tree constructors
// ---------------------------------------------------------------------------

fn nop() -> impl FnMut(u32) -> u32 + Send + 'static {
    |_available| DEFAULT_CONSUMED_CYCLES
}

/// CPU on the master plus a 10 kHz timer and a 100 Hz vsync: every slot busy.
fn dense_tree() -> ClockTree {
    let mut tree = sparse_tree();
    tree.add_node(5, ClockNode::leaf(0, nop()).named("cpu")).unwrap();
    tree
}

/// 10 kHz timer and 100 Hz vsync under a 1 MHz master: 99 of 100 slots idle.
fn sparse_tree() -> ClockTree {
    let mut tree = ClockTree::new();
    tree.add_node(0, ClockNode::master(MASTER_HZ)).unwrap();
    tree.add_node(1, ClockNode::divider(0, 1)).unwrap();
    tree.add_node(2, ClockNode::leaf(1, nop()).named("timer")).unwrap();
    tree.add_node(3, ClockNode::divider(1, 1)).unwrap();
    tree.add_node(4, ClockNode::leaf(3, nop()).named("vsync")).unwrap();
    tree
}

// ---------------------------------------------------------------------------
// Compile benchmarks
// ---------------------------------------------------------------------------

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduler/compile");
    let options = CompileOptions::default();

    let dense = dense_tree();
    group.bench_function("dense", |b| {
        b.iter(|| black_box(compile(black_box(&dense), &options).unwrap()));
    });

    let sparse = sparse_tree();
    group.bench_function("sparse", |b| {
        b.iter(|| black_box(compile(black_box(&sparse), &options).unwrap()));
    });

    group.finish();
}

// ---------------------------------------------------------------------------
// Playback benchmarks
// ---------------------------------------------------------------------------

fn bench_playback(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduler/playback");

    let cases = [
        ("dense", dense_tree(), SparseMode::Auto),
        ("sparse_skip", sparse_tree(), SparseMode::Auto),
        ("sparse_walk", sparse_tree(), SparseMode::Never),
    ];

    for (name, mut tree, sparse) in cases {
        let options = CompileOptions {
            sparse,
            ..CompileOptions::default()
        };
        let schedule = compile(&tree, &options).unwrap();
        let mut engine = PlaybackEngine::new();
        group.bench_with_input(
            BenchmarkId::new("one_second", name),
            &schedule,
            |b, schedule| {
                b.iter(|| {
                    black_box(engine.run(schedule, &mut tree, MASTER_HZ, || false));
                });
            },
        );
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

criterion_group!(benches, bench_compile, bench_playback);
criterion_main!(benches);
