//! # Storage Benchmarks
//!
//! Element storage lookups, canonical conversion and a full migration.
//!
//! Run with: `cargo bench -p moldwork-core`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use moldwork_core::{
    CanonicalDefault, CanonicalKeyval, CanonicalMold, ContextGraph, ElementStorage, MoldElement,
    Update, Value, ValueType, Version, VersionWindow, generate_config,
};
use std::hint::black_box;

/// Storage with `size` names, each present in three version strata.
fn create_stratified_storage(size: usize) -> ElementStorage<usize> {
    let mut storage = ElementStorage::new();
    for i in 0..size {
        for major in 1..=3u32 {
            let window = VersionWindow::new(
                Version::new(major, 0, 0),
                (major < 3).then_some(Version::new(major + 1, 0, 0)),
            );
            storage
                .insert(format!("key{}", i), window, i)
                .expect("insert");
        }
    }
    storage
}

/// Mold at 3.0.0 with `size` keyvals whose defaults change at every major.
fn create_mold(size: usize) -> CanonicalMold {
    let elements = (0..size)
        .map(|i| {
            MoldElement::Keyval(CanonicalKeyval {
                name: format!("key{}", i),
                window: VersionWindow::default(),
                value_type: Some(ValueType::Integer),
                defaults: (1..=3u32)
                    .map(|major| CanonicalDefault {
                        introduced: Version::new(major, 0, 0),
                        value: Value::Integer(i64::from(major)),
                    })
                    .collect(),
                restrictions: Vec::new(),
                documentation: Vec::new(),
                renamed_from: None,
            })
        })
        .collect();
    CanonicalMold {
        version: Version::new(3, 0, 0),
        documentation: Vec::new(),
        elements,
    }
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_find_at(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_at");

    for size in [100, 1000, 10000].iter() {
        let storage = create_stratified_storage(*size);

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let name = format!("key{}", size / 2);
                black_box(storage.find_at(&name, Version::new(2, 5, 0)))
            });
        });
    }

    group.finish();
}

fn bench_mold_into_graph(c: &mut Criterion) {
    let mut group = c.benchmark_group("mold_into_graph");

    for size in [100, 500, 1000].iter() {
        let mold = create_mold(*size);

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let mut graph = ContextGraph::new();
                black_box(mold.into_graph(&mut graph).expect("build"))
            });
        });
    }

    group.finish();
}

fn bench_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("update");

    for size in [100, 500].iter() {
        let mold = create_mold(*size);
        let config = generate_config(&mold, Some(Version::INITIAL)).expect("generate");

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let mut graph = ContextGraph::new();
                let built = mold.into_graph(&mut graph).expect("mold");
                let config = config.into_graph(&mut graph, &built).expect("config");
                let update =
                    Update::start(&mut graph, &config, Version::new(3, 0, 0)).expect("start");
                black_box(update.finish())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_find_at, bench_mold_into_graph, bench_update);
criterion_main!(benches);
