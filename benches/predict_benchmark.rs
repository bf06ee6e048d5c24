use std::path::Path;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use hmmsuite::{HmmModel, Tagger};

fn load() -> HmmModel {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/intent.json");
    HmmModel::from_path(path).expect("failed to load model")
}

/// Cycles through every symbol some state can emit.
fn observations(len: usize) -> Vec<usize> {
    [0, 1, 2, 3, 4, 5, 8, 9, 10].iter().copied().cycle().take(len).collect()
}

fn predict_benchmark(c: &mut Criterion) {
    let model = load();
    let mut group = c.benchmark_group("predict");
    for len in [10, 100, 1000] {
        let obs = observations(len);
        group.bench_with_input(BenchmarkId::from_parameter(len), &obs, |b, obs| {
            b.iter(|| model.predict(black_box(obs)).expect("failed to predict"))
        });
    }
    group.finish();
}

fn marginal_benchmark(c: &mut Criterion) {
    let model = load();
    let obs = observations(1000);
    let mut tagger = model.tagger();
    c.bench_function("lognorm/1000", |b| {
        b.iter(|| {
            tagger.set_seq(black_box(&obs)).expect("failed to set sequence");
            tagger.lognorm()
        })
    });
}

criterion_group!(benchmarks, predict_benchmark, marginal_benchmark);
criterion_main!(benchmarks);
