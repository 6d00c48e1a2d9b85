//! Benchmarks for the genetic optimizer step.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use stimsearch::compute::Mask;
use stimsearch::compute::optimizer::{GeneticOptimizer, Optimizer};
use stimsearch::schema::GeneticConfig;

fn bench_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("genetic_step");

    for population in [16, 64, 256] {
        let config = GeneticConfig {
            population_size: population,
            random_seed: Some(0),
            ..GeneticConfig::for_dim(512)
        };

        let mut optimizer = GeneticOptimizer::new(config).expect("valid config");
        optimizer.init(None).expect("init");

        let scores: Vec<f32> = (0..population).map(|i| (i as f32).sin()).collect();
        let mask = Mask::all_synthetic(population);

        group.bench_with_input(
            BenchmarkId::from_parameter(population),
            &population,
            |b, _| {
                b.iter(|| {
                    optimizer
                        .step(black_box(&scores), black_box(&mask))
                        .expect("step");
                });
            },
        );
    }

    group.finish();
}

fn bench_init(c: &mut Criterion) {
    let mut group = c.benchmark_group("genetic_init");

    for dim in [64, 512, 4096] {
        let config = GeneticConfig {
            population_size: 50,
            random_seed: Some(0),
            ..GeneticConfig::for_dim(dim)
        };

        group.bench_with_input(BenchmarkId::from_parameter(dim), &dim, |b, _| {
            b.iter(|| {
                let mut optimizer = GeneticOptimizer::new(config.clone()).expect("valid config");
                black_box(optimizer.init(None).expect("init"));
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_step, bench_init);
criterion_main!(benches);
