use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use hummingbird_network_rust::{
    BatchOrchestrator, InteractionRecord, NetworkConfig, Period, ReplicateId, SamplingMethod,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Replicate counts we benchmark (each gives 2 methods × 2 periods items)
const REPLICATES: &[usize] = &[4, 16, 64];

/// Random sparse webs: 12 plants × 6 hummingbirds, ~40% of cells filled
fn synthetic_records(seed: u64, n_replicates: usize) -> Vec<InteractionRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut records = Vec::new();

    for rep in 0..n_replicates {
        let replicate = ReplicateId::new(2016 + (rep % 4) as i32, format!("P{}", rep));
        for method in SamplingMethod::ALL {
            for period in Period::ALL {
                for plant in 0..12 {
                    for bird in 0..6 {
                        if rng.gen_bool(0.4) {
                            let count = rng.gen_range(1..20) as f64;
                            records.push(InteractionRecord {
                                replicate: replicate.clone(),
                                period,
                                sampling_method: method,
                                row_entity: format!("plant_{:02}", plant),
                                column_entity: format!("bird_{}", bird),
                                weight: count,
                                raw_count: count,
                            });
                        }
                    }
                }
            }
        }
    }
    records
}

fn bench_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("Network batch");

    for &n in REPLICATES {
        let records = synthetic_records(42, n);
        let sequential = BatchOrchestrator::new(NetworkConfig::default());
        let parallel = BatchOrchestrator::new(NetworkConfig {
            parallel: true,
            ..NetworkConfig::default()
        });

        group.throughput(Throughput::Elements((n * 4) as u64));
        group.bench_with_input(BenchmarkId::new("sequential", n), &n, |bencher, _| {
            bencher.iter(|| sequential.run(black_box(&records)))
        });
        group.bench_with_input(BenchmarkId::new("parallel", n), &n, |bencher, _| {
            bencher.iter(|| parallel.run(black_box(&records)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_batch);
criterion_main!(benches);
