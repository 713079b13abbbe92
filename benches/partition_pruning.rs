use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use geoparcel::{
    BoundingBox, FooterMetadata, PartitionBounds, PartitionBoundsIndex, PartitionSet,
    SPATIAL_METADATA_KEY, SpatialPartitionPruner,
};
use rand::{Rng, SeedableRng, rngs::StdRng};

// ============================================================================
// Helper Functions
// ============================================================================

fn random_index(partitions: usize) -> PartitionBoundsIndex {
    let mut rng = StdRng::seed_from_u64(42);
    let bounds: PartitionBounds = (0..partitions)
        .map(|_| {
            let x = rng.gen_range(-180.0..170.0);
            let y = rng.gen_range(-90.0..80.0);
            BoundingBox::new(x, y, x + rng.gen_range(0.0..10.0), y + rng.gen_range(0.0..10.0))
        })
        .collect();
    let mut index = PartitionBoundsIndex::new();
    index.insert("geom", bounds);
    index
}

// ============================================================================
// Benchmarks
// ============================================================================

fn bench_prune(c: &mut Criterion) {
    let mut group = c.benchmark_group("spatial_prune");
    let query = BoundingBox::new(-10.0, -10.0, 10.0, 10.0);

    for partitions in [100usize, 1_000, 10_000] {
        let index = random_index(partitions);
        group.throughput(Throughput::Elements(partitions as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(partitions),
            &index,
            |b, index| {
                b.iter(|| {
                    let set = PartitionSet::new(
                        (0..partitions).collect::<Vec<_>>(),
                        Some(index.clone()),
                        None,
                    );
                    let pruned = SpatialPartitionPruner::new(query).prune(set, "geom");
                    black_box(pruned.len())
                })
            },
        );
    }
    group.finish();
}

fn bench_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("bounds_load");

    for partitions in [100usize, 10_000] {
        let footer = random_index(partitions)
            .persist(&FooterMetadata::new())
            .unwrap();
        group.throughput(Throughput::Bytes(
            footer.get(SPATIAL_METADATA_KEY).map_or(0, str::len) as u64,
        ));
        group.bench_with_input(
            BenchmarkId::from_parameter(partitions),
            &footer,
            |b, footer| b.iter(|| black_box(PartitionBoundsIndex::load(footer).unwrap())),
        );
    }
    group.finish();
}

criterion_group!(benches, bench_prune, bench_load);
criterion_main!(benches);
