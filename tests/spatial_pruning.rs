use std::{collections::BTreeMap, sync::Arc};

use arrow::{
    array::{Array, Int64Array, ListArray, RecordBatch},
    datatypes::Float64Type,
};
use arrow_schema::{DataType, Field, Schema};
use geoparcel::{
    BoundingBox, DatasetWriter, GeoTable, GeometryKind, LazyPartition, PartitionBounds,
    PartitionBoundsIndex, PartitionSet, PartitionedTable, ReadOptions, SpatialPartitionPruner,
    Storage, WriteOptions, read_partitioned,
};
use rand::{Rng, SeedableRng, rngs::StdRng};

fn square_partition(x: f64, y: f64, rows: i64) -> GeoTable {
    let geom = ListArray::from_iter_primitive::<Float64Type, _, _>(
        (0..rows).map(|_| Some(vec![Some(x), Some(y), Some(x + 1.0), Some(y + 1.0)])),
    );
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("geom", geom.data_type().clone(), true),
    ]));
    let batch = RecordBatch::try_new(
        schema,
        vec![Arc::new(Int64Array::from_iter_values(0..rows)), Arc::new(geom)],
    )
    .unwrap();
    GeoTable::new(batch, BTreeMap::from([("geom".to_string(), GeometryKind::Line)])).unwrap()
}

fn write_scenario() -> Storage {
    let storage = Storage::memory();
    let source = PartitionedTable::from_tables(vec![
        square_partition(0.0, 0.0, 1),
        square_partition(5.0, 5.0, 2),
        square_partition(10.0, 10.0, 3),
    ])
    .unwrap();
    DatasetWriter::new(storage.clone())
        .write_partitioned(&source, "memory://scenario", &WriteOptions::default())
        .unwrap();
    storage
}

#[test]
fn bbox_selects_only_overlapping_partition() {
    let storage = write_scenario();
    let options = ReadOptions::builder()
        .bbox(BoundingBox::new(4.0, 4.0, 7.0, 7.0))
        .build();
    let table = read_partitioned(&storage, &["memory://scenario"], &options).unwrap();

    assert_eq!(table.npartitions(), 1);
    let piece = table.partitions()[0].piece().unwrap();
    assert_eq!(piece.path, "memory://scenario/part.1.parquet");
    assert_eq!(piece.ordinal, 1);
    assert_eq!(
        table.partition_bounds("geom").unwrap().as_slice(),
        &[BoundingBox::new(5.0, 5.0, 6.0, 6.0)]
    );
    assert_eq!(table.collect().unwrap().num_rows(), 2);
}

#[test]
fn bbox_touching_an_edge_keeps_partition() {
    let storage = write_scenario();
    let options = ReadOptions::builder()
        .bbox(BoundingBox::new(6.0, 6.0, 10.0, 10.0))
        .build();
    let table = read_partitioned(&storage, &["memory://scenario"], &options).unwrap();
    assert_eq!(table.npartitions(), 2);
}

#[test]
fn disjoint_bbox_yields_one_empty_partition() {
    let storage = write_scenario();
    let options = ReadOptions::builder()
        .bbox(BoundingBox::new(100.0, 100.0, 101.0, 101.0))
        .build();
    let table = read_partitioned(&storage, &["memory://scenario"], &options).unwrap();

    assert_eq!(table.npartitions(), 1);
    assert!(matches!(table.partitions()[0], LazyPartition::Empty(_)));
    assert!(table.divisions().is_none());
    let collected = table.collect().unwrap();
    assert_eq!(collected.num_rows(), 0);
    assert_eq!(collected.batch().schema(), *table.meta().schema());
}

#[test]
fn dataset_without_spatial_index_is_not_pruned() {
    let storage = Storage::memory();
    let writer = DatasetWriter::new(storage.clone());
    writer
        .write(
            &square_partition(0.0, 0.0, 4),
            "memory://plain.parquet",
            &WriteOptions::default(),
        )
        .unwrap();
    let options = ReadOptions::builder()
        .bbox(BoundingBox::new(50.0, 50.0, 60.0, 60.0))
        .build();
    let table = read_partitioned(&storage, &["memory://plain.parquet"], &options).unwrap();
    assert_eq!(table.npartitions(), 1);
    assert!(table.partitions()[0].piece().is_some());
}

fn random_box(rng: &mut StdRng) -> BoundingBox {
    let x = rng.gen_range(-100.0..100.0);
    let y = rng.gen_range(-100.0..100.0);
    let w = rng.gen_range(0.0..30.0);
    let h = rng.gen_range(0.0..30.0);
    BoundingBox::new(x, y, x + w, y + h)
}

fn random_set(rng: &mut StdRng, partitions: usize) -> PartitionSet<usize> {
    let boxes: Vec<BoundingBox> = (0..partitions)
        .map(|_| {
            if rng.gen_range(0..10) == 0 {
                BoundingBox::empty()
            } else {
                random_box(rng)
            }
        })
        .collect();
    let mut index = PartitionBoundsIndex::new();
    index.insert("geom", PartitionBounds::new(boxes));
    PartitionSet::new((0..partitions).collect(), Some(index), None)
}

#[test]
fn pruning_matches_overlap_predicate() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..200 {
        let set = random_set(&mut rng, 40);
        let query = random_box(&mut rng);
        let boxes = set.bounds.as_ref().unwrap().get("geom").unwrap().clone();

        let kept = SpatialPartitionPruner::new(query).prune(set, "geom");
        let expected: Vec<usize> = boxes
            .iter()
            .enumerate()
            .filter(|(_, b)| {
                b.is_empty()
                    || !(b.x1 < query.x0 || b.y1 < query.y0 || b.x0 > query.x1 || b.y0 > query.y1)
            })
            .map(|(idx, _)| idx)
            .collect();
        assert_eq!(kept.partitions, expected);
        let kept_boxes = kept.bounds.unwrap().get("geom").unwrap().clone();
        let expected_boxes: Vec<BoundingBox> = expected.iter().map(|idx| *boxes.get(*idx).unwrap()).collect();
        assert_eq!(kept_boxes.len(), expected_boxes.len());
        for (actual, wanted) in kept_boxes.iter().zip(&expected_boxes) {
            assert!(actual == wanted || (actual.is_empty() && wanted.is_empty()));
        }
    }
}

#[test]
fn pruning_is_monotonic_in_the_query() {
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..200 {
        let set = random_set(&mut rng, 40);
        let outer = random_box(&mut rng);
        let inner = BoundingBox::new(
            rng.gen_range(outer.x0..=outer.x1),
            rng.gen_range(outer.y0..=outer.y1),
            rng.gen_range(outer.x0..=outer.x1),
            rng.gen_range(outer.y0..=outer.y1),
        );
        assert!(outer.contains(&inner));

        let wide = SpatialPartitionPruner::new(outer).prune(set.clone(), "geom");
        let narrow = SpatialPartitionPruner::new(inner).prune(set, "geom");
        assert!(narrow.partitions.iter().all(|p| wide.partitions.contains(p)));
    }
}
