use std::{collections::BTreeMap, sync::Arc};

use arrow::{
    array::{Array, Int64Array, ListArray, RecordBatch},
    datatypes::Float64Type,
};
use arrow_schema::{DataType, Field, Schema};
use bytes::Bytes;
use geoparcel::{
    BoundingBox, COMMON_METADATA_FILE, DatasetWriter, FooterMetadata, GeoTable, GeometryKind,
    PartitionBoundsIndex, PartitionedTable, ReadOptions, SPATIAL_METADATA_KEY,
    Storage, TABULAR_METADATA_KEY, WriteOptions, read_partitioned,
};
use parquet::{
    arrow::ArrowWriter,
    file::properties::WriterProperties,
    format::KeyValue,
};

fn square_partition(x: f64, rows: i64) -> GeoTable {
    let geom = ListArray::from_iter_primitive::<Float64Type, _, _>(
        (0..rows).map(|_| Some(vec![Some(x), Some(x), Some(x + 1.0), Some(x + 1.0)])),
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

fn write_dataset(storage: &Storage, path: &str, xs: &[f64]) {
    let source =
        PartitionedTable::from_tables(xs.iter().map(|x| square_partition(*x, 2)).collect())
            .unwrap();
    DatasetWriter::new(storage.clone())
        .write_partitioned(&source, path, &WriteOptions::default())
        .unwrap();
}

fn footer(storage: &Storage, path: &str) -> FooterMetadata {
    FooterMetadata::from_parquet(&storage.read_footer(path).unwrap())
}

fn encode_footer_file(schema: Arc<Schema>, kvs: Vec<KeyValue>) -> Bytes {
    let props = WriterProperties::builder()
        .set_key_value_metadata(Some(kvs))
        .build();
    let mut buffer = Vec::new();
    let writer = ArrowWriter::try_new(&mut buffer, schema, Some(props)).unwrap();
    writer.close().unwrap();
    Bytes::from(buffer)
}

#[test]
fn common_metadata_keeps_tabular_and_spatial_keys() {
    let storage = Storage::memory();
    write_dataset(&storage, "memory://ds", &[0.0, 5.0]);

    let kv = footer(&storage, &format!("memory://ds/{COMMON_METADATA_FILE}"));
    assert!(kv.contains_key(TABULAR_METADATA_KEY));
    let blob: serde_json::Value = serde_json::from_str(kv.get(SPATIAL_METADATA_KEY).unwrap()).unwrap();
    assert_eq!(blob["version"], 1);
    assert_eq!(blob["partition_bounds"]["geom"]["1"]["x0"], 5.0);

    // pieces carry tabular metadata only
    let piece = footer(&storage, "memory://ds/part.0.parquet");
    assert!(piece.contains_key(TABULAR_METADATA_KEY));
    assert!(!piece.contains_key(SPATIAL_METADATA_KEY));
}

#[test]
fn legacy_spatial_blob_is_used_for_pruning() {
    let storage = Storage::memory();
    let writer = DatasetWriter::new(storage.clone());
    for (idx, x) in [0.0, 5.0, 10.0].into_iter().enumerate() {
        writer
            .write(
                &square_partition(x, 1),
                &format!("memory://legacy/part.{idx}.parquet"),
                &WriteOptions::default(),
            )
            .unwrap();
    }
    let template = square_partition(0.0, 0);
    let tabular = template.geo_schema().tabular_metadata().encode().unwrap();
    let legacy = r#"{"partition_bounds": {"geom": {
        "x0": {"0": 0.0, "1": 5.0, "2": 10.0},
        "y0": {"0": 0.0, "1": 5.0, "2": 10.0},
        "x1": {"0": 1.0, "1": 6.0, "2": 11.0},
        "y1": {"0": 1.0, "1": 6.0, "2": 11.0}
    }}}"#;
    storage
        .write(
            &format!("memory://legacy/{COMMON_METADATA_FILE}"),
            encode_footer_file(
                template.batch().schema(),
                vec![
                    KeyValue::new(TABULAR_METADATA_KEY.to_string(), tabular),
                    KeyValue::new(SPATIAL_METADATA_KEY.to_string(), legacy.to_string()),
                ],
            ),
        )
        .unwrap();

    let options = ReadOptions::builder()
        .bbox(BoundingBox::new(9.0, 9.0, 20.0, 20.0))
        .build();
    let table = read_partitioned(&storage, &["memory://legacy"], &options).unwrap();
    assert_eq!(table.npartitions(), 1);
    assert_eq!(
        table.partitions()[0].piece().unwrap().path,
        "memory://legacy/part.2.parquet"
    );
}

#[test]
fn glob_expands_roots_and_reattaches_protocol() {
    let storage = Storage::memory();
    write_dataset(&storage, "memory://bucket/b", &[20.0]);
    write_dataset(&storage, "memory://bucket/a", &[0.0, 5.0]);

    let table =
        read_partitioned(&storage, &["memory://bucket/*"], &ReadOptions::default()).unwrap();
    let paths: Vec<&str> = table
        .partitions()
        .iter()
        .map(|partition| partition.piece().unwrap().path.as_str())
        .collect();
    assert_eq!(
        paths,
        vec![
            "memory://bucket/a/part.0.parquet",
            "memory://bucket/a/part.1.parquet",
            "memory://bucket/b/part.0.parquet",
        ]
    );
    assert_eq!(table.partition_bounds("geom").unwrap().len(), 3);

    let options = ReadOptions::builder()
        .bbox(BoundingBox::new(19.0, 19.0, 30.0, 30.0))
        .build();
    let pruned = read_partitioned(&storage, &["memory://bucket/*"], &options).unwrap();
    assert_eq!(pruned.npartitions(), 1);
    assert_eq!(pruned.collect().unwrap().num_rows(), 2);
}

#[test]
fn unindexed_root_disables_pruning_for_all_roots() {
    let storage = Storage::memory();
    write_dataset(&storage, "memory://indexed", &[0.0, 5.0]);
    DatasetWriter::new(storage.clone())
        .write(
            &square_partition(10.0, 3),
            "memory://plain.parquet",
            &WriteOptions::default(),
        )
        .unwrap();

    let options = ReadOptions::builder()
        .bbox(BoundingBox::new(100.0, 100.0, 101.0, 101.0))
        .build();
    let table =
        read_partitioned(&storage, &["memory://indexed", "memory://plain.parquet"], &options)
            .unwrap();
    assert_eq!(table.npartitions(), 3);
    assert!(table.partition_bounds_index().is_empty());
    assert_eq!(table.collect().unwrap().num_rows(), 7);
}

#[test]
fn bounds_merge_only_counts_matching_columns() {
    let mut index = PartitionBoundsIndex::new();
    index.insert(
        "geom",
        vec![BoundingBox::new(0.0, 0.0, 1.0, 1.0)].into_iter().collect(),
    );
    let merged = PartitionBoundsIndex::concat(vec![(Some(index.clone()), 1), (Some(index), 1)])
        .unwrap();
    assert_eq!(merged.get("geom").unwrap().len(), 2);
}
