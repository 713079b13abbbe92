//! Writing tables and partitioned datasets with spatial metadata.

use arrow::array::RecordBatch;
use bytes::Bytes;
use parquet::{arrow::ArrowWriter, file::properties::WriterProperties};

use crate::{
    GeoTable, Result,
    assemble::{PartitionedTable, read_partitioned},
    bounds::{PartitionBounds, PartitionBoundsIndex},
    dataset::COMMON_METADATA_FILE,
    geometry::TABULAR_METADATA_KEY,
    metadata::FooterMetadata,
    options::{ReadOptions, WriteOptions},
    storage::{Storage, join},
    table::GeoSchema,
};

/// Writes [`GeoTable`]s and [`PartitionedTable`]s to storage.
#[derive(Clone, Debug)]
pub struct DatasetWriter {
    storage: Storage,
}

impl DatasetWriter {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Writes `table` as a single Parquet file carrying tabular metadata.
    pub fn write(&self, table: &GeoTable, path: &str, options: &WriteOptions) -> Result<()> {
        let footer = tabular_footer(table.geo_schema())?;
        let bytes = encode(table.batch(), &footer, options)?;
        tracing::info!(path, rows = table.num_rows(), "writing table");
        self.storage.write(path, bytes)
    }

    /// Writes `source` as a partitioned dataset directory.
    ///
    /// Any existing directory at `path` is removed first. Each partition with
    /// rows becomes `part.<i>.parquet` holding exactly one row group; partitions
    /// without rows are not written, and `i` counts written pieces only.
    /// `_common_metadata` holds the schema, the tabular metadata and the
    /// spatial metadata with per-piece bounds of every geometry column.
    pub fn write_partitioned(
        &self,
        source: &PartitionedTable,
        path: &str,
        options: &WriteOptions,
    ) -> Result<()> {
        if self.storage.is_dir(path)? {
            tracing::info!(path, "removing existing dataset before write");
            self.storage.remove_dir_all(path)?;
        }

        let meta = source.meta();
        let mut written = Vec::with_capacity(source.npartitions());
        for partition in source.partitions() {
            let table = partition.execute()?;
            if table.num_rows() == 0 {
                written.push(false);
                continue;
            }
            let footer = tabular_footer(table.geo_schema())?;
            let bytes = encode(table.batch(), &footer, options)?;
            let piece = written.iter().filter(|kept| **kept).count();
            self.storage.write(&join(path, &format!("part.{piece}.parquet")), bytes)?;
            written.push(true);
        }
        let common_path = join(path, COMMON_METADATA_FILE);
        let empty = RecordBatch::new_empty(meta.schema().clone());
        self.storage
            .write(&common_path, encode(&empty, &tabular_footer(meta)?, options)?)?;
        tracing::info!(
            path,
            partitions = source.npartitions(),
            skipped_empty = written.iter().filter(|kept| !**kept).count(),
            "wrote partitioned dataset"
        );

        let bounds = self.partition_bounds(source, path, &written)?;
        let existing = FooterMetadata::from_parquet(&self.storage.read_footer(&common_path)?);
        let merged = bounds.persist(&existing)?;
        self.storage
            .write(&common_path, encode(&empty, &merged, options)?)?;
        Ok(())
    }

    /// Bounds of every geometry column for the written pieces, reusing those
    /// cached on `source`.
    fn partition_bounds(
        &self,
        source: &PartitionedTable,
        path: &str,
        written: &[bool],
    ) -> Result<PartitionBoundsIndex> {
        let mut index = PartitionBoundsIndex::new();
        for column in source.meta().geometry_columns().keys() {
            let bounds = match source.partition_bounds(column) {
                Some(bounds) => bounds.filter(written),
                None if !written.contains(&true) => PartitionBounds::new(Vec::new()),
                None => {
                    tracing::debug!(column = column.as_str(), path, "computing bounds from written dataset");
                    let options = ReadOptions::builder().columns([column.as_str()]).build();
                    let mut reopened = read_partitioned(&self.storage, &[path], &options)?;
                    reopened.ensure_partition_bounds(column)?.clone()
                }
            };
            index.insert(column.clone(), bounds);
        }
        Ok(index)
    }
}

fn tabular_footer(schema: &GeoSchema) -> Result<FooterMetadata> {
    let mut footer = FooterMetadata::new();
    footer.insert(TABULAR_METADATA_KEY, schema.tabular_metadata().encode()?);
    Ok(footer)
}

/// Encodes `batch` as a Parquet file; a batch with rows lands in a single row group.
fn encode(batch: &RecordBatch, footer: &FooterMetadata, options: &WriteOptions) -> Result<Bytes> {
    let props = WriterProperties::builder()
        .set_compression(options.compression())
        .set_max_row_group_size(batch.num_rows().max(1))
        .set_key_value_metadata(Some(footer.to_key_values()))
        .build();
    let mut buffer = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buffer, batch.schema(), Some(props))?;
    writer.write(batch)?;
    writer.close()?;
    Ok(Bytes::from(buffer))
}
