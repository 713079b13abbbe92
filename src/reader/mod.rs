//! Reading single Parquet files and whole datasets into [`GeoTable`]s.

use arrow::{
    array::{RecordBatch, RecordBatchReader},
    compute::concat_batches,
};
use bytes::Bytes;
use parquet::{
    arrow::{ProjectionMask, arrow_reader::ParquetRecordBatchReaderBuilder},
    file::metadata::ParquetMetaData,
};

use crate::{
    Error, GeoTable, Result,
    dataset::{Dataset, footer_schema},
    geometry::{TABULAR_METADATA_KEY, TabularMetadata},
    metadata::FooterMetadata,
    storage::{CacheGeneration, Storage},
    table::{GeoSchema, column_indices, strip_metadata},
};

#[cfg(feature = "tokio")]
mod stream;
#[cfg(feature = "tokio")]
pub(crate) use stream::read_piece_async;

/// Reads a Parquet file or a directory of pieces into one table.
///
/// When `columns` is given, index columns recorded in the tabular metadata
/// are prepended to it. Pieces of a directory are concatenated in natural
/// order.
///
/// # Errors
///
/// [`Error::PathNotFound`] when `path` does not exist; [`Error::Schema`]
/// when a requested column is missing.
pub fn read(storage: &Storage, path: &str, columns: Option<&[String]>) -> Result<GeoTable> {
    let dataset = Dataset::open(storage, path, CacheGeneration::default())?;
    let footer = dataset.schema_footer(storage)?.ok_or_else(|| {
        Error::schema(format!("dataset '{path}' has no pieces and no shared footer"))
    })?;
    let (schema, tabular) = footer_schema(&footer)?;
    let columns = columns.map(|columns| with_index_columns(&tabular, columns));
    let geo_schema = GeoSchema::new(schema, tabular.geometry_columns());
    let geo_schema = match columns.as_deref() {
        Some(columns) => geo_schema.project(columns)?,
        None => geo_schema,
    };

    let batches = dataset
        .pieces()
        .iter()
        .map(|piece| {
            let builder = ParquetRecordBatchReaderBuilder::try_new(storage.read(piece)?)?;
            decode_batch(builder, columns.as_deref())
        })
        .collect::<Result<Vec<_>>>()?;
    let batch = match batches.first() {
        Some(first) => concat_batches(&first.schema(), &batches)?,
        None => RecordBatch::new_empty(geo_schema.schema().clone()),
    };
    tracing::debug!(path, pieces = batches.len(), rows = batch.num_rows(), "read dataset");

    let geo_schema = GeoSchema::new(batch.schema(), geo_schema.geometry_columns().clone());
    Ok(GeoTable::from_parts(batch, geo_schema))
}

/// Reads one piece: the deferred work behind a lazy partition.
pub(crate) fn read_piece(storage: &Storage, path: &str, columns: Option<&[String]>) -> Result<GeoTable> {
    decode_piece(storage.read(path)?, columns)
}

/// Decodes the bytes of a whole piece.
pub(crate) fn decode_piece(bytes: Bytes, columns: Option<&[String]>) -> Result<GeoTable> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(bytes)?;
    let tabular = tabular_metadata(builder.metadata())?;
    let columns = columns.map(|columns| with_index_columns(&tabular, columns));
    let batch = decode_batch(builder, columns.as_deref())?;
    let geo_schema = GeoSchema::new(batch.schema(), tabular.geometry_columns());
    Ok(GeoTable::from_parts(batch, geo_schema))
}

/// Decodes a whole file, projecting to `columns` in the requested order.
fn decode_batch(
    mut builder: ParquetRecordBatchReaderBuilder<Bytes>,
    columns: Option<&[String]>,
) -> Result<RecordBatch> {
    if let Some(columns) = columns {
        let indices = column_indices(builder.schema(), columns)?;
        let mask = ProjectionMask::roots(builder.parquet_schema(), indices);
        builder = builder.with_projection(mask);
    }
    let reader = builder.build()?;
    let schema = strip_metadata(&reader.schema());
    let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;
    finish_batches(schema, &batches, columns)
}

/// Concatenates decoded batches and restores the requested column order.
fn finish_batches(
    schema: arrow_schema::SchemaRef,
    batches: &[RecordBatch],
    columns: Option<&[String]>,
) -> Result<RecordBatch> {
    let columns_in_file_order = batches
        .iter()
        .map(|batch| RecordBatch::try_new(schema.clone(), batch.columns().to_vec()))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let batch = concat_batches(&schema, &columns_in_file_order)?;
    match columns {
        Some(columns) => {
            let order = column_indices(&batch.schema(), columns)?;
            Ok(batch.project(&order)?)
        }
        None => Ok(batch),
    }
}

fn tabular_metadata(metadata: &ParquetMetaData) -> Result<TabularMetadata> {
    let footer = FooterMetadata::from_parquet(metadata);
    TabularMetadata::decode(footer.get(TABULAR_METADATA_KEY))
}

/// Prepends recorded index columns that the caller did not ask for.
pub(crate) fn with_index_columns(tabular: &TabularMetadata, columns: &[String]) -> Vec<String> {
    let mut all: Vec<String> = tabular
        .index_column_names()
        .into_iter()
        .filter(|name| !columns.contains(name))
        .collect();
    all.extend(columns.iter().cloned());
    all
}
