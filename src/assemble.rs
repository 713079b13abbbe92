//! Opening one or more dataset roots as an ordered sequence of lazy partitions.

use arrow::{array::RecordBatch, compute::concat_batches};

use crate::{
    BoundingBox, Error, GeoTable, Result,
    bounds::{PartitionBounds, PartitionBoundsIndex, partition_envelope},
    dataset::{Dataset, ParquetPieceRef, footer_schema},
    divisions::{load_divisions, validate},
    lazy::LazyPartition,
    natural::sort_naturally,
    options::ReadOptions,
    prune::{PartitionSet, SpatialPartitionPruner},
    reader::{read_piece, with_index_columns},
    storage::{Storage, has_glob_magic},
    table::GeoSchema,
};

/// Builds a [`PartitionedTable`] from dataset paths without reading any rows.
#[derive(Clone, Debug)]
pub struct LazyPartitionAssembler {
    storage: Storage,
    options: ReadOptions,
}

impl LazyPartitionAssembler {
    pub fn new(storage: Storage, options: ReadOptions) -> Self {
        Self { storage, options }
    }

    /// Opens `paths` as one logical table.
    ///
    /// Pieces are ordered root by root, each root in natural order. Only
    /// footers are read.
    ///
    /// # Errors
    ///
    /// - [`Error::EmptyPath`] when `paths` is empty, before any storage access
    /// - [`Error::PathNotFound`] when a root (or every glob match) is missing
    /// - [`Error::Schema`] when a requested column or geometry does not exist
    /// - [`Error::DivisionsUnavailable`] / [`Error::UnsortedDivisions`] when
    ///   divisions are requested but cannot be established
    pub fn assemble<S: AsRef<str>>(&self, paths: &[S]) -> Result<PartitionedTable> {
        if paths.is_empty() {
            return Err(Error::EmptyPath);
        }
        let storage = &self.storage;
        let roots = self.expand(paths)?;
        let generation = self.options.cache_generation();
        let datasets = roots
            .iter()
            .map(|root| Dataset::open(storage, root, generation))
            .collect::<Result<Vec<_>>>()?;

        let (meta, columns) = self.infer_meta(&datasets[0])?;

        let mut partitions = Vec::new();
        for dataset in &datasets {
            for path in dataset.pieces() {
                partitions.push(LazyPartition::Piece {
                    piece: ParquetPieceRef {
                        path: path.clone(),
                        ordinal: partitions.len(),
                    },
                    columns: columns.clone(),
                    schema: meta.clone(),
                    storage: self.storage.clone(),
                });
            }
        }

        let bounds = PartitionBoundsIndex::concat(
            datasets
                .iter()
                .map(|dataset| {
                    let index = match dataset.common_footer() {
                        Some(footer) => PartitionBoundsIndex::load(&footer)?,
                        None => None,
                    };
                    Ok((index, dataset.pieces().len()))
                })
                .collect::<Result<Vec<_>>>()?,
        );
        let divisions = if self.options.load_divisions() {
            Some(load_divisions(storage, &datasets)?)
        } else {
            None
        };

        let mut set = PartitionSet::new(partitions, bounds, divisions);
        if let Some(query) = self.options.bbox() {
            match meta.geometry() {
                Some(column) => set = SpatialPartitionPruner::new(*query).prune(set, column),
                None => tracing::warn!("bbox given but dataset has no geometry column, skipping pruning"),
            }
        }

        if set.is_empty() {
            tracing::debug!(roots = roots.len(), "no partitions selected");
            let bounds = set.bounds.as_ref().map(empty_partition_bounds).unwrap_or_default();
            return Ok(PartitionedTable {
                partitions: vec![LazyPartition::Empty(meta.clone())],
                divisions: None,
                meta,
                partition_bounds: bounds,
            });
        }

        let divisions = match set.divisions.as_deref() {
            Some(divisions) => Some(validate(divisions)?),
            None => None,
        };
        tracing::debug!(
            roots = roots.len(),
            partitions = set.len(),
            divisions = divisions.is_some(),
            "assembled partitioned table"
        );
        Ok(PartitionedTable {
            partitions: set.partitions,
            divisions,
            meta,
            partition_bounds: set.bounds.unwrap_or_default(),
        })
    }

    fn expand<S: AsRef<str>>(&self, paths: &[S]) -> Result<Vec<String>> {
        let [single] = paths else {
            return Ok(paths.iter().map(|path| path.as_ref().to_string()).collect());
        };
        let pattern = single.as_ref();
        if !has_glob_magic(pattern) {
            return Ok(vec![pattern.to_string()]);
        }
        let mut roots = self.storage.glob(pattern)?;
        if roots.is_empty() {
            return Err(Error::path_not_found(pattern));
        }
        sort_naturally(&mut roots);
        tracing::debug!(pattern, matches = roots.len(), "expanded glob");
        Ok(roots)
    }

    /// Schema of the first root, projected and with the active geometry set.
    fn infer_meta(&self, dataset: &Dataset) -> Result<(GeoSchema, Option<Vec<String>>)> {
        let footer = dataset.schema_footer(&self.storage)?.ok_or_else(|| {
            Error::schema(format!(
                "dataset '{}' has no pieces and no shared footer",
                dataset.root()
            ))
        })?;
        let (schema, tabular) = footer_schema(&footer)?;
        let meta = GeoSchema::new(schema, tabular.geometry_columns());
        let columns = self
            .options
            .columns()
            .map(|columns| with_index_columns(&tabular, columns));
        let meta = match columns.as_deref() {
            Some(columns) => meta.project(columns)?,
            None => meta,
        };
        let meta = match self.options.geometry() {
            Some(geometry) => meta.set_geometry(geometry)?,
            None => meta,
        };
        Ok((meta, columns))
    }
}

/// Opens `paths` as a [`PartitionedTable`].
///
/// # Example
///
/// ```no_run
/// use geoparcel::{BoundingBox, ReadOptions, Storage, read_partitioned};
///
/// # fn main() -> geoparcel::Result<()> {
/// let options = ReadOptions::builder()
///     .bbox(BoundingBox::new(4.0, 4.0, 7.0, 7.0))
///     .build();
/// let table = read_partitioned(&Storage::local(), &["/data/cities"], &options)?;
/// println!("{} partitions overlap the query", table.npartitions());
/// # Ok(())
/// # }
/// ```
pub fn read_partitioned<S: AsRef<str>>(
    storage: &Storage,
    paths: &[S],
    options: &ReadOptions,
) -> Result<PartitionedTable> {
    LazyPartitionAssembler::new(storage.clone(), options.clone()).assemble(paths)
}

fn empty_partition_bounds(index: &PartitionBoundsIndex) -> PartitionBoundsIndex {
    let mut empty = PartitionBoundsIndex::new();
    for column in index.columns() {
        empty.insert(column, PartitionBounds::new(vec![BoundingBox::empty()]));
    }
    empty
}

/// An ordered sequence of lazy partitions forming one logical table.
#[derive(Clone, Debug)]
pub struct PartitionedTable {
    partitions: Vec<LazyPartition>,
    divisions: Option<Vec<i64>>,
    meta: GeoSchema,
    partition_bounds: PartitionBoundsIndex,
}

impl PartitionedTable {
    /// Wraps in-memory tables, one partition each, computing bounds for
    /// every geometry column.
    ///
    /// All tables must share the first table's schema.
    pub fn from_tables(tables: Vec<GeoTable>) -> Result<Self> {
        let first = tables
            .first()
            .ok_or_else(|| Error::schema("cannot build a partitioned table from no tables"))?;
        let meta = first.geo_schema().clone();
        if let Some(mismatch) = tables
            .iter()
            .position(|table| table.batch().schema() != *meta.schema())
        {
            return Err(Error::schema(format!(
                "partition {mismatch} does not match the schema of partition 0"
            )));
        }
        let geometry_columns: Vec<String> = meta.geometry_columns().keys().cloned().collect();
        let partition_bounds = PartitionBoundsIndex::compute(&tables, &geometry_columns)?;
        Ok(Self {
            partitions: tables.into_iter().map(LazyPartition::InMemory).collect(),
            divisions: None,
            meta,
            partition_bounds,
        })
    }

    pub fn partitions(&self) -> &[LazyPartition] {
        &self.partitions
    }

    pub fn npartitions(&self) -> usize {
        self.partitions.len()
    }

    /// Flattened `min_0, ..., min_{n-1}, max_{n-1}` of the ordering key, if known.
    pub fn divisions(&self) -> Option<&[i64]> {
        self.divisions.as_deref()
    }

    pub fn known_divisions(&self) -> bool {
        self.divisions.is_some()
    }

    pub fn meta(&self) -> &GeoSchema {
        &self.meta
    }

    pub fn geometry(&self) -> Option<&str> {
        self.meta.geometry()
    }

    pub fn set_geometry(mut self, column: &str) -> Result<Self> {
        self.meta = self.meta.set_geometry(column)?;
        Ok(self)
    }

    /// Bounds recorded or computed so far.
    pub fn partition_bounds_index(&self) -> &PartitionBoundsIndex {
        &self.partition_bounds
    }

    /// Cached bounds for `column`, if they cover every partition.
    pub fn partition_bounds(&self, column: &str) -> Option<&PartitionBounds> {
        self.partition_bounds
            .get(column)
            .filter(|bounds| bounds.len() == self.partitions.len())
    }

    /// Bounds for `column`, computing and caching them if needed.
    ///
    /// Pieces are read restricted to `column`.
    pub fn ensure_partition_bounds(&mut self, column: &str) -> Result<&PartitionBounds> {
        if !self.meta.geometry_columns().contains_key(column) {
            return Err(Error::schema(format!("column '{column}' is not a geometry column")));
        }
        if self.partition_bounds(column).is_none() {
            tracing::debug!(column, partitions = self.partitions.len(), "computing partition bounds");
            let bounds = self
                .partitions
                .iter()
                .map(|partition| partition_column_envelope(partition, column))
                .collect::<Result<PartitionBounds>>()?;
            self.partition_bounds.insert(column, bounds);
        }
        self.partition_bounds
            .get(column)
            .ok_or_else(|| Error::schema(format!("no bounds for column '{column}'")))
    }

    /// Bounds of every partition for `column` merged into one box.
    pub fn total_bounds(&mut self, column: &str) -> Result<BoundingBox> {
        Ok(self.ensure_partition_bounds(column)?.total())
    }

    /// Executes every partition in order and concatenates the results.
    pub fn collect(&self) -> Result<GeoTable> {
        let tables = self
            .partitions
            .iter()
            .map(LazyPartition::execute)
            .collect::<Result<Vec<_>>>()?;
        self.concat(tables)
    }

    /// Executes up to `concurrency` partitions at a time, preserving order.
    #[cfg(feature = "tokio")]
    pub async fn collect_async(&self, concurrency: usize) -> Result<GeoTable> {
        use futures::{StreamExt, TryStreamExt, stream};

        let tables: Vec<GeoTable> =
            stream::iter(self.partitions.iter().map(|partition| partition.execute_async()))
                .buffered(concurrency.max(1))
                .try_collect()
                .await?;
        self.concat(tables)
    }

    fn concat(&self, tables: Vec<GeoTable>) -> Result<GeoTable> {
        let schema = self.meta.schema().clone();
        let batches = tables
            .into_iter()
            .map(|table| RecordBatch::try_new(schema.clone(), table.into_batch().columns().to_vec()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let batch = concat_batches(&schema, &batches)?;
        Ok(GeoTable::from_parts(batch, self.meta.clone()))
    }
}

fn partition_column_envelope(partition: &LazyPartition, column: &str) -> Result<BoundingBox> {
    match partition {
        LazyPartition::Piece { piece, storage, .. } => {
            let table = read_piece(storage, &piece.path, Some(&[column.to_string()][..]))?;
            partition_envelope(&table, column)
        }
        LazyPartition::Empty(_) => Ok(BoundingBox::empty()),
        LazyPartition::InMemory(table) => partition_envelope(table, column),
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap, sync::Arc};

    use arrow::array::{Array, Int64Array, ListArray};
    use arrow::datatypes::Float64Type;
    use arrow_schema::{Field, Schema};

    use super::*;
    use crate::geometry::GeometryKind;

    fn line_table(ids: &[i64], coords: &[[f64; 4]]) -> GeoTable {
        let geom = ListArray::from_iter_primitive::<Float64Type, _, _>(
            coords
                .iter()
                .map(|c| Some(c.iter().copied().map(Some).collect::<Vec<_>>())),
        );
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", arrow_schema::DataType::Int64, false),
            Field::new("geom", geom.data_type().clone(), true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![Arc::new(Int64Array::from(ids.to_vec())), Arc::new(geom)],
        )
        .unwrap();
        GeoTable::new(batch, BTreeMap::from([("geom".to_string(), GeometryKind::Line)])).unwrap()
    }

    #[test]
    fn empty_path_list_fails_before_io() {
        let paths: [&str; 0] = [];
        let err = read_partitioned(&Storage::memory(), &paths, &ReadOptions::default()).unwrap_err();
        assert!(matches!(err, Error::EmptyPath));
    }

    #[test]
    fn from_tables_computes_bounds() {
        let table = PartitionedTable::from_tables(vec![
            line_table(&[1], &[[0.0, 0.0, 1.0, 1.0]]),
            line_table(&[2, 3], &[[5.0, 5.0, 6.0, 6.0], [4.0, 7.0, 4.5, 7.5]]),
        ])
        .unwrap();
        assert_eq!(table.npartitions(), 2);
        assert_eq!(table.geometry(), Some("geom"));
        assert_eq!(
            table.partition_bounds("geom").unwrap().as_slice(),
            &[
                BoundingBox::new(0.0, 0.0, 1.0, 1.0),
                BoundingBox::new(4.0, 5.0, 6.0, 7.5)
            ]
        );
        assert_eq!(table.collect().unwrap().num_rows(), 3);
    }

    #[test]
    fn from_tables_rejects_mismatched_schemas() {
        let other = {
            let schema = Arc::new(Schema::new(vec![Field::new(
                "id",
                arrow_schema::DataType::Int64,
                false,
            )]));
            let batch =
                RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![1]))]).unwrap();
            GeoTable::new(batch, BTreeMap::new()).unwrap()
        };
        let err = PartitionedTable::from_tables(vec![line_table(&[1], &[[0.0; 4]]), other])
            .unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
    }

    #[test]
    fn ensure_bounds_rejects_plain_columns() {
        let mut table =
            PartitionedTable::from_tables(vec![line_table(&[1], &[[0.0, 0.0, 1.0, 1.0]])]).unwrap();
        assert!(table.ensure_partition_bounds("id").is_err());
        assert_eq!(
            table.total_bounds("geom").unwrap(),
            BoundingBox::new(0.0, 0.0, 1.0, 1.0)
        );
    }
}
