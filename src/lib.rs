//! Spatially partitioned Parquet datasets.
//!
//! A dataset is a directory of `part.<i>.parquet` pieces plus a
//! `_common_metadata` footer that records, per geometry column, the bounding
//! box of every partition. Readers use those boxes to skip partitions that
//! cannot overlap a query region, and can recover the sorted
//! `hilbert_distance` range of each partition from row group statistics.
//!
//! ```no_run
//! use geoparcel::{BoundingBox, DatasetWriter, ReadOptions, Storage, WriteOptions, read_partitioned};
//!
//! # fn main() -> geoparcel::Result<()> {
//! let storage = Storage::local();
//! let options = ReadOptions::builder()
//!     .bbox(BoundingBox::new(4.0, 4.0, 7.0, 7.0))
//!     .build();
//! let table = read_partitioned(&storage, &["/data/cities"], &options)?;
//! DatasetWriter::new(storage).write_partitioned(&table, "/data/subset", &WriteOptions::default())?;
//! # Ok(())
//! # }
//! ```

mod assemble;
mod bbox;
mod bounds;
mod dataset;
mod divisions;
mod error;
mod geometry;
mod lazy;
mod metadata;
mod natural;
mod options;
mod prune;
mod reader;
mod storage;
mod table;
mod writer;

pub use assemble::{LazyPartitionAssembler, PartitionedTable, read_partitioned};
pub use bbox::{BoundingBox, envelope};
pub use bounds::{PartitionBounds, PartitionBoundsIndex, partition_envelope};
pub use dataset::{COMMON_METADATA_FILE, Dataset, METADATA_FILE, ParquetPieceRef};
pub use divisions::{Division, ORDERING_KEY_COLUMN, load_divisions, validate as validate_divisions};
pub use error::{Error, Result};
pub use geometry::{ColumnMetadata, GeometryKind, IndexColumn, TABULAR_METADATA_KEY, TabularMetadata};
pub use lazy::LazyPartition;
pub use metadata::{FooterMetadata, SPATIAL_METADATA_KEY, SPATIAL_METADATA_VERSION, SpatialMetadata};
pub use natural::{natural_cmp, sort_naturally};
pub use options::{ReadOptions, ReadOptionsBuilder, WriteOptions, WriteOptionsBuilder};
pub use prune::{PartitionSet, SpatialPartitionPruner};
pub use reader::read;
pub use storage::{CacheGeneration, Storage, has_glob_magic};
pub use table::{GeoSchema, GeoTable};
pub use writer::DatasetWriter;
