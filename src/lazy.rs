use crate::{
    GeoTable, Result,
    dataset::ParquetPieceRef,
    reader::read_piece,
    storage::Storage,
    table::GeoSchema,
};

/// A deferred partition read.
///
/// Executing a partition has no side effects, so the same value can be run
/// any number of times, on any thread.
#[derive(Clone, Debug)]
pub enum LazyPartition {
    /// Decode one piece, projected to `columns`.
    Piece {
        piece: ParquetPieceRef,
        columns: Option<Vec<String>>,
        schema: GeoSchema,
        storage: Storage,
    },
    /// No rows, conforming to the schema.
    Empty(GeoSchema),
    /// Already materialized.
    InMemory(GeoTable),
}

impl LazyPartition {
    pub fn piece(&self) -> Option<&ParquetPieceRef> {
        match self {
            LazyPartition::Piece { piece, .. } => Some(piece),
            _ => None,
        }
    }

    pub fn execute(&self) -> Result<GeoTable> {
        match self {
            LazyPartition::Piece {
                piece,
                columns,
                schema,
                storage,
            } => {
                tracing::debug!(path = piece.path.as_str(), ordinal = piece.ordinal, "reading partition");
                let table = read_piece(storage, &piece.path, columns.as_deref())?;
                Ok(conform(table, schema))
            }
            LazyPartition::Empty(schema) => Ok(GeoTable::empty(schema)),
            LazyPartition::InMemory(table) => Ok(table.clone()),
        }
    }

    #[cfg(feature = "tokio")]
    pub async fn execute_async(&self) -> Result<GeoTable> {
        match self {
            LazyPartition::Piece {
                piece,
                columns,
                schema,
                storage,
            } => {
                let table =
                    crate::reader::read_piece_async(storage, &piece.path, columns.clone()).await?;
                Ok(conform(table, schema))
            }
            other => other.execute(),
        }
    }
}

/// Carries the dataset's active geometry over to a decoded piece.
fn conform(table: GeoTable, schema: &GeoSchema) -> GeoTable {
    match schema.geometry() {
        Some(active) if table.geometry() != Some(active) => {
            table.clone().set_geometry(active).unwrap_or(table)
        }
        _ => table,
    }
}
