use thiserror::Error;

/// Errors that can occur while writing, opening or assembling a dataset.
///
/// Missing spatial information is not an error: a dataset without a spatial
/// index simply cannot be pruned. Missing ordering information is an error
/// because the caller explicitly asked for divisions.
#[derive(Debug, Error)]
pub enum Error {
    /// The requested path does not exist in storage
    #[error("Path not found: {path}")]
    PathNotFound {
        /// Path as given by the caller (including any protocol prefix)
        path: String,
    },

    /// An empty list of dataset paths was supplied
    #[error("Empty path specification")]
    EmptyPath,

    /// The spatial metadata key is present but cannot be decoded
    #[error("Cannot decode spatial metadata: {reason}")]
    MetadataDecode {
        /// What was wrong with the encoded blob
        reason: String,
    },

    /// Metadata could not be serialized to JSON
    #[error("Cannot encode metadata: {0}")]
    MetadataEncode(#[from] serde_json::Error),

    /// Divisions were requested but the ordering key cannot be read
    #[error("Cannot load divisions because {reason}")]
    DivisionsUnavailable {
        /// Why the per-partition key ranges are unavailable
        reason: String,
    },

    /// The per-partition key ranges do not form a sorted sequence
    #[error(
        "Cannot load divisions because the discovered divisions are unsorted.\n\
         Set load_divisions to false to skip loading divisions."
    )]
    UnsortedDivisions {
        /// The offending `min_0, ..., min_{n-1}, max_{n-1}` sequence
        divisions: Vec<i64>,
    },

    /// Schema-level problem (unknown column, non-geometry column, mismatched tables)
    #[error("Schema error: {0}")]
    Schema(String),

    /// Invalid glob pattern or failure while expanding it
    #[error("Glob error: {0}")]
    Glob(String),

    /// A spawned partition read did not complete
    #[cfg(feature = "tokio")]
    #[error("Task error: {0}")]
    Task(String),

    /// IO errors while resolving local paths
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Object store errors (missing objects, listing and transfer failures)
    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    /// A path that cannot be expressed as an object store location
    #[error("Invalid path: {0}")]
    ObjectPath(#[from] object_store::path::Error),

    /// Parquet format errors
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Arrow errors from array and batch operations
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),
}

/// Result type alias for dataset operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn path_not_found(path: impl Into<String>) -> Self {
        Error::PathNotFound { path: path.into() }
    }

    pub(crate) fn metadata_decode(reason: impl Into<String>) -> Self {
        Error::MetadataDecode {
            reason: reason.into(),
        }
    }

    pub(crate) fn divisions_unavailable(reason: impl Into<String>) -> Self {
        Error::DivisionsUnavailable {
            reason: reason.into(),
        }
    }

    pub(crate) fn schema(msg: impl Into<String>) -> Self {
        Error::Schema(msg.into())
    }
}
