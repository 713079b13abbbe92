use arrow_schema::SchemaRef;
use parquet::{arrow::parquet_to_arrow_schema, file::metadata::ParquetMetaData};

use crate::{
    Result,
    error::Error,
    geometry::{TABULAR_METADATA_KEY, TabularMetadata},
    metadata::FooterMetadata,
    natural::natural_cmp,
    storage::{CacheGeneration, Storage, file_name, join},
    table::strip_metadata,
};

/// Shared footer written next to the partition files.
pub const COMMON_METADATA_FILE: &str = "_common_metadata";
/// Shared footer that additionally carries row group metadata.
pub const METADATA_FILE: &str = "_metadata";

/// One physical partition file and its position in the logical ordering.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ParquetPieceRef {
    pub path: String,
    pub ordinal: usize,
}

/// A dataset root: either a single Parquet file or a directory of pieces.
#[derive(Clone, Debug)]
pub struct Dataset {
    root: String,
    pieces: Vec<String>,
    common_metadata: Option<ParquetMetaData>,
}

impl Dataset {
    /// Opens `path` and orders its pieces naturally.
    ///
    /// Files whose name starts with `_` or `.` are not pieces. The shared
    /// footer is `_common_metadata`, falling back to `_metadata`.
    pub fn open(storage: &Storage, path: &str, generation: CacheGeneration) -> Result<Self> {
        if !storage.exists(path)? {
            return Err(Error::path_not_found(path));
        }
        if !storage.is_dir(path)? {
            return Ok(Self {
                root: path.to_string(),
                pieces: vec![path.to_string()],
                common_metadata: None,
            });
        }

        let files = storage.list_files(path, generation)?;
        let mut pieces: Vec<String> = files
            .iter()
            .filter(|file| !file_name(file).starts_with(['_', '.']))
            .cloned()
            .collect();
        pieces.sort_by(|a, b| natural_cmp(a, b));

        let mut common_metadata = None;
        for footer_name in [COMMON_METADATA_FILE, METADATA_FILE] {
            if files.iter().any(|file| file_name(file) == footer_name) {
                common_metadata = Some(storage.read_footer(&join(path, footer_name))?);
                break;
            }
        }

        tracing::debug!(
            root = path,
            pieces = pieces.len(),
            shared_footer = common_metadata.is_some(),
            "opened dataset"
        );
        Ok(Self {
            root: path.to_string(),
            pieces,
            common_metadata,
        })
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Piece paths in natural order.
    pub fn pieces(&self) -> &[String] {
        &self.pieces
    }

    /// Footer of `_common_metadata` / `_metadata`, if the dataset has one.
    pub fn common_metadata(&self) -> Option<&ParquetMetaData> {
        self.common_metadata.as_ref()
    }

    /// Key/value metadata of the shared footer, if the dataset has one.
    pub fn common_footer(&self) -> Option<FooterMetadata> {
        self.common_metadata.as_ref().map(FooterMetadata::from_parquet)
    }

    /// Footer describing the whole dataset: the shared footer when present,
    /// otherwise the first piece's own footer.
    pub fn schema_footer(&self, storage: &Storage) -> Result<Option<ParquetMetaData>> {
        if let Some(common) = &self.common_metadata {
            return Ok(Some(common.clone()));
        }
        match self.pieces.first() {
            Some(first) => Ok(Some(storage.read_footer(first)?)),
            None => Ok(None),
        }
    }
}

/// Arrow schema (without schema-level metadata) and tabular metadata of a footer.
pub(crate) fn footer_schema(footer: &ParquetMetaData) -> Result<(SchemaRef, TabularMetadata)> {
    let file_metadata = footer.file_metadata();
    let schema = parquet_to_arrow_schema(
        file_metadata.schema_descr(),
        file_metadata.key_value_metadata(),
    )?;
    let kv = FooterMetadata::from_parquet(footer);
    let tabular = TabularMetadata::decode(kv.get(TABULAR_METADATA_KEY))?;
    Ok((strip_metadata(&schema), tabular))
}
