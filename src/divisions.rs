//! Per-partition ranges of the ordering key, read from column chunk statistics.

use parquet::file::{metadata::ParquetMetaData, statistics::Statistics};

use crate::{
    Error, Result,
    dataset::Dataset,
    storage::Storage,
};

/// Reserved column holding each row's position on the space-filling curve.
pub const ORDERING_KEY_COLUMN: &str = "hilbert_distance";

/// Smallest and largest ordering key of one partition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Division {
    pub min: i64,
    pub max: i64,
}

impl Division {
    pub fn new(min: i64, max: i64) -> Self {
        Self { min, max }
    }

    /// Reads the key range from the footer of a single-row-group piece.
    pub fn from_footer(path: &str, footer: &ParquetMetaData) -> Result<Self> {
        let row_groups = footer.row_groups();
        let [row_group] = row_groups else {
            return Err(Error::divisions_unavailable(format!(
                "piece '{path}' has {} row groups, expected exactly one",
                row_groups.len()
            )));
        };
        let chunk = row_group
            .columns()
            .iter()
            .find(|chunk| chunk.column_path().string() == ORDERING_KEY_COLUMN)
            .ok_or_else(|| {
                Error::divisions_unavailable(format!(
                    "the {ORDERING_KEY_COLUMN} column is not present in piece '{path}'"
                ))
            })?;
        let stats = chunk.statistics().ok_or_else(|| {
            Error::divisions_unavailable(format!(
                "piece '{path}' has no statistics for {ORDERING_KEY_COLUMN}"
            ))
        })?;
        let range = match stats {
            Statistics::Int64(stats) => stats.min_opt().copied().zip(stats.max_opt().copied()),
            Statistics::Int32(stats) => stats
                .min_opt()
                .map(|min| i64::from(*min))
                .zip(stats.max_opt().map(|max| i64::from(*max))),
            _ => {
                return Err(Error::divisions_unavailable(format!(
                    "{ORDERING_KEY_COLUMN} statistics of piece '{path}' are not integral"
                )));
            }
        };
        let (min, max) = range.ok_or_else(|| {
            Error::divisions_unavailable(format!(
                "piece '{path}' has no min/max for {ORDERING_KEY_COLUMN}"
            ))
        })?;
        Ok(Self { min, max })
    }
}

/// Loads one division per piece, concatenated in root order.
///
/// Only the footer of each piece is fetched.
pub fn load_divisions(storage: &Storage, datasets: &[Dataset]) -> Result<Vec<Division>> {
    let mut divisions = Vec::new();
    for dataset in datasets {
        for piece in dataset.pieces() {
            let footer = storage.read_footer(piece)?;
            divisions.push(Division::from_footer(piece, &footer)?);
        }
    }
    tracing::debug!(partitions = divisions.len(), "loaded divisions");
    Ok(divisions)
}

/// Flattens divisions into `min_0, ..., min_{n-1}, max_{n-1}`.
///
/// # Errors
///
/// [`Error::UnsortedDivisions`] when the sequence is not non-decreasing.
pub fn validate(divisions: &[Division]) -> Result<Vec<i64>> {
    let Some(last) = divisions.last() else {
        return Ok(Vec::new());
    };
    let mut flat: Vec<i64> = divisions.iter().map(|division| division.min).collect();
    flat.push(last.max);
    if flat.windows(2).any(|pair| pair[0] > pair[1]) {
        return Err(Error::UnsortedDivisions { divisions: flat });
    }
    Ok(flat)
}
