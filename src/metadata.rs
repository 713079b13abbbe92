//! Spatial metadata blob stored in the shared dataset footer.
//!
//! The blob is UTF-8 JSON under [`SPATIAL_METADATA_KEY`]:
//!
//! ```text
//! { "version": 1,
//!   "partition_bounds": {
//!     "<geometry_column>": { "<partition_index>": {"x0": f, "y0": f, "x1": f, "y1": f}, ... },
//!     ...
//! } }
//! ```
//!
//! Blobs without a `version` field are read as version 1. Such legacy blobs may
//! also store each column coordinate-first (`{"x0": {"<partition_index>": f}, ...}`).

use std::collections::BTreeMap;

use parquet::{file::metadata::ParquetMetaData, format::KeyValue};
use serde::{Deserialize, Serialize};

use crate::{BoundingBox, Error, Result};

/// Footer key holding the spatial metadata blob.
pub const SPATIAL_METADATA_KEY: &str = "spatialpandas";

/// Footer key used by the Arrow writer for the serialized Arrow schema.
pub(crate) const ARROW_SCHEMA_KEY: &str = "ARROW:schema";

pub const SPATIAL_METADATA_VERSION: u32 = 1;

/// Serialized form of the partition bounds index.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpatialMetadata {
    pub version: u32,
    /// Column name -> partition label -> bounding box.
    pub partition_bounds: BTreeMap<String, BTreeMap<String, BoundingBox>>,
}

#[derive(Serialize)]
struct EncodedMetadata<'a> {
    version: u32,
    partition_bounds: &'a BTreeMap<String, BTreeMap<String, BoundingBox>>,
}

#[derive(Deserialize)]
struct DecodedMetadata {
    #[serde(default)]
    version: Option<u32>,
    #[serde(default)]
    partition_bounds: BTreeMap<String, ColumnBounds>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ColumnBounds {
    ByPartition(BTreeMap<String, BoundingBox>),
    ByCoordinate {
        x0: BTreeMap<String, Option<f64>>,
        y0: BTreeMap<String, Option<f64>>,
        x1: BTreeMap<String, Option<f64>>,
        y1: BTreeMap<String, Option<f64>>,
    },
}

impl ColumnBounds {
    fn into_partitions(self, column: &str) -> Result<BTreeMap<String, BoundingBox>> {
        match self {
            ColumnBounds::ByPartition(bounds) => Ok(bounds),
            ColumnBounds::ByCoordinate { x0, y0, x1, y1 } => {
                let coord = |map: &BTreeMap<String, Option<f64>>, label: &str| {
                    map.get(label).map(|v| v.unwrap_or(f64::NAN)).ok_or_else(|| {
                        Error::metadata_decode(format!(
                            "column '{column}' has no coordinates for partition '{label}'"
                        ))
                    })
                };
                x0.keys()
                    .map(|label| {
                        let bbox = BoundingBox {
                            x0: coord(&x0, label)?,
                            y0: coord(&y0, label)?,
                            x1: coord(&x1, label)?,
                            y1: coord(&y1, label)?,
                        };
                        Ok((label.clone(), bbox))
                    })
                    .collect()
            }
        }
    }
}

impl SpatialMetadata {
    pub fn new(partition_bounds: BTreeMap<String, BTreeMap<String, BoundingBox>>) -> Self {
        Self {
            version: SPATIAL_METADATA_VERSION,
            partition_bounds,
        }
    }

    /// JSON text of the blob, always carrying the current version.
    pub fn encode(&self) -> Result<String> {
        let encoded = EncodedMetadata {
            version: self.version,
            partition_bounds: &self.partition_bounds,
        };
        Ok(serde_json::to_string(&encoded)?)
    }

    /// Decodes the blob stored under the spatial key.
    ///
    /// An absent or empty blob means "no spatial index" and decodes to empty
    /// metadata.
    pub fn decode(raw: Option<&[u8]>) -> Result<Self> {
        let raw = match raw {
            Some(raw) if !raw.iter().all(u8::is_ascii_whitespace) => raw,
            _ => return Ok(Self::new(BTreeMap::new())),
        };
        let decoded: DecodedMetadata =
            serde_json::from_slice(raw).map_err(|e| Error::metadata_decode(e.to_string()))?;
        let version = decoded.version.unwrap_or(SPATIAL_METADATA_VERSION);
        if version > SPATIAL_METADATA_VERSION {
            return Err(Error::metadata_decode(format!(
                "unsupported version {version} (latest supported is {SPATIAL_METADATA_VERSION})"
            )));
        }
        let partition_bounds = decoded
            .partition_bounds
            .into_iter()
            .map(|(column, bounds)| {
                let bounds = bounds.into_partitions(&column)?;
                Ok((column, bounds))
            })
            .collect::<Result<_>>()?;
        Ok(Self {
            version,
            partition_bounds,
        })
    }
}

/// Key/value metadata of a Parquet footer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FooterMetadata {
    entries: BTreeMap<String, String>,
}

impl FooterMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parquet(metadata: &ParquetMetaData) -> Self {
        let entries = metadata
            .file_metadata()
            .key_value_metadata()
            .map(|kvs| {
                kvs.iter()
                    .filter_map(|kv| Some((kv.key.clone(), kv.value.clone()?)))
                    .collect()
            })
            .unwrap_or_default();
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Raw spatial blob, if the footer carries one.
    pub fn spatial_blob(&self) -> Option<&[u8]> {
        self.get(SPATIAL_METADATA_KEY).map(str::as_bytes)
    }

    /// Entries to hand to the Arrow writer; the writer adds its own schema entry.
    pub(crate) fn to_key_values(&self) -> Vec<KeyValue> {
        self.entries
            .iter()
            .filter(|(key, _)| key.as_str() != ARROW_SCHEMA_KEY)
            .map(|(key, value)| KeyValue::new(key.clone(), value.clone()))
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FooterMetadata {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
