use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// Footer key holding the tabular sidecar metadata (column dtypes, index columns).
pub const TABULAR_METADATA_KEY: &str = "pandas";

/// The closed set of geometry column kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GeometryKind {
    Point,
    MultiPoint,
    Ring,
    Line,
    MultiLine,
    Polygon,
    MultiPolygon,
}

impl GeometryKind {
    pub const ALL: [GeometryKind; 7] = [
        GeometryKind::Point,
        GeometryKind::MultiPoint,
        GeometryKind::Ring,
        GeometryKind::Line,
        GeometryKind::MultiLine,
        GeometryKind::Polygon,
        GeometryKind::MultiPolygon,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            GeometryKind::Point => "point",
            GeometryKind::MultiPoint => "multipoint",
            GeometryKind::Ring => "ring",
            GeometryKind::Line => "line",
            GeometryKind::MultiLine => "multiline",
            GeometryKind::Polygon => "polygon",
            GeometryKind::MultiPolygon => "multipolygon",
        }
    }

    /// Resolves a dtype string such as `"polygon[float64]"` or `"Point"`.
    ///
    /// Returns `None` for anything outside the known geometry kinds, including
    /// known kinds with a non-numeric subtype.
    ///
    /// ```
    /// use geoparcel::GeometryKind;
    ///
    /// assert_eq!(GeometryKind::parse("multiline[float64]"), Some(GeometryKind::MultiLine));
    /// assert_eq!(GeometryKind::parse("int64"), None);
    /// ```
    pub fn parse(type_string: &str) -> Option<GeometryKind> {
        let type_string = type_string.trim();
        let (name, subtype) = match type_string.split_once('[') {
            Some((name, rest)) => (name, Some(rest.strip_suffix(']')?)),
            None => (type_string, None),
        };
        if let Some(subtype) = subtype {
            if !is_numeric_subtype(subtype) {
                return None;
            }
        }
        GeometryKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(name))
    }

    /// The dtype string recorded in tabular metadata.
    pub fn type_string(&self) -> String {
        format!("{}[float64]", self.name())
    }
}

impl fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn is_numeric_subtype(subtype: &str) -> bool {
    matches!(
        subtype,
        "float16"
            | "float32"
            | "float64"
            | "int8"
            | "int16"
            | "int32"
            | "int64"
            | "uint8"
            | "uint16"
            | "uint32"
            | "uint64"
    )
}

/// Sidecar tabular metadata stored next to the Arrow schema in Parquet footers.
///
/// Only the fields needed to recover geometry dtypes and index columns are
/// modelled; everything else in the blob is ignored on read.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TabularMetadata {
    #[serde(default)]
    pub index_columns: Vec<IndexColumn>,
    #[serde(default)]
    pub columns: Vec<ColumnMetadata>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndexColumn {
    Name(String),
    Descriptor {
        #[serde(default)]
        name: Option<String>,
    },
    Other(Value),
}

impl IndexColumn {
    /// Name of a materialized index column, if the entry names one.
    pub fn name(&self) -> Option<&str> {
        match self {
            IndexColumn::Name(name) => Some(name),
            IndexColumn::Descriptor { name } => name.as_deref(),
            IndexColumn::Other(_) => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "numpy_type")]
    pub type_string: Option<String>,
}

impl TabularMetadata {
    /// Parses the blob stored under [`TABULAR_METADATA_KEY`]; absent means empty.
    pub fn decode(raw: Option<&str>) -> Result<Self> {
        match raw {
            None => Ok(Self::default()),
            Some(raw) if raw.trim().is_empty() => Ok(Self::default()),
            Some(raw) => serde_json::from_str(raw)
                .map_err(|e| Error::metadata_decode(format!("tabular metadata: {e}"))),
        }
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Columns whose recorded dtype resolves to a known geometry kind.
    ///
    /// Unresolvable dtype strings are skipped rather than reported.
    pub fn geometry_columns(&self) -> BTreeMap<String, GeometryKind> {
        self.columns
            .iter()
            .filter_map(|column| {
                let name = column.name.as_ref()?;
                let kind = GeometryKind::parse(column.type_string.as_deref()?)?;
                Some((name.clone(), kind))
            })
            .collect()
    }

    pub fn index_column_names(&self) -> Vec<String> {
        self.index_columns
            .iter()
            .filter_map(|column| column.name().map(str::to_string))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_kind_case_insensitively() {
        for kind in GeometryKind::ALL {
            assert_eq!(GeometryKind::parse(&kind.type_string()), Some(kind));
            assert_eq!(GeometryKind::parse(&kind.name().to_uppercase()), Some(kind));
        }
        assert_eq!(GeometryKind::parse("Polygon[float32]"), Some(GeometryKind::Polygon));
    }

    #[test]
    fn rejects_unknown_dtypes() {
        assert_eq!(GeometryKind::parse("object"), None);
        assert_eq!(GeometryKind::parse("point[string]"), None);
        assert_eq!(GeometryKind::parse("point[float64"), None);
        assert_eq!(GeometryKind::parse("geometry[float64]"), None);
    }

    #[test]
    fn geometry_columns_skip_unresolvable_dtypes() {
        let raw = r#"{
            "index_columns": ["idx", {"kind": "range", "name": null}],
            "columns": [
                {"name": "geom", "numpy_type": "multipolygon[float64]"},
                {"name": "weird", "numpy_type": "point[object]"},
                {"name": "v", "numpy_type": "int64"},
                {"name": null, "numpy_type": "line[float64]"}
            ],
            "pandas_version": "1.0"
        }"#;
        let meta = TabularMetadata::decode(Some(raw)).unwrap();
        let geometry = meta.geometry_columns();
        assert_eq!(geometry.len(), 1);
        assert_eq!(geometry["geom"], GeometryKind::MultiPolygon);
        assert_eq!(meta.index_column_names(), vec!["idx".to_string()]);
    }

    #[test]
    fn absent_metadata_is_empty() {
        assert_eq!(TabularMetadata::decode(None).unwrap(), TabularMetadata::default());
        assert!(matches!(
            TabularMetadata::decode(Some("{not json")),
            Err(Error::MetadataDecode { .. })
        ));
    }
}
