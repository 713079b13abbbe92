use std::{collections::BTreeMap, sync::Arc};

use arrow::array::RecordBatch;
use arrow_schema::{Schema, SchemaRef};

use crate::{
    Error, Result,
    geometry::{ColumnMetadata, GeometryKind, TabularMetadata},
};

/// Arrow schema plus the geometry interpretation of some of its columns.
#[derive(Clone, Debug, PartialEq)]
pub struct GeoSchema {
    schema: SchemaRef,
    geometry_columns: BTreeMap<String, GeometryKind>,
    geometry: Option<String>,
}

impl GeoSchema {
    /// Builds a schema, keeping only geometry declarations for columns that exist.
    ///
    /// The active geometry column defaults to the first geometry column in
    /// schema order.
    pub fn new(schema: SchemaRef, geometry_columns: BTreeMap<String, GeometryKind>) -> Self {
        let geometry_columns: BTreeMap<_, _> = geometry_columns
            .into_iter()
            .filter(|(name, _)| schema.column_with_name(name).is_some())
            .collect();
        let geometry = schema
            .fields()
            .iter()
            .map(|field| field.name())
            .find(|name| geometry_columns.contains_key(*name))
            .cloned();
        Self {
            schema,
            geometry_columns,
            geometry,
        }
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn geometry_columns(&self) -> &BTreeMap<String, GeometryKind> {
        &self.geometry_columns
    }

    /// Name of the active geometry column.
    pub fn geometry(&self) -> Option<&str> {
        self.geometry.as_deref()
    }

    /// Makes `column` the active geometry column.
    pub fn set_geometry(mut self, column: &str) -> Result<Self> {
        if !self.geometry_columns.contains_key(column) {
            return Err(Error::schema(format!(
                "column '{column}' is not a geometry column"
            )));
        }
        self.geometry = Some(column.to_string());
        Ok(self)
    }

    /// Restricts the schema to `columns`, in the given order.
    pub fn project(&self, columns: &[String]) -> Result<Self> {
        let indices = column_indices(&self.schema, columns)?;
        let schema = Arc::new(self.schema.project(&indices)?);
        let mut projected = Self::new(schema, self.geometry_columns.clone());
        if let Some(active) = self.geometry.as_deref() {
            if projected.geometry_columns.contains_key(active) {
                projected.geometry = Some(active.to_string());
            }
        }
        Ok(projected)
    }

    /// Tabular sidecar metadata describing this schema.
    pub fn tabular_metadata(&self) -> TabularMetadata {
        let columns = self
            .schema
            .fields()
            .iter()
            .map(|field| {
                let type_string = match self.geometry_columns.get(field.name()) {
                    Some(kind) => kind.type_string(),
                    None => field.data_type().to_string().to_lowercase(),
                };
                ColumnMetadata {
                    name: Some(field.name().clone()),
                    type_string: Some(type_string),
                }
            })
            .collect();
        TabularMetadata {
            index_columns: Vec::new(),
            columns,
        }
    }
}

/// An in-memory table whose geometry columns are known.
#[derive(Clone, Debug, PartialEq)]
pub struct GeoTable {
    batch: RecordBatch,
    schema: GeoSchema,
}

impl GeoTable {
    pub fn new(batch: RecordBatch, geometry_columns: BTreeMap<String, GeometryKind>) -> Result<Self> {
        for name in geometry_columns.keys() {
            if batch.schema().column_with_name(name).is_none() {
                return Err(Error::schema(format!(
                    "geometry column '{name}' not found in table"
                )));
            }
        }
        let schema = GeoSchema::new(batch.schema(), geometry_columns);
        Ok(Self { batch, schema })
    }

    /// A table without rows conforming to `schema`.
    pub fn empty(schema: &GeoSchema) -> Self {
        Self {
            batch: RecordBatch::new_empty(schema.schema().clone()),
            schema: schema.clone(),
        }
    }

    pub(crate) fn from_parts(batch: RecordBatch, schema: GeoSchema) -> Self {
        Self { batch, schema }
    }

    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn into_batch(self) -> RecordBatch {
        self.batch
    }

    pub fn geo_schema(&self) -> &GeoSchema {
        &self.schema
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn geometry(&self) -> Option<&str> {
        self.schema.geometry()
    }

    pub fn geometry_columns(&self) -> &BTreeMap<String, GeometryKind> {
        self.schema.geometry_columns()
    }

    pub fn set_geometry(mut self, column: &str) -> Result<Self> {
        self.schema = self.schema.set_geometry(column)?;
        Ok(self)
    }
}

pub(crate) fn column_indices(schema: &Schema, columns: &[String]) -> Result<Vec<usize>> {
    columns
        .iter()
        .map(|name| {
            schema
                .index_of(name)
                .map_err(|_| Error::schema(format!("column '{name}' not found in schema")))
        })
        .collect()
}

/// Copy of `schema` without schema-level metadata; field metadata is kept.
pub(crate) fn strip_metadata(schema: &Schema) -> SchemaRef {
    Arc::new(Schema::new(schema.fields().clone()))
}
