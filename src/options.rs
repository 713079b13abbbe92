use parquet::basic::Compression;

use crate::{BoundingBox, storage::CacheGeneration};

/// Options for opening a partitioned dataset.
#[derive(Clone, Debug, Default)]
pub struct ReadOptions {
    columns: Option<Vec<String>>,
    load_divisions: bool,
    geometry: Option<String>,
    bbox: Option<BoundingBox>,
    cache_generation: CacheGeneration,
}

impl ReadOptions {
    /// Create a new builder for ReadOptions
    ///
    /// # Example
    /// ```
    /// use geoparcel::{BoundingBox, ReadOptions};
    ///
    /// let options = ReadOptions::builder()
    ///     .columns(["id", "geom"])
    ///     .bbox(BoundingBox::new(0.0, 0.0, 10.0, 10.0))
    ///     .load_divisions(true)
    ///     .build();
    /// assert!(options.load_divisions());
    /// ```
    pub fn builder() -> ReadOptionsBuilder {
        ReadOptionsBuilder::default()
    }

    pub fn columns(&self) -> Option<&[String]> {
        self.columns.as_deref()
    }

    pub fn load_divisions(&self) -> bool {
        self.load_divisions
    }

    pub fn geometry(&self) -> Option<&str> {
        self.geometry.as_deref()
    }

    pub fn bbox(&self) -> Option<&BoundingBox> {
        self.bbox.as_ref()
    }

    pub fn cache_generation(&self) -> CacheGeneration {
        self.cache_generation
    }
}

/// Builder for ReadOptions
#[derive(Clone, Debug, Default)]
pub struct ReadOptionsBuilder {
    columns: Option<Vec<String>>,
    load_divisions: Option<bool>,
    geometry: Option<String>,
    bbox: Option<BoundingBox>,
    cache_generation: Option<CacheGeneration>,
}

impl ReadOptionsBuilder {
    /// Columns to read (default: all)
    ///
    /// Index columns recorded in the tabular metadata are added in front.
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Load and validate `hilbert_distance` divisions (default: false)
    pub fn load_divisions(mut self, value: bool) -> Self {
        self.load_divisions = Some(value);
        self
    }

    /// Active geometry column (default: first geometry column)
    ///
    /// Also the column whose bounds are used for `bbox` pruning.
    pub fn geometry(mut self, column: impl Into<String>) -> Self {
        self.geometry = Some(column.into());
        self
    }

    /// Only keep partitions whose bounds overlap this box (default: keep all)
    pub fn bbox(mut self, bbox: BoundingBox) -> Self {
        self.bbox = Some(bbox);
        self
    }

    /// Generation of directory listings to accept (default: 0)
    ///
    /// Bump it to see files written since the last listing of a directory.
    pub fn cache_generation(mut self, generation: CacheGeneration) -> Self {
        self.cache_generation = Some(generation);
        self
    }

    /// Build the ReadOptions
    pub fn build(self) -> ReadOptions {
        ReadOptions {
            columns: self.columns,
            load_divisions: self.load_divisions.unwrap_or(false),
            geometry: self.geometry,
            bbox: self.bbox,
            cache_generation: self.cache_generation.unwrap_or_default(),
        }
    }
}

/// Options for writing tables and datasets.
#[derive(Clone, Debug)]
pub struct WriteOptions {
    compression: Compression,
}

impl WriteOptions {
    pub fn builder() -> WriteOptionsBuilder {
        WriteOptionsBuilder::default()
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            compression: Compression::SNAPPY,
        }
    }
}

/// Builder for WriteOptions
#[derive(Clone, Debug, Default)]
pub struct WriteOptionsBuilder {
    compression: Option<Compression>,
}

impl WriteOptionsBuilder {
    /// Column compression codec (default: snappy)
    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = Some(compression);
        self
    }

    /// Build the WriteOptions
    pub fn build(self) -> WriteOptions {
        WriteOptions {
            compression: self.compression.unwrap_or(Compression::SNAPPY),
        }
    }
}
