use std::collections::BTreeMap;

use crate::{
    BoundingBox, Error, GeoTable, Result,
    bbox::envelope,
    metadata::{FooterMetadata, SPATIAL_METADATA_KEY, SpatialMetadata},
};

/// Bounding boxes of one geometry column, indexed by partition position.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PartitionBounds {
    boxes: Vec<BoundingBox>,
}

impl PartitionBounds {
    pub fn new(boxes: Vec<BoundingBox>) -> Self {
        Self { boxes }
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn get(&self, partition: usize) -> Option<&BoundingBox> {
        self.boxes.get(partition)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BoundingBox> {
        self.boxes.iter()
    }

    pub fn as_slice(&self) -> &[BoundingBox] {
        &self.boxes
    }

    /// Envelope of every partition.
    pub fn total(&self) -> BoundingBox {
        self.boxes
            .iter()
            .fold(BoundingBox::empty(), |acc, bbox| acc.union(bbox))
    }

    /// Keeps the boxes whose mask entry is `true`, renumbered densely.
    pub fn filter(&self, mask: &[bool]) -> Self {
        Self {
            boxes: apply_mask(&self.boxes, mask),
        }
    }

    fn from_labelled(column: &str, labelled: &BTreeMap<String, BoundingBox>) -> Result<Self> {
        let mut entries = labelled
            .iter()
            .map(|(label, bbox)| {
                let partition = label.trim().parse::<i64>().map_err(|_| {
                    Error::metadata_decode(format!(
                        "column '{column}' has non-integer partition label '{label}'"
                    ))
                })?;
                Ok((partition, *bbox))
            })
            .collect::<Result<Vec<_>>>()?;
        entries.sort_by_key(|(partition, _)| *partition);
        Ok(Self {
            boxes: entries.into_iter().map(|(_, bbox)| bbox).collect(),
        })
    }

    fn to_labelled(&self) -> BTreeMap<String, BoundingBox> {
        self.boxes
            .iter()
            .enumerate()
            .map(|(partition, bbox)| (partition.to_string(), *bbox))
            .collect()
    }
}

impl FromIterator<BoundingBox> for PartitionBounds {
    fn from_iter<T: IntoIterator<Item = BoundingBox>>(iter: T) -> Self {
        Self {
            boxes: iter.into_iter().collect(),
        }
    }
}

/// Per-column partition bounds of a dataset.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PartitionBoundsIndex {
    columns: BTreeMap<String, PartitionBounds>,
}

impl PartitionBoundsIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Computes bounds for `geometry_columns` directly from in-memory partitions.
    pub fn compute<'a>(
        partitions: impl IntoIterator<Item = &'a GeoTable>,
        geometry_columns: &[String],
    ) -> Result<Self> {
        let mut columns: BTreeMap<String, Vec<BoundingBox>> = geometry_columns
            .iter()
            .map(|column| (column.clone(), Vec::new()))
            .collect();
        for partition in partitions {
            for (column, boxes) in columns.iter_mut() {
                boxes.push(partition_envelope(partition, column)?);
            }
        }
        Ok(Self {
            columns: columns
                .into_iter()
                .map(|(column, boxes)| (column, PartitionBounds::new(boxes)))
                .collect(),
        })
    }

    /// Reads bounds from a footer.
    ///
    /// `None` means the footer has no spatial index at all; an empty index
    /// means one was written but recorded no geometry columns. Partition labels
    /// are parsed as integers and reindexed densely in ascending order.
    pub fn load(footer: &FooterMetadata) -> Result<Option<Self>> {
        let Some(raw) = footer.spatial_blob() else {
            return Ok(None);
        };
        let metadata = SpatialMetadata::decode(Some(raw))?;
        Self::from_metadata(&metadata).map(Some)
    }

    pub fn from_metadata(metadata: &SpatialMetadata) -> Result<Self> {
        let columns = metadata
            .partition_bounds
            .iter()
            .map(|(column, labelled)| {
                Ok((column.clone(), PartitionBounds::from_labelled(column, labelled)?))
            })
            .collect::<Result<_>>()?;
        Ok(Self { columns })
    }

    pub fn to_metadata(&self) -> SpatialMetadata {
        SpatialMetadata::new(
            self.columns
                .iter()
                .map(|(column, bounds)| (column.clone(), bounds.to_labelled()))
                .collect(),
        )
    }

    /// Footer with the spatial key added or replaced; other keys are untouched.
    pub fn persist(&self, existing: &FooterMetadata) -> Result<FooterMetadata> {
        let mut merged = existing.clone();
        merged.insert(SPATIAL_METADATA_KEY, self.to_metadata().encode()?);
        Ok(merged)
    }

    pub fn get(&self, column: &str) -> Option<&PartitionBounds> {
        self.columns.get(column)
    }

    pub fn insert(&mut self, column: impl Into<String>, bounds: PartitionBounds) {
        self.columns.insert(column.into(), bounds);
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PartitionBounds)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Applies `mask` to every column.
    pub fn filter(&self, mask: &[bool]) -> Self {
        Self {
            columns: self
                .columns
                .iter()
                .map(|(column, bounds)| (column.clone(), bounds.filter(mask)))
                .collect(),
        }
    }

    /// Concatenates the indexes of several dataset roots in root order.
    ///
    /// Returns `None` unless every root has a spatial index. A column is kept
    /// only if every root records it with one box per piece of that root.
    pub fn concat(roots: Vec<(Option<Self>, usize)>) -> Option<Self> {
        let mut indexes = Vec::with_capacity(roots.len());
        for (index, pieces) in roots {
            indexes.push((index?, pieces));
        }
        let (first, _) = indexes.first()?;
        let mut columns = BTreeMap::new();
        'columns: for column in first.columns.keys() {
            let mut boxes = Vec::new();
            for (index, pieces) in &indexes {
                match index.columns.get(column) {
                    Some(bounds) if bounds.len() == *pieces => {
                        boxes.extend_from_slice(bounds.as_slice());
                    }
                    Some(bounds) => {
                        tracing::warn!(
                            column = column.as_str(),
                            boxes = bounds.len(),
                            pieces,
                            "partition bounds do not match piece count, ignoring column"
                        );
                        continue 'columns;
                    }
                    None => continue 'columns,
                }
            }
            columns.insert(column.clone(), PartitionBounds::new(boxes));
        }
        Some(Self { columns })
    }
}

/// Envelope of one geometry column of one partition.
pub fn partition_envelope(partition: &GeoTable, column: &str) -> Result<BoundingBox> {
    let array = partition
        .batch()
        .column_by_name(column)
        .ok_or_else(|| Error::schema(format!("geometry column '{column}' not found")))?;
    envelope(array.as_ref())
}

pub(crate) fn apply_mask<T: Clone>(items: &[T], mask: &[bool]) -> Vec<T> {
    items
        .iter()
        .zip(mask)
        .filter(|(_, keep)| **keep)
        .map(|(item, _)| item.clone())
        .collect()
}
