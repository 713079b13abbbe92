//! Partition-level pruning by bounding box overlap.

use crate::{
    BoundingBox,
    bounds::{PartitionBounds, PartitionBoundsIndex, apply_mask},
    divisions::Division,
    lazy::LazyPartition,
};

/// Partitions together with everything indexed by partition position.
///
/// `bounds` and `divisions` (when present) always have one entry per
/// partition, in partition order.
#[derive(Clone, Debug)]
pub struct PartitionSet<T = LazyPartition> {
    pub partitions: Vec<T>,
    pub bounds: Option<PartitionBoundsIndex>,
    pub divisions: Option<Vec<Division>>,
}

impl<T: Clone> PartitionSet<T> {
    pub fn new(
        partitions: Vec<T>,
        bounds: Option<PartitionBoundsIndex>,
        divisions: Option<Vec<Division>>,
    ) -> Self {
        Self {
            partitions,
            bounds,
            divisions,
        }
    }

    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    /// Keeps the partitions whose mask entry is `true`, along with their
    /// bounds and divisions.
    pub fn filter(self, mask: &[bool]) -> Self {
        Self {
            partitions: apply_mask(&self.partitions, mask),
            bounds: self.bounds.map(|bounds| bounds.filter(mask)),
            divisions: self.divisions.map(|divisions| apply_mask(&divisions, mask)),
        }
    }
}

/// Keeps the partitions whose box for a geometry column overlaps a query box.
///
/// # Example
///
/// ```
/// use geoparcel::{BoundingBox, PartitionBounds, SpatialPartitionPruner};
///
/// let bounds = PartitionBounds::new(vec![
///     BoundingBox::new(0.0, 0.0, 1.0, 1.0),
///     BoundingBox::new(5.0, 5.0, 6.0, 6.0),
///     BoundingBox::new(10.0, 10.0, 11.0, 11.0),
/// ]);
/// let pruner = SpatialPartitionPruner::new(BoundingBox::new(4.0, 4.0, 7.0, 7.0));
/// assert_eq!(pruner.mask(&bounds), vec![false, true, false]);
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpatialPartitionPruner {
    query: BoundingBox,
}

impl SpatialPartitionPruner {
    pub fn new(query: BoundingBox) -> Self {
        let query = BoundingBox::new(query.x0, query.y0, query.x1, query.y1);
        Self { query }
    }

    pub fn query(&self) -> &BoundingBox {
        &self.query
    }

    pub fn mask(&self, bounds: &PartitionBounds) -> Vec<bool> {
        bounds.iter().map(|bbox| bbox.intersects(&self.query)).collect()
    }

    /// Prunes `set` using the bounds recorded for `column`.
    ///
    /// Without usable bounds for `column` the set is returned unchanged.
    pub fn prune<T: Clone>(&self, set: PartitionSet<T>, column: &str) -> PartitionSet<T> {
        let Some(bounds) = set.bounds.as_ref().and_then(|index| index.get(column)) else {
            tracing::warn!(column, "no partition bounds for column, skipping spatial pruning");
            return set;
        };
        if bounds.len() != set.len() {
            tracing::warn!(
                column,
                boxes = bounds.len(),
                partitions = set.len(),
                "partition bounds do not match partition count, skipping spatial pruning"
            );
            return set;
        }
        let mask = self.mask(bounds);
        let before = set.len();
        let pruned = set.filter(&mask);
        tracing::debug!(column, before, after = pruned.len(), "pruned partitions");
        pruned
    }
}
