use rstar::{RTree, RTreeObject, AABB};

use crate::geometry::{Point, Rect};
use crate::ids::ShapeId;

/// An entry in the R-tree, referencing an arena slot by its stable id.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialEntry {
    pub shape: ShapeId,
    pub rect: Rect,
}

impl RTreeObject for SpatialEntry {
    type Envelope = AABB<[i64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            [self.rect.min.x, self.rect.min.y],
            [self.rect.max.x, self.rect.max.y],
        )
    }
}

#[derive(Debug, Clone)]
struct Slot<T> {
    rect: Rect,
    payload: T,
}

/// Arena of rectangles addressed by stable integer ids, backed by an R-tree
/// for sub-linear overlap queries.
///
/// Ids are never reused after removal, so they stay valid as references
/// across moves and can be shared read-only between worker threads.
#[derive(Debug, Clone)]
pub struct SpatialIndex<T> {
    slots: Vec<Option<Slot<T>>>,
    tree: RTree<SpatialEntry>,
}

impl<T> SpatialIndex<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            tree: RTree::new(),
        }
    }

    /// Build the index in one go from a list of shapes.
    pub fn build(shapes: Vec<(Rect, T)>) -> Self {
        let mut slots = Vec::with_capacity(shapes.len());
        let mut entries = Vec::with_capacity(shapes.len());
        for (idx, (rect, payload)) in shapes.into_iter().enumerate() {
            let shape = ShapeId::from_index(idx);
            entries.push(SpatialEntry { shape, rect });
            slots.push(Some(Slot { rect, payload }));
        }
        Self {
            slots,
            tree: RTree::bulk_load(entries),
        }
    }

    pub fn insert(&mut self, rect: Rect, payload: T) -> ShapeId {
        let shape = ShapeId::from_index(self.slots.len());
        self.slots.push(Some(Slot { rect, payload }));
        self.tree.insert(SpatialEntry { shape, rect });
        shape
    }

    pub fn remove(&mut self, shape: ShapeId) -> Option<(Rect, T)> {
        let slot = self.slots.get_mut(shape.index())?.take()?;
        self.tree.remove(&SpatialEntry {
            shape,
            rect: slot.rect,
        });
        Some((slot.rect, slot.payload))
    }

    /// Move a shape to a new rectangle, keeping its id.
    pub fn update(&mut self, shape: ShapeId, rect: Rect) -> bool {
        let Some(Some(slot)) = self.slots.get_mut(shape.index()) else {
            return false;
        };
        let old = slot.rect;
        slot.rect = rect;
        self.tree.remove(&SpatialEntry { shape, rect: old });
        self.tree.insert(SpatialEntry { shape, rect });
        true
    }

    pub fn get(&self, shape: ShapeId) -> Option<(&Rect, &T)> {
        self.slots
            .get(shape.index())?
            .as_ref()
            .map(|s| (&s.rect, &s.payload))
    }

    /// All shapes whose interior overlaps `rect`, in ascending id order.
    pub fn query_overlapping(&self, rect: &Rect) -> Vec<ShapeId> {
        let mut hits: Vec<ShapeId> = self
            .tree
            .locate_in_envelope_intersecting(&envelope(rect))
            .filter(|e| e.rect.overlaps(rect))
            .map(|e| e.shape)
            .collect();
        hits.sort();
        hits
    }

    /// All shapes touching `rect` (closed test), in ascending id order.
    pub fn query_intersecting(&self, rect: &Rect) -> Vec<ShapeId> {
        let mut hits: Vec<ShapeId> = self
            .tree
            .locate_in_envelope_intersecting(&envelope(rect))
            .map(|e| e.shape)
            .collect();
        hits.sort();
        hits
    }

    /// All shapes containing the point, in ascending id order.
    pub fn query_point(&self, point: &Point) -> Vec<ShapeId> {
        let mut hits: Vec<ShapeId> = self
            .tree
            .locate_in_envelope_intersecting(&AABB::from_point([point.x, point.y]))
            .map(|e| e.shape)
            .collect();
        hits.sort();
        hits
    }

    /// Early-exit overlap test with a payload filter.
    pub fn any_overlapping<F>(&self, rect: &Rect, mut filter: F) -> bool
    where
        F: FnMut(ShapeId, &T) -> bool,
    {
        self.tree
            .locate_in_envelope_intersecting(&envelope(rect))
            .filter(|e| e.rect.overlaps(rect))
            .any(|e| match self.get(e.shape) {
                Some((_, payload)) => filter(e.shape, payload),
                None => false,
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = (ShapeId, &Rect, &T)> {
        self.slots.iter().enumerate().filter_map(|(idx, slot)| {
            slot.as_ref()
                .map(|s| (ShapeId::from_index(idx), &s.rect, &s.payload))
        })
    }

    /// Number of live shapes in the index.
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

impl<T> Default for SpatialIndex<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn envelope(rect: &Rect) -> AABB<[i64; 2]> {
    AABB::from_corners([rect.min.x, rect.min.y], [rect.max.x, rect.max.y])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SpatialIndex<&'static str> {
        SpatialIndex::build(vec![
            (Rect::new(0, 0, 10, 10), "a"),
            (Rect::new(20, 20, 30, 30), "b"),
            (Rect::new(10, 0, 20, 10), "c"),
        ])
    }

    #[test]
    fn test_spatial_query() {
        let index = sample();

        let results = index.query_point(&Point::new(5, 5));
        assert_eq!(results, vec![ShapeId::from_raw(0)]);

        let results = index.query_point(&Point::new(25, 25));
        assert_eq!(results, vec![ShapeId::from_raw(1)]);

        // Viewport query touching a and c
        let viewport = Rect::new(-5, -5, 15, 15);
        let results = index.query_overlapping(&viewport);
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_abutment_is_not_overlap() {
        let index = sample();
        // a and c share the edge x = 10
        let hits = index.query_overlapping(&Rect::new(0, 0, 10, 10));
        assert_eq!(hits, vec![ShapeId::from_raw(0)]);
        let touching = index.query_intersecting(&Rect::new(0, 0, 10, 10));
        assert_eq!(touching, vec![ShapeId::from_raw(0), ShapeId::from_raw(2)]);
    }

    #[test]
    fn test_update_and_remove_keep_ids_stable() {
        let mut index = sample();
        let b = ShapeId::from_raw(1);
        assert!(index.update(b, Rect::new(50, 50, 60, 60)));
        assert!(index.query_point(&Point::new(25, 25)).is_empty());
        assert_eq!(index.query_point(&Point::new(55, 55)), vec![b]);

        let (rect, payload) = index.remove(ShapeId::from_raw(0)).unwrap();
        assert_eq!(rect, Rect::new(0, 0, 10, 10));
        assert_eq!(payload, "a");
        assert_eq!(index.len(), 2);

        let d = index.insert(Rect::new(0, 0, 5, 5), "d");
        assert_eq!(d, ShapeId::from_raw(3));
        assert!(index.get(ShapeId::from_raw(0)).is_none());
    }

    #[test]
    fn test_any_overlapping_with_filter() {
        let index = sample();
        let probe = Rect::new(5, 5, 15, 8);
        assert!(index.any_overlapping(&probe, |_, p| *p == "c"));
        assert!(!index.any_overlapping(&probe, |_, p| *p == "b"));
    }
}
