//! Coarse congestion map.
//!
//! The grid is tiled into square gcells of `gcell_size` grid lines per
//! side (tracks and pin access lines alike), shared by all layers. Capacity is the number of usable nodes in a
//! gcell; usage counts the nodes claimed by committed routes.

use pnr_core::Coord;

use crate::grid::{Owner, RoutingGrid};

#[derive(Debug, Clone)]
pub struct CongestionMap {
    size: usize,
    cols: usize,
    usage: Vec<u32>,
    capacity: Vec<u32>,
}

impl CongestionMap {
    pub fn new(grid: &RoutingGrid, gcell_size: usize) -> Self {
        let size = gcell_size.max(1);
        let cols = grid.columns().div_ceil(size);
        let rows = grid.rows().div_ceil(size);
        let mut map = Self {
            size,
            cols,
            usage: vec![0; cols * rows],
            capacity: vec![0; cols * rows],
        };
        for node in 0..grid.node_count() {
            let g = map.gcell_of(grid, node);
            match grid.owner(node) {
                Owner::Blocked => {}
                // pre-routed and pin nodes are already spent
                Owner::Net(_) => {
                    map.capacity[g] += 1;
                    map.usage[g] += 1;
                }
                Owner::Free => map.capacity[g] += 1,
            }
        }
        map
    }

    pub fn gcell_of(&self, grid: &RoutingGrid, node: usize) -> usize {
        let (_, c, r) = grid.coords(node);
        (r / self.size) * self.cols + c / self.size
    }

    pub fn usage(&self, gcell: usize) -> u32 {
        self.usage[gcell]
    }

    /// Extra cost of entering `gcell` with a step of `pitch`.
    pub fn penalty(&self, gcell: usize, pitch: Coord, weight: Coord) -> Coord {
        let capacity = Coord::from(self.capacity[gcell].max(1));
        pitch * weight * Coord::from(self.usage[gcell]) / capacity
    }

    pub fn add(&mut self, gcell: usize) {
        self.usage[gcell] += 1;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use pnr_core::technology::{LayerSpec, TechnologySpec};
    use pnr_core::{DesignDatabase, Rect, RoutingDirection, Shape, Technology};

    fn grid() -> RoutingGrid {
        let tech = Arc::new(
            Technology::load(&TechnologySpec {
                layers: vec![
                    LayerSpec::routing("M1", RoutingDirection::Horizontal, 10, 4),
                    LayerSpec::routing("M2", RoutingDirection::Vertical, 10, 4),
                ],
                ..Default::default()
            })
            .unwrap(),
        );
        let mut db = DesignDatabase::new("top", tech);
        db.set_boundary(Shape::Rect(Rect::new(0, 0, 60, 60))).unwrap();
        RoutingGrid::build(&db).unwrap()
    }

    #[test]
    fn test_gcells_tile_the_grid() {
        let grid = grid();
        let map = CongestionMap::new(&grid, 4);
        // 6 x 6 tracks in 4-track gcells: 2 x 2
        assert_eq!(map.gcell_of(&grid, grid.node(0, 0, 0)), 0);
        assert_eq!(map.gcell_of(&grid, grid.node(1, 5, 0)), 1);
        assert_eq!(map.gcell_of(&grid, grid.node(0, 3, 4)), 2);
        assert_eq!(map.gcell_of(&grid, grid.node(1, 5, 5)), 3);
    }

    #[test]
    fn test_penalty_grows_with_usage() {
        let grid = grid();
        let mut map = CongestionMap::new(&grid, 4);
        // 4 x 4 tracks x 2 layers
        assert_eq!(map.penalty(0, 10, 2), 0);
        for _ in 0..16 {
            map.add(0);
        }
        assert_eq!(map.usage(0), 16);
        assert_eq!(map.penalty(0, 10, 2), 10);
        assert_eq!(map.penalty(3, 10, 2), 0);
    }
}
