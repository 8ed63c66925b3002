//! Multi-source A* over the routing grid.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use pnr_core::{Coord, NetId};

use crate::congestion::CongestionMap;
use crate::grid::{RoutingGrid, Step};

/// Step costs of one run, resolved from the router configuration.
#[derive(Debug, Clone, Copy)]
pub struct CostModel {
    pub wrong_way_cost: Coord,
    pub via_cost: Coord,
    pub congestion_weight: Coord,
    pub max_expansions: usize,
}

impl CostModel {
    fn step_cost(&self, step: Step, penalty: impl Fn(Coord) -> Coord) -> Coord {
        match step {
            Step::Planar { length, preferred } => {
                let base = if preferred { length } else { length * self.wrong_way_cost };
                base + penalty(length)
            }
            Step::Via => self.via_cost,
        }
    }
}

#[derive(Debug)]
pub enum SearchError {
    NoPath,
    BudgetExhausted,
}

/// Open-set entry ordered for a min-heap on `(f, node)`.
#[derive(Debug, PartialEq, Eq)]
struct Frontier {
    f: Coord,
    node: usize,
}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        // reversed for min-heap
        other.f.cmp(&self.f).then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Cheapest path for `net` from any of `sources` to `target`, as node
/// indices starting at a source and ending at `target`.
pub fn find_path(
    grid: &RoutingGrid,
    congestion: &CongestionMap,
    costs: &CostModel,
    net: NetId,
    sources: &[usize],
    target: usize,
) -> Result<Vec<usize>, SearchError> {
    let goal = grid.point(target);
    let heuristic = |node: usize| grid.point(node).manhattan_distance(&goal);

    let mut open = BinaryHeap::new();
    let mut best: HashMap<usize, (Coord, Option<usize>)> = HashMap::new();
    for &s in sources {
        best.insert(s, (0, None));
        open.push(Frontier { f: heuristic(s), node: s });
    }

    let mut expansions = 0usize;
    while let Some(Frontier { f, node }) = open.pop() {
        let g = best.get(&node).map_or(0, |(g, _)| *g);
        if f > g + heuristic(node) {
            continue; // stale entry
        }
        if node == target {
            return Ok(reconstruct(&best, target));
        }
        expansions += 1;
        if costs.max_expansions > 0 && expansions > costs.max_expansions {
            return Err(SearchError::BudgetExhausted);
        }

        for (next, step) in grid.neighbors(node, net) {
            let gcell = congestion.gcell_of(grid, next);
            let cost = g + costs.step_cost(step, |pitch| {
                congestion.penalty(gcell, pitch, costs.congestion_weight)
            });
            if best.get(&next).map_or(true, |(b, _)| cost < *b) {
                best.insert(next, (cost, Some(node)));
                open.push(Frontier { f: cost + heuristic(next), node: next });
            }
        }
    }
    Err(SearchError::NoPath)
}

fn reconstruct(best: &HashMap<usize, (Coord, Option<usize>)>, end: usize) -> Vec<usize> {
    let mut path = vec![end];
    let mut current = end;
    while let Some((_, Some(prev))) = best.get(&current) {
        path.push(*prev);
        current = *prev;
    }
    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use pnr_core::technology::{LayerSpec, TechnologySpec};
    use pnr_core::{DesignDatabase, Rect, RoutingDirection, Shape, Technology};

    const COSTS: CostModel = CostModel {
        wrong_way_cost: 3,
        via_cost: 20,
        congestion_weight: 0,
        max_expansions: 0,
    };

    fn empty() -> DesignDatabase {
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
        db.set_boundary(Shape::Rect(Rect::new(0, 0, 100, 100))).unwrap();
        db
    }

    #[test]
    fn test_straight_run_on_preferred_layer() {
        let db = empty();
        let grid = RoutingGrid::build(&db).unwrap();
        let map = CongestionMap::new(&grid, 4);
        let net = NetId::from_raw(0);
        let path = find_path(&grid, &map, &COSTS, net, &[grid.node(0, 1, 2)], grid.node(0, 6, 2)).unwrap();
        assert_eq!(path.len(), 6);
        assert_eq!(path[0], grid.node(0, 1, 2));
        assert!(path.iter().all(|&n| grid.coords(n).0 == 0 && grid.coords(n).2 == 2));
    }

    #[test]
    fn test_turn_uses_the_other_layer() {
        let db = empty();
        let grid = RoutingGrid::build(&db).unwrap();
        let map = CongestionMap::new(&grid, 4);
        let net = NetId::from_raw(0);
        // an L on M1 would need 50 wrong-way units (cost 150); two vias cost 40
        let path = find_path(&grid, &map, &COSTS, net, &[grid.node(0, 0, 0)], grid.node(0, 5, 5)).unwrap();
        let layers: Vec<usize> = path.iter().map(|&n| grid.coords(n).0).collect();
        assert!(layers.contains(&1));
        assert_eq!(*layers.last().unwrap(), 0);
    }

    #[test]
    fn test_wall_without_gap_has_no_path() {
        let mut db = empty();
        db.add_obstruction(None, Shape::Rect(Rect::new(40, 0, 60, 100))).unwrap();
        let grid = RoutingGrid::build(&db).unwrap();
        let map = CongestionMap::new(&grid, 4);
        let net = NetId::from_raw(0);
        let result = find_path(&grid, &map, &COSTS, net, &[grid.node(0, 0, 0)], grid.node(0, 9, 0));
        assert!(matches!(result, Err(SearchError::NoPath)));

        let tight = CostModel { max_expansions: 3, ..COSTS };
        let open = RoutingGrid::build(&empty()).unwrap();
        let map = CongestionMap::new(&open, 4);
        let result = find_path(&open, &map, &tight, net, &[open.node(0, 0, 0)], open.node(0, 9, 9));
        assert!(matches!(result, Err(SearchError::BudgetExhausted)));
    }

    #[test]
    fn test_search_from_many_sources_picks_nearest() {
        let db = empty();
        let grid = RoutingGrid::build(&db).unwrap();
        let map = CongestionMap::new(&grid, 4);
        let net = NetId::from_raw(0);
        let sources = [grid.node(0, 0, 4), grid.node(0, 7, 4)];
        let path = find_path(&grid, &map, &COSTS, net, &sources, grid.node(0, 9, 4)).unwrap();
        assert_eq!(path[0], grid.node(0, 7, 4));
        assert_eq!(path.len(), 3);
    }
}
