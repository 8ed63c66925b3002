//! Legalization: nearest free slot by expanding-ring search.

use rayon::prelude::*;

use pnr_core::{Coord, DesignDatabase, InstanceId, Orientation, PnrError, Point, Rect};

use crate::sites::SiteGrid;

/// Ordering key of a candidate position: displacement from the target,
/// then squared distance of the footprint centre from the boundary centre.
pub(crate) type SlotCost = (Coord, i128);

/// Is the footprint legal: free in the database and clear of port pins.
pub(crate) fn slot_is_free(db: &DesignDatabase, rect: &Rect, id: Option<InstanceId>) -> bool {
    let on_port = db
        .ports()
        .iter()
        .filter_map(|p| p.position)
        .any(|p| rect.contains_point(&p));
    !on_port && db.is_free(rect, id)
}

/// Place each `(instance, target centre)` in order at the nearest legal
/// slot. Instances that find no slot within `max_probes` candidates are
/// left unplaced and reported as `PlacementInfeasible`.
pub fn legalize(
    db: &mut DesignDatabase,
    grid: &SiteGrid,
    targets: &[(InstanceId, Point)],
    max_probes: usize,
) -> (usize, Vec<PnrError>) {
    let mut placed = 0;
    let mut failures = Vec::new();

    for &(id, centre) in targets {
        let Ok(inst) = db.instance(id) else {
            failures.push(PnrError::UnknownInstance(id));
            continue;
        };
        let (w, h) = Orientation::N.placed_size(inst.master.size().0, inst.master.size().1);
        let want = Point::new(centre.x - w / 2, centre.y - h / 2);
        let (col, row) = grid.nearest(want);

        match nearest_free(db, grid, id, want, (col, row), (w, h), max_probes) {
            Some(pos) => match db.set_position(id, pos, Orientation::N) {
                Ok(()) => placed += 1,
                Err(e) => {
                    log::error!("Legalization of {id} failed: {e}");
                    failures.push(e);
                }
            },
            None => {
                log::error!(
                    "No legal slot for {} within {max_probes} probes",
                    db.instance(id).map(|i| i.name.as_str()).unwrap_or("?")
                );
                failures.push(PnrError::PlacementInfeasible(id));
            }
        }
    }
    log::info!("Legalized {placed} instances, {} infeasible", failures.len());
    (placed, failures)
}

fn nearest_free(
    db: &DesignDatabase,
    grid: &SiteGrid,
    id: InstanceId,
    want: Point,
    (col, row): (Coord, Coord),
    (w, h): (Coord, Coord),
    max_probes: usize,
) -> Option<Point> {
    let mut probes = 0usize;
    for radius in 0..=grid.max_radius(col, row) {
        if probes >= max_probes {
            break;
        }
        let mut ring = grid.ring(col, row, radius);
        ring.truncate(max_probes - probes);
        probes += ring.len();

        let best = ring
            .par_iter()
            .enumerate()
            .filter_map(|(order, &(c, r))| {
                let pos = grid.slot(c, r);
                let rect = Rect::from_origin_size(pos, w, h);
                slot_is_free(db, &rect, Some(id)).then(|| {
                    let cost: SlotCost = (
                        pos.manhattan_distance(&want),
                        rect.center().distance_squared(&grid.center),
                    );
                    (cost, order, pos)
                })
            })
            .min_by_key(|(cost, order, _)| (*cost, *order));
        if let Some((_, _, pos)) = best {
            return Some(pos);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::FloorplannerConfig;
    use pnr_core::cell::CellGeometry;
    use pnr_core::technology::{LayerSpec, TechnologySpec};
    use pnr_core::{CellLibrary, RoutingDirection, Shape, Technology};

    fn setup(instances: usize) -> (DesignDatabase, SiteGrid, Vec<InstanceId>) {
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
        let mut lib = CellLibrary::new();
        lib.import_geometry(vec![("BUF".into(), CellGeometry::new(10, 10))]);
        let mut db = DesignDatabase::new("top", Arc::clone(&tech));
        db.set_boundary(Shape::Rect(Rect::new(0, 0, 50, 50))).unwrap();
        let ids = (0..instances)
            .map(|i| {
                db.create_instance(&format!("u{i}"), Arc::clone(lib.get("BUF").unwrap()))
                    .unwrap()
            })
            .collect();
        let grid = SiteGrid::new(&tech, &FloorplannerConfig::default(), Rect::new(0, 0, 50, 50)).unwrap();
        (db, grid, ids)
    }

    #[test]
    fn test_stacked_targets_spread_without_overlap() {
        let (mut db, grid, ids) = setup(5);
        let targets: Vec<_> = ids.iter().map(|&id| (id, Point::new(25, 25))).collect();
        let (placed, failures) = legalize(&mut db, &grid, &targets, 1000);
        assert_eq!(placed, 5);
        assert!(failures.is_empty());
        // first instance takes the exact target slot
        assert_eq!(db.instance(ids[0]).unwrap().position, Point::new(20, 20));
        let boxes: Vec<Rect> = db.instances().iter().filter_map(|i| i.bbox()).collect();
        for (i, a) in boxes.iter().enumerate() {
            for b in &boxes[i + 1..] {
                assert!(!a.overlaps(b));
            }
        }
    }

    #[test]
    fn test_full_obstruction_is_infeasible() {
        let (mut db, grid, ids) = setup(2);
        db.add_obstruction(None, Shape::Rect(Rect::new(0, 0, 50, 50))).unwrap();
        let targets: Vec<_> = ids.iter().map(|&id| (id, Point::new(25, 25))).collect();
        let (placed, failures) = legalize(&mut db, &grid, &targets, 1000);
        assert_eq!(placed, 0);
        assert!(matches!(failures[0], PnrError::PlacementInfeasible(id) if id == ids[0]));
        assert!(matches!(failures[1], PnrError::PlacementInfeasible(id) if id == ids[1]));
        assert!(db.instances().iter().all(|i| !i.is_placed()));
    }

    #[test]
    fn test_probe_budget_bounds_the_search() {
        let (mut db, grid, ids) = setup(1);
        db.add_obstruction(None, Shape::Rect(Rect::new(0, 0, 40, 50))).unwrap();
        // the only free column is four rings away from the lower-left target
        let (placed, _) = legalize(&mut db, &grid, &[(ids[0], Point::new(5, 5))], 3);
        assert_eq!(placed, 0);
        let (placed, _) = legalize(&mut db, &grid, &[(ids[0], Point::new(5, 5))], 100);
        assert_eq!(placed, 1);
        assert_eq!(db.instance(ids[0]).unwrap().position.x, 40);
    }
}
