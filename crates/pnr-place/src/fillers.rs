//! Filler cells.
//!
//! After placement every run of free sites in a row is covered with fixed
//! filler instances, widest filler first. A gap narrower than the smallest
//! filler stays empty.

use std::sync::Arc;

use pnr_core::{CellLibrary, CellMaster, Coord, DesignDatabase, Orientation, PnrError, Point, Rect, Result};

use crate::legalize::slot_is_free;
use crate::sites::SiteGrid;

/// Look up the filler masters named in `names`, widest first (ties by
/// name). Every name must be a placeable cell of `library`.
pub fn resolve_fillers(library: &CellLibrary, names: &[String]) -> Result<Vec<Arc<CellMaster>>> {
    let mut fillers = Vec::with_capacity(names.len());
    for name in names {
        let master = library
            .get(name)
            .filter(|m| m.is_placeable() && m.size().0 > 0)
            .ok_or_else(|| PnrError::UnknownCellReference(name.clone()))?;
        if !fillers.iter().any(|f: &Arc<CellMaster>| f.name == master.name) {
            fillers.push(Arc::clone(master));
        }
    }
    fillers.sort_by(|a, b| b.size().0.cmp(&a.size().0).then_with(|| a.name.cmp(&b.name)));
    Ok(fillers)
}

/// Fill the free sites of every row with `fillers`. Returns how many
/// filler instances were added.
pub fn insert_fillers(db: &mut DesignDatabase, grid: &SiteGrid, fillers: &[Arc<CellMaster>]) -> Result<usize> {
    if fillers.is_empty() {
        return Ok(0);
    }
    let mut serial = 0usize;
    let mut added = 0usize;
    for row in 0..grid.rows {
        let mut col = 0;
        while col < grid.cols {
            let start = col;
            while col < grid.cols && site_is_free(db, grid, col, row) {
                col += 1;
            }
            if col > start {
                let x0 = grid.slot(start, row).x;
                let gap = (col - start) * grid.site_width;
                added += fill_gap(db, grid, fillers, (x0, row), gap, &mut serial)?;
            }
            col += 1;
        }
    }
    if added > 0 {
        log::info!("Inserted {added} filler cells");
    }
    Ok(added)
}

fn site_is_free(db: &DesignDatabase, grid: &SiteGrid, col: Coord, row: Coord) -> bool {
    let rect = Rect::from_origin_size(grid.slot(col, row), grid.site_width, grid.row_height);
    slot_is_free(db, &rect, None)
}

/// Cover `width` starting at `x` in `row`, taking the widest filler that
/// still fits at each step.
fn fill_gap(
    db: &mut DesignDatabase,
    grid: &SiteGrid,
    fillers: &[Arc<CellMaster>],
    (mut x, row): (Coord, Coord),
    mut width: Coord,
    serial: &mut usize,
) -> Result<usize> {
    let y = grid.slot(0, row).y;
    let mut added = 0;
    while width > 0 {
        let fit = fillers.iter().find(|f| {
            let (w, h) = f.size();
            w <= width && slot_is_free(db, &Rect::new(x, y, x + w, y + h), None)
        });
        let Some(master) = fit else {
            log::debug!("Gap of {width} at ({x}, {y}) is narrower than every filler");
            break;
        };
        let name = loop {
            let name = format!("filler_{serial}");
            *serial += 1;
            if db.instance_by_name(&name).is_none() {
                break name;
            }
        };
        let id = db.create_instance(&name, Arc::clone(master))?;
        db.place_fixed(id, Point::new(x, y), Orientation::N)?;
        let w = master.size().0;
        x += w;
        width -= w;
        added += 1;
    }
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pnr_core::cell::CellGeometry;
    use pnr_core::technology::{LayerSpec, TechnologySpec};
    use pnr_core::{RoutingDirection, Shape, Technology};

    use crate::config::FloorplannerConfig;

    fn setup() -> (CellLibrary, DesignDatabase, SiteGrid) {
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
        lib.import_geometry(vec![
            ("INV".into(), CellGeometry::new(10, 10)),
            ("FILL1".into(), CellGeometry::new(10, 10)),
            ("FILL4".into(), CellGeometry::new(40, 10)),
            ("FILL2".into(), CellGeometry::new(20, 10)),
        ]);
        let mut db = DesignDatabase::new("top", Arc::clone(&tech));
        let boundary = Rect::new(0, 0, 100, 20);
        db.set_boundary(Shape::Rect(boundary)).unwrap();
        let grid = SiteGrid::new(&tech, &FloorplannerConfig::default(), boundary).unwrap();
        (lib, db, grid)
    }

    #[test]
    fn test_fillers_sorted_widest_first() {
        let (lib, _, _) = setup();
        let names = ["FILL1", "FILL4", "FILL2", "FILL1"].map(String::from);
        let fillers = resolve_fillers(&lib, &names).unwrap();
        let order: Vec<&str> = fillers.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(order, ["FILL4", "FILL2", "FILL1"]);
        let missing = resolve_fillers(&lib, &["FILL9".to_string()]).unwrap_err();
        assert!(matches!(missing, PnrError::UnknownCellReference(ref n) if n == "FILL9"));
    }

    #[test]
    fn test_gaps_are_covered_without_overlap() {
        let (lib, mut db, grid) = setup();
        let inv = db.create_instance("u0", Arc::clone(lib.get("INV").unwrap())).unwrap();
        db.place_fixed(inv, Point::new(30, 0), Orientation::N).unwrap();
        let fillers = resolve_fillers(&lib, &["FILL4", "FILL2", "FILL1"].map(String::from)).unwrap();

        // row 0: 30 left of u0 (FILL2 + FILL1), 60 right of it (FILL4 + FILL2)
        // row 1: 100 free (FILL4 + FILL4 + FILL2)
        assert_eq!(insert_fillers(&mut db, &grid, &fillers).unwrap(), 7);
        let row0: Vec<(Coord, &str)> = db
            .instances()
            .iter()
            .filter(|i| i.position.y == 0)
            .map(|i| (i.position.x, i.master.name.as_str()))
            .collect();
        assert_eq!(
            row0,
            [(30, "INV"), (0, "FILL2"), (20, "FILL1"), (40, "FILL4"), (80, "FILL2")]
        );
        let covered: Coord = db
            .instances()
            .iter()
            .filter_map(|i| i.bbox())
            .map(|b| b.width() * b.height())
            .sum();
        assert_eq!(covered, 100 * 20);

        // nothing left to fill
        assert_eq!(insert_fillers(&mut db, &grid, &fillers).unwrap(), 0);
    }

    #[test]
    fn test_gap_narrower_than_every_filler_stays_empty() {
        let (lib, mut db, grid) = setup();
        let fillers = resolve_fillers(&lib, &["FILL4".to_string()]).unwrap();
        // 100 wide rows take two FILL4 each and leave 20 uncovered
        assert_eq!(insert_fillers(&mut db, &grid, &fillers).unwrap(), 4);
        assert!(db.is_free(&Rect::new(80, 0, 100, 20), None));
        assert!(db.instances().iter().all(|i| i.is_fixed()));
    }
}
