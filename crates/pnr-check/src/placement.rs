//! Placement legality: every instance placed, inside the boundary, clear of
//! obstructions and of every other instance.

use pnr_core::{DesignDatabase, Rect, Shape};

use crate::violation::{Violation, ViolationKind};

pub fn check_placement(db: &DesignDatabase) -> Vec<Violation> {
    let mut out = Vec::new();
    let boundary = db.boundary_rect();
    if boundary.is_none() {
        out.push(Violation::error(ViolationKind::OutOfBoundary, "design has no boundary"));
    }

    for inst in db.instances() {
        let Some(bbox) = inst.bbox() else {
            out.push(Violation::error(
                ViolationKind::Unplaced,
                format!("instance {} is not placed", inst.name),
            ));
            continue;
        };
        if boundary.is_some() && !db.boundary_contains(&Shape::Rect(bbox)) {
            out.push(
                Violation::error(
                    ViolationKind::OutOfBoundary,
                    format!("instance {} is outside the boundary", inst.name),
                )
                .at(bbox),
            );
        }
        // each pair once, from the lower id
        for other in db.instances_overlapping(&bbox) {
            if other <= inst.id {
                continue;
            }
            let Some(theirs) = db.instances()[other.index()].bbox() else {
                continue;
            };
            if !bbox.overlaps(&theirs) {
                continue;
            }
            if let Some(common) = bbox.intersection(&theirs) {
                out.push(
                    Violation::error(
                        ViolationKind::Overlap,
                        format!(
                            "instances {} and {} overlap",
                            inst.name,
                            db.instances()[other.index()].name
                        ),
                    )
                    .at(common),
                );
            }
        }
        for obs in db.obstructions_overlapping(&bbox) {
            out.push(
                Violation::error(
                    ViolationKind::ObstructionOverlap,
                    format!("instance {} overlaps obstruction {obs}", inst.name),
                )
                .at(bbox),
            );
        }
    }

    for port in db.ports() {
        match port.position {
            None => out.push(Violation::error(
                ViolationKind::Unplaced,
                format!("port {} is not placed", port.name),
            )),
            Some(p) if boundary.is_some_and(|b| !b.contains_point(&p)) => out.push(
                Violation::error(
                    ViolationKind::OutOfBoundary,
                    format!("port {} is outside the boundary", port.name),
                )
                .at(Rect::new(p.x, p.y, p.x, p.y)),
            ),
            Some(_) => {}
        }
    }

    log::info!("Placement check: {} violation(s)", out.len());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{design, placed};
    use pnr_core::{Orientation, Point};

    #[test]
    fn test_clean_placement_passes() {
        let db = placed(&[(20, 40), (50, 40)]);
        assert!(check_placement(&db).is_empty());
    }

    #[test]
    fn test_unplaced_instance_is_reported() {
        let mut db = design(2);
        let id = db.instance_by_name("u0").unwrap().id;
        db.place_fixed(id, Point::new(10, 10), Orientation::N).unwrap();

        let violations = check_placement(&db);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::Unplaced);
        assert!(violations[0].message.contains("u1"));
        assert!(violations[0].is_error());
    }

    #[test]
    fn test_missing_boundary_is_reported() {
        let tech = crate::testutil::tech();
        let db = DesignDatabase::new("empty", tech);
        let violations = check_placement(&db);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::OutOfBoundary);
    }
}
