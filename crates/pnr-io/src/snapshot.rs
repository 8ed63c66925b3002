//! JSON design snapshots.
//!
//! Output is pretty-printed with a trailing newline. Element order follows
//! database ids, so two identical designs serialise to identical bytes.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use pnr_core::database::DesignSnapshot;
use pnr_core::{CellLibrary, DesignDatabase, Result, Technology};

pub fn to_json(snapshot: &DesignSnapshot) -> Result<String> {
    let mut json = serde_json::to_string_pretty(snapshot)?;
    json.push('\n');
    Ok(json)
}

pub fn from_json(json: &str) -> Result<DesignSnapshot> {
    Ok(serde_json::from_str(json)?)
}

pub fn write_snapshot(db: &DesignDatabase, path: &Path) -> Result<()> {
    let json = to_json(&db.snapshot())?;
    fs::write(path, json)?;
    log::info!("Wrote snapshot of '{}' to {}", db.name, path.display());
    Ok(())
}

pub fn read_snapshot(path: &Path) -> Result<DesignSnapshot> {
    let json = fs::read_to_string(path)?;
    from_json(&json)
}

/// Read a snapshot file and rebuild the database against a technology and
/// library.
pub fn load_design(path: &Path, tech: Arc<Technology>, library: &CellLibrary) -> Result<DesignDatabase> {
    let snapshot = read_snapshot(path)?;
    DesignDatabase::from_snapshot(tech, library, &snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pnr_core::geometry::{Rect, Shape};
    use pnr_core::layer::RoutingDirection;
    use pnr_core::technology::{LayerSpec, TechnologySpec};

    fn tech() -> Arc<Technology> {
        Arc::new(
            Technology::load(&TechnologySpec {
                layers: vec![
                    LayerSpec::routing("M1", RoutingDirection::Horizontal, 10, 4),
                    LayerSpec::routing("M2", RoutingDirection::Vertical, 10, 4),
                ],
                ..Default::default()
            })
            .unwrap(),
        )
    }

    #[test]
    fn test_snapshot_file_round_trip() {
        let tech = tech();
        let mut db = DesignDatabase::new("top", Arc::clone(&tech));
        db.set_boundary(Shape::Rect(Rect::new(0, 0, 100, 100))).unwrap();
        let m1 = tech.layer_by_name("M1").unwrap().id;
        db.add_obstruction(Some(m1), Shape::Rect(Rect::new(10, 10, 20, 20)))
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("top.json");
        write_snapshot(&db, &path).unwrap();

        let loaded = load_design(&path, tech, &CellLibrary::new()).unwrap();
        assert_eq!(loaded.snapshot(), db.snapshot());
        assert_eq!(
            to_json(&loaded.snapshot()).unwrap(),
            fs::read_to_string(&path).unwrap()
        );
    }

    #[test]
    fn test_malformed_snapshot_is_json_error() {
        assert!(matches!(
            from_json("{ \"name\": 3 }"),
            Err(pnr_core::PnrError::Json(_))
        ));
    }
}
