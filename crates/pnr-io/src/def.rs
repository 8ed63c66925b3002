//! DEF 5.8 writer (export only).
//!
//! Emits DIEAREA, generated VIAS, COMPONENTS, PINS and NETS with regular
//! wiring. Coordinates are database units, so `UNITS DISTANCE MICRONS`
//! is the technology's DBU-per-micron.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use pnr_core::database::{PlacementStatus, Via};
use pnr_core::geometry::{Point, Shape};
use pnr_core::{DesignDatabase, LayerId, PortDirection, Result, Terminal};

pub fn write_def_file(db: &DesignDatabase, path: &Path) -> Result<()> {
    fs::write(path, write_def(db))?;
    log::info!("Wrote DEF for '{}' to {}", db.name, path.display());
    Ok(())
}

pub fn write_def(db: &DesignDatabase) -> String {
    let tech = db.technology();
    let layer = |id: LayerId| {
        tech.layer(id)
            .map(|l| l.name.clone())
            .unwrap_or_else(|| id.to_string())
    };
    let pt = |p: Point| format!("( {} {} )", p.x, p.y);

    let mut out = String::new();
    // String formatting cannot fail; the results are ignored throughout.
    let _ = writeln!(out, "VERSION 5.8 ;");
    let _ = writeln!(out, "DIVIDERCHAR \"/\" ;");
    let _ = writeln!(out, "BUSBITCHARS \"[]\" ;");
    let _ = writeln!(out, "DESIGN {} ;", db.name);
    let _ = writeln!(out, "UNITS DISTANCE MICRONS {} ;", tech.dbu_per_micron);
    match db.boundary() {
        Some(Shape::Rect(r)) => {
            let _ = writeln!(out, "DIEAREA {} {} ;", pt(r.min), pt(r.max));
        }
        Some(Shape::Polygon(p)) => {
            let pts: Vec<String> = p.vertices.iter().map(|v| pt(*v)).collect();
            let _ = writeln!(out, "DIEAREA {} ;", pts.join(" "));
        }
        None => {}
    }
    out.push('\n');

    // Derived via rules have no library definition, so describe the ones in use.
    let mut generated: BTreeMap<&str, &Via> = BTreeMap::new();
    for net in db.nets() {
        for via in &net.route.vias {
            let derived = tech
                .via_rules()
                .iter()
                .any(|r| r.name == via.rule && r.derived);
            if derived {
                generated.entry(via.rule.as_str()).or_insert(via);
            }
        }
    }
    if !generated.is_empty() {
        let _ = writeln!(out, "VIAS {} ;", generated.len());
        for (name, via) in &generated {
            let local = |r: pnr_core::Rect| {
                format!(
                    "( {} {} ) ( {} {} )",
                    r.min.x - via.position.x,
                    r.min.y - via.position.y,
                    r.max.x - via.position.x,
                    r.max.y - via.position.y
                )
            };
            let _ = write!(out, "- {name}");
            for (id, rect) in via.footprints() {
                let _ = write!(out, "\n  + RECT {} {}", layer(id), local(rect));
            }
            let _ = writeln!(out, " ;");
        }
        let _ = writeln!(out, "END VIAS\n");
    }

    let _ = writeln!(out, "COMPONENTS {} ;", db.instances().len());
    for inst in db.instances() {
        let _ = write!(out, "- {} {}", inst.name, inst.master.name);
        match inst.status {
            PlacementStatus::Unplaced => {
                let _ = write!(out, " + UNPLACED");
            }
            PlacementStatus::Placed => {
                let _ = write!(out, " + PLACED {} {}", pt(inst.position), inst.orientation.name());
            }
            PlacementStatus::Fixed => {
                let _ = write!(out, " + FIXED {} {}", pt(inst.position), inst.orientation.name());
            }
        }
        let _ = writeln!(out, " ;");
    }
    let _ = writeln!(out, "END COMPONENTS\n");

    let _ = writeln!(out, "PINS {} ;", db.ports().len());
    for port in db.ports() {
        let net = port
            .net
            .and_then(|n| db.net(n).ok())
            .map_or(port.name.as_str(), |n| n.name.as_str());
        let direction = match port.direction {
            PortDirection::Input => "INPUT",
            PortDirection::Output => "OUTPUT",
            PortDirection::InOut => "INOUT",
        };
        let _ = write!(
            out,
            "- {} + NET {} + DIRECTION {} + USE SIGNAL",
            port.name, net, direction
        );
        if let (Some(pos), Some(l)) = (port.position, port.layer) {
            let h = port.size / 2;
            let _ = write!(
                out,
                "\n  + LAYER {} ( {} {} ) ( {} {} ) + PLACED {} N",
                layer(l),
                -h,
                -h,
                h,
                h,
                pt(pos)
            );
        }
        let _ = writeln!(out, " ;");
    }
    let _ = writeln!(out, "END PINS\n");

    let _ = writeln!(out, "NETS {} ;", db.nets().len());
    for net in db.nets() {
        let _ = write!(out, "- {}", net.name);
        for t in &net.terminals {
            match t {
                Terminal::Pin { instance, pin } => {
                    let name = db
                        .instance(*instance)
                        .map(|i| i.name.as_str())
                        .unwrap_or("?");
                    let _ = write!(out, " ( {name} {pin} )");
                }
                Terminal::Port(p) => {
                    let name = db
                        .ports()
                        .get(p.index())
                        .map_or("?", |p| p.name.as_str());
                    let _ = write!(out, " ( PIN {name} )");
                }
            }
        }
        let mut keyword = "+ ROUTED";
        for seg in &net.route.segments {
            let end = match (seg.start.x == seg.end.x, seg.start.y == seg.end.y) {
                (true, true) => String::new(),
                (true, false) => format!(" ( * {} )", seg.end.y),
                _ => format!(" ( {} * )", seg.end.x),
            };
            let _ = write!(out, "\n  {keyword} {} {}{}", layer(seg.layer), pt(seg.start), end);
            keyword = "NEW";
        }
        for via in &net.route.vias {
            let _ = write!(out, "\n  {keyword} {} {} {}", layer(via.bottom), pt(via.position), via.rule);
            keyword = "NEW";
        }
        let _ = writeln!(out, " ;");
    }
    let _ = writeln!(out, "END NETS\n");
    let _ = writeln!(out, "END DESIGN");
    out
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use pnr_core::cell::{CellGeometry, CellPin, PinDirection};
    use pnr_core::database::RouteSegment;
    use pnr_core::geometry::{Orientation, Rect};
    use pnr_core::layer::RoutingDirection;
    use pnr_core::technology::{LayerSpec, TechnologySpec};
    use pnr_core::{CellLibrary, Technology};

    #[test]
    fn test_write_def_sections() {
        let tech = Arc::new(
            Technology::load(&TechnologySpec {
                layers: vec![
                    LayerSpec::routing("M1", RoutingDirection::Horizontal, 10, 4),
                    LayerSpec::routing("M2", RoutingDirection::Vertical, 10, 4),
                ],
                dbu_per_micron: 100,
                ..Default::default()
            })
            .unwrap(),
        );
        let m1 = tech.layer_by_name("M1").unwrap().id;
        let inv = CellGeometry::new(10, 10)
            .with_pin(CellPin::new("A", PinDirection::Input).with_rect(m1, Rect::new(0, 4, 2, 6)))
            .with_pin(CellPin::new("Y", PinDirection::Output).with_rect(m1, Rect::new(8, 4, 10, 6)));
        let mut lib = CellLibrary::new();
        lib.import_geometry(vec![("INV".into(), inv)]);

        let mut db = DesignDatabase::new("chain", Arc::clone(&tech));
        db.set_boundary(Shape::Rect(Rect::new(0, 0, 100, 100))).unwrap();
        let u1 = db.create_instance("u1", Arc::clone(lib.get("INV").unwrap())).unwrap();
        let u2 = db.create_instance("u2", Arc::clone(lib.get("INV").unwrap())).unwrap();
        let n = db
            .add_net(
                "n1",
                vec![
                    Terminal::Pin { instance: u1, pin: "Y".into() },
                    Terminal::Pin { instance: u2, pin: "A".into() },
                ],
            )
            .unwrap();
        db.set_position(u1, Point::new(0, 0), Orientation::N).unwrap();
        db.place_fixed(u2, Point::new(30, 0), Orientation::FN).unwrap();
        db.begin_route(n).unwrap();
        db.commit_route(
            n,
            &[RouteSegment {
                layer: m1,
                start: Point::new(9, 5),
                end: Point::new(31, 5),
                width: 4,
            }],
            &[],
        )
        .unwrap();
        db.finish_route(n).unwrap();

        let def = write_def(&db);
        assert!(def.starts_with("VERSION 5.8 ;"));
        assert!(def.contains("UNITS DISTANCE MICRONS 100 ;"));
        assert!(def.contains("DIEAREA ( 0 0 ) ( 100 100 ) ;"));
        assert!(def.contains("- u1 INV + PLACED ( 0 0 ) N ;"));
        assert!(def.contains("- u2 INV + FIXED ( 30 0 ) FN ;"));
        assert!(def.contains("- n1 ( u1 Y ) ( u2 A )\n  + ROUTED M1 ( 9 5 ) ( 31 * ) ;"));
        assert!(def.trim_end().ends_with("END DESIGN"));
    }
}
