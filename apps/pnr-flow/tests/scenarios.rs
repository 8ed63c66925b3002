//! End-to-end runs of the whole pipeline on small inverter chains.

use std::fs;
use std::sync::Arc;

use pnr_check::{check_placement, check_routing, error_count, ViolationKind};
use pnr_core::cell::{CellGeometry, CellPin, PinDirection};
use pnr_core::technology::{LayerSpec, TechnologySpec};
use pnr_core::{CellLibrary, PnrError, Rect, RouteState, RoutingDirection, Shape, Technology};
use pnr_flow::{build_design, place_and_route, run_flow, FlowInputs};
use pnr_io::project::{FloorplanConfig, ObstructionConfig};
use pnr_io::{load_design, read_verilog, select_top, write_snapshot, write_verilog, ProjectConfig};
use pnr_place::Floorplanner;
use pnr_route::Router;

/// u0 -> u1 -> u2; the outer pins stay unconnected.
const CHAIN: &str = r#"
module chain;
  wire w1, w2;
  INV u0 (.A(), .Y(w1));
  INV u1 (.A(w1), .Y(w2));
  INV u2 (.A(w2), .Y());
endmodule
"#;

fn tech() -> Arc<Technology> {
    Arc::new(
        Technology::load(&TechnologySpec {
            layers: vec![
                LayerSpec::routing("M1", RoutingDirection::Horizontal, 10, 4),
                LayerSpec::cut("V1", 2),
                LayerSpec::routing("M2", RoutingDirection::Vertical, 10, 4),
            ],
            ..Default::default()
        })
        .unwrap(),
    )
}

fn inputs(verilog: &str) -> FlowInputs {
    inputs_with_pins(verilog, ("M1", Rect::new(2, 4, 6, 6)), ("M2", Rect::new(4, 2, 6, 8)))
}

/// Inverter library with the A and Y pins drawn as given.
fn inputs_with_pins(verilog: &str, a: (&str, Rect), y: (&str, Rect)) -> FlowInputs {
    let tech = tech();
    let layer = |name: &str| tech.layer_by_name(name).unwrap().id;
    let inv = CellGeometry::new(10, 10)
        .with_pin(CellPin::new("A", PinDirection::Input).with_rect(layer(a.0), a.1))
        .with_pin(CellPin::new("Y", PinDirection::Output).with_rect(layer(y.0), y.1));
    let mut library = CellLibrary::new();
    library.import_geometry(vec![("INV".into(), inv)]);
    let top = select_top(read_verilog(verilog).unwrap(), None).unwrap();
    FlowInputs { tech, library, top }
}

fn project(boundary: Rect) -> ProjectConfig {
    ProjectConfig {
        floorplan: FloorplanConfig {
            boundary: Some(Shape::Rect(boundary)),
            ..Default::default()
        },
        ..Default::default()
    }
}

#[test]
fn test_three_inverter_chain_places_and_routes() {
    let inputs = inputs(CHAIN);
    let project = project(Rect::new(0, 0, 100, 100));
    let db = build_design(&inputs, &project).unwrap();
    let outcome = place_and_route(db, &inputs, &project).unwrap();

    assert!(outcome.placement.failures.is_empty());
    assert!(outcome.routing.failed.is_empty(), "{:?}", outcome.routing.failed);
    assert_eq!(outcome.routing.routed, 2);

    let db = &outcome.db;
    assert!(db.instances().iter().all(|i| i.is_placed()));
    let boxes: Vec<Rect> = db.instances().iter().filter_map(|i| i.bbox()).collect();
    for (i, a) in boxes.iter().enumerate() {
        assert!(Rect::new(0, 0, 100, 100).contains(a));
        for b in &boxes[i + 1..] {
            assert!(!a.overlaps(b));
        }
    }
    assert!(db.nets().iter().all(|n| n.route.state == RouteState::Routed));
    assert!(check_placement(db).is_empty());
    assert_eq!(error_count(&check_routing(db)), 0);
    assert!(outcome.is_clean(), "{:?}", outcome.violations);
}

#[test]
fn test_chain_routes_with_both_pins_on_the_lower_metal() {
    let layouts = [
        (Rect::new(1, 3, 3, 7), Rect::new(7, 3, 9, 7)),
        (Rect::new(1, 1, 3, 9), Rect::new(7, 1, 9, 9)),
        (Rect::new(2, 1, 8, 3), Rect::new(2, 7, 8, 9)),
    ];
    for (a, y) in layouts {
        let inputs = inputs_with_pins(CHAIN, ("M1", a), ("M1", y));
        let project = project(Rect::new(0, 0, 100, 100));
        let db = build_design(&inputs, &project).unwrap();
        let outcome = place_and_route(db, &inputs, &project).unwrap();

        assert!(outcome.placement.failures.is_empty(), "{a:?} {y:?}");
        assert!(outcome.routing.failed.is_empty(), "{a:?} {y:?}: {:?}", outcome.routing.failed);
        assert_eq!(outcome.routing.routed, 2);
        assert!(outcome.db.nets().iter().all(|n| n.route.state == RouteState::Routed));
        assert_eq!(error_count(&check_routing(&outcome.db)), 0, "{a:?} {y:?}");
    }
}

#[test]
fn test_fillers_complete_the_rows() {
    let mut inputs = inputs(CHAIN);
    inputs
        .library
        .import_geometry(vec![("FILL1".into(), CellGeometry::new(10, 10))]);
    let mut project = project(Rect::new(0, 0, 100, 100));
    project.placer.fillers = vec!["FILL1".into()];
    let db = build_design(&inputs, &project).unwrap();
    let outcome = place_and_route(db, &inputs, &project).unwrap();

    assert!(outcome.is_clean(), "{:?}", outcome.summary());
    assert_eq!(outcome.routing.routed, 2);
    // 100 sites, three inverters
    assert_eq!(outcome.placement.fillers, 97);
    assert_eq!(outcome.summary().fillers, 97);
    let covered: i64 = outcome
        .db
        .instances()
        .iter()
        .filter_map(|i| i.bbox())
        .map(|b| b.width() * b.height())
        .sum();
    assert_eq!(covered, 100 * 100);

    let text = write_verilog(&outcome.db);
    assert!(text.contains("  FILL1 filler_0 ();"));
    let module = select_top(read_verilog(&text).unwrap(), None).unwrap();
    assert_eq!(module.instances.len(), 100);
}

#[test]
fn test_unknown_filler_is_rejected() {
    let inputs = inputs(CHAIN);
    let mut project = project(Rect::new(0, 0, 100, 100));
    project.placer.fillers = vec!["FILL9".into()];
    let db = build_design(&inputs, &project).unwrap();
    let err = place_and_route(db, &inputs, &project).unwrap_err();
    assert!(matches!(err, PnrError::UnknownCellReference(ref n) if n == "FILL9"));
}

#[test]
fn test_obstruction_over_everything_fails_every_instance() {
    let inputs = inputs(CHAIN);
    let mut project = project(Rect::new(0, 0, 100, 100));
    project.floorplan.obstructions.push(ObstructionConfig {
        layer: None,
        shape: Shape::Rect(Rect::new(0, 0, 100, 100)),
    });
    let db = build_design(&inputs, &project).unwrap();
    let outcome = place_and_route(db, &inputs, &project).unwrap();

    assert_eq!(outcome.placement.failures.len(), 3);
    assert!(outcome
        .placement
        .failures
        .iter()
        .all(|e| matches!(e, PnrError::PlacementInfeasible(_))));
    assert!(outcome.db.instances().iter().all(|i| !i.is_placed()));
    assert_eq!(outcome.routing.routed, 0);
    assert!(outcome
        .violations
        .iter()
        .any(|v| v.kind == ViolationKind::Unplaced));
    assert!(!outcome.is_clean());
}

#[test]
fn test_single_pin_net_is_rejected_before_routing() {
    let inputs = inputs(
        r#"
module lonely;
  wire w;
  INV u0 (.A(), .Y(w));
endmodule
"#,
    );
    let err = build_design(&inputs, &project(Rect::new(0, 0, 100, 100))).unwrap_err();
    assert!(matches!(err, PnrError::DanglingPin { ref net, terminals: 1 } if net == "w"));
}

#[test]
fn test_identical_runs_produce_identical_designs() {
    let inputs = inputs(CHAIN);
    let mut project = project(Rect::new(0, 0, 100, 100));
    project.placer.threads = 4;
    project.router.threads = 4;

    let snapshots: Vec<_> = (0..2)
        .map(|_| {
            let db = build_design(&inputs, &project).unwrap();
            place_and_route(db, &inputs, &project).unwrap().db.snapshot()
        })
        .collect();
    assert_eq!(snapshots[0], snapshots[1]);
}

#[test]
fn test_rerun_on_finished_design_changes_nothing() {
    let inputs = inputs(CHAIN);
    let project = project(Rect::new(0, 0, 100, 100));
    let db = build_design(&inputs, &project).unwrap();
    let mut db = place_and_route(db, &inputs, &project).unwrap().db;
    let before = db.snapshot();

    let placement = Floorplanner::new(Arc::clone(&inputs.tech), project.placer.clone())
        .run(&mut db)
        .unwrap();
    assert!(placement.skipped_global);
    assert_eq!(placement.moved, 0);
    assert!(placement.failures.is_empty());

    let routing = Router::new(Arc::clone(&inputs.tech), project.router.clone())
        .run(&mut db)
        .unwrap();
    assert_eq!(routing.routed, 0);
    assert_eq!(routing.skipped, 2);
    assert_eq!(db.snapshot(), before);
}

#[test]
fn test_snapshot_round_trip_restores_geometry() {
    let inputs = inputs(CHAIN);
    let project = project(Rect::new(0, 0, 100, 100));
    let db = build_design(&inputs, &project).unwrap();
    let db = place_and_route(db, &inputs, &project).unwrap().db;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chain.json");
    write_snapshot(&db, &path).unwrap();
    let restored = load_design(&path, Arc::clone(&inputs.tech), &inputs.library).unwrap();

    assert_eq!(restored.snapshot(), db.snapshot());
    for (a, b) in db.nets().iter().zip(restored.nets()) {
        assert_eq!(a.route.segments, b.route.segments);
        assert_eq!(a.route.vias, b.route.vias);
    }
}

const TECH_LEF: &str = r#"
VERSION 5.8 ;
UNITS
  DATABASE MICRONS 100 ;
END UNITS

SITE core
  CLASS CORE ;
  SIZE 0.1 BY 0.1 ;
END core

LAYER M1
  TYPE ROUTING ;
  DIRECTION HORIZONTAL ;
  PITCH 0.1 ;
  WIDTH 0.04 ;
  SPACING 0.06 ;
END M1

LAYER V1
  TYPE CUT ;
  WIDTH 0.02 ;
END V1

LAYER M2
  TYPE ROUTING ;
  DIRECTION VERTICAL ;
  PITCH 0.1 ;
  WIDTH 0.04 ;
  SPACING 0.06 ;
END M2

END LIBRARY
"#;

const CELL_LEF: &str = r#"
MACRO INV
  CLASS CORE ;
  ORIGIN 0 0 ;
  SIZE 0.1 BY 0.1 ;
  SITE core ;
  PIN A
    DIRECTION INPUT ;
    PORT
      LAYER M1 ;
        RECT 0.02 0.04 0.06 0.06 ;
    END
  END A
  PIN Y
    DIRECTION OUTPUT ;
    PORT
      LAYER M2 ;
        RECT 0.04 0.02 0.06 0.08 ;
    END
  END Y
END INV
END LIBRARY
"#;

const LIBERTY: &str = r#"
library (toy) {
  cell (INV) {
    area : 1.0 ;
    pin (A) {
      direction : input ;
      capacitance : 0.002 ;
    }
    pin (Y) {
      direction : output ;
      function : "!A" ;
    }
  }
}
"#;

#[test]
fn test_project_files_drive_the_whole_flow() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("tech.lef"), TECH_LEF).unwrap();
    fs::write(dir.path().join("cells.lef"), CELL_LEF).unwrap();
    fs::write(dir.path().join("cells.lib"), LIBERTY).unwrap();
    fs::write(dir.path().join("chain.v"), CHAIN).unwrap();
    fs::write(
        dir.path().join("flow.json"),
        r#"{
            "name": "chain_top",
            "technology_lef": "tech.lef",
            "cell_lefs": ["cells.lef"],
            "liberty": ["cells.lib"],
            "verilog": ["chain.v"],
            "floorplan": {
                "boundary": { "Rect": { "min": { "x": 0, "y": 0 }, "max": { "x": 100, "y": 100 } } }
            },
            "router": { "threads": 2 },
            "output": {
                "snapshot": "out/chain.json",
                "def": "out/chain.def",
                "verilog": "out/chain.v",
                "report": "out/report.json"
            }
        }"#,
    )
    .unwrap();

    let project = ProjectConfig::load(&dir.path().join("flow.json")).unwrap();
    let outcome = run_flow(&project).unwrap();
    assert!(outcome.is_clean(), "{:?}", outcome.summary());
    assert_eq!(outcome.db.name, "chain_top");

    let def = fs::read_to_string(dir.path().join("out/chain.def")).unwrap();
    assert!(def.contains("DESIGN chain_top ;"));
    assert!(def.contains("COMPONENTS 3 ;"));

    let netlist = fs::read_to_string(dir.path().join("out/chain.v")).unwrap();
    let written = select_top(read_verilog(&netlist).unwrap(), None).unwrap();
    assert_eq!(written.name, "chain_top");
    assert_eq!(written.instances.len(), 3);

    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("out/report.json")).unwrap()).unwrap();
    assert_eq!(report["routed"], 2);
    assert_eq!(report["placed"], 3);

    let snapshot = pnr_io::read_snapshot(&dir.path().join("out/chain.json")).unwrap();
    assert_eq!(snapshot, outcome.db.snapshot());
}

#[test]
fn test_missing_input_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let project = ProjectConfig::from_json(
        r#"{ "technology_lef": "nope.lef", "verilog": ["chain.v"] }"#,
        dir.path(),
    )
    .unwrap();
    assert!(matches!(run_flow(&project), Err(PnrError::Io(_))));
}
