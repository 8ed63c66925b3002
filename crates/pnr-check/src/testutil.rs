//! Small inverter-chain designs shared by the check tests.

use std::sync::Arc;

use pnr_core::cell::{CellGeometry, CellPin, PinDirection};
use pnr_core::technology::{LayerSpec, TechnologySpec};
use pnr_core::{
    CellLibrary, Coord, DesignDatabase, Orientation, Point, Rect, RoutingDirection, Shape,
    Technology, Terminal,
};

pub fn tech() -> Arc<Technology> {
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

/// `count` unplaced inverters u0..u{count-1} chained Y -> A by nets n0...
pub fn design(count: usize) -> DesignDatabase {
    let tech = tech();
    let m1 = tech.layer_by_name("M1").unwrap().id;
    let m2 = tech.layer_by_name("M2").unwrap().id;
    let inv = CellGeometry::new(10, 10)
        .with_pin(CellPin::new("A", PinDirection::Input).with_rect(m1, Rect::new(2, 4, 6, 6)))
        .with_pin(CellPin::new("Y", PinDirection::Output).with_rect(m2, Rect::new(4, 2, 6, 8)));
    let mut lib = CellLibrary::new();
    lib.import_geometry(vec![("INV".into(), inv)]);

    let mut db = DesignDatabase::new("chain", Arc::clone(&tech));
    db.set_boundary(Shape::Rect(Rect::new(0, 0, 100, 100))).unwrap();
    let ids: Vec<_> = (0..count)
        .map(|i| {
            db.create_instance(&format!("u{i}"), Arc::clone(lib.get("INV").unwrap()))
                .unwrap()
        })
        .collect();
    for (i, w) in ids.windows(2).enumerate() {
        db.add_net(
            &format!("n{i}"),
            vec![
                Terminal::Pin { instance: w[0], pin: "Y".into() },
                Terminal::Pin { instance: w[1], pin: "A".into() },
            ],
        )
        .unwrap();
    }
    db
}

/// The chain with every inverter fixed at `positions`.
pub fn placed(positions: &[(Coord, Coord)]) -> DesignDatabase {
    let mut db = design(positions.len());
    for (i, &(x, y)) in positions.iter().enumerate() {
        let id = db.instance_by_name(&format!("u{i}")).unwrap().id;
        db.place_fixed(id, Point::new(x, y), Orientation::N).unwrap();
    }
    db
}
