//! Read-only browsing queries over a design: layers with their display
//! attributes, obstructions, placed instances and routes by region.

use serde::Serialize;

use crate::database::{DesignDatabase, Instance, Obstruction, RouteState};
use crate::geometry::{Coord, Rect};
use crate::ids::{LayerId, NetId};
use crate::layer::Layer;

/// Routing status of one net, as shown in a net browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetStatus {
    pub id: NetId,
    pub name: String,
    pub state: RouteState,
    pub wirelength: Coord,
    pub via_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DesignSummary {
    pub instances: usize,
    pub placed: usize,
    pub nets: usize,
    pub routed: usize,
    pub failed: usize,
    pub hpwl: Coord,
}

/// Borrowing view; it cannot mutate the database.
#[derive(Clone, Copy)]
pub struct LayerQuery<'a> {
    db: &'a DesignDatabase,
}

impl<'a> LayerQuery<'a> {
    pub fn new(db: &'a DesignDatabase) -> Self {
        Self { db }
    }

    /// All layers bottom to top, with appearance attributes.
    pub fn layers(&self) -> &'a [Layer] {
        self.db.technology().layers().all_layers()
    }

    /// Global obstructions and keepouts that block `layer`.
    pub fn obstructions_on(&self, layer: LayerId) -> Vec<Obstruction> {
        self.db
            .obstructions()
            .iter()
            .cloned()
            .chain(self.db.keepouts())
            .filter(|o| o.blocks_layer(layer))
            .collect()
    }

    /// Global obstructions and keepouts touching a viewport.
    pub fn obstructions_in(&self, viewport: &Rect) -> Vec<Obstruction> {
        self.db
            .obstructions()
            .iter()
            .cloned()
            .chain(self.db.keepouts())
            .filter(|o| o.shape.bbox().is_some_and(|b| b.intersects(viewport)))
            .collect()
    }

    /// Placed instances touching a viewport, ascending id.
    pub fn instances_in(&self, viewport: &Rect) -> Vec<&'a Instance> {
        self.db
            .instances()
            .iter()
            .filter(|i| i.bbox().is_some_and(|b| b.intersects(viewport)))
            .collect()
    }

    pub fn routes_on(&self, layer: LayerId, viewport: &Rect) -> Vec<(NetId, Rect)> {
        self.db.route_shapes_in(layer, viewport)
    }

    pub fn net_status(&self) -> Vec<NetStatus> {
        self.db
            .nets()
            .iter()
            .map(|n| NetStatus {
                id: n.id,
                name: n.name.clone(),
                state: n.route.state,
                wirelength: n.route.segments.iter().map(|s| s.length()).sum(),
                via_count: n.route.vias.len(),
            })
            .collect()
    }

    pub fn summary(&self) -> DesignSummary {
        let nets = self.db.nets();
        DesignSummary {
            instances: self.db.instances().len(),
            placed: self.db.instances().iter().filter(|i| i.is_placed()).count(),
            nets: nets.len(),
            routed: nets
                .iter()
                .filter(|n| n.route.state == RouteState::Routed)
                .count(),
            failed: nets
                .iter()
                .filter(|n| n.route.state == RouteState::Failed)
                .count(),
            hpwl: self.db.total_hpwl(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::cell::{CellGeometry, CellPin, LayerShape, PinDirection};
    use crate::geometry::{Point, Shape};
    use crate::ids::InstanceId;
    use crate::layer::RoutingDirection;
    use crate::library::CellLibrary;
    use crate::technology::{LayerSpec, Technology, TechnologySpec};
    use crate::geometry::Orientation;

    #[test]
    fn test_browse_obstructions_and_instances() {
        let tech = Arc::new(
            Technology::load(&TechnologySpec {
                layers: vec![
                    LayerSpec::routing("M1", RoutingDirection::Horizontal, 10, 4),
                    LayerSpec::routing("M2", RoutingDirection::Vertical, 10, 4),
                ],
                dbu_per_micron: 1000,
                manufacturing_grid: 1,
                ..Default::default()
            })
            .unwrap(),
        );
        let m1 = tech.layer_by_name("M1").unwrap().id;
        let m2 = tech.layer_by_name("M2").unwrap().id;
        let mut geom = CellGeometry::new(10, 10)
            .with_pin(CellPin::new("A", PinDirection::Input).with_rect(m1, Rect::new(0, 0, 2, 2)));
        geom.obstructions.push(LayerShape {
            layer: m1,
            shape: Shape::Rect(Rect::new(4, 4, 8, 8)),
        });
        let mut lib = CellLibrary::new();
        lib.import_geometry(vec![("BLK".into(), geom)]);

        let mut db = DesignDatabase::new("top", Arc::clone(&tech));
        db.set_boundary(Shape::Rect(Rect::new(0, 0, 100, 100))).unwrap();
        db.add_obstruction(Some(m2), Shape::Rect(Rect::new(50, 50, 60, 60)))
            .unwrap();
        let u = db.create_instance("u1", Arc::clone(lib.get("BLK").unwrap())).unwrap();
        db.set_position(u, Point::new(20, 20), Orientation::N).unwrap();

        let q = LayerQuery::new(&db);
        assert_eq!(q.layers().len(), 2);
        let on_m1 = q.obstructions_on(m1);
        assert_eq!(on_m1.len(), 1);
        assert_eq!(on_m1[0].shape, Shape::Rect(Rect::new(24, 24, 28, 28)));
        assert_eq!(q.obstructions_on(m2).len(), 1);
        assert_eq!(q.obstructions_in(&Rect::new(0, 0, 30, 30)).len(), 1);

        let hits = q.instances_in(&Rect::new(0, 0, 25, 25));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, InstanceId::from_raw(0));
        assert!(q.instances_in(&Rect::new(70, 70, 80, 80)).is_empty());

        let summary = q.summary();
        assert_eq!(summary.placed, 1);
        assert_eq!(summary.nets, 0);
    }
}
