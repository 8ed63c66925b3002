//! I/O port placement on the boundary.
//!
//! Unplaced ports are spread evenly along one edge each (inputs left,
//! outputs right, inouts top), in declaration order. Positions sit on the
//! routing tracks nearest the edge so the router can reach them. Ports that
//! do not fit their edge spill over to the other edges in the order left,
//! right, top, bottom; ports left over after that are reported as failures.

use pnr_core::{Coord, DesignDatabase, LayerId, PnrError, Point, PortDirection, PortId, Result, RoutingDirection};

/// Track coordinates along one axis within `[lo, hi)`.
fn tracks(lo: Coord, hi: Coord, pattern: (Coord, Coord)) -> Vec<Coord> {
    let (pitch, offset) = pattern;
    if pitch <= 0 {
        return Vec::new();
    }
    let mut out = Vec::new();
    let mut v = lo + offset.rem_euclid(pitch);
    while v < hi {
        out.push(v);
        v += pitch;
    }
    out
}

/// `n` indices spread evenly over `0..len`, centred in their share.
fn spread(n: usize, len: usize) -> Vec<usize> {
    (0..n).map(|i| ((2 * i + 1) * len) / (2 * n)).collect()
}

/// One side of the boundary and the track positions it offers.
struct Edge {
    /// The x of a vertical edge or the y of a horizontal one.
    fixed: Coord,
    vertical: bool,
    layer: LayerId,
    slots: Vec<Coord>,
    ports: Vec<PortId>,
}

impl Edge {
    fn has_room(&self) -> bool {
        self.ports.len() < self.slots.len()
    }

    fn positions(&self) -> impl Iterator<Item = (PortId, Point)> + '_ {
        let spots = spread(self.ports.len(), self.slots.len());
        self.ports.iter().zip(spots).map(|(&id, k)| {
            let v = self.slots[k];
            let p = if self.vertical {
                Point::new(self.fixed, v)
            } else {
                Point::new(v, self.fixed)
            };
            (id, p)
        })
    }
}

/// Place every port that has no position yet. Returns how many were placed
/// and one failure per port that found no free track.
pub fn place_ports(db: &mut DesignDatabase) -> Result<(usize, Vec<PnrError>)> {
    let boundary = db
        .boundary_rect()
        .ok_or_else(|| PnrError::InvalidState("no floorplan boundary".into()))?;
    let tech = db.technology().clone();

    let lowest = |dir: RoutingDirection| -> Option<LayerId> {
        let layers = tech.routing_layers();
        layers
            .iter()
            .find(|l| l.direction == dir)
            .or_else(|| layers.first())
            .map(|l| l.id)
    };
    let (Some(side_layer), Some(top_layer)) =
        (lowest(RoutingDirection::Horizontal), lowest(RoutingDirection::Vertical))
    else {
        return Err(PnrError::InvalidState("technology has no routing layers".into()));
    };
    let xs = tracks(
        boundary.min.x,
        boundary.max.x,
        tech.track_pattern(RoutingDirection::Vertical).unwrap_or((1, 0)),
    );
    let ys = tracks(
        boundary.min.y,
        boundary.max.y,
        tech.track_pattern(RoutingDirection::Horizontal).unwrap_or((1, 0)),
    );
    let (Some(&left), Some(&right), Some(&bottom), Some(&top)) =
        (xs.first(), xs.last(), ys.first(), ys.last())
    else {
        return Err(PnrError::InvalidState("boundary holds no routing tracks".into()));
    };
    // corners belong to the vertical edges
    let inner = xs.get(1..xs.len().saturating_sub(1)).unwrap_or_default().to_vec();

    let edge = |fixed, vertical, layer, slots: &Vec<Coord>| Edge {
        fixed,
        vertical,
        layer,
        slots: slots.clone(),
        ports: Vec::new(),
    };
    let mut edges = [
        edge(left, true, side_layer, &ys),
        edge(right, true, side_layer, &ys),
        edge(top, false, top_layer, &inner),
        edge(bottom, false, top_layer, &inner),
    ];
    if right == left {
        edges[1].slots.clear();
    }
    if bottom == top {
        edges[3].slots.clear();
    }

    let mut overflow: Vec<PortId> = Vec::new();
    for (home, dir) in [(0, PortDirection::Input), (1, PortDirection::Output), (2, PortDirection::InOut)] {
        for port in db.ports().iter().filter(|p| p.position.is_none() && p.direction == dir) {
            if edges[home].has_room() {
                edges[home].ports.push(port.id);
            } else {
                overflow.push(port.id);
            }
        }
    }
    let mut failures = Vec::new();
    for id in overflow {
        match edges.iter_mut().find(|e| e.has_room()) {
            Some(e) => e.ports.push(id),
            None => {
                let name = db.ports().get(id.index()).map_or("?", |p| p.name.as_str());
                log::warn!("No boundary track left for port '{name}'");
                failures.push(PnrError::PortPlacementInfeasible(id));
            }
        }
    }

    let mut placed = 0;
    for e in &edges {
        for (id, position) in e.positions() {
            db.set_port_position(id, position, e.layer)?;
            placed += 1;
        }
    }
    if placed > 0 {
        log::info!("Placed {placed} I/O ports on the boundary");
    }
    Ok((placed, failures))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use pnr_core::technology::{LayerSpec, TechnologySpec};
    use pnr_core::{Rect, Shape, Technology};

    #[test]
    fn test_spread() {
        assert_eq!(spread(1, 10), vec![5]);
        assert_eq!(spread(2, 10), vec![2, 7]);
        assert_eq!(spread(0, 10), Vec::<usize>::new());
    }

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
    fn test_crowded_edge_spills_then_fails() {
        let mut db = DesignDatabase::new("top", tech());
        // three tracks per side; the top and bottom keep only the middle one
        db.set_boundary(Shape::Rect(Rect::new(0, 0, 30, 30))).unwrap();
        let ids: Vec<PortId> = (0..9)
            .map(|i| db.add_port(&format!("in{i}"), PortDirection::Input))
            .collect();

        let (placed, failures) = place_ports(&mut db).unwrap();
        assert_eq!(placed, 8);
        assert!(matches!(failures[..], [PnrError::PortPlacementInfeasible(id)] if id == ids[8]));

        let ports = db.ports();
        assert_eq!(ports[ids[0].index()].position, Some(Point::new(5, 5)));
        assert_eq!(ports[ids[3].index()].position, Some(Point::new(25, 5)));
        assert_eq!(ports[ids[6].index()].position, Some(Point::new(15, 25)));
        assert_eq!(ports[ids[7].index()].position, Some(Point::new(15, 5)));
        assert!(ports[ids[8].index()].position.is_none());
        let mut spots: Vec<Point> = ports.iter().filter_map(|p| p.position).collect();
        spots.sort_by_key(|p| (p.x, p.y));
        spots.dedup();
        assert_eq!(spots.len(), 8);
    }

    #[test]
    fn test_ports_go_to_their_edges() {
        let tech = tech();
        let m1 = tech.layer_by_name("M1").unwrap().id;
        let m2 = tech.layer_by_name("M2").unwrap().id;
        let mut db = DesignDatabase::new("top", tech);
        db.set_boundary(Shape::Rect(Rect::new(0, 0, 100, 100))).unwrap();
        let a = db.add_port("a", PortDirection::Input);
        let y = db.add_port("y", PortDirection::Output);
        let io = db.add_port("io", PortDirection::InOut);

        assert_eq!(place_ports(&mut db).unwrap().0, 3);
        let ports = db.ports();
        assert_eq!(ports[a.index()].position, Some(Point::new(5, 55)));
        assert_eq!(ports[a.index()].layer, Some(m1));
        assert_eq!(ports[y.index()].position, Some(Point::new(95, 55)));
        assert_eq!(ports[io.index()].position, Some(Point::new(55, 95)));
        assert_eq!(ports[io.index()].layer, Some(m2));

        // already placed ports are left alone
        assert_eq!(place_ports(&mut db).unwrap().0, 0);
    }
}
