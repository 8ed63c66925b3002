//! Force-directed global placement.
//!
//! Every net is modelled as a clique with weight `1 / (k - 1)`. Each
//! iteration moves every movable instance to the weighted mean of its
//! neighbours, its placed ports and a weak pull to the boundary centre.
//! All updates of one iteration read the previous positions only, so the
//! result does not depend on the thread count.
//!
//! This is the one floating-point phase of the flow. Each instance's sums
//! run serially in a fixed neighbour order, and the targets are rounded to
//! DBU before legalization.

use rayon::prelude::*;

use pnr_core::{DesignDatabase, InstanceId, Point, Terminal};

use crate::config::FloorplannerConfig;
use crate::sites::SiteGrid;

#[derive(Debug, Clone, Copy)]
enum Anchor {
    Movable(usize),
    Fixed(f64, f64),
}

/// Target centre of every instance in `movable`, in the same order.
pub fn global_placement(
    db: &DesignDatabase,
    movable: &[InstanceId],
    grid: &SiteGrid,
    config: &FloorplannerConfig,
) -> Vec<Point> {
    let n = movable.len();
    if n == 0 {
        return Vec::new();
    }
    let mut slot_of = vec![None; db.instances().len()];
    for (k, id) in movable.iter().enumerate() {
        slot_of[id.index()] = Some(k);
    }

    let mut springs: Vec<Vec<(Anchor, f64)>> = vec![Vec::new(); n];
    for net in db.nets() {
        let mut anchors = Vec::with_capacity(net.terminals.len());
        for t in &net.terminals {
            let anchor = match t {
                Terminal::Pin { instance, .. } => match slot_of[instance.index()] {
                    Some(k) => Some((Anchor::Movable(k), 1.0)),
                    None => db
                        .terminal_location(t)
                        .map(|p| (Anchor::Fixed(p.x as f64, p.y as f64), 1.0)),
                },
                Terminal::Port(_) => db
                    .terminal_location(t)
                    .map(|p| (Anchor::Fixed(p.x as f64, p.y as f64), config.port_weight)),
            };
            anchors.extend(anchor);
        }
        if anchors.len() < 2 {
            continue;
        }
        let w = 1.0 / (anchors.len() - 1) as f64;
        for (i, (a, _)) in anchors.iter().enumerate() {
            let Anchor::Movable(k) = *a else { continue };
            for (j, (b, scale)) in anchors.iter().enumerate() {
                if i != j {
                    springs[k].push((*b, w * scale));
                }
            }
        }
    }

    // deterministic start: spread over a sqrt(n) x sqrt(n) lattice
    let side = (n as f64).sqrt().ceil() as usize;
    let b_w = (grid.cols * grid.site_width) as f64;
    let b_h = (grid.rows * grid.row_height) as f64;
    let (ox, oy) = (grid.origin.x as f64, grid.origin.y as f64);
    let mut pos: Vec<(f64, f64)> = (0..n)
        .map(|k| {
            let (i, j) = (k % side, k / side);
            (
                ox + b_w * (i as f64 + 0.5) / side as f64,
                oy + b_h * (j as f64 + 0.5) / side as f64,
            )
        })
        .collect();

    let (cx, cy) = (grid.center.x as f64, grid.center.y as f64);
    let c = config.center_weight.max(0.0);
    for _ in 0..config.global_iterations {
        pos = (0..n)
            .into_par_iter()
            .map(|k| {
                let (mut sx, mut sy, mut sw) = (c * cx, c * cy, c);
                for (anchor, w) in &springs[k] {
                    let (x, y) = match *anchor {
                        Anchor::Movable(m) => pos[m],
                        Anchor::Fixed(x, y) => (x, y),
                    };
                    sx += w * x;
                    sy += w * y;
                    sw += w;
                }
                if sw > 0.0 {
                    (sx / sw, sy / sw)
                } else {
                    pos[k]
                }
            })
            .collect();
    }

    log::debug!("Global placement of {n} instances after {} iterations", config.global_iterations);
    pos.into_iter()
        .map(|(x, y)| Point::new(x.round() as i64, y.round() as i64))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use pnr_core::cell::{CellGeometry, CellPin, PinDirection};
    use pnr_core::technology::{LayerSpec, TechnologySpec};
    use pnr_core::{CellLibrary, PortDirection, Rect, RoutingDirection, Shape, Technology};

    #[test]
    fn test_instances_are_pulled_towards_their_port() {
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
        let m1 = tech.layer_by_name("M1").unwrap().id;
        let inv = CellGeometry::new(10, 10)
            .with_pin(CellPin::new("A", PinDirection::Input))
            .with_pin(CellPin::new("Y", PinDirection::Output));
        let mut lib = CellLibrary::new();
        lib.import_geometry(vec![("INV".into(), inv)]);

        let mut db = DesignDatabase::new("top", Arc::clone(&tech));
        db.set_boundary(Shape::Rect(Rect::new(0, 0, 200, 200))).unwrap();
        let p = db.add_port("in", PortDirection::Input);
        let u1 = db.create_instance("u1", Arc::clone(lib.get("INV").unwrap())).unwrap();
        let u2 = db.create_instance("u2", Arc::clone(lib.get("INV").unwrap())).unwrap();
        db.add_net("a", vec![Terminal::Port(p), Terminal::Pin { instance: u1, pin: "A".into() }])
            .unwrap();
        db.add_net(
            "b",
            vec![
                Terminal::Pin { instance: u1, pin: "Y".into() },
                Terminal::Pin { instance: u2, pin: "A".into() },
            ],
        )
        .unwrap();
        db.set_port_position(p, Point::new(5, 105), m1).unwrap();

        let cfg = FloorplannerConfig::default();
        let grid = SiteGrid::new(&tech, &cfg, Rect::new(0, 0, 200, 200)).unwrap();
        let targets = global_placement(&db, &[u1, u2], &grid, &cfg);
        assert_eq!(targets.len(), 2);
        // u1 sits between the port and u2; both are left of the centre
        assert!(targets[0].x < targets[1].x);
        assert!(targets[1].x < 100);

        // identical inputs give identical output
        assert_eq!(targets, global_placement(&db, &[u1, u2], &grid, &cfg));
        let in_pool = |threads: usize| {
            rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .unwrap()
                .install(|| global_placement(&db, &[u1, u2], &grid, &cfg))
        };
        assert_eq!(in_pool(1), targets);
        assert_eq!(in_pool(4), targets);
    }
}
