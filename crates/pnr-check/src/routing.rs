//! Routing verification: layer legality, shorts against other nets' wires
//! and pins, obstruction overlap, spacing and per-net connectivity.

use std::collections::BTreeSet;

use pnr_core::{DesignDatabase, LayerId, Net, NetId, Rect, RouteState, Shape, Terminal};

use crate::violation::{Violation, ViolationKind};

pub fn check_routing(db: &DesignDatabase) -> Vec<Violation> {
    let mut out = Vec::new();
    let mut shorted = BTreeSet::new();

    for net in db.nets() {
        match net.route.state {
            RouteState::Routed => {}
            RouteState::Failed | RouteState::Unrouted | RouteState::InProgress => {
                out.push(Violation::warning(
                    ViolationKind::Unrouted,
                    format!("net {} is {:?}", net.name, net.route.state),
                ));
            }
        }

        for seg in &net.route.segments {
            if !db.technology().is_routing_layer(seg.layer) {
                out.push(
                    Violation::error(
                        ViolationKind::NonRoutingLayer,
                        format!("net {} has a wire on non-routing layer {}", net.name, seg.layer),
                    )
                    .on_layer(seg.layer)
                    .at(seg.rect()),
                );
            }
        }

        let pieces = route_pieces(net);
        for &(layer, rect) in &pieces {
            check_foreign_routes(db, net, layer, rect, &mut shorted, &mut out);
            check_foreign_pins(db, net, layer, rect, &mut out);
            check_blockages(db, net, layer, rect, &mut out);
        }
        check_spacing(db, net, &pieces, &mut out);

        if net.route.state == RouteState::Routed {
            check_connectivity(db, net, &pieces, &mut out);
        }
    }

    log::info!("Routing check: {} violation(s)", out.len());
    out
}

/// Every (layer, rect) of a net's wires and vias.
fn route_pieces(net: &Net) -> Vec<(LayerId, Rect)> {
    let mut pieces: Vec<(LayerId, Rect)> = net
        .route
        .segments
        .iter()
        .map(|s| (s.layer, s.rect()))
        .collect();
    for via in &net.route.vias {
        pieces.extend(via.footprints());
    }
    pieces
}

// ── Shorts ───────────────────────────────────────────────────────────

fn check_foreign_routes(
    db: &DesignDatabase,
    net: &Net,
    layer: LayerId,
    rect: Rect,
    shorted: &mut BTreeSet<(NetId, NetId, LayerId)>,
    out: &mut Vec<Violation>,
) {
    for (other, theirs) in db.route_shapes_in(layer, &rect) {
        if other == net.id || !theirs.overlaps(&rect) {
            continue;
        }
        // one report per net pair and layer
        if !shorted.insert((net.id.min(other), net.id.max(other), layer)) {
            continue;
        }
        let other_name = db.net(other).map_or_else(|_| other.to_string(), |n| n.name.clone());
        out.push(
            Violation::error(
                ViolationKind::Short,
                format!("nets {} and {other_name} short on layer {layer}", net.name),
            )
            .on_layer(layer)
            .at(rect.intersection(&theirs).unwrap_or(rect)),
        );
    }
}

fn check_foreign_pins(db: &DesignDatabase, net: &Net, layer: LayerId, rect: Rect, out: &mut Vec<Violation>) {
    for id in db.instances_overlapping(&rect) {
        let inst = &db.instances()[id.index()];
        let Some(geometry) = inst.master.geometry.as_ref() else {
            continue;
        };
        for pin in &geometry.pins {
            if db.net_of_pin(id, &pin.name) == Some(net.id) {
                continue;
            }
            let touches = inst
                .pin_shapes(&pin.name)
                .iter()
                .any(|s| s.layer == layer && s.shape.overlaps_rect(&rect));
            if touches {
                out.push(
                    Violation::error(
                        ViolationKind::Short,
                        format!("net {} shorts pin {}/{}", net.name, inst.name, pin.name),
                    )
                    .on_layer(layer)
                    .at(rect),
                );
            }
        }
    }
    for port in db.ports() {
        if port.net == Some(net.id) {
            continue;
        }
        let Some(shape) = port.shape() else {
            continue;
        };
        if shape.layer == layer && shape.shape.overlaps_rect(&rect) {
            out.push(
                Violation::error(
                    ViolationKind::Short,
                    format!("net {} shorts port {}", net.name, port.name),
                )
                .on_layer(layer)
                .at(rect),
            );
        }
    }
}

fn check_blockages(db: &DesignDatabase, net: &Net, layer: LayerId, rect: Rect, out: &mut Vec<Violation>) {
    let global = db
        .obstructions_overlapping(&rect)
        .into_iter()
        .any(|o| db.obstructions()[o.index()].blocks_layer(layer));
    let keepout = db.instances_overlapping(&rect).into_iter().find(|id| {
        db.instances()[id.index()]
            .keepout_shapes()
            .iter()
            .any(|s| s.layer == layer && s.shape.overlaps_rect(&rect))
    });
    if global || keepout.is_some() {
        let what = match keepout {
            Some(id) if !global => format!("a keepout of {}", db.instances()[id.index()].name),
            _ => "an obstruction".to_string(),
        };
        out.push(
            Violation::error(
                ViolationKind::ObstructionOverlap,
                format!("net {} overlaps {what} on layer {layer}", net.name),
            )
            .on_layer(layer)
            .at(rect),
        );
    }
}

// ── Spacing ──────────────────────────────────────────────────────────

/// Squared distance between two rectangles; zero when they touch.
fn gap_squared(a: &Rect, b: &Rect) -> i128 {
    let dx = i128::from((b.min.x - a.max.x).max(a.min.x - b.max.x).max(0));
    let dy = i128::from((b.min.y - a.max.y).max(a.min.y - b.max.y).max(0));
    dx * dx + dy * dy
}

/// Different-net wires closer than the layer's minimum spacing. Only the
/// net with the lower id reports a pair.
fn check_spacing(db: &DesignDatabase, net: &Net, pieces: &[(LayerId, Rect)], out: &mut Vec<Violation>) {
    let mut reported = BTreeSet::new();
    for &(layer, rect) in pieces {
        let Some(spacing) = db
            .technology()
            .spacing_rule(layer)
            .map(|r| r.min_spacing)
            .filter(|s| *s > 0)
        else {
            continue;
        };
        let limit = i128::from(spacing) * i128::from(spacing);
        for (other, theirs) in db.route_shapes_in(layer, &rect.expand(spacing)) {
            if other <= net.id || theirs.overlaps(&rect) || gap_squared(&rect, &theirs) >= limit {
                continue;
            }
            if reported.insert((other, layer)) {
                out.push(
                    Violation::warning(
                        ViolationKind::MinSpacing,
                        format!(
                            "nets {} and {other} closer than {spacing} on layer {layer}",
                            net.name
                        ),
                    )
                    .on_layer(layer)
                    .at(rect.union(&theirs)),
                );
            }
        }
    }
}

// ── Connectivity ─────────────────────────────────────────────────────

/// Union-find over piece indices.
struct Components {
    parent: Vec<usize>,
}

impl Components {
    fn new(n: usize) -> Self {
        Self { parent: (0..n).collect() }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            // lower root wins so the result is order independent
            let (lo, hi) = (ra.min(rb), ra.max(rb));
            self.parent[hi] = lo;
        }
    }
}

/// Closed contact: abutting wire ends connect.
fn touches(a: &Shape, b: &Rect) -> bool {
    match a {
        Shape::Rect(r) => r.intersects(b),
        Shape::Polygon(p) => p.bbox().is_some_and(|bb| bb.intersects(b)),
    }
}

/// A routed net must join all of its terminals and leave no stray piece.
/// Nodes are terminals first, then segments, then vias; a via joins its
/// two metal pads into one node.
fn check_connectivity(db: &DesignDatabase, net: &Net, pieces: &[(LayerId, Rect)], out: &mut Vec<Violation>) {
    let terminals: Vec<_> = net.terminals.iter().map(|t| db.terminal_shapes(t)).collect();

    // (node, layer, rect) for every metal piece; cut footprints carry no current
    let mut metal: Vec<(usize, LayerId, Rect)> = Vec::new();
    let mut node = terminals.len();
    for seg in &net.route.segments {
        metal.push((node, seg.layer, seg.rect()));
        node += 1;
    }
    for via in &net.route.vias {
        metal.push((node, via.bottom, via.pad_rect()));
        metal.push((node, via.top, via.pad_rect()));
        node += 1;
    }
    let mut sets = Components::new(node);

    for (i, &(a, la, ra)) in metal.iter().enumerate() {
        for &(b, lb, rb) in &metal[i + 1..] {
            if la == lb && ra.intersects(&rb) {
                sets.union(a, b);
            }
        }
        for (t, shapes) in terminals.iter().enumerate() {
            if shapes.iter().any(|s| s.layer == la && touches(&s.shape, &ra)) {
                sets.union(t, a);
            }
        }
    }

    let bbox = pieces
        .iter()
        .map(|(_, r)| *r)
        .reduce(|a, b| a.union(&b));
    let root = sets.find(0);
    let mut missing = Vec::new();
    for (t, terminal) in net.terminals.iter().enumerate() {
        if terminals[t].is_empty() || sets.find(t) != root {
            missing.push(match terminal {
                Terminal::Pin { instance, pin } => db
                    .instance(*instance)
                    .map_or_else(|_| format!("{instance}/{pin}"), |i| format!("{}/{pin}", i.name)),
                Terminal::Port(port) => db
                    .ports()
                    .get(port.index())
                    .map_or_else(|| port.to_string(), |p| p.name.clone()),
            });
        }
    }
    let stray = (terminals.len()..node).any(|n| sets.find(n) != root);

    if !missing.is_empty() || stray {
        let mut message = format!("net {} is open", net.name);
        if !missing.is_empty() {
            message.push_str(&format!(": {} not connected", missing.join(", ")));
        }
        if stray {
            message.push_str(" (disconnected route pieces)");
        }
        let mut v = Violation::error(ViolationKind::Open, message);
        if let Some(bbox) = bbox {
            v = v.at(bbox);
        }
        out.push(v);
    }
}
