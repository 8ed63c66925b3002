//! Layer-aware routing grid.
//!
//! One node per (routing layer, x track, y track). Nodes, planar edges and
//! via edges each carry an [`Owner`]: obstructions and unconnected pins
//! block them, pin shapes reserve them for their net and committed routes
//! claim them. A net may use anything that is free or its own.
//!
//! Besides the regular tracks the grid carries a column and a row through
//! the centre of every placed pin and port, so pins narrower than the pitch
//! still have an access node of their own. Those nodes may sit closer than
//! a pitch to their neighbours; reservations are therefore made by
//! geometry, never by node alone.

use pnr_core::technology::ViaRule;
use pnr_core::{
    Coord, DesignDatabase, LayerId, LayerKind, LayerShape, NetId, PnrError, Point, Rect,
    Result, RouteSegment, RoutingDirection, Shape, Technology, Via,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    Free,
    Blocked,
    Net(NetId),
}

impl Owner {
    /// Combine two claims on the same resource. Two different nets, or
    /// anything with a blockage, leave it unusable.
    fn merge(self, other: Owner) -> Owner {
        match (self, other) {
            (Owner::Free, o) | (o, Owner::Free) => o,
            (Owner::Net(a), Owner::Net(b)) if a == b => Owner::Net(a),
            _ => Owner::Blocked,
        }
    }

    pub fn admits(self, net: NetId) -> bool {
        match self {
            Owner::Free => true,
            Owner::Net(n) => n == net,
            Owner::Blocked => false,
        }
    }
}

/// One move out of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Planar { length: Coord, preferred: bool },
    Via,
}

#[derive(Debug, Clone)]
pub struct GridLayer {
    pub id: LayerId,
    pub direction: RoutingDirection,
    pub width: Coord,
    /// Half side of the square covered by a wire end or via pad at a node.
    reach: Coord,
    /// Rule of the via to the next routing layer up.
    pub via_up: Option<ViaRule>,
}

/// Which grid resources a blockage or reservation applies to.
#[derive(Debug, Clone, Copy)]
enum Scope {
    Layer(usize),
    Cut(LayerId),
    All,
}

#[derive(Debug, Clone)]
pub struct RoutingGrid {
    layers: Vec<GridLayer>,
    xs: Vec<Coord>,
    ys: Vec<Coord>,
    nodes: Vec<Owner>,
    /// Wire from a node to its +x neighbour.
    east: Vec<Owner>,
    /// Wire from a node to its +y neighbour.
    north: Vec<Owner>,
    /// Via from a node to the node on the layer above.
    up: Vec<Owner>,
}

fn tracks(min: Coord, max: Coord, (pitch, offset): (Coord, Coord)) -> Vec<Coord> {
    let mut out = Vec::new();
    let mut t = min + offset;
    while t < max {
        if t >= min {
            out.push(t);
        }
        t += pitch;
    }
    out
}

/// Centres of every placed pin and port shape on a routing layer.
fn access_coordinates(db: &DesignDatabase) -> (Vec<Coord>, Vec<Coord>) {
    let tech = db.technology();
    let mut shapes: Vec<LayerShape> = Vec::new();
    for inst in db.instances().iter().filter(|i| i.is_placed()) {
        if let Some(geometry) = &inst.master.geometry {
            for pin in &geometry.pins {
                shapes.extend(inst.pin_shapes(&pin.name));
            }
        }
    }
    shapes.extend(db.ports().iter().filter_map(|p| p.shape()));

    let (mut xs, mut ys) = (Vec::new(), Vec::new());
    for s in shapes.iter().filter(|s| tech.is_routing_layer(s.layer)) {
        if let Some(bbox) = s.shape.bbox() {
            let c = bbox.center();
            xs.push(c.x);
            ys.push(c.y);
        }
    }
    (xs, ys)
}

/// Sorted union of `tracks` and the `extra` coordinates inside `[min, max)`.
fn merge_coordinates(mut tracks: Vec<Coord>, extra: Vec<Coord>, min: Coord, max: Coord) -> Vec<Coord> {
    tracks.extend(extra.into_iter().filter(|c| (min..max).contains(c)));
    tracks.sort_unstable();
    tracks.dedup();
    tracks
}

impl RoutingGrid {
    /// Grid over the boundary of `db` with every obstruction, keepout, pin,
    /// port and already committed route marked.
    pub fn build(db: &DesignDatabase) -> Result<Self> {
        let tech = db.technology();
        let boundary = db
            .boundary()
            .cloned()
            .ok_or_else(|| PnrError::InvalidState("no floorplan boundary".into()))?;
        let area = boundary
            .bbox()
            .ok_or_else(|| PnrError::InvalidState("empty floorplan boundary".into()))?;
        let routing = tech.routing_layers();
        if routing.is_empty() {
            return Err(PnrError::InvalidState("technology has no routing layers".into()));
        }
        let missing = || PnrError::InvalidState("no routing track pattern".into());
        let xs = tracks(
            area.min.x,
            area.max.x,
            tech.track_pattern(RoutingDirection::Vertical).ok_or_else(missing)?,
        );
        let ys = tracks(
            area.min.y,
            area.max.y,
            tech.track_pattern(RoutingDirection::Horizontal).ok_or_else(missing)?,
        );
        if xs.is_empty() || ys.is_empty() {
            return Err(PnrError::InvalidState("boundary holds no routing tracks".into()));
        }
        let (pin_xs, pin_ys) = access_coordinates(db);
        let xs = merge_coordinates(xs, pin_xs, area.min.x, area.max.x);
        let ys = merge_coordinates(ys, pin_ys, area.min.y, area.max.y);

        let mut layers: Vec<GridLayer> = routing
            .iter()
            .enumerate()
            .map(|(i, l)| GridLayer {
                id: l.id,
                direction: l.direction,
                width: l.width,
                reach: l.width / 2,
                via_up: routing
                    .get(i + 1)
                    .and_then(|above| tech.via_rule(l.id, above.id))
                    .cloned(),
            })
            .collect();
        for i in 0..layers.len() {
            let mut side = layers[i].width;
            if layers[i].via_up.is_some() {
                side = side.max(layers[i + 1].width);
            }
            if i > 0 && layers[i - 1].via_up.is_some() {
                side = side.max(layers[i - 1].width);
            }
            layers[i].reach = side / 2;
        }

        let count = layers.len() * xs.len() * ys.len();
        let mut grid = RoutingGrid {
            layers,
            xs,
            ys,
            nodes: vec![Owner::Free; count],
            east: vec![Owner::Free; count],
            north: vec![Owner::Free; count],
            up: vec![Owner::Free; count],
        };
        grid.clip_to(&boundary);
        grid.mark_design(db);
        log::debug!(
            "Routing grid {} x {} x {} layers, {} nodes blocked",
            grid.xs.len(),
            grid.ys.len(),
            grid.layers.len(),
            grid.nodes.iter().filter(|o| **o == Owner::Blocked).count()
        );
        Ok(grid)
    }

    // ── Indexing ─────────────────────────────────────────────────────

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn columns(&self) -> usize {
        self.xs.len()
    }

    pub fn rows(&self) -> usize {
        self.ys.len()
    }

    pub fn layers(&self) -> &[GridLayer] {
        &self.layers
    }

    pub fn node(&self, layer: usize, col: usize, row: usize) -> usize {
        (layer * self.ys.len() + row) * self.xs.len() + col
    }

    /// `(layer, col, row)` of a node index.
    pub fn coords(&self, node: usize) -> (usize, usize, usize) {
        let (nx, ny) = (self.xs.len(), self.ys.len());
        (node / (nx * ny), node % nx, (node / nx) % ny)
    }

    pub fn point(&self, node: usize) -> Point {
        let (_, c, r) = self.coords(node);
        Point::new(self.xs[c], self.ys[r])
    }

    pub fn layer_of(&self, node: usize) -> &GridLayer {
        &self.layers[self.coords(node).0]
    }

    pub fn owner(&self, node: usize) -> Owner {
        self.nodes[node]
    }

    /// Node of `layer` at exactly `p`, if `p` lies on a column and a row.
    pub fn node_at(&self, layer: usize, p: Point) -> Option<usize> {
        let col = self.xs.binary_search(&p.x).ok()?;
        let row = self.ys.binary_search(&p.y).ok()?;
        (layer < self.layers.len()).then(|| self.node(layer, col, row))
    }

    /// Mark a node as used by a committed route of `net`.
    pub fn claim(&mut self, node: usize, net: NetId) {
        self.nodes[node] = self.nodes[node].merge(Owner::Net(net));
    }

    fn square(&self, col: usize, row: usize, half: Coord) -> Rect {
        let (x, y) = (self.xs[col], self.ys[row]);
        Rect::new(x - half, y - half, x + half, y + half)
    }

    fn wire_square(&self, node: usize) -> Rect {
        let (l, c, r) = self.coords(node);
        self.square(c, r, self.layers[l].width / 2)
    }

    /// Index range of `tracks` whose square of half side `half` may overlap
    /// `[lo, hi)`, widened by one track below for edges starting there.
    fn span(tracks: &[Coord], lo: Coord, hi: Coord, half: Coord) -> std::ops::Range<usize> {
        let start = tracks.partition_point(|t| t + half <= lo).saturating_sub(1);
        let end = tracks.partition_point(|t| t - half < hi);
        start..end.max(start)
    }

    // ── Marking ──────────────────────────────────────────────────────

    fn clip_to(&mut self, boundary: &Shape) {
        let (nx, ny) = (self.xs.len(), self.ys.len());
        for l in 0..self.layers.len() {
            let (reach, half) = (self.layers[l].reach, self.layers[l].width / 2);
            let has_via = self.layers[l].via_up.is_some();
            for r in 0..ny {
                for c in 0..nx {
                    let i = self.node(l, c, r);
                    if !boundary.contains_rect(&self.square(c, r, reach)) {
                        self.nodes[i] = Owner::Blocked;
                    }
                    let p = Point::new(self.xs[c], self.ys[r]);
                    if c + 1 == nx
                        || !boundary.contains_rect(
                            &Rect::from_corners(p, Point::new(self.xs[c + 1], p.y)).expand(half),
                        )
                    {
                        self.east[i] = Owner::Blocked;
                    }
                    if r + 1 == ny
                        || !boundary.contains_rect(
                            &Rect::from_corners(p, Point::new(p.x, self.ys[r + 1])).expand(half),
                        )
                    {
                        self.north[i] = Owner::Blocked;
                    }
                    if !has_via {
                        self.up[i] = Owner::Blocked;
                    }
                }
            }
        }
    }

    fn scope_of(&self, tech: &Technology, layer: Option<LayerId>) -> Option<Scope> {
        let Some(id) = layer else {
            return Some(Scope::All);
        };
        if let Some(l) = self.layers.iter().position(|g| g.id == id) {
            return Some(Scope::Layer(l));
        }
        match tech.layer(id)?.kind {
            LayerKind::Obstruction => Some(Scope::All),
            LayerKind::Cut => Some(Scope::Cut(id)),
            _ => None,
        }
    }

    fn mark_design(&mut self, db: &DesignDatabase) {
        let tech = db.technology();
        for obs in db.obstructions().iter().chain(db.keepouts().iter()) {
            if let Some(scope) = self.scope_of(tech, obs.layer) {
                self.mark(scope, &obs.shape, Owner::Blocked);
            }
        }

        for inst in db.instances().iter().filter(|i| i.is_placed()) {
            let Some(geometry) = &inst.master.geometry else {
                continue;
            };
            for pin in &geometry.pins {
                let owner = db
                    .net_of_pin(inst.id, &pin.name)
                    .map_or(Owner::Blocked, Owner::Net);
                for s in inst.pin_shapes(&pin.name) {
                    if let Some(scope) = self.scope_of(tech, Some(s.layer)) {
                        self.mark(scope, &s.shape, owner);
                    }
                }
            }
        }

        for port in db.ports() {
            let owner = port.net.map_or(Owner::Blocked, Owner::Net);
            if let Some(s) = port.shape() {
                if let Some(scope) = self.scope_of(tech, Some(s.layer)) {
                    self.mark(scope, &s.shape, owner);
                }
            }
        }

        for net in db.nets() {
            self.mark_route(tech, net.id, &net.route.segments, &net.route.vias);
        }
    }

    /// Reserve for `net` every node and edge its wires and vias touch.
    pub fn mark_route(&mut self, tech: &Technology, net: NetId, segments: &[RouteSegment], vias: &[Via]) {
        let owner = Owner::Net(net);
        for seg in segments {
            if let Some(scope) = self.scope_of(tech, Some(seg.layer)) {
                self.mark(scope, &Shape::Rect(seg.rect()), owner);
            }
        }
        for via in vias {
            for (layer, rect) in via.footprints() {
                if let Some(scope) = self.scope_of(tech, Some(layer)) {
                    self.mark(scope, &Shape::Rect(rect), owner);
                }
            }
        }
    }

    fn mark(&mut self, scope: Scope, shape: &Shape, owner: Owner) {
        let Some(bbox) = shape.bbox() else {
            return;
        };
        match scope {
            Scope::Layer(l) => self.mark_layer(l, shape, &bbox, owner),
            Scope::Cut(cut) => self.mark_cuts(Some(cut), shape, &bbox, owner),
            Scope::All => {
                for l in 0..self.layers.len() {
                    self.mark_layer(l, shape, &bbox, owner);
                }
                self.mark_cuts(None, shape, &bbox, owner);
            }
        }
    }

    fn mark_layer(&mut self, l: usize, shape: &Shape, bbox: &Rect, owner: Owner) {
        let (reach, half) = (self.layers[l].reach, self.layers[l].width / 2);
        let cols = Self::span(&self.xs, bbox.min.x, bbox.max.x, reach);
        let rows = Self::span(&self.ys, bbox.min.y, bbox.max.y, reach);
        for r in rows {
            for c in cols.clone() {
                let i = self.node(l, c, r);
                if shape.overlaps_rect(&self.square(c, r, reach)) {
                    self.nodes[i] = self.nodes[i].merge(owner);
                }
                let p = Point::new(self.xs[c], self.ys[r]);
                if let Some(&x) = self.xs.get(c + 1) {
                    let strip = Rect::from_corners(p, Point::new(x, p.y)).expand(half);
                    if shape.overlaps_rect(&strip) {
                        self.east[i] = self.east[i].merge(owner);
                    }
                }
                if let Some(&y) = self.ys.get(r + 1) {
                    let strip = Rect::from_corners(p, Point::new(p.x, y)).expand(half);
                    if shape.overlaps_rect(&strip) {
                        self.north[i] = self.north[i].merge(owner);
                    }
                }
            }
        }
    }

    /// Via edges whose cut (on `cut`, or on any cut layer when `None`)
    /// overlaps `shape`.
    fn mark_cuts(&mut self, cut: Option<LayerId>, shape: &Shape, bbox: &Rect, owner: Owner) {
        for l in 0..self.layers.len() {
            let Some(rule) = self.layers[l].via_up.clone() else {
                continue;
            };
            if rule.cut.is_none() || (cut.is_some() && rule.cut != cut) {
                continue;
            }
            let half = rule.cut_size / 2;
            let cols = Self::span(&self.xs, bbox.min.x, bbox.max.x, half);
            let rows = Self::span(&self.ys, bbox.min.y, bbox.max.y, half);
            for r in rows {
                for c in cols.clone() {
                    let centre = Point::new(self.xs[c], self.ys[r]);
                    if shape.overlaps_rect(&rule.cut_rect(centre)) {
                        let i = self.node(l, c, r);
                        self.up[i] = self.up[i].merge(owner);
                    }
                }
            }
        }
    }

    // ── Search support ───────────────────────────────────────────────

    /// Moves `net` may take out of `node`, in a fixed order: west, east,
    /// south, north, down, up.
    pub fn neighbors(&self, node: usize, net: NetId) -> impl Iterator<Item = (usize, Step)> {
        let (l, c, r) = self.coords(node);
        let (nx, ny) = (self.xs.len(), self.ys.len());
        let layer_size = nx * ny;
        let dir = self.layers[l].direction;
        let horizontal_ok = dir != RoutingDirection::Vertical;
        let vertical_ok = dir != RoutingDirection::Horizontal;
        let free = |edge: Owner, next: usize| edge.admits(net) && self.nodes[next].admits(net);

        let mut out: [Option<(usize, Step)>; 6] = [None; 6];
        if c > 0 && free(self.east[node - 1], node - 1) {
            let length = self.xs[c] - self.xs[c - 1];
            out[0] = Some((node - 1, Step::Planar { length, preferred: horizontal_ok }));
        }
        if c + 1 < nx && free(self.east[node], node + 1) {
            let length = self.xs[c + 1] - self.xs[c];
            out[1] = Some((node + 1, Step::Planar { length, preferred: horizontal_ok }));
        }
        if r > 0 && free(self.north[node - nx], node - nx) {
            let length = self.ys[r] - self.ys[r - 1];
            out[2] = Some((node - nx, Step::Planar { length, preferred: vertical_ok }));
        }
        if r + 1 < ny && free(self.north[node], node + nx) {
            let length = self.ys[r + 1] - self.ys[r];
            out[3] = Some((node + nx, Step::Planar { length, preferred: vertical_ok }));
        }
        if l > 0 && free(self.up[node - layer_size], node - layer_size) {
            out[4] = Some((node - layer_size, Step::Via));
        }
        if l + 1 < self.layers.len() && free(self.up[node], node + layer_size) {
            out[5] = Some((node + layer_size, Step::Via));
        }
        out.into_iter().flatten()
    }

    /// Whether `net` may still take the move between two neighbouring
    /// nodes, as returned by [`Self::neighbors`].
    pub fn step_admits(&self, a: usize, b: usize, net: NetId) -> bool {
        let lo = a.min(b);
        let ((la, _, ra), (lb, _, rb)) = (self.coords(a), self.coords(b));
        let edge = if la != lb {
            self.up[lo]
        } else if ra == rb {
            self.east[lo]
        } else {
            self.north[lo]
        };
        edge.admits(net) && self.nodes[a].admits(net) && self.nodes[b].admits(net)
    }

    /// Node reserved for `net` on one of `shapes` whose wire square touches
    /// the shape, nearest to `centre` (ties to the lower index).
    pub fn access_node(&self, net: NetId, shapes: &[LayerShape], centre: Point) -> Option<usize> {
        let mut best: Option<(Coord, usize)> = None;
        for s in shapes {
            let Some(l) = self.layers.iter().position(|g| g.id == s.layer) else {
                continue;
            };
            let Some(bbox) = s.shape.bbox() else {
                continue;
            };
            let reach = self.layers[l].reach;
            let cols = Self::span(&self.xs, bbox.min.x, bbox.max.x, reach);
            let rows = Self::span(&self.ys, bbox.min.y, bbox.max.y, reach);
            for r in rows {
                for c in cols.clone() {
                    let i = self.node(l, c, r);
                    if self.nodes[i] != Owner::Net(net) || !s.shape.overlaps_rect(&self.wire_square(i)) {
                        continue;
                    }
                    let key = (self.point(i).manhattan_distance(&centre), i);
                    if best.map_or(true, |b| key < b) {
                        best = Some(key);
                    }
                }
            }
        }
        best.map(|(_, i)| i)
    }

    // ── Geometry ─────────────────────────────────────────────────────

    /// Wire between two nodes on one layer.
    pub fn segment(&self, from: usize, to: usize) -> RouteSegment {
        let layer = self.layer_of(from);
        RouteSegment {
            layer: layer.id,
            start: self.point(from),
            end: self.point(to),
            width: layer.width,
        }
    }

    /// Via from `node` to the layer above it.
    pub fn via(&self, node: usize) -> Option<Via> {
        let (l, _, _) = self.coords(node);
        let (lower, upper) = (&self.layers[l], self.layers.get(l + 1)?);
        let rule = lower.via_up.as_ref()?;
        Some(Via {
            rule: rule.name.clone(),
            position: self.point(node),
            bottom: lower.id,
            top: upper.id,
            cut: rule.cut,
            pad: lower.width.max(upper.width),
            cut_size: rule.cut_size,
        })
    }
}
