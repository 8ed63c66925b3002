use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cell::{CellMaster, LayerShape};
use crate::error::{PnrError, Result};
use crate::geometry::{Coord, Orientation, Point, Rect, Shape};
use crate::ids::{InstanceId, LayerId, NetId, ObstructionId, PortId, ShapeId};
use crate::library::CellLibrary;
use crate::netlist::{NetlistGraph, PortDirection, Terminal};
use crate::spatial::SpatialIndex;
use crate::technology::Technology;

// ── Entities ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlacementStatus {
    #[default]
    Unplaced,
    Placed,
    /// Placed and never moved by the floorplanner.
    Fixed,
}

/// A placed (or not yet placed) use of a cell master.
#[derive(Debug, Clone)]
pub struct Instance {
    pub id: InstanceId,
    pub name: String,
    pub master: Arc<CellMaster>,
    /// Lower-left corner of the placed footprint.
    pub position: Point,
    pub orientation: Orientation,
    pub status: PlacementStatus,
    shape: Option<ShapeId>,
}

impl Instance {
    pub fn is_placed(&self) -> bool {
        self.status != PlacementStatus::Unplaced
    }

    pub fn is_fixed(&self) -> bool {
        self.status == PlacementStatus::Fixed
    }

    /// Footprint the instance would occupy at `position` in `orientation`.
    pub fn footprint_at(&self, position: Point, orientation: Orientation) -> Rect {
        let (w, h) = self.master.size();
        let (pw, ph) = orientation.placed_size(w, h);
        Rect::from_origin_size(position, pw, ph)
    }

    /// Current footprint, if placed.
    pub fn bbox(&self) -> Option<Rect> {
        self.is_placed()
            .then(|| self.footprint_at(self.position, self.orientation))
    }

    /// Shapes of a pin in design coordinates.
    pub fn pin_shapes(&self, pin: &str) -> Vec<LayerShape> {
        let (w, h) = self.master.size();
        self.master
            .pin(pin)
            .map(|p| {
                p.shapes
                    .iter()
                    .map(|s| LayerShape {
                        layer: s.layer,
                        shape: self
                            .orientation
                            .transform_shape(&s.shape, w, h, self.position),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Cell blockages (keepouts) in design coordinates.
    pub fn keepout_shapes(&self) -> Vec<LayerShape> {
        let (w, h) = self.master.size();
        self.master
            .geometry
            .iter()
            .flat_map(|g| g.obstructions.iter())
            .map(|s| LayerShape {
                layer: s.layer,
                shape: self
                    .orientation
                    .transform_shape(&s.shape, w, h, self.position),
            })
            .collect()
    }
}

/// Top-level I/O terminal of the design.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Port {
    pub id: PortId,
    pub name: String,
    pub direction: PortDirection,
    pub net: Option<NetId>,
    pub position: Option<Point>,
    pub layer: Option<LayerId>,
    /// Side of the square pin shape.
    pub size: Coord,
}

impl Port {
    pub fn shape(&self) -> Option<LayerShape> {
        let (p, layer) = (self.position?, self.layer?);
        let h = self.size / 2;
        Some(LayerShape {
            layer,
            shape: Shape::Rect(Rect::new(p.x - h, p.y - h, p.x + h, p.y + h)),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObstructionScope {
    /// From the floorplan; blocks placement and routing.
    Global,
    /// Blockage inside a placed cell; follows the instance.
    Keepout(InstanceId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Obstruction {
    /// `None` blocks every layer.
    pub layer: Option<LayerId>,
    pub shape: Shape,
    pub scope: ObstructionScope,
}

impl Obstruction {
    pub fn blocks_layer(&self, layer: LayerId) -> bool {
        self.layer.map_or(true, |l| l == layer)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RouteState {
    #[default]
    Unrouted,
    InProgress,
    Routed,
    Failed,
}

/// Straight wire on a routing layer, from centreline `start` to `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouteSegment {
    pub layer: LayerId,
    pub start: Point,
    pub end: Point,
    pub width: Coord,
}

impl RouteSegment {
    /// Wire footprint, extended by half a width past each end.
    pub fn rect(&self) -> Rect {
        Rect::from_corners(self.start, self.end).expand(self.width / 2)
    }

    pub fn length(&self) -> Coord {
        self.start.manhattan_distance(&self.end)
    }
}

/// Layer change between two adjacent routing layers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Via {
    pub rule: String,
    pub position: Point,
    pub bottom: LayerId,
    pub top: LayerId,
    pub cut: Option<LayerId>,
    /// Side of the square landing pad on both metal layers.
    pub pad: Coord,
    pub cut_size: Coord,
}

impl Via {
    pub fn pad_rect(&self) -> Rect {
        square(self.position, self.pad)
    }

    pub fn cut_rect(&self) -> Rect {
        square(self.position, self.cut_size)
    }

    /// Every (layer, rect) the via occupies.
    pub fn footprints(&self) -> Vec<(LayerId, Rect)> {
        let mut out = vec![(self.bottom, self.pad_rect()), (self.top, self.pad_rect())];
        if let Some(cut) = self.cut {
            out.push((cut, self.cut_rect()));
        }
        out
    }
}

fn square(center: Point, side: Coord) -> Rect {
    let h = side / 2;
    Rect::new(center.x - h, center.y - h, center.x + h, center.y + h)
}

#[derive(Debug, Clone, Default)]
pub struct NetRoute {
    pub state: RouteState,
    pub segments: Vec<RouteSegment>,
    pub vias: Vec<Via>,
    pub failure: Option<String>,
    shapes: Vec<(LayerId, ShapeId)>,
}

#[derive(Debug, Clone)]
pub struct Net {
    pub id: NetId,
    pub name: String,
    pub terminals: Vec<Terminal>,
    pub route: NetRoute,
}

// ── Database ─────────────────────────────────────────────────────────

/// The single mutable store of a design: boundary, obstructions, instance
/// placement and net routing. Every overlap query goes through an R-tree.
#[derive(Debug, Clone)]
pub struct DesignDatabase {
    pub name: String,
    tech: Arc<Technology>,
    boundary: Option<Shape>,
    instances: Vec<Instance>,
    instance_index: SpatialIndex<InstanceId>,
    ports: Vec<Port>,
    nets: Vec<Net>,
    obstructions: Vec<Obstruction>,
    obstruction_index: SpatialIndex<ObstructionId>,
    route_index: Vec<SpatialIndex<NetId>>,
    pin_nets: HashMap<(InstanceId, String), NetId>,
    instance_nets: Vec<Vec<NetId>>,
}

impl DesignDatabase {
    pub fn new(name: &str, tech: Arc<Technology>) -> Self {
        let layer_count = tech.layers().layer_count();
        Self {
            name: name.to_string(),
            tech,
            boundary: None,
            instances: Vec::new(),
            instance_index: SpatialIndex::new(),
            ports: Vec::new(),
            nets: Vec::new(),
            obstructions: Vec::new(),
            obstruction_index: SpatialIndex::new(),
            route_index: (0..layer_count).map(|_| SpatialIndex::new()).collect(),
            pin_nets: HashMap::new(),
            instance_nets: Vec::new(),
        }
    }

    /// Database populated with the unplaced instances, ports and nets of an
    /// elaborated netlist. Ids follow netlist order.
    pub fn from_netlist(tech: Arc<Technology>, netlist: &NetlistGraph) -> Result<Self> {
        let mut db = Self::new(&netlist.name, tech);
        for inst in &netlist.instances {
            db.create_instance(&inst.name, Arc::clone(&inst.master))?;
        }
        for port in &netlist.ports {
            db.add_port(&port.name, port.direction);
        }
        for net in &netlist.nets {
            db.add_net(&net.name, net.terminals.clone())?;
        }
        Ok(db)
    }

    pub fn technology(&self) -> &Arc<Technology> {
        &self.tech
    }

    // ── Netlist objects ──────────────────────────────────────────────

    pub fn create_instance(&mut self, name: &str, master: Arc<CellMaster>) -> Result<InstanceId> {
        if !master.is_placeable() {
            return Err(PnrError::UnresolvedCellReference {
                instance: name.to_string(),
                cell: master.name.clone(),
            });
        }
        let id = InstanceId::from_index(self.instances.len());
        self.instances.push(Instance {
            id,
            name: name.to_string(),
            master,
            position: Point::default(),
            orientation: Orientation::N,
            status: PlacementStatus::Unplaced,
            shape: None,
        });
        self.instance_nets.push(Vec::new());
        Ok(id)
    }

    pub fn add_port(&mut self, name: &str, direction: PortDirection) -> PortId {
        let id = PortId::from_index(self.ports.len());
        let size = self
            .tech
            .routing_layers()
            .first()
            .map_or(0, |l| l.width);
        self.ports.push(Port {
            id,
            name: name.to_string(),
            direction,
            net: None,
            position: None,
            layer: None,
            size,
        });
        id
    }

    /// Add a net over existing terminals. Single-terminal nets are rejected.
    pub fn add_net(&mut self, name: &str, terminals: Vec<Terminal>) -> Result<NetId> {
        if terminals.len() < 2 {
            return Err(PnrError::DanglingPin {
                net: name.to_string(),
                terminals: terminals.len(),
            });
        }
        let id = NetId::from_index(self.nets.len());
        for t in &terminals {
            match t {
                Terminal::Pin { instance, pin } => {
                    let inst = self.instance(*instance)?;
                    if inst.master.pin(pin).is_none() {
                        return Err(PnrError::UnknownPin {
                            instance: inst.name.clone(),
                            pin: pin.clone(),
                        });
                    }
                    if let Some(other) = self.pin_nets.get(&(*instance, pin.clone())) {
                        return Err(PnrError::PinConflict {
                            instance: inst.name.clone(),
                            pin: pin.clone(),
                            first: self.nets[other.index()].name.clone(),
                            second: name.to_string(),
                        });
                    }
                }
                Terminal::Port(port) => {
                    let p = self
                        .ports
                        .get(port.index())
                        .ok_or_else(|| PnrError::InvalidState(format!("unknown port {port}")))?;
                    if p.net.is_some() {
                        return Err(PnrError::PinConflict {
                            instance: String::new(),
                            pin: p.name.clone(),
                            first: p.net.map(|n| self.nets[n.index()].name.clone()).unwrap_or_default(),
                            second: name.to_string(),
                        });
                    }
                }
            }
        }
        for t in &terminals {
            match t {
                Terminal::Pin { instance, pin } => {
                    self.pin_nets.insert((*instance, pin.clone()), id);
                    let nets = &mut self.instance_nets[instance.index()];
                    if !nets.contains(&id) {
                        nets.push(id);
                    }
                }
                Terminal::Port(port) => self.ports[port.index()].net = Some(id),
            }
        }
        self.nets.push(Net {
            id,
            name: name.to_string(),
            terminals,
            route: NetRoute::default(),
        });
        Ok(id)
    }

    pub fn instance(&self, id: InstanceId) -> Result<&Instance> {
        self.instances
            .get(id.index())
            .ok_or(PnrError::UnknownInstance(id))
    }

    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    pub fn instance_by_name(&self, name: &str) -> Option<&Instance> {
        self.instances.iter().find(|i| i.name == name)
    }

    pub fn net(&self, id: NetId) -> Result<&Net> {
        self.nets.get(id.index()).ok_or(PnrError::UnknownNet(id))
    }

    pub fn nets(&self) -> &[Net] {
        &self.nets
    }

    pub fn net_by_name(&self, name: &str) -> Option<&Net> {
        self.nets.iter().find(|n| n.name == name)
    }

    pub fn ports(&self) -> &[Port] {
        &self.ports
    }

    pub fn net_of_pin(&self, instance: InstanceId, pin: &str) -> Option<NetId> {
        self.pin_nets.get(&(instance, pin.to_string())).copied()
    }

    /// Nets with at least one pin on the instance, in net id order.
    pub fn nets_of_instance(&self, instance: InstanceId) -> &[NetId] {
        self.instance_nets
            .get(instance.index())
            .map_or(&[], Vec::as_slice)
    }

    // ── Floorplan ────────────────────────────────────────────────────

    /// Set the legal placement region. Only allowed before anything is placed.
    pub fn set_boundary(&mut self, boundary: Shape) -> Result<()> {
        if self.instances.iter().any(Instance::is_placed) {
            return Err(PnrError::InvalidState(
                "boundary cannot change once instances are placed".into(),
            ));
        }
        match boundary.bbox() {
            Some(bb) if !bb.is_degenerate() => {}
            _ => {
                return Err(PnrError::InvalidState(
                    "floorplan boundary is empty".into(),
                ))
            }
        }
        self.boundary = Some(boundary);
        Ok(())
    }

    pub fn boundary(&self) -> Option<&Shape> {
        self.boundary.as_ref()
    }

    pub fn boundary_rect(&self) -> Option<Rect> {
        self.boundary.as_ref().and_then(Shape::bbox)
    }

    /// True when `shape` lies entirely within the floorplan boundary.
    pub fn boundary_contains(&self, shape: &Shape) -> bool {
        let Some(boundary) = &self.boundary else {
            return false;
        };
        match shape {
            Shape::Rect(r) => boundary.contains_rect(r),
            // conservative for polygons: test the bounding box
            Shape::Polygon(p) => p.bbox().is_some_and(|bb| boundary.contains_rect(&bb)),
        }
    }

    /// Interior overlap of two shapes; touching edges do not overlap.
    pub fn overlaps(&self, a: &Shape, b: &Shape) -> bool {
        a.overlaps(b)
    }

    pub fn add_obstruction(&mut self, layer: Option<LayerId>, shape: Shape) -> Result<ObstructionId> {
        if self.instances.iter().any(Instance::is_placed) {
            return Err(PnrError::InvalidState(
                "obstructions must be loaded before placement".into(),
            ));
        }
        if let Some(l) = layer {
            if self.tech.layer(l).is_none() {
                return Err(PnrError::InvalidState(format!("unknown layer {l}")));
            }
        }
        let bbox = shape
            .bbox()
            .ok_or_else(|| PnrError::InvalidState("empty obstruction shape".into()))?;
        let id = ObstructionId::from_index(self.obstructions.len());
        self.obstructions.push(Obstruction {
            layer,
            shape,
            scope: ObstructionScope::Global,
        });
        self.obstruction_index.insert(bbox, id);
        Ok(id)
    }

    pub fn obstructions(&self) -> &[Obstruction] {
        &self.obstructions
    }

    /// Global obstructions whose interior overlaps `rect`.
    pub fn obstructions_overlapping(&self, rect: &Rect) -> Vec<ObstructionId> {
        self.obstruction_index
            .query_overlapping(rect)
            .into_iter()
            .filter_map(|s| self.obstruction_index.get(s).map(|(_, id)| *id))
            .filter(|id| self.obstructions[id.index()].shape.overlaps_rect(rect))
            .collect()
    }

    /// Keepouts of every placed instance, in instance order.
    pub fn keepouts(&self) -> Vec<Obstruction> {
        self.instances
            .iter()
            .filter(|i| i.is_placed())
            .flat_map(|i| {
                i.keepout_shapes().into_iter().map(move |s| Obstruction {
                    layer: Some(s.layer),
                    shape: s.shape,
                    scope: ObstructionScope::Keepout(i.id),
                })
            })
            .collect()
    }

    // ── Placement ────────────────────────────────────────────────────

    /// Placed instances whose footprint overlaps `rect`, ascending id.
    pub fn instances_overlapping(&self, rect: &Rect) -> Vec<InstanceId> {
        let mut ids: Vec<InstanceId> = self
            .instance_index
            .query_overlapping(rect)
            .into_iter()
            .filter_map(|s| self.instance_index.get(s).map(|(_, id)| *id))
            .collect();
        ids.sort();
        ids
    }

    /// Is `rect` a legal footprint: inside the boundary, clear of global
    /// obstructions and of every placed instance other than `ignore`.
    pub fn is_free(&self, rect: &Rect, ignore: Option<InstanceId>) -> bool {
        self.check_footprint(rect, ignore).is_ok()
    }

    fn check_footprint(&self, rect: &Rect, ignore: Option<InstanceId>) -> std::result::Result<(), String> {
        if !self.boundary_contains(&Shape::Rect(*rect)) {
            return Err(format!("{rect:?} is not inside the floorplan boundary"));
        }
        if let Some(obs) = self.obstructions_overlapping(rect).first() {
            return Err(format!("overlaps obstruction {obs}"));
        }
        let blocker = self
            .instance_index
            .query_overlapping(rect)
            .into_iter()
            .filter_map(|s| self.instance_index.get(s).map(|(_, id)| *id))
            .find(|id| Some(*id) != ignore);
        match blocker {
            Some(other) => Err(format!("overlaps instance {}", self.instances[other.index()].name)),
            None => Ok(()),
        }
    }

    fn check_movable(&self, id: InstanceId) -> Result<&Instance> {
        let inst = self.instance(id)?;
        if inst.is_fixed() {
            return Err(PnrError::PlacementCollision {
                instance: id,
                reason: "instance is fixed".into(),
            });
        }
        if self.nets_of_instance(id).iter().any(|n| {
            self.nets[n.index()].route.state != RouteState::Unrouted
        }) {
            return Err(PnrError::InvalidState(format!(
                "instance {} has routed nets; clear routes before moving it",
                inst.name
            )));
        }
        Ok(inst)
    }

    /// Move an instance. The move is checked first and either fully
    /// committed or rejected with `PlacementCollision`, leaving the
    /// database unchanged.
    pub fn set_position(&mut self, id: InstanceId, position: Point, orientation: Orientation) -> Result<()> {
        let inst = self.check_movable(id)?;
        let rect = inst.footprint_at(position, orientation);
        self.check_footprint(&rect, Some(id))
            .map_err(|reason| PnrError::PlacementCollision { instance: id, reason })?;
        self.commit_position(id, position, orientation, PlacementStatus::Placed, rect);
        Ok(())
    }

    /// Place an instance and mark it fixed.
    pub fn place_fixed(&mut self, id: InstanceId, position: Point, orientation: Orientation) -> Result<()> {
        let inst = self.check_movable(id)?;
        let rect = inst.footprint_at(position, orientation);
        self.check_footprint(&rect, Some(id))
            .map_err(|reason| PnrError::PlacementCollision { instance: id, reason })?;
        self.commit_position(id, position, orientation, PlacementStatus::Fixed, rect);
        Ok(())
    }

    pub fn clear_position(&mut self, id: InstanceId) -> Result<()> {
        self.check_movable(id)?;
        let inst = &mut self.instances[id.index()];
        if let Some(shape) = inst.shape.take() {
            self.instance_index.remove(shape);
        }
        inst.status = PlacementStatus::Unplaced;
        Ok(())
    }

    fn commit_position(
        &mut self,
        id: InstanceId,
        position: Point,
        orientation: Orientation,
        status: PlacementStatus,
        rect: Rect,
    ) {
        let inst = &mut self.instances[id.index()];
        inst.position = position;
        inst.orientation = orientation;
        inst.status = status;
        match inst.shape {
            Some(shape) => {
                self.instance_index.update(shape, rect);
            }
            None => inst.shape = Some(self.instance_index.insert(rect, id)),
        }
        log::debug!("Placed {} at ({}, {}) {}", inst.name, position.x, position.y, orientation.name());
    }

    pub fn set_port_position(&mut self, id: PortId, position: Point, layer: LayerId) -> Result<()> {
        if !self.tech.is_routing_layer(layer) {
            return Err(PnrError::InvalidState(format!(
                "port layer {layer} is not a routing layer"
            )));
        }
        let inside = self
            .boundary_rect()
            .is_some_and(|b| b.contains_point(&position));
        if !inside {
            return Err(PnrError::InvalidState(format!(
                "port position ({}, {}) is outside the boundary",
                position.x, position.y
            )));
        }
        let port = self
            .ports
            .get_mut(id.index())
            .ok_or_else(|| PnrError::InvalidState(format!("unknown port {id}")))?;
        port.position = Some(position);
        port.layer = Some(layer);
        Ok(())
    }

    /// Shapes of a terminal in design coordinates; empty if not yet placed.
    pub fn terminal_shapes(&self, terminal: &Terminal) -> Vec<LayerShape> {
        match terminal {
            Terminal::Pin { instance, pin } => self
                .instances
                .get(instance.index())
                .filter(|i| i.is_placed())
                .map(|i| i.pin_shapes(pin))
                .unwrap_or_default(),
            Terminal::Port(port) => self
                .ports
                .get(port.index())
                .and_then(Port::shape)
                .into_iter()
                .collect(),
        }
    }

    /// Representative location of a terminal used for wirelength estimates.
    pub fn terminal_location(&self, terminal: &Terminal) -> Option<Point> {
        match terminal {
            Terminal::Pin { instance, pin } => {
                let inst = self.instances.get(instance.index())?;
                if !inst.is_placed() {
                    return None;
                }
                let center = inst
                    .pin_shapes(pin)
                    .iter()
                    .filter_map(|s| s.shape.bbox())
                    .reduce(|a, b| a.union(&b))
                    .map(|r| r.center());
                center.or_else(|| inst.bbox().map(|b| b.center()))
            }
            Terminal::Port(port) => self.ports.get(port.index())?.position,
        }
    }

    /// Half-perimeter of the bounding box of the net's placed terminals.
    pub fn net_hpwl(&self, net: NetId) -> Coord {
        let points: Vec<Point> = self.nets[net.index()]
            .terminals
            .iter()
            .filter_map(|t| self.terminal_location(t))
            .collect();
        Rect::from_points(&points).map_or(0, |r| r.half_perimeter())
    }

    pub fn total_hpwl(&self) -> Coord {
        (0..self.nets.len())
            .map(|i| self.net_hpwl(NetId::from_index(i)))
            .sum()
    }

    // ── Routing ──────────────────────────────────────────────────────

    fn net_mut(&mut self, id: NetId) -> Result<&mut Net> {
        self.nets.get_mut(id.index()).ok_or(PnrError::UnknownNet(id))
    }

    fn expect_state(&self, id: NetId, expected: RouteState) -> Result<()> {
        let state = self.net(id)?.route.state;
        if state != expected {
            return Err(PnrError::InvalidState(format!(
                "net {id} is {state:?}, expected {expected:?}"
            )));
        }
        Ok(())
    }

    /// UNROUTED -> IN_PROGRESS.
    pub fn begin_route(&mut self, net: NetId) -> Result<()> {
        self.expect_state(net, RouteState::Unrouted)?;
        self.net_mut(net)?.route.state = RouteState::InProgress;
        Ok(())
    }

    /// IN_PROGRESS -> ROUTED.
    pub fn finish_route(&mut self, net: NetId) -> Result<()> {
        self.expect_state(net, RouteState::InProgress)?;
        self.net_mut(net)?.route.state = RouteState::Routed;
        Ok(())
    }

    /// IN_PROGRESS -> FAILED. Partial geometry is removed.
    pub fn fail_route(&mut self, net: NetId, reason: &str) -> Result<()> {
        self.expect_state(net, RouteState::InProgress)?;
        self.remove_route_geometry(net);
        let n = self.net_mut(net)?;
        n.route.state = RouteState::Failed;
        n.route.failure = Some(reason.to_string());
        Ok(())
    }

    fn remove_route_geometry(&mut self, net: NetId) {
        let n = &mut self.nets[net.index()];
        for (layer, shape) in n.route.shapes.drain(..) {
            self.route_index[layer.index()].remove(shape);
        }
        n.route.segments.clear();
        n.route.vias.clear();
    }

    /// Reset every net to UNROUTED and drop all routing geometry.
    pub fn clear_routes(&mut self) {
        for i in 0..self.nets.len() {
            self.remove_route_geometry(NetId::from_index(i));
            let route = &mut self.nets[i].route;
            route.state = RouteState::Unrouted;
            route.failure = None;
        }
        log::info!("Cleared routes of {} nets", self.nets.len());
    }

    /// Why `rect` on `layer` cannot carry geometry of `net`, if it cannot.
    fn route_conflict(&self, net: NetId, layer: LayerId, rect: &Rect) -> Option<String> {
        let foreign = self
            .route_index
            .get(layer.index())?
            .any_overlapping(rect, |_, owner| *owner != net);
        if foreign {
            return Some(format!("overlaps another net on layer {layer}"));
        }
        let blocked = self
            .obstructions_overlapping(rect)
            .into_iter()
            .any(|o| self.obstructions[o.index()].blocks_layer(layer));
        if blocked {
            return Some(format!("overlaps an obstruction on layer {layer}"));
        }
        for inst in self.instances_overlapping(rect) {
            let keepout = self.instances[inst.index()]
                .keepout_shapes()
                .iter()
                .any(|s| s.layer == layer && s.shape.overlaps_rect(rect));
            if keepout {
                return Some(format!(
                    "overlaps a keepout of {} on layer {layer}",
                    self.instances[inst.index()].name
                ));
            }
        }
        None
    }

    fn check_segment(&self, net: NetId, seg: &RouteSegment) -> Result<()> {
        if !self.tech.is_routing_layer(seg.layer) {
            return Err(PnrError::route_failed(
                net,
                format!("layer {} is not a routing layer", seg.layer),
            ));
        }
        if seg.start.x != seg.end.x && seg.start.y != seg.end.y {
            return Err(PnrError::route_failed(net, "segment is not axis-aligned"));
        }
        match self.route_conflict(net, seg.layer, &seg.rect()) {
            Some(reason) => Err(PnrError::route_failed(net, reason)),
            None => Ok(()),
        }
    }

    fn check_via(&self, net: NetId, via: &Via) -> Result<()> {
        if self.tech.via_rule(via.bottom, via.top).is_none() {
            return Err(PnrError::route_failed(
                net,
                format!("no via rule between {} and {}", via.bottom, via.top),
            ));
        }
        for (layer, rect) in via.footprints() {
            if let Some(reason) = self.route_conflict(net, layer, &rect) {
                return Err(PnrError::route_failed(net, reason));
            }
        }
        Ok(())
    }

    fn insert_shape(&mut self, net: NetId, layer: LayerId, rect: Rect) {
        let shape = self.route_index[layer.index()].insert(rect, net);
        self.nets[net.index()].route.shapes.push((layer, shape));
    }

    /// Append a wire to a net that is being routed. Rejected without change
    /// if the layer is not a routing layer or the wire would overlap
    /// another net or an obstruction on its layer.
    pub fn add_route_segment(&mut self, net: NetId, segment: RouteSegment) -> Result<()> {
        self.expect_state(net, RouteState::InProgress)?;
        self.check_segment(net, &segment)?;
        self.insert_shape(net, segment.layer, segment.rect());
        self.nets[net.index()].route.segments.push(segment);
        Ok(())
    }

    pub fn add_via(&mut self, net: NetId, via: Via) -> Result<()> {
        self.expect_state(net, RouteState::InProgress)?;
        self.check_via(net, &via)?;
        for (layer, rect) in via.footprints() {
            self.insert_shape(net, layer, rect);
        }
        self.nets[net.index()].route.vias.push(via);
        Ok(())
    }

    /// Append a whole path atomically: every piece is checked before any
    /// is inserted.
    pub fn commit_route(&mut self, net: NetId, segments: &[RouteSegment], vias: &[Via]) -> Result<()> {
        self.expect_state(net, RouteState::InProgress)?;
        for seg in segments {
            self.check_segment(net, seg)?;
        }
        for via in vias {
            self.check_via(net, via)?;
        }
        for seg in segments {
            self.insert_shape(net, seg.layer, seg.rect());
        }
        for via in vias {
            for (layer, rect) in via.footprints() {
                self.insert_shape(net, layer, rect);
            }
        }
        let route = &mut self.nets[net.index()].route;
        route.segments.extend_from_slice(segments);
        route.vias.extend_from_slice(vias);
        Ok(())
    }

    /// Route shapes on `layer` touching `rect`, as (net, rect) in id order.
    pub fn route_shapes_in(&self, layer: LayerId, rect: &Rect) -> Vec<(NetId, Rect)> {
        let Some(index) = self.route_index.get(layer.index()) else {
            return Vec::new();
        };
        index
            .query_intersecting(rect)
            .into_iter()
            .filter_map(|s| index.get(s).map(|(r, n)| (*n, *r)))
            .collect()
    }

    // ── Snapshot ─────────────────────────────────────────────────────

    /// Serialisable copy of the placement and routing state.
    pub fn snapshot(&self) -> DesignSnapshot {
        let layer_name = |id: LayerId| {
            self.tech
                .layer(id)
                .map(|l| l.name.clone())
                .unwrap_or_else(|| id.to_string())
        };
        DesignSnapshot {
            name: self.name.clone(),
            boundary: self.boundary.clone(),
            obstructions: self
                .obstructions
                .iter()
                .map(|o| ObstructionRecord {
                    layer: o.layer.map(layer_name),
                    shape: o.shape.clone(),
                })
                .collect(),
            ports: self
                .ports
                .iter()
                .map(|p| PortRecord {
                    name: p.name.clone(),
                    direction: p.direction,
                    position: p.position,
                    layer: p.layer.map(layer_name),
                })
                .collect(),
            instances: self
                .instances
                .iter()
                .map(|i| InstanceRecord {
                    name: i.name.clone(),
                    cell: i.master.name.clone(),
                    position: i.is_placed().then_some(i.position),
                    orientation: i.orientation,
                    status: i.status,
                })
                .collect(),
            nets: self
                .nets
                .iter()
                .map(|n| NetRecord {
                    name: n.name.clone(),
                    terminals: n
                        .terminals
                        .iter()
                        .map(|t| match t {
                            Terminal::Pin { instance, pin } => TerminalRecord::Pin {
                                instance: self.instances[instance.index()].name.clone(),
                                pin: pin.clone(),
                            },
                            Terminal::Port(p) => TerminalRecord::Port {
                                port: self.ports[p.index()].name.clone(),
                            },
                        })
                        .collect(),
                    state: n.route.state,
                    failure: n.route.failure.clone(),
                    segments: n
                        .route
                        .segments
                        .iter()
                        .map(|s| SegmentRecord {
                            layer: layer_name(s.layer),
                            start: s.start,
                            end: s.end,
                            width: s.width,
                        })
                        .collect(),
                    vias: n
                        .route
                        .vias
                        .iter()
                        .map(|v| ViaRecord {
                            rule: v.rule.clone(),
                            position: v.position,
                            bottom: layer_name(v.bottom),
                            top: layer_name(v.top),
                            cut: v.cut.map(layer_name),
                            pad: v.pad,
                            cut_size: v.cut_size,
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    /// Rebuild a database from a snapshot. Every placement and route piece
    /// is re-checked, so an illegal snapshot is rejected.
    pub fn from_snapshot(
        tech: Arc<Technology>,
        library: &CellLibrary,
        snapshot: &DesignSnapshot,
    ) -> Result<Self> {
        let mut db = Self::new(&snapshot.name, Arc::clone(&tech));
        let layer = |name: &str| -> Result<LayerId> {
            tech.layer_by_name(name)
                .map(|l| l.id)
                .ok_or_else(|| PnrError::malformed(format!("snapshot names unknown layer '{name}'")))
        };

        if let Some(boundary) = &snapshot.boundary {
            db.set_boundary(boundary.clone())?;
        }
        for obs in &snapshot.obstructions {
            let l = obs.layer.as_deref().map(layer).transpose()?;
            db.add_obstruction(l, obs.shape.clone())?;
        }

        let mut instance_ids = HashMap::new();
        for rec in &snapshot.instances {
            let master = library
                .placeable(&rec.cell)
                .ok_or_else(|| PnrError::UnresolvedCellReference {
                    instance: rec.name.clone(),
                    cell: rec.cell.clone(),
                })?;
            let id = db.create_instance(&rec.name, Arc::clone(master))?;
            instance_ids.insert(rec.name.clone(), id);
        }
        let mut port_ids = HashMap::new();
        for rec in &snapshot.ports {
            let id = db.add_port(&rec.name, rec.direction);
            port_ids.insert(rec.name.clone(), id);
            if let (Some(pos), Some(l)) = (rec.position, rec.layer.as_deref()) {
                db.set_port_position(id, pos, layer(l)?)?;
            }
        }
        for rec in &snapshot.instances {
            let id = instance_ids[&rec.name];
            match (rec.status, rec.position) {
                (PlacementStatus::Placed, Some(pos)) => db.set_position(id, pos, rec.orientation)?,
                (PlacementStatus::Fixed, Some(pos)) => db.place_fixed(id, pos, rec.orientation)?,
                _ => {}
            }
        }

        for rec in &snapshot.nets {
            let terminals = rec
                .terminals
                .iter()
                .map(|t| match t {
                    TerminalRecord::Pin { instance, pin } => instance_ids
                        .get(instance)
                        .map(|id| Terminal::Pin {
                            instance: *id,
                            pin: pin.clone(),
                        })
                        .ok_or_else(|| PnrError::InvalidState(format!("unknown instance '{instance}'"))),
                    TerminalRecord::Port { port } => port_ids
                        .get(port)
                        .map(|id| Terminal::Port(*id))
                        .ok_or_else(|| PnrError::InvalidState(format!("unknown port '{port}'"))),
                })
                .collect::<Result<Vec<_>>>()?;
            let id = db.add_net(&rec.name, terminals)?;

            let segments = rec
                .segments
                .iter()
                .map(|s| {
                    Ok(RouteSegment {
                        layer: layer(&s.layer)?,
                        start: s.start,
                        end: s.end,
                        width: s.width,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            let vias = rec
                .vias
                .iter()
                .map(|v| {
                    Ok(Via {
                        rule: v.rule.clone(),
                        position: v.position,
                        bottom: layer(&v.bottom)?,
                        top: layer(&v.top)?,
                        cut: v.cut.as_deref().map(layer).transpose()?,
                        pad: v.pad,
                        cut_size: v.cut_size,
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            match rec.state {
                RouteState::Unrouted => {}
                RouteState::Routed => {
                    db.begin_route(id)?;
                    db.commit_route(id, &segments, &vias)?;
                    db.finish_route(id)?;
                }
                RouteState::Failed => {
                    db.begin_route(id)?;
                    db.fail_route(id, rec.failure.as_deref().unwrap_or("failed"))?;
                }
                RouteState::InProgress => {
                    return Err(PnrError::InvalidState(format!(
                        "snapshot has net '{}' mid-route",
                        rec.name
                    )))
                }
            }
        }
        Ok(db)
    }
}

// ── Snapshot records ─────────────────────────────────────────────────

/// Serialisable design state; layers and cells are referenced by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignSnapshot {
    pub name: String,
    pub boundary: Option<Shape>,
    pub obstructions: Vec<ObstructionRecord>,
    pub ports: Vec<PortRecord>,
    pub instances: Vec<InstanceRecord>,
    pub nets: Vec<NetRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObstructionRecord {
    pub layer: Option<String>,
    pub shape: Shape,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortRecord {
    pub name: String,
    pub direction: PortDirection,
    pub position: Option<Point>,
    pub layer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub name: String,
    pub cell: String,
    pub position: Option<Point>,
    pub orientation: Orientation,
    pub status: PlacementStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TerminalRecord {
    Pin { instance: String, pin: String },
    Port { port: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetRecord {
    pub name: String,
    pub terminals: Vec<TerminalRecord>,
    pub state: RouteState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    pub segments: Vec<SegmentRecord>,
    pub vias: Vec<ViaRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentRecord {
    pub layer: String,
    pub start: Point,
    pub end: Point,
    pub width: Coord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViaRecord {
    pub rule: String,
    pub position: Point,
    pub bottom: String,
    pub top: String,
    pub cut: Option<String>,
    pub pad: Coord,
    pub cut_size: Coord,
}
