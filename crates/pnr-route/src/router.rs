use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use rayon::prelude::*;

use pnr_core::{
    Coord, DesignDatabase, NetId, PnrError, Point, Result, RouteSegment, RouteState,
    RoutingDirection, Technology, Terminal, Via,
};

use crate::astar::{find_path, CostModel, SearchError};
use crate::config::RouterConfig;
use crate::congestion::CongestionMap;
use crate::grid::{Owner, RoutingGrid};
use crate::prim::prim_order;

/// Outcome of one router run. Failed nets are listed here, never retried.
#[derive(Debug, Default)]
pub struct RoutingReport {
    pub routed: usize,
    /// Nets that were not UNROUTED when the run started.
    pub skipped: usize,
    pub failed: Vec<PnrError>,
    pub wirelength: Coord,
    pub via_count: usize,
}

impl RoutingReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// A net ready for search: its terminal access nodes in connection order.
#[derive(Debug)]
struct NetJob {
    net: NetId,
    name: String,
    terminals: Vec<usize>,
}

/// Tree found for one net: the connecting paths and every node they use.
#[derive(Debug)]
struct Solution {
    paths: Vec<Vec<usize>>,
    nodes: Vec<usize>,
}

/// Greedy, rip-up free maze router.
///
/// Nets are routed shortest first. Path search runs speculatively in
/// parallel batches against the occupancy at the start of the batch, while
/// commits happen one net at a time in routing order; a result made stale
/// by an earlier commit is searched again before it is committed.
pub struct Router {
    tech: Arc<Technology>,
    config: RouterConfig,
}

impl Router {
    pub fn new(tech: Arc<Technology>, config: RouterConfig) -> Self {
        Self { tech, config }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    fn cost_model(&self) -> CostModel {
        let coarsest = [RoutingDirection::Horizontal, RoutingDirection::Vertical]
            .into_iter()
            .filter_map(|d| self.tech.track_pattern(d))
            .map(|(pitch, _)| pitch)
            .max()
            .unwrap_or(1);
        CostModel {
            wrong_way_cost: self.config.wrong_way_cost.max(1),
            via_cost: self.config.via_cost.unwrap_or(2 * coarsest).max(0),
            congestion_weight: self.config.congestion_weight.max(0),
            max_expansions: self.config.max_expansions,
        }
    }

    /// Route every UNROUTED net of `db`.
    pub fn run(&self, db: &mut DesignDatabase) -> Result<RoutingReport> {
        let mut grid = RoutingGrid::build(db)?;
        let mut congestion = CongestionMap::new(&grid, self.config.gcell_size);
        let costs = self.cost_model();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads)
            .build()
            .map_err(|e| PnrError::InvalidState(format!("thread pool: {e}")))?;
        let mut report = RoutingReport::default();

        let mut order: Vec<(Coord, NetId)> = Vec::new();
        for net in db.nets() {
            if net.route.state == RouteState::Unrouted {
                order.push((db.net_hpwl(net.id), net.id));
            } else {
                report.skipped += 1;
            }
        }
        order.sort();

        let mut jobs = Vec::with_capacity(order.len());
        for (_, net) in order {
            match plan(db, &grid, net) {
                Ok(job) => jobs.push(job),
                Err(reason) => record_failure(db, net, reason, &mut report)?,
            }
        }

        for batch in jobs.chunks(self.config.batch_size.max(1)) {
            let speculative: Vec<std::result::Result<Solution, String>> = pool.install(|| {
                batch
                    .par_iter()
                    .map(|job| search(&grid, &congestion, &costs, job))
                    .collect()
            });

            let mut touched: HashSet<usize> = HashSet::new();
            for (job, result) in batch.iter().zip(speculative) {
                let stale = match &result {
                    Ok(solution) => {
                        solution.nodes.iter().any(|&n| {
                            !grid.owner(n).admits(job.net)
                                || touched.contains(&congestion.gcell_of(&grid, n))
                        }) || solution
                            .paths
                            .iter()
                            .any(|p| p.windows(2).any(|w| !grid.step_admits(w[0], w[1], job.net)))
                    }
                    Err(_) => !touched.is_empty(),
                };
                let result = if stale {
                    log::debug!("Re-searching {} after earlier commits", job.name);
                    search(&grid, &congestion, &costs, job)
                } else {
                    result
                };
                match result {
                    Ok(solution) => {
                        if commit(db, &mut grid, &mut congestion, job, &solution, &mut report)? {
                            touched.extend(solution.nodes.iter().map(|&n| congestion.gcell_of(&grid, n)));
                        }
                    }
                    Err(reason) => record_failure(db, job.net, reason, &mut report)?,
                }
            }
        }

        log::info!(
            "Routed {} nets of '{}' ({} failed, {} skipped), wirelength {}, {} vias",
            report.routed,
            db.name,
            report.failed.len(),
            report.skipped,
            report.wirelength,
            report.via_count
        );
        Ok(report)
    }
}

fn terminal_label(db: &DesignDatabase, terminal: &Terminal) -> String {
    match terminal {
        Terminal::Pin { instance, pin } => {
            let inst = db.instance(*instance).map_or("?", |i| i.name.as_str());
            format!("{inst}/{pin}")
        }
        Terminal::Port(port) => db
            .ports()
            .get(port.index())
            .map_or_else(|| port.to_string(), |p| p.name.clone()),
    }
}

/// Resolve the access node of every terminal and order them by Prim's MST.
fn plan(db: &DesignDatabase, grid: &RoutingGrid, id: NetId) -> std::result::Result<NetJob, String> {
    let net = db.net(id).map_err(|e| e.to_string())?;
    let mut nodes: Vec<usize> = Vec::new();
    for t in &net.terminals {
        let shapes = db.terminal_shapes(t);
        let centre = db.terminal_location(t).filter(|_| !shapes.is_empty());
        let Some(centre) = centre else {
            return Err(format!("terminal {} is not placed", terminal_label(db, t)));
        };
        let node = grid
            .access_node(id, &shapes, centre)
            .ok_or_else(|| format!("terminal {} has no free access point", terminal_label(db, t)))?;
        if !nodes.contains(&node) {
            nodes.push(node);
        }
    }
    let points: Vec<Point> = nodes.iter().map(|&n| grid.point(n)).collect();
    Ok(NetJob {
        net: id,
        name: net.name.clone(),
        terminals: prim_order(&points).into_iter().map(|i| nodes[i]).collect(),
    })
}

/// Grow a tree from the first terminal, connecting each further terminal
/// by a multi-source search from everything connected so far.
fn search(
    grid: &RoutingGrid,
    congestion: &CongestionMap,
    costs: &CostModel,
    job: &NetJob,
) -> std::result::Result<Solution, String> {
    let mut tree: BTreeSet<usize> = job.terminals.first().copied().into_iter().collect();
    let mut paths = Vec::new();
    for &target in job.terminals.iter().skip(1) {
        if tree.contains(&target) {
            continue;
        }
        let sources: Vec<usize> = tree.iter().copied().collect();
        let path = find_path(grid, congestion, costs, job.net, &sources, target).map_err(|e| {
            let at = grid.point(target);
            match e {
                SearchError::NoPath => format!("no path to terminal at ({}, {})", at.x, at.y),
                SearchError::BudgetExhausted => format!(
                    "search budget of {} expansions exhausted towards ({}, {})",
                    costs.max_expansions, at.x, at.y
                ),
            }
        })?;
        tree.extend(path.iter().copied());
        paths.push(path);
    }
    Ok(Solution {
        paths,
        nodes: tree.into_iter().collect(),
    })
}

/// Maximal straight segments and vias of a solution. A tree of a single
/// node becomes one zero-length segment so the terminal is still covered.
fn geometry(grid: &RoutingGrid, solution: &Solution) -> (Vec<RouteSegment>, Vec<Via>) {
    let mut segments = Vec::new();
    let mut vias = Vec::new();
    for path in solution.paths.iter().filter(|p| !p.is_empty()) {
        let mut run = path[0];
        let mut along_x: Option<bool> = None;
        for pair in path.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let ((la, _, ra), (lb, _, rb)) = (grid.coords(a), grid.coords(b));
            if la != lb {
                if run != a {
                    segments.push(grid.segment(run, a));
                }
                vias.extend(grid.via(a.min(b)));
                run = b;
                along_x = None;
                continue;
            }
            let horizontal = ra == rb;
            if along_x.is_some_and(|h| h != horizontal) {
                segments.push(grid.segment(run, a));
                run = a;
            }
            along_x = Some(horizontal);
        }
        let end = path[path.len() - 1];
        if run != end {
            segments.push(grid.segment(run, end));
        }
    }
    if segments.is_empty() && vias.is_empty() {
        if let Some(&node) = solution.nodes.first() {
            segments.push(grid.segment(node, node));
        }
    }
    (segments, vias)
}

/// Write a solution to the database and reserve everything it touches.
/// Returns false when the database rejected the geometry and the net was
/// failed instead.
fn commit(
    db: &mut DesignDatabase,
    grid: &mut RoutingGrid,
    congestion: &mut CongestionMap,
    job: &NetJob,
    solution: &Solution,
    report: &mut RoutingReport,
) -> Result<bool> {
    let (segments, vias) = geometry(grid, solution);
    db.begin_route(job.net)?;
    if let Err(e) = db.commit_route(job.net, &segments, &vias) {
        let reason = match e {
            PnrError::RouteFailed { reason, .. } => reason,
            other => other.to_string(),
        };
        record_failure(db, job.net, reason, report)?;
        return Ok(false);
    }
    db.finish_route(job.net)?;

    for &node in &solution.nodes {
        if grid.owner(node) == Owner::Free {
            let g = congestion.gcell_of(grid, node);
            congestion.add(g);
        }
        grid.claim(node, job.net);
    }
    grid.mark_route(db.technology(), job.net, &segments, &vias);
    let length: Coord = segments.iter().map(RouteSegment::length).sum();
    report.routed += 1;
    report.wirelength += length;
    report.via_count += vias.len();
    log::debug!(
        "Routed {}: {} segments, {} vias, length {length}",
        job.name,
        segments.len(),
        vias.len()
    );
    Ok(true)
}

fn record_failure(db: &mut DesignDatabase, net: NetId, reason: String, report: &mut RoutingReport) -> Result<()> {
    if db.net(net)?.route.state == RouteState::Unrouted {
        db.begin_route(net)?;
    }
    db.fail_route(net, &reason)?;
    log::error!("Routing of {} failed: {reason}", db.net(net)?.name);
    report.failed.push(PnrError::route_failed(net, reason));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pnr_core::cell::{CellGeometry, CellPin, PinDirection};
    use pnr_core::technology::{LayerSpec, TechnologySpec};
    use pnr_core::{CellLibrary, InstanceId, Orientation, Rect, Shape};

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

    /// Fixed inverters at `positions` chained Y -> A, with `walls` added to
    /// the floorplan first.
    fn chain(positions: &[(Coord, Coord)], walls: &[(Option<&str>, Rect)]) -> (Arc<Technology>, DesignDatabase) {
        let pins = [("M1", Rect::new(2, 4, 6, 6)), ("M2", Rect::new(4, 2, 6, 8))];
        chain_with_pins(positions, walls, pins)
    }

    fn chain_with_pins(
        positions: &[(Coord, Coord)],
        walls: &[(Option<&str>, Rect)],
        [a, y]: [(&str, Rect); 2],
    ) -> (Arc<Technology>, DesignDatabase) {
        let tech = tech();
        let layer = |name: &str| tech.layer_by_name(name).unwrap().id;
        let inv = CellGeometry::new(10, 10)
            .with_pin(CellPin::new("A", PinDirection::Input).with_rect(layer(a.0), a.1))
            .with_pin(CellPin::new("Y", PinDirection::Output).with_rect(layer(y.0), y.1));
        let mut lib = CellLibrary::new();
        lib.import_geometry(vec![("INV".into(), inv)]);

        let mut db = DesignDatabase::new("chain", Arc::clone(&tech));
        db.set_boundary(Shape::Rect(Rect::new(0, 0, 100, 100))).unwrap();
        for (layer, rect) in walls {
            let layer = layer.map(|name| tech.layer_by_name(name).unwrap().id);
            db.add_obstruction(layer, Shape::Rect(*rect)).unwrap();
        }
        let ids: Vec<InstanceId> = positions
            .iter()
            .enumerate()
            .map(|(i, &(x, y))| {
                let id = db
                    .create_instance(&format!("u{i}"), Arc::clone(lib.get("INV").unwrap()))
                    .unwrap();
                db.place_fixed(id, Point::new(x, y), Orientation::N).unwrap();
                id
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
        (tech, db)
    }

    /// No route shape overlaps a route shape or pin of another net.
    fn assert_no_shorts(db: &DesignDatabase) {
        for net in db.nets() {
            let mut shapes: Vec<_> = net.route.segments.iter().map(|s| (s.layer, s.rect())).collect();
            for via in &net.route.vias {
                shapes.extend(via.footprints());
            }
            for (layer, rect) in shapes {
                for (other, r) in db.route_shapes_in(layer, &rect) {
                    assert!(other == net.id || !r.overlaps(&rect), "{} shorts {other}", net.name);
                }
                for inst in db.instances() {
                    for pin in &inst.master.geometry.as_ref().unwrap().pins {
                        if db.net_of_pin(inst.id, &pin.name) == Some(net.id) {
                            continue;
                        }
                        for s in inst.pin_shapes(&pin.name) {
                            assert!(
                                s.layer != layer || !s.shape.overlaps_rect(&rect),
                                "{} touches {}/{}",
                                net.name,
                                inst.name,
                                pin.name
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_chain_routes_without_shorts() {
        let (tech, mut db) = chain(&[(20, 40), (50, 40), (80, 40)], &[]);
        let report = Router::new(tech, RouterConfig::default()).run(&mut db).unwrap();
        assert!(report.is_complete(), "{:?}", report.failed);
        assert_eq!(report.routed, 2);
        assert!(report.wirelength > 0);
        assert!(db.nets().iter().all(|n| n.route.state == RouteState::Routed));
        assert_no_shorts(&db);
    }

    #[test]
    fn test_same_layer_pins_get_separate_access() {
        let pins = [("M1", Rect::new(1, 3, 3, 7)), ("M1", Rect::new(7, 3, 9, 7))];
        for positions in [[(20, 40), (30, 40), (40, 40)], [(20, 20), (50, 60), (30, 80)]] {
            let (tech, mut db) = chain_with_pins(&positions, &[], pins);
            let report = Router::new(tech, RouterConfig::default()).run(&mut db).unwrap();
            assert!(report.is_complete(), "{positions:?}: {:?}", report.failed);
            assert_eq!(report.routed, 2);
            assert_no_shorts(&db);
        }
    }

    #[test]
    fn test_wall_fails_the_net() {
        let wall = Rect::new(40, 0, 60, 100);
        let (tech, mut db) = chain(&[(10, 40), (80, 40)], &[(None, wall)]);
        let report = Router::new(tech, RouterConfig::default()).run(&mut db).unwrap();
        assert_eq!(report.routed, 0);
        assert!(matches!(report.failed[..], [PnrError::RouteFailed { .. }]));
        let net = &db.nets()[0];
        assert_eq!(net.route.state, RouteState::Failed);
        assert!(net.route.segments.is_empty());
        assert!(net.route.failure.is_some());
    }

    #[test]
    fn test_layer_wall_is_crossed_on_the_other_layer() {
        let wall = Rect::new(40, 0, 60, 100);
        let (tech, mut db) = chain(&[(10, 40), (80, 40)], &[(Some("M1"), wall)]);
        let m1 = tech.layer_by_name("M1").unwrap().id;
        let report = Router::new(tech, RouterConfig::default()).run(&mut db).unwrap();
        assert_eq!(report.routed, 1);
        let route = &db.nets()[0].route;
        assert!(route
            .segments
            .iter()
            .filter(|s| s.layer == m1)
            .all(|s| !s.rect().overlaps(&wall)));
        assert!(route.vias.iter().all(|v| !v.pad_rect().overlaps(&wall)));
        assert!(report.via_count >= 1);
    }

    #[test]
    fn test_determinism_across_thread_counts() {
        let positions = [(10, 10), (40, 60), (70, 20), (30, 80), (80, 80)];
        let mut snapshots = Vec::new();
        for threads in [1, 4] {
            let (tech, mut db) = chain(&positions, &[]);
            let config = RouterConfig {
                threads,
                batch_size: 2,
                ..Default::default()
            };
            Router::new(tech, config).run(&mut db).unwrap();
            snapshots.push(db.snapshot());
        }
        assert_eq!(snapshots[0], snapshots[1]);
    }

    #[test]
    fn test_second_run_skips_routed_nets() {
        let (tech, mut db) = chain(&[(20, 40), (50, 40), (80, 40)], &[]);
        let router = Router::new(tech, RouterConfig::default());
        router.run(&mut db).unwrap();
        let before = db.snapshot();
        let report = router.run(&mut db).unwrap();
        assert_eq!((report.routed, report.skipped), (0, 2));
        assert_eq!(db.snapshot(), before);
    }

    #[test]
    fn test_rebuilt_grid_sees_committed_routes() {
        let (tech, mut db) = chain(&[(20, 40), (50, 40), (80, 40)], &[]);
        Router::new(tech, RouterConfig::default()).run(&mut db).unwrap();
        let grid = RoutingGrid::build(&db).unwrap();
        for net in db.nets() {
            for seg in &net.route.segments {
                let l = grid.layers().iter().position(|g| g.id == seg.layer).unwrap();
                for p in [seg.start, seg.end] {
                    let node = grid.node_at(l, p).unwrap();
                    assert_eq!(grid.owner(node), Owner::Net(net.id));
                }
            }
        }
    }

    #[test]
    fn test_missing_boundary_is_an_error() {
        let mut db = DesignDatabase::new("empty", tech());
        let result = Router::new(tech(), RouterConfig::default()).run(&mut db);
        assert!(matches!(result, Err(PnrError::InvalidState(_))));
    }

    #[test]
    fn test_paths_become_straight_segments_and_vias() {
        let (_, db) = chain(&[], &[]);
        let grid = RoutingGrid::build(&db).unwrap();
        let path = vec![
            grid.node(0, 0, 0),
            grid.node(0, 1, 0),
            grid.node(0, 2, 0),
            grid.node(1, 2, 0),
            grid.node(1, 2, 1),
            grid.node(1, 2, 2),
        ];
        let solution = Solution {
            nodes: path.clone(),
            paths: vec![path],
        };
        let (segments, vias) = geometry(&grid, &solution);
        assert_eq!(segments.len(), 2);
        assert_eq!((segments[0].start, segments[0].end), (Point::new(5, 5), Point::new(25, 5)));
        assert_eq!((segments[1].start, segments[1].end), (Point::new(25, 5), Point::new(25, 25)));
        assert_eq!(vias.len(), 1);
        assert_eq!(vias[0].position, Point::new(25, 5));
        assert_eq!(vias[0].pad, 4);

        let single = Solution {
            paths: Vec::new(),
            nodes: vec![grid.node(0, 3, 3)],
        };
        let (segments, vias) = geometry(&grid, &single);
        assert!(vias.is_empty());
        assert_eq!(segments[0].length(), 0);
    }
}
