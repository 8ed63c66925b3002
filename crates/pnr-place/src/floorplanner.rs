use std::sync::Arc;

use pnr_core::{CellMaster, Coord, DesignDatabase, InstanceId, PnrError, Point, Rect, Result, Technology};

use crate::config::FloorplannerConfig;
use crate::fillers::insert_fillers;
use crate::global::global_placement;
use crate::legalize::legalize;
use crate::ports::place_ports;
use crate::refine::refine;
use crate::sites::SiteGrid;

/// Outcome of one floorplanner run. Per-instance and per-port failures are
/// collected here instead of aborting the run.
#[derive(Debug, Default)]
pub struct PlacementReport {
    /// Instances placed by legalization in this run.
    pub placed: usize,
    /// Refinement moves.
    pub moved: usize,
    pub ports_placed: usize,
    pub fillers: usize,
    /// True when every movable instance was already legal and the global
    /// and legalization phases were skipped.
    pub skipped_global: bool,
    pub failures: Vec<PnrError>,
    pub hpwl: Coord,
}

impl PlacementReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Deterministic placer. Holds its technology and configuration
/// explicitly so several runs can coexist in one process.
pub struct Floorplanner {
    tech: Arc<Technology>,
    config: FloorplannerConfig,
    fillers: Vec<Arc<CellMaster>>,
}

impl Floorplanner {
    pub fn new(tech: Arc<Technology>, config: FloorplannerConfig) -> Self {
        Self {
            tech,
            config,
            fillers: Vec::new(),
        }
    }

    /// Fill the remaining row gaps with these masters after refinement,
    /// tried in the given order (see [`crate::fillers::resolve_fillers`]).
    pub fn with_fillers(mut self, fillers: Vec<Arc<CellMaster>>) -> Self {
        self.fillers = fillers;
        self
    }

    pub fn config(&self) -> &FloorplannerConfig {
        &self.config
    }

    /// A boundary at the origin sized for `utilization` of the total cell
    /// area, with `aspect_ratio` = height / width, rounded up to whole
    /// sites and rows.
    pub fn suggest_boundary(&self, db: &DesignDatabase, utilization: f64, aspect_ratio: f64) -> Result<Rect> {
        if !(utilization > 0.0 && utilization <= 1.0) || aspect_ratio <= 0.0 {
            return Err(PnrError::InvalidState(format!(
                "utilization {utilization} / aspect ratio {aspect_ratio} out of range"
            )));
        }
        let probe = SiteGrid::new(&self.tech, &self.config, Rect::new(0, 0, 1, 1))?;
        let cell_area: f64 = db
            .instances()
            .iter()
            .map(|i| {
                let (w, h) = i.master.size();
                (w * h) as f64
            })
            .sum();
        let area = (cell_area / utilization).max((probe.site_width * probe.row_height) as f64);
        let width = (area / aspect_ratio).sqrt();
        let height = width * aspect_ratio;
        let round_up = |v: f64, step: Coord| ((v / step as f64).ceil() as Coord).max(1) * step;
        // at least as wide and tall as the largest cell
        let (max_w, max_h) = db
            .instances()
            .iter()
            .map(|i| i.master.size())
            .fold((0, 0), |(a, b), (w, h)| (a.max(w), b.max(h)));
        let w = round_up(width, probe.site_width).max(round_up(max_w as f64, probe.site_width));
        let h = round_up(height, probe.row_height).max(round_up(max_h as f64, probe.row_height));
        Ok(Rect::new(0, 0, w, h))
    }

    /// Place ports and every unplaced movable instance, refine, then fill
    /// the leftover sites when fillers are configured.
    pub fn run(&self, db: &mut DesignDatabase) -> Result<PlacementReport> {
        let boundary = db
            .boundary_rect()
            .ok_or_else(|| PnrError::InvalidState("no floorplan boundary".into()))?;
        let grid = SiteGrid::new(&self.tech, &self.config, boundary)?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads)
            .build()
            .map_err(|e| PnrError::InvalidState(format!("thread pool: {e}")))?;

        let (ports_placed, port_failures) = place_ports(db)?;
        let mut report = PlacementReport {
            ports_placed,
            failures: port_failures,
            ..Default::default()
        };

        let movable: Vec<InstanceId> = db
            .instances()
            .iter()
            .filter(|i| !i.is_fixed())
            .map(|i| i.id)
            .collect();
        let pending: Vec<InstanceId> = movable
            .iter()
            .copied()
            .filter(|id| db.instance(*id).is_ok_and(|i| !i.is_placed()))
            .collect();

        pool.install(|| {
            if pending.is_empty() {
                report.skipped_global = true;
                log::info!("All {} movable instances already legal; skipping global placement", movable.len());
            } else {
                let centres = global_placement(db, &pending, &grid, &self.config);
                let targets: Vec<(InstanceId, Point)> =
                    pending.iter().copied().zip(centres).collect();
                let (placed, failures) = legalize(db, &grid, &targets, self.config.max_probes);
                report.placed = placed;
                report.failures.extend(failures);
            }
            report.moved = refine(
                db,
                &grid,
                &movable,
                self.config.refine_radius,
                self.config.max_passes,
            );
        });

        // a partial placement would get its holes filled; leave it open
        if report.is_complete() {
            report.fillers = insert_fillers(db, &grid, &self.fillers)?;
        }
        report.hpwl = db.total_hpwl();
        log::info!(
            "Floorplan of '{}': {} placed, {} moved, {} failed, HPWL {}",
            db.name,
            report.placed,
            report.moved,
            report.failures.len(),
            report.hpwl
        );
        Ok(report)
    }
}
