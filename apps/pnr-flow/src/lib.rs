//! # pnr flow
//!
//! The batch pipeline behind the `pnr-flow` binary: load the inputs a
//! project file names, elaborate the top module, apply the floorplan,
//! place, route, check and write the outputs. Per-entity placement and
//! routing failures end up in the [`FlowOutcome`], never in an `Err`.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use pnr_check::{check_design, error_count, Violation};
use pnr_core::netlist::Module;
use pnr_core::{
    CellLibrary, Coord, DesignDatabase, LayerId, NetlistGraph, PnrError, Result, RouteState,
    Shape, Technology, TechnologySpec,
};
use pnr_io::{
    read_cells, read_liberty, read_technology, read_verilog, select_top, write_def_file,
    write_snapshot, write_verilog_file, OutputConfig, ProjectConfig,
};
use pnr_place::{resolve_fillers, Floorplanner, PlacementReport};
use pnr_route::{Router, RoutingReport};

// ── Inputs ───────────────────────────────────────────────────────────

/// Everything read from disk before the design is built.
#[derive(Debug)]
pub struct FlowInputs {
    pub tech: Arc<Technology>,
    pub library: CellLibrary,
    pub top: Module,
}

fn read_source(path: &Path) -> Result<String> {
    log::debug!("Reading {}", path.display());
    fs::read_to_string(path).map_err(|e| {
        PnrError::Io(std::io::Error::new(e.kind(), format!("{}: {e}", path.display())))
    })
}

fn load_technology(project: &ProjectConfig) -> Result<Technology> {
    let spec: TechnologySpec = match (&project.technology_lef, &project.technology_json) {
        (Some(lef), _) => read_technology(&read_source(lef)?)?,
        (None, Some(json)) => serde_json::from_str(&read_source(json)?)?,
        (None, None) => return Err(PnrError::InvalidState("project names no technology".into())),
    };
    let tech = Technology::load(&spec)?;
    log::info!(
        "Loaded technology '{}': {} layers, {} via rules",
        tech.name,
        tech.layers().layer_count(),
        tech.via_rules().len()
    );
    Ok(tech)
}

/// Read the technology, cell libraries and netlist. Every import is
/// all-or-nothing; the first failing file ends the load.
pub fn load_inputs(project: &ProjectConfig) -> Result<FlowInputs> {
    let tech = Arc::new(load_technology(project)?);
    let mut library = CellLibrary::with_options(project.library.clone());

    // a technology LEF may carry macros as well
    if let Some(path) = &project.technology_lef {
        let cells = read_cells(&read_source(path)?, &tech)?;
        if !cells.is_empty() {
            library.import_geometry(cells);
        }
    }
    for path in &project.cell_lefs {
        library.import_geometry(read_cells(&read_source(path)?, &tech)?);
    }
    for path in &project.liberty {
        library.import_timing(read_liberty(&read_source(path)?)?)?;
    }

    let mut modules = Vec::new();
    for path in &project.verilog {
        modules.extend(read_verilog(&read_source(path)?)?);
    }
    let top = select_top(modules, project.top.as_deref())?;
    log::info!("Top module '{}' with {} instances", top.name, top.instances.len());

    Ok(FlowInputs { tech, library, top })
}

// ── Design ───────────────────────────────────────────────────────────

fn layer_id(tech: &Technology, name: &str) -> Result<LayerId> {
    tech.layer_by_name(name)
        .map(|l| l.id)
        .ok_or_else(|| PnrError::InvalidState(format!("floorplan names unknown layer '{name}'")))
}

/// Elaborate the top module into a fresh database and apply the floorplan:
/// boundary, obstructions, pinned ports and fixed instances.
pub fn build_design(inputs: &FlowInputs, project: &ProjectConfig) -> Result<DesignDatabase> {
    let netlist = NetlistGraph::elaborate(&inputs.top, &inputs.library)?;
    let mut db = DesignDatabase::from_netlist(Arc::clone(&inputs.tech), &netlist)?;
    if let Some(name) = &project.name {
        db.name = name.clone();
    }
    let tech = Arc::clone(&inputs.tech);
    let fp = &project.floorplan;

    let boundary = match &fp.boundary {
        Some(shape) => shape.clone(),
        None => {
            let planner = Floorplanner::new(Arc::clone(&tech), project.placer.clone());
            Shape::Rect(planner.suggest_boundary(&db, fp.utilization, fp.aspect_ratio)?)
        }
    };
    db.set_boundary(boundary)?;

    for obs in &fp.obstructions {
        let layer = obs.layer.as_deref().map(|n| layer_id(&tech, n)).transpose()?;
        db.add_obstruction(layer, obs.shape.clone())?;
    }
    for pin in &fp.ports {
        let id = db
            .ports()
            .iter()
            .find(|p| p.name == pin.name)
            .map(|p| p.id)
            .ok_or_else(|| PnrError::InvalidState(format!("floorplan names unknown port '{}'", pin.name)))?;
        db.set_port_position(id, pin.position, layer_id(&tech, &pin.layer)?)?;
    }
    for fixed in &fp.fixed {
        let id = db
            .instance_by_name(&fixed.name)
            .map(|i| i.id)
            .ok_or_else(|| {
                PnrError::InvalidState(format!("floorplan names unknown instance '{}'", fixed.name))
            })?;
        db.place_fixed(id, fixed.position, fixed.orientation)?;
    }
    log::info!(
        "Built design '{}': {} instances, {} nets, {} ports",
        db.name,
        db.instances().len(),
        db.nets().len(),
        db.ports().len()
    );
    Ok(db)
}

// ── Place, route, check ──────────────────────────────────────────────

#[derive(Debug)]
pub struct FlowOutcome {
    pub db: DesignDatabase,
    pub placement: PlacementReport,
    pub routing: RoutingReport,
    pub violations: Vec<Violation>,
}

impl FlowOutcome {
    /// No placement or routing failure and no error-level violation.
    pub fn is_clean(&self) -> bool {
        self.placement.is_complete() && self.routing.is_complete() && error_count(&self.violations) == 0
    }

    pub fn summary(&self) -> FlowSummary {
        let db = &self.db;
        FlowSummary {
            design: db.name.clone(),
            instances: db.instances().len(),
            placed: db.instances().iter().filter(|i| i.is_placed()).count(),
            nets: db.nets().len(),
            routed: db
                .nets()
                .iter()
                .filter(|n| n.route.state == RouteState::Routed)
                .count(),
            fillers: self.placement.fillers,
            hpwl: self.placement.hpwl,
            wirelength: self.routing.wirelength,
            vias: self.routing.via_count,
            placement_failures: self.placement.failures.iter().map(|e| e.to_string()).collect(),
            route_failures: self.routing.failed.iter().map(|e| e.to_string()).collect(),
            violations: self.violations.clone(),
        }
    }
}

/// JSON report of one run.
#[derive(Debug, Clone, Serialize)]
pub struct FlowSummary {
    pub design: String,
    pub instances: usize,
    pub placed: usize,
    pub nets: usize,
    pub routed: usize,
    pub fillers: usize,
    pub hpwl: Coord,
    pub wirelength: Coord,
    pub vias: usize,
    pub placement_failures: Vec<String>,
    pub route_failures: Vec<String>,
    pub violations: Vec<Violation>,
}

/// Floorplan, route and check a built design. Filler masters named by the
/// placer config are looked up in the input library.
pub fn place_and_route(mut db: DesignDatabase, inputs: &FlowInputs, project: &ProjectConfig) -> Result<FlowOutcome> {
    let tech = Arc::clone(db.technology());
    let fillers = resolve_fillers(&inputs.library, &project.placer.fillers)?;
    let placement = Floorplanner::new(Arc::clone(&tech), project.placer.clone())
        .with_fillers(fillers)
        .run(&mut db)?;
    let routing = Router::new(tech, project.router.clone()).run(&mut db)?;
    let violations = check_design(&db);
    Ok(FlowOutcome {
        db,
        placement,
        routing,
        violations,
    })
}

// ── Outputs ──────────────────────────────────────────────────────────

fn create_parent(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

pub fn write_outputs(outcome: &FlowOutcome, output: &OutputConfig) -> Result<()> {
    if let Some(path) = &output.snapshot {
        create_parent(path)?;
        write_snapshot(&outcome.db, path)?;
    }
    if let Some(path) = &output.def {
        create_parent(path)?;
        write_def_file(&outcome.db, path)?;
    }
    if let Some(path) = &output.verilog {
        create_parent(path)?;
        write_verilog_file(&outcome.db, path)?;
    }
    if let Some(path) = &output.report {
        create_parent(path)?;
        let mut json = serde_json::to_string_pretty(&outcome.summary())?;
        json.push('\n');
        fs::write(path, json)?;
        log::info!("Wrote report to {}", path.display());
    }
    Ok(())
}

/// The whole pipeline for one project.
pub fn run_flow(project: &ProjectConfig) -> Result<FlowOutcome> {
    let inputs = load_inputs(project)?;
    let db = build_design(&inputs, project)?;
    let outcome = place_and_route(db, &inputs, project)?;
    write_outputs(&outcome, &project.output)?;
    if outcome.is_clean() {
        log::info!("Flow finished clean");
    } else {
        log::warn!(
            "Flow finished with {} placement failures, {} route failures, {} violations",
            outcome.placement.failures.len(),
            outcome.routing.failed.len(),
            outcome.violations.len()
        );
    }
    Ok(outcome)
}
