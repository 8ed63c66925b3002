//! Project file: the JSON description of one batch flow run.
//!
//! Input paths are resolved relative to the directory holding the project
//! file. Floorplan coordinates are database units.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use pnr_core::{Orientation, PnrError, Point, Result, Shape};
use pnr_core::LibraryImportOptions;
use pnr_place::FloorplannerConfig;
use pnr_route::RouterConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Design name; defaults to the top module name.
    pub name: Option<String>,
    /// Technology from a LEF file ...
    pub technology_lef: Option<PathBuf>,
    /// ... or from a JSON `TechnologySpec`.
    pub technology_json: Option<PathBuf>,
    /// Cell geometry LEFs, imported in order (last write wins).
    pub cell_lefs: Vec<PathBuf>,
    pub liberty: Vec<PathBuf>,
    pub verilog: Vec<PathBuf>,
    /// Top module; defaults to the last module no other module instantiates.
    pub top: Option<String>,
    pub library: LibraryImportOptions,
    pub floorplan: FloorplanConfig,
    pub placer: FloorplannerConfig,
    pub router: RouterConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FloorplanConfig {
    /// Explicit boundary. When absent one is sized from the cell area.
    pub boundary: Option<Shape>,
    pub utilization: f64,
    /// Height over width of a generated boundary.
    pub aspect_ratio: f64,
    pub obstructions: Vec<ObstructionConfig>,
    pub ports: Vec<PortPlacement>,
    pub fixed: Vec<FixedInstance>,
}

impl Default for FloorplanConfig {
    fn default() -> Self {
        Self {
            boundary: None,
            utilization: 0.5,
            aspect_ratio: 1.0,
            obstructions: Vec::new(),
            ports: Vec::new(),
            fixed: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObstructionConfig {
    /// Layer name; absent blocks every layer.
    #[serde(default)]
    pub layer: Option<String>,
    pub shape: Shape,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortPlacement {
    pub name: String,
    pub position: Point,
    pub layer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixedInstance {
    pub name: String,
    pub position: Point,
    #[serde(default)]
    pub orientation: Orientation,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub snapshot: Option<PathBuf>,
    pub def: Option<PathBuf>,
    /// Structural Verilog of the placed design, fillers included.
    pub verilog: Option<PathBuf>,
    /// JSON summary of the run.
    pub report: Option<PathBuf>,
}

impl ProjectConfig {
    /// Read a project file and resolve its paths against its directory.
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_json(&json, base)
    }

    pub fn from_json(json: &str, base: &Path) -> Result<Self> {
        let mut config: ProjectConfig = serde_json::from_str(json)?;
        config.resolve_paths(base);
        config.validate()?;
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        self.technology_lef.iter_mut().for_each(resolve);
        self.technology_json.iter_mut().for_each(resolve);
        self.cell_lefs.iter_mut().for_each(resolve);
        self.liberty.iter_mut().for_each(resolve);
        self.verilog.iter_mut().for_each(resolve);
        self.output.snapshot.iter_mut().for_each(resolve);
        self.output.def.iter_mut().for_each(resolve);
        self.output.verilog.iter_mut().for_each(resolve);
        self.output.report.iter_mut().for_each(resolve);
    }

    pub fn validate(&self) -> Result<()> {
        match (&self.technology_lef, &self.technology_json) {
            (Some(_), Some(_)) => {
                return Err(PnrError::InvalidState(
                    "project names both a technology LEF and a technology JSON".into(),
                ))
            }
            (None, None) => {
                return Err(PnrError::InvalidState("project names no technology".into()))
            }
            _ => {}
        }
        if self.verilog.is_empty() {
            return Err(PnrError::InvalidState("project names no Verilog netlist".into()));
        }
        let fp = &self.floorplan;
        if fp.boundary.is_none() && !(fp.utilization > 0.0 && fp.utilization <= 1.0) {
            return Err(PnrError::InvalidState(format!(
                "utilization {} must be in (0, 1]",
                fp.utilization
            )));
        }
        Ok(())
    }
}
