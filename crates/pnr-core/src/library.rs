//! Cell library: geometry and timing views merged by cell name.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::cell::{CellGeometry, CellMaster, CellTiming};
use crate::error::{PnrError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryImportOptions {
    /// Fail a timing import that names a cell without geometry instead of
    /// keeping it as a timing-only master.
    #[serde(default)]
    pub require_geometry: bool,
}

/// Outcome of one import call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub added: usize,
    pub updated: usize,
    pub warnings: Vec<String>,
}

impl ImportSummary {
    fn warn(&mut self, message: String) {
        log::warn!("{message}");
        self.warnings.push(message);
    }
}

/// Cell masters keyed by name. Masters are shared with instances through
/// `Arc`, never copied.
#[derive(Debug, Clone, Default)]
pub struct CellLibrary {
    cells: IndexMap<String, Arc<CellMaster>>,
    options: LibraryImportOptions,
}

impl CellLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: LibraryImportOptions) -> Self {
        Self {
            cells: IndexMap::new(),
            options,
        }
    }

    /// Merge parsed cell geometry. Existing geometry of the same name is
    /// replaced (last write wins); existing timing is kept.
    pub fn import_geometry(&mut self, cells: Vec<(String, CellGeometry)>) -> ImportSummary {
        let mut summary = ImportSummary::default();
        for (name, geometry) in cells {
            match self.cells.get_mut(&name) {
                Some(existing) => {
                    let master = Arc::make_mut(existing);
                    if master.geometry.is_some() {
                        summary.warn(format!(
                            "cell '{name}' geometry redefined, keeping the latest definition"
                        ));
                    }
                    master.geometry = Some(geometry);
                    summary.updated += 1;
                }
                None => {
                    self.cells.insert(
                        name.clone(),
                        Arc::new(CellMaster::with_geometry(&name, geometry)),
                    );
                    summary.added += 1;
                }
            }
        }
        log::info!(
            "Imported geometry: {} new, {} updated cells",
            summary.added,
            summary.updated
        );
        summary
    }

    /// Merge parsed timing. Atomic: with `require_geometry`, an unknown
    /// cell rejects the whole import before anything is changed.
    pub fn import_timing(&mut self, cells: Vec<CellTiming>) -> Result<ImportSummary> {
        if self.options.require_geometry {
            if let Some(missing) = cells.iter().find(|t| {
                self.cells
                    .get(&t.name)
                    .map_or(true, |m| m.geometry.is_none())
            }) {
                return Err(PnrError::UnknownCellReference(missing.name.clone()));
            }
        }

        let mut summary = ImportSummary::default();
        for timing in cells {
            let name = timing.name.clone();
            match self.cells.get_mut(&name) {
                Some(existing) => {
                    let master = Arc::make_mut(existing);
                    if master.timing.is_some() {
                        summary.warn(format!(
                            "cell '{name}' timing redefined, keeping the latest definition"
                        ));
                    }
                    if let Some(geom) = &master.geometry {
                        for pin in timing.pins.keys() {
                            if !geom.pins.iter().any(|p| &p.name == pin) {
                                summary.warn(format!(
                                    "cell '{name}' timing pin '{pin}' has no geometry"
                                ));
                            }
                        }
                    } else {
                        summary.warn(format!("cell '{name}' is timing-only"));
                    }
                    master.timing = Some(timing);
                    summary.updated += 1;
                }
                None => {
                    summary.warn(format!(
                        "timing for unknown cell '{name}', keeping it as timing-only"
                    ));
                    self.cells
                        .insert(name, Arc::new(CellMaster::timing_only(timing)));
                    summary.added += 1;
                }
            }
        }
        log::info!(
            "Imported timing: {} merged, {} timing-only cells",
            summary.updated,
            summary.added
        );
        Ok(summary)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<CellMaster>> {
        self.cells.get(name)
    }

    /// Master usable for placement, i.e. one that has geometry.
    pub fn placeable(&self, name: &str) -> Option<&Arc<CellMaster>> {
        self.cells.get(name).filter(|m| m.is_placeable())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<CellMaster>> {
        self.cells.values()
    }

    pub fn cell_names(&self) -> Vec<&str> {
        self.cells.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}
