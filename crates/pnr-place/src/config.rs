use serde::{Deserialize, Serialize};

use pnr_core::Coord;

/// Knobs of one floorplanner run. Every field has a default so a project
/// file may give only the ones it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FloorplannerConfig {
    /// Technology site defining the placement grid. When absent the first
    /// core site is used, then `site_width`/`row_height`, then the routing
    /// pitches.
    pub site: Option<String>,
    pub site_width: Option<Coord>,
    pub row_height: Option<Coord>,
    /// Force-directed iterations.
    pub global_iterations: usize,
    /// Pull of every movable instance towards the boundary centre, relative
    /// to a two-pin net.
    pub center_weight: f64,
    /// Pull of a placed port on the instances it connects.
    pub port_weight: f64,
    /// Candidate slots examined per instance before legalization gives up.
    pub max_probes: usize,
    /// Refinement passes over all movable instances.
    pub max_passes: usize,
    /// Search radius of a refinement move, in sites/rows.
    pub refine_radius: Coord,
    /// Worker threads for candidate evaluation; 0 uses the rayon default.
    pub threads: usize,
    /// Filler cells for the gaps left after placement. Empty skips filling.
    pub fillers: Vec<String>,
}

impl Default for FloorplannerConfig {
    fn default() -> Self {
        Self {
            site: None,
            site_width: None,
            row_height: None,
            global_iterations: 40,
            center_weight: 0.01,
            port_weight: 1.0,
            max_probes: 20_000,
            max_passes: 4,
            refine_radius: 3,
            threads: 0,
            fillers: Vec::new(),
        }
    }
}
