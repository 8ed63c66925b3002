use serde::{Deserialize, Serialize};

use pnr_core::Coord;

/// Knobs of one router run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Worker threads for speculative path search; 0 uses the rayon default.
    pub threads: usize,
    /// Nets searched concurrently against one occupancy snapshot.
    pub batch_size: usize,
    /// Cost multiplier of a step against the layer's preferred direction.
    pub wrong_way_cost: Coord,
    /// Cost of a layer change. Defaults to twice the coarsest track pitch.
    pub via_cost: Option<Coord>,
    /// Side of a congestion cell, in tracks.
    pub gcell_size: usize,
    /// Extra cost of entering a full congestion cell, in pitches.
    pub congestion_weight: Coord,
    /// Node expansions allowed per connection; 0 means unbounded.
    pub max_expansions: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            batch_size: 8,
            wrong_way_cost: 3,
            via_cost: None,
            gcell_size: 4,
            congestion_weight: 2,
            max_expansions: 0,
        }
    }
}
