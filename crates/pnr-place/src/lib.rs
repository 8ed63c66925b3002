//! # pnr place
//!
//! Floorplanner: I/O ports on the boundary, force-directed global
//! placement, nearest-free-slot legalization, local-search refinement and
//! filler insertion.
//! Runs are deterministic for identical inputs at any thread count.

pub mod config;
pub mod fillers;
pub mod floorplanner;
pub mod global;
pub mod legalize;
pub mod ports;
pub mod refine;
pub mod sites;

pub use config::FloorplannerConfig;
pub use fillers::{insert_fillers, resolve_fillers};
pub use floorplanner::{Floorplanner, PlacementReport};
pub use sites::SiteGrid;
