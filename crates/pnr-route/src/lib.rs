//! # pnr route
//!
//! Grid-based maze router. Nets are routed shortest first by A* over a
//! layer-aware track grid, with congestion-biased costs, speculative
//! parallel search and serialized commits into the design database.

pub mod astar;
pub mod config;
pub mod congestion;
pub mod grid;
pub mod prim;
pub mod router;

pub use config::RouterConfig;
pub use grid::{Owner, RoutingGrid};
pub use router::{Router, RoutingReport};
