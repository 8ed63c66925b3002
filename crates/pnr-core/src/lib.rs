//! # pnr core
//!
//! Technology model, cell library, gate-level netlist and the design
//! database shared by the floorplanner and the router. Spatial queries are
//! backed by R-trees over arenas of shapes with stable integer ids.

pub mod cell;
pub mod database;
pub mod error;
pub mod geometry;
pub mod ids;
pub mod layer;
pub mod library;
pub mod netlist;
pub mod query;
pub mod spatial;
pub mod technology;

pub use cell::{CellGeometry, CellMaster, CellPin, CellTiming, LayerShape, PinDirection, PinUse};
pub use database::{
    DesignDatabase, DesignSnapshot, Instance, Net, Obstruction, ObstructionScope,
    PlacementStatus, Port, RouteSegment, RouteState, Via,
};
pub use error::{PnrError, Result};
pub use geometry::{Coord, Orientation, Point, Polygon, Rect, Shape};
pub use ids::{InstanceId, LayerId, NetId, ObstructionId, PortId, ShapeId};
pub use layer::{Layer, LayerKind, RoutingDirection};
pub use library::{CellLibrary, LibraryImportOptions};
pub use netlist::{Module, NetlistGraph, PortDirection, Terminal};
pub use query::LayerQuery;
pub use technology::{Technology, TechnologySpec};
