//! Error taxonomy for the place-and-route backend.
//!
//! Import errors reject the whole import. Placement and routing errors are
//! per-entity and usually travel inside run reports instead of aborting.

use thiserror::Error;

use crate::ids::{InstanceId, NetId, PortId};

#[derive(Debug, Error)]
pub enum PnrError {
    /// Technology spec failed validation.
    #[error("malformed technology: {0}")]
    MalformedTechnology(String),

    /// Cell geometry (LEF) source could not be parsed.
    #[error("geometry parse error at line {line}: {message}")]
    GeometryParse { line: usize, message: String },

    /// Timing (Liberty) source could not be parsed.
    #[error("timing parse error at line {line}: {message}")]
    TimingParse { line: usize, message: String },

    /// A source referenced a cell that is not in the library.
    #[error("unknown cell reference '{0}'")]
    UnknownCellReference(String),

    /// Netlist (Verilog) source could not be parsed.
    #[error("netlist parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// A netlist instance names a cell that is missing or has no geometry.
    #[error("instance '{instance}' references unresolved cell '{cell}'")]
    UnresolvedCellReference { instance: String, cell: String },

    /// A net with fewer than two terminals.
    #[error("net '{net}' is dangling: {terminals} terminal(s)")]
    DanglingPin { net: String, terminals: usize },

    /// A connection names a pin the cell does not have.
    #[error("instance '{instance}' has no pin '{pin}'")]
    UnknownPin { instance: String, pin: String },

    /// A pin connected to more than one net.
    #[error("pin '{instance}/{pin}' is connected to both '{first}' and '{second}'")]
    PinConflict {
        instance: String,
        pin: String,
        first: String,
        second: String,
    },

    /// A move that would break placement legality. The database is unchanged.
    #[error("placement collision for {instance}: {reason}")]
    PlacementCollision { instance: InstanceId, reason: String },

    /// Legalization found no free slot within the probe budget.
    #[error("placement infeasible for {0}")]
    PlacementInfeasible(InstanceId),

    /// Every boundary track is taken; the port stays unplaced.
    #[error("no free boundary track for port {0}")]
    PortPlacementInfeasible(PortId),

    /// No route exists for the net under the current occupancy.
    #[error("route failed for {net}: {reason}")]
    RouteFailed { net: NetId, reason: String },

    #[error("unknown instance {0}")]
    UnknownInstance(InstanceId),

    #[error("unknown net {0}")]
    UnknownNet(NetId),

    /// Operation not allowed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PnrError {
    pub fn malformed(message: impl Into<String>) -> Self {
        PnrError::MalformedTechnology(message.into())
    }

    pub fn route_failed(net: NetId, reason: impl Into<String>) -> Self {
        PnrError::RouteFailed {
            net,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PnrError>;
