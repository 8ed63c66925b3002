use serde::{Deserialize, Serialize};

use pnr_core::{LayerId, Rect};

/// What rule a violation breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ViolationKind {
    /// Two placed instances share area.
    Overlap,
    /// Instance footprint or port outside the floorplan boundary.
    OutOfBoundary,
    /// Placed cell or route piece on top of an obstruction or keepout.
    ObstructionOverlap,
    /// Instance or port without a position.
    Unplaced,
    /// Wire drawn on a layer that is not a routing layer.
    NonRoutingLayer,
    /// Geometry of two different nets overlapping on one layer.
    Short,
    /// Different-net wires closer than the layer's minimum spacing.
    MinSpacing,
    /// A routed net whose geometry does not join all of its terminals.
    Open,
    /// Net left without a route.
    Unrouted,
}

/// Severity level of a violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub severity: Severity,
    pub message: String,
    pub layer: Option<LayerId>,
    /// Region of the violation, when it has one.
    pub bbox: Option<Rect>,
}

impl Violation {
    pub fn error(kind: ViolationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Error,
            message: message.into(),
            layer: None,
            bbox: None,
        }
    }

    pub fn warning(kind: ViolationKind, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(kind, message)
        }
    }

    pub fn on_layer(mut self, layer: LayerId) -> Self {
        self.layer = Some(layer);
        self
    }

    pub fn at(mut self, bbox: Rect) -> Self {
        self.bbox = Some(bbox);
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}
