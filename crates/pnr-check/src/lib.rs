//! # pnr check
//!
//! Verification of a placed and routed design. The checks read the
//! database only and report every problem found as a [`Violation`]
//! instead of stopping at the first one.

pub mod placement;
pub mod routing;
pub mod violation;

#[cfg(test)]
mod testutil;

pub use placement::check_placement;
pub use routing::check_routing;
pub use violation::{Severity, Violation, ViolationKind};

use pnr_core::DesignDatabase;

/// Placement and routing checks together.
pub fn check_design(db: &DesignDatabase) -> Vec<Violation> {
    let mut violations = check_placement(db);
    violations.extend(check_routing(db));
    violations
}

pub fn error_count(violations: &[Violation]) -> usize {
    violations.iter().filter(|v| v.is_error()).count()
}
