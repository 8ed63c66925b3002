//! Opaque integer ids for design entities.
//!
//! Every id is a thin `u32` arena index. Ids are assigned in creation order
//! and never reused, which makes them usable as deterministic tie-breakers.

use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u32);

        impl $name {
            pub fn from_raw(index: u32) -> Self {
                Self(index)
            }

            pub fn as_raw(self) -> u32 {
                self.0
            }

            pub fn index(self) -> usize {
                self.0 as usize
            }

            pub fn from_index(index: usize) -> Self {
                Self(index as u32)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

define_id!(
    /// Technology layer, numbered in stack order of declaration.
    LayerId, "L"
);

define_id!(
    /// Placed instance of a cell master.
    InstanceId, "I"
);

define_id!(
    /// Net connecting instance pins and ports.
    NetId, "N"
);

define_id!(
    /// Top-level I/O port of the design.
    PortId, "P"
);

define_id!(
    /// Obstruction (global blockage or per-instance keepout).
    ObstructionId, "O"
);

define_id!(
    /// Shape slot in a spatial index arena.
    ShapeId, "S"
);
