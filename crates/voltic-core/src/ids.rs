//! Integer identifiers for registered entities.
//!
//! Ids are non-negative once assigned by the engine; the value `-1` is the
//! "none" sentinel used for unassigned entities and blanked references. Ids
//! are allocated monotonically and never reused within an engine instance
//! unless a caller supplies one manually.

use std::fmt;

/// Unique identifier for a registered module.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(pub i64);

/// Unique identifier for a registered cable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CableId(pub i64);

/// Unique identifier for a registered parameter handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamHandleId(pub i64);

macro_rules! impl_id {
    ($name:ident) => {
        impl $name {
            /// The unassigned / blanked sentinel.
            pub const NONE: $name = $name(-1);

            /// Returns true if this id is the `NONE` sentinel.
            #[inline]
            pub fn is_none(self) -> bool {
                self.0 < 0
            }

            /// Returns true if this id refers to a (possibly former) entity.
            #[inline]
            pub fn is_some(self) -> bool {
                self.0 >= 0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::NONE
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

impl_id!(ModuleId);
impl_id!(CableId);
impl_id!(ParamHandleId);
