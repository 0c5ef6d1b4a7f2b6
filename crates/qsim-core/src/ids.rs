//! Strongly typed, zero-cost identifier wrappers.
//!
//! All IDs are `Copy + Ord + Hash` so they can be used as map keys and sorted
//! collection elements without ceremony.  Ordering matters: the node mover
//! visits in-links in ascending `LinkId` order and partitions are merged in
//! ascending `PartitionId` order, so the derived `Ord` is part of the
//! determinism contract.

use std::fmt;

/// Generate a typed ID wrapper around a primitive integer.
macro_rules! typed_id {
    ($(#[$attr:meta])* $vis:vis struct $name:ident($inner:ty);) => {
        $(#[$attr])*
        #[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        $vis struct $name(pub $inner);

        impl $name {
            /// Sentinel meaning "no valid ID".
            pub const INVALID: $name = $name(<$inner>::MAX);

            /// Cast to `usize` for direct use as a `Vec` index.
            #[inline(always)]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl Default for $name {
            /// Returns the `INVALID` sentinel so uninitialized IDs are visibly invalid.
            #[inline(always)]
            fn default() -> Self {
                Self::INVALID
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl From<$name> for usize {
            #[inline(always)]
            fn from(id: $name) -> usize {
                id.0 as usize
            }
        }

        impl TryFrom<usize> for $name {
            type Error = std::num::TryFromIntError;
            fn try_from(n: usize) -> Result<$name, Self::Error> {
                <$inner>::try_from(n).map($name)
            }
        }
    };
}

typed_id! {
    /// A traveller, or the synthetic driver of a transit departure.
    pub struct PersonId(u32);
}

typed_id! {
    /// A physical vehicle (private car or transit vehicle).
    pub struct VehicleId(u32);
}

typed_id! {
    /// Index into the vehicle type registry.
    pub struct VehicleTypeId(u16);
}

typed_id! {
    /// Index of a network node.
    pub struct NodeId(u32);
}

typed_id! {
    /// Index of a directed network link.  Link ids are dense and stable: the
    /// id handed out by the network builder is the id in every event.
    pub struct LinkId(u32);
}

typed_id! {
    /// A transit stop facility (located on exactly one link).
    pub struct StopId(u32);
}

typed_id! {
    /// A transit line.
    pub struct LineId(u32);
}

typed_id! {
    /// A route within a transit line.
    pub struct TransitRouteId(u32);
}

typed_id! {
    /// One scheduled departure of a transit route.
    pub struct DepartureId(u32);
}

typed_id! {
    /// A network partition (one worker per partition).
    pub struct PartitionId(u32);
}
