//! `qsim-core` — foundational types for the queue-based mobility simulation.
//!
//! This crate is a dependency of every other `qsim-*` crate.  It has no
//! `qsim-*` dependencies and only `thiserror` (plus optional `serde`) from the
//! outside world.
//!
//! # What lives here
//!
//! | Module          | Contents                                                |
//! |-----------------|---------------------------------------------------------|
//! | [`ids`]         | `PersonId`, `VehicleId`, `LinkId`, `NodeId`, `StopId`, … |
//! | [`geo`]         | `Coord` (planar, metres)                                |
//! | [`time`]        | `SimTime`, `SimClock`                                   |
//! | [`config`]      | `SimConfig`, `VehicleBehavior`                          |
//! | [`transport`]   | `LegMode` enum                                          |
//! | [`vehicle`]     | `VehicleType`, `Vehicles` registry                      |
//! | [`error`]       | `CoreError`, `CoreResult`                               |
//!
//! # Feature flags
//!
//! | Flag    | Effect                                                     |
//! |---------|------------------------------------------------------------|
//! | `serde` | Adds `Serialize`/`Deserialize` to ids, time and config.    |

pub mod config;
pub mod error;
pub mod geo;
pub mod ids;
pub mod time;
pub mod transport;
pub mod vehicle;


// ── Re-exports ────────────────────────────────────────────────────────────────

pub use config::{SimConfig, VehicleBehavior};
pub use error::{CoreError, CoreResult};
pub use geo::Coord;
pub use ids::{
    DepartureId, LineId, LinkId, NodeId, PartitionId, PersonId, StopId, TransitRouteId,
    VehicleId, VehicleTypeId,
};
pub use time::{SimClock, SimTime};
pub use transport::LegMode;
pub use vehicle::{VehicleType, Vehicles};
