//! `qsim-transit` — the transit schedule.
//!
//! # Crate layout
//!
//! | Module       | Contents                                                       |
//! |--------------|----------------------------------------------------------------|
//! | [`schedule`] | `TransitSchedule`, `TransitLine`, `TransitRoute`, `TransitRouteStop`, `TransitStopFacility`, `Departure` |
//! | [`error`]    | `TransitError`, `TransitResult<T>`                             |
//!
//! The schedule is static input.  Each `Departure` becomes one transit
//! driver in the engine; the drivers of a route share its `Arc<TransitRoute>`.

pub mod error;
pub mod schedule;


pub use error::{TransitError, TransitResult};
pub use schedule::{
    Departure, ScheduledDeparture, TransitLine, TransitRoute, TransitRouteStop, TransitSchedule,
    TransitStopFacility,
};
