//! `qsim-engine` — the queue model: links, nodes, vehicles, and the agents
//! that drive and ride them.
//!
//! # Crate layout
//!
//! | Module             | Contents                                                  |
//! |--------------------|-----------------------------------------------------------|
//! | [`flow`]           | `FlowCapacity` — per-step outflow accumulator             |
//! | [`link_queue`]     | `LinkQueue` (q, buffer, waiting, held), `SplitOutLink`, `VehicleHandler` |
//! | [`link_table`]     | `LinkTable` — one partition's slots for every link        |
//! | [`node_mover`]     | `move_node` — two-phase node crossing                     |
//! | [`advance`]        | `LinkAdvance` — standard handler (traffic entry, stops, arrival) |
//! | [`agent`]          | `PersonAgent`, `RouteCursor`, `MovableOnNetwork`          |
//! | [`transit_driver`] | `TransitDriverAgent`, `SchedulesStops`, delay computation |
//! | [`boarding`]       | `AccessEgress`, `StopAgentTracker`                        |
//! | [`vehicle`]        | `QVehicle`, `Driver`, `Cabin`, `CarriesPassengers`        |
//! | [`error`]          | `EngineError`, `EngineResult<T>`                          |
//!
//! Nothing in this crate knows about threads.  A partition owns a
//! `LinkTable` and drives it through `advance` and `move_node`; everything
//! that crosses a partition boundary comes back as a value (`Handoff`,
//! storage changes) for the orchestrator to deliver.

pub mod advance;
pub mod agent;
pub mod boarding;
pub mod error;
pub mod flow;
pub mod link_queue;
pub mod link_table;
pub mod node_mover;
pub mod transit_driver;
pub mod vehicle;

#[cfg(test)]
mod tests;

pub use advance::LinkAdvance;
pub use agent::{
    default_vehicle_of, AfterLeg, AgentState, LegState, MovableOnNetwork, PersonAgent, RouteCursor,
};
pub use boarding::{AccessEgress, BoardingOutcome, StopAgentTracker, StopContext};
pub use error::{EngineError, EngineResult};
pub use flow::FlowCapacity;
pub use link_queue::{
    Disposition, LinkOccupancy, LinkQueue, Origin, SplitOutLink, StorageSync, VehicleHandler,
};
pub use link_table::{LinkSlot, LinkTable};
pub use node_mover::{move_node, Handoff, MoverSettings, NodeMoveResult};
pub use transit_driver::{
    arrival_delay, departure_delay, DriverState, SchedulesStops, SharedRoute, StopServices,
    StopVehicle, TransitDriverAgent,
};
pub use vehicle::{Cabin, CarriesPassengers, Driver, QVehicle};
