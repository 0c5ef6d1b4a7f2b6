//! `qsim-sim` — partitioned step loop for the queue-based mobility simulation.
//!
//! # Step loop
//!
//! ```text
//! while now ≤ end_time and something is alive:
//!   ① every partition runs its phases (parallel with the `parallel` feature):
//!        teleport arrivals → activity ends → transit departures →
//!        link advance → deferred departures → node mover → outbox
//!   ② barrier: each partition receives its mailboxes in ascending source order
//!   ③ events of all partitions are merged by (time, partition, seq) and
//!      handed to the event handlers, then to the observer
//!   ④ now += time_step_secs
//! ```
//!
//! When the loop ends, every agent and vehicle still alive is aborted with a
//! `StuckAndAbort` event and [`SimStats`] are returned.
//!
//! # Cargo features
//!
//! | Feature    | Effect                                                       |
//! |------------|--------------------------------------------------------------|
//! | `parallel` | Runs partition steps on Rayon's thread pool.                 |
//! | `fx-hash`  | Uses FxHash for the parked-vehicle tables.                   |
//!
//! # Quick-start
//!
//! ```rust,ignore
//! use qsim_core::SimConfig;
//! use qsim_sim::{NoopObserver, QSimBuilder};
//!
//! let mut sim = QSimBuilder::new(SimConfig::default(), network)
//!     .population(population)
//!     .build()?;
//! let stats = sim.run(&mut NoopObserver)?;
//! ```

pub mod builder;
pub mod error;
pub mod mailbox;
pub mod observer;
mod partition;
pub mod sim;


pub use builder::QSimBuilder;
pub use error::{SimError, SimResult};
pub use mailbox::{Mailboxes, Message};
pub use observer::{NetworkSnapshot, NoopObserver, SimObserver, SimStats, StepSummary};
pub use sim::QSim;
