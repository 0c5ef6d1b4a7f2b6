//! `qsim-population` — plans, populations, wake queue, and CSV loading.
//!
//! # Crate layout
//!
//! | Module         | Contents                                                    |
//! |----------------|-------------------------------------------------------------|
//! | [`plan`]       | `Activity`, `Leg`, `Route`, `NetworkRoute`, `Plan`, `Population` |
//! | [`wake_queue`] | `WakeQueue<T>` (`BTreeMap<SimTime, Vec<T>>`)                |
//! | [`loader`]     | `load_population_csv`, `load_population_reader`             |
//! | [`error`]      | `PopulationError`, `PopulationResult<T>`                    |
//!
//! Plans are inputs: the engine executes them as given and never changes
//! them.  Route choice and activity scheduling happen elsewhere.

pub mod error;
pub mod loader;
pub mod plan;
pub mod wake_queue;


pub use error::{PopulationError, PopulationResult};
pub use loader::{load_population_csv, load_population_reader};
pub use plan::{
    Activity, Leg, NetworkRoute, Person, Plan, PlanElement, Population, Route,
    TransitPassengerRoute,
};
pub use wake_queue::WakeQueue;
