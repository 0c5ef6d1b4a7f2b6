//! `qsim-network` — network topology, partitioning, and routing.
//!
//! # Crate layout
//!
//! | Module        | Contents                                                    |
//! |---------------|-------------------------------------------------------------|
//! | [`network`]   | `Network` (CSR in/out links + R-tree), `NetworkBuilder`, `Link` |
//! | [`partition`] | `Partitioning` — node → partition assignment, link ownership |
//! | [`router`]    | `Router` trait, `Route`, `DijkstraRouter` (free-flow)       |
//! | [`loader`]    | `load_network_csv`, `load_network_reader`                   |
//! | [`error`]     | `NetworkError`, `NetworkResult<T>`                          |
//!
//! The network is immutable once built and is shared read-only by every
//! partition worker, so no synchronisation is needed to read it.

pub mod error;
pub mod loader;
pub mod network;
pub mod partition;
pub mod router;

#[cfg(test)]
mod tests;

pub use error::{NetworkError, NetworkResult};
pub use loader::{load_network_csv, load_network_reader};
pub use network::{Link, LinkAttributes, Network, NetworkBuilder, DEFAULT_CELL_SIZE_M};
pub use partition::Partitioning;
pub use router::{DijkstraRouter, Route, Router};
