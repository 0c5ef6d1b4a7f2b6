//! `qsim-output` — event and step-summary writers for the queue simulation.
//!
//! Three backends are provided behind Cargo features:
//!
//! | Feature   | Backend     | Files created                                   |
//! |-----------|-------------|-------------------------------------------------|
//! | *(none)*  | CSV         | `events.csv`, `step_summaries.csv`              |
//! | `sqlite`  | SQLite      | `output.db`                                     |
//! | `parquet` | Parquet     | `events.parquet`, `step_summaries.parquet`      |
//!
//! All backends implement [`OutputWriter`] and are driven by
//! [`SimOutputObserver`], which implements `qsim_sim::SimObserver`.
//!
//! # Usage
//!
//! ```rust,ignore
//! use qsim_output::{CsvWriter, SimOutputObserver};
//!
//! let writer = CsvWriter::new(Path::new("./output"))?;
//! let mut obs = SimOutputObserver::new(writer);
//! sim.run(&mut obs)?;
//! if let Some(e) = obs.take_error() {
//!     eprintln!("output error: {e}");
//! }
//! ```

pub mod csv;
pub mod error;
pub mod observer;
pub mod row;
pub mod writer;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "parquet")]
pub mod parquet;


pub use csv::{read_events_csv, CsvWriter};
pub use error::{OutputError, OutputResult};
pub use observer::SimOutputObserver;
pub use row::{EventRow, StepSummaryRow, EVENT_COLUMNS};
pub use writer::OutputWriter;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteWriter;

#[cfg(feature = "parquet")]
pub use parquet::ParquetWriter;
