//! `qsim-events` — the simulation's event stream.
//!
//! # Crate layout
//!
//! | Module      | Contents                                                      |
//! |-------------|---------------------------------------------------------------|
//! | [`event`]   | `Event`, `EventKind`, `AbortSubject`                          |
//! | [`buffer`]  | `EventBuffer` (one per partition), `merge_buffers`            |
//! | [`handler`] | `EventHandler` trait, `EventsManager`, `EventsCollector`, `EventCounter` |

pub mod buffer;
pub mod event;
pub mod handler;


pub use buffer::{merge_buffers, EventBuffer, SequencedEvent};
pub use event::{AbortSubject, Event, EventKind};
pub use handler::{EventCounter, EventHandler, EventsCollector, EventsManager};
