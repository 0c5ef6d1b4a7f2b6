//! Event listeners.
//!
//! Handlers receive the merged stream on the orchestrator thread after every
//! step.  They only observe: nothing they do feeds back into the simulation.

use std::collections::BTreeMap;

use crate::Event;

/// Receives every event in merged order.
pub trait EventHandler: Send {
    fn handle_event(&mut self, event: &Event);

    /// Called once after the last step.
    fn finish(&mut self) {}
}

/// Fan-out of merged events to registered handlers.
#[derive(Default)]
pub struct EventsManager {
    handlers: Vec<Box<dyn EventHandler>>,
    processed: u64,
}

impl EventsManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_handler(&mut self, handler: Box<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Dispatch a merged batch to every handler, in registration order.
    pub fn process(&mut self, events: &[Event]) {
        for event in events {
            for h in &mut self.handlers {
                h.handle_event(event);
            }
        }
        self.processed += events.len() as u64;
    }

    pub fn finish(&mut self) {
        for h in &mut self.handlers {
            h.finish();
        }
    }

    /// Total events dispatched so far.
    pub fn processed(&self) -> u64 {
        self.processed
    }
}

// ── EventsCollector ───────────────────────────────────────────────────────────

/// Keeps a copy of every event it is given.
///
/// Owns its events; read them back from the value that saw the run (for
/// example by passing it to `QSim::run` as the observer).
#[derive(Clone, Debug, Default)]
pub struct EventsCollector {
    events: Vec<Event>,
}

impl EventsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl EventHandler for EventsCollector {
    fn handle_event(&mut self, event: &Event) {
        self.events.push(event.clone());
    }
}

// ── EventCounter ──────────────────────────────────────────────────────────────

/// Counts events per type name.
#[derive(Clone, Debug, Default)]
pub struct EventCounter {
    counts: BTreeMap<&'static str, u64>,
}

impl EventCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events seen with this type name.
    pub fn count(&self, type_name: &str) -> u64 {
        self.counts.get(type_name).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// All counters, ordered by type name.
    pub fn counts(&self) -> &BTreeMap<&'static str, u64> {
        &self.counts
    }
}

impl EventHandler for EventCounter {
    fn handle_event(&mut self, event: &Event) {
        *self.counts.entry(event.type_name()).or_insert(0) += 1;
    }
}
