//! Observer hooks, step summaries and end-of-run statistics.

use qsim_core::SimTime;
use qsim_engine::LinkOccupancy;
use qsim_events::{Event, EventCounter, EventHandler, EventsCollector};

/// Per-step counts reported to [`SimObserver::on_step_end`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StepSummary {
    pub time:                SimTime,
    pub events:              usize,
    pub departures:          u64,
    pub arrivals:            u64,
    /// Vehicles on any link (moving, queued, held or waiting to enter).
    pub vehicles_on_network: usize,
    pub agents_at_activity:  usize,
}

/// Occupancy of every link, ascending by link id.
#[derive(Clone, Debug, Default)]
pub struct NetworkSnapshot {
    pub time:  SimTime,
    pub links: Vec<LinkOccupancy>,
}

/// Totals for a finished run.
///
/// `aborted_agents` and `finished_agents` count population members only;
/// transit drivers are not part of the population.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SimStats {
    pub vehicles_entered: u64,
    pub vehicles_left:    u64,
    pub departures:       u64,
    pub arrivals:         u64,
    pub aborted_agents:   u64,
    pub finished_agents:  u64,
    pub steps:            u64,
    pub end_time:         SimTime,
}

/// Callbacks invoked by [`QSim::run`][crate::QSim::run] at key points in the
/// step loop.
///
/// All methods have default no-op implementations so implementors only need
/// to override what they care about.  Observers see the simulation; they
/// cannot change it.
///
/// # Example — progress printer
///
/// ```rust,ignore
/// struct Progress;
///
/// impl SimObserver for Progress {
///     fn on_step_end(&mut self, now: SimTime, summary: &StepSummary) {
///         if now.secs() % 3_600 == 0 {
///             println!("{now}: {} vehicles on the network", summary.vehicles_on_network);
///         }
///     }
/// }
/// ```
pub trait SimObserver {
    /// Called at the very start of each step, before any partition runs.
    fn on_step_start(&mut self, _now: SimTime) {}

    /// Called with the merged events of a step, in final order.
    fn on_events(&mut self, _events: &[Event]) {}

    /// Called at the end of each step.
    fn on_step_end(&mut self, _now: SimTime, _summary: &StepSummary) {}

    /// Called every `config.snapshot_interval_steps` steps.
    fn on_snapshot(&mut self, _now: SimTime, _snapshot: &NetworkSnapshot) {}

    /// Called once after the final step.
    fn on_sim_end(&mut self, _stats: &SimStats) {}
}

/// A [`SimObserver`] that does nothing.
pub struct NoopObserver;

impl SimObserver for NoopObserver {}

impl<O: SimObserver + ?Sized> SimObserver for &mut O {
    fn on_step_start(&mut self, now: SimTime) {
        (**self).on_step_start(now);
    }

    fn on_events(&mut self, events: &[Event]) {
        (**self).on_events(events);
    }

    fn on_step_end(&mut self, now: SimTime, summary: &StepSummary) {
        (**self).on_step_end(now, summary);
    }

    fn on_snapshot(&mut self, now: SimTime, snapshot: &NetworkSnapshot) {
        (**self).on_snapshot(now, snapshot);
    }

    fn on_sim_end(&mut self, stats: &SimStats) {
        (**self).on_sim_end(stats);
    }
}

/// Both observers see every hook, `A` first.
impl<A: SimObserver, B: SimObserver> SimObserver for (A, B) {
    fn on_step_start(&mut self, now: SimTime) {
        self.0.on_step_start(now);
        self.1.on_step_start(now);
    }

    fn on_events(&mut self, events: &[Event]) {
        self.0.on_events(events);
        self.1.on_events(events);
    }

    fn on_step_end(&mut self, now: SimTime, summary: &StepSummary) {
        self.0.on_step_end(now, summary);
        self.1.on_step_end(now, summary);
    }

    fn on_snapshot(&mut self, now: SimTime, snapshot: &NetworkSnapshot) {
        self.0.on_snapshot(now, snapshot);
        self.1.on_snapshot(now, snapshot);
    }

    fn on_sim_end(&mut self, stats: &SimStats) {
        self.0.on_sim_end(stats);
        self.1.on_sim_end(stats);
    }
}

impl SimObserver for EventsCollector {
    fn on_events(&mut self, events: &[Event]) {
        for e in events {
            self.handle_event(e);
        }
    }
}

impl SimObserver for EventCounter {
    fn on_events(&mut self, events: &[Event]) {
        for e in events {
            self.handle_event(e);
        }
    }
}
