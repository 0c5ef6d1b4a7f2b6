//! The `QSim` struct and its step loop.

use std::sync::atomic::AtomicBool;

use log::{error, info};

use qsim_core::{SimClock, SimConfig, SimTime};
use qsim_events::{merge_buffers, Event, EventKind, EventsManager};
use qsim_network::Network;

use crate::mailbox::Mailboxes;
use crate::partition::{Partition, Shared};
use crate::{NetworkSnapshot, SimError, SimObserver, SimResult, SimStats, StepSummary};

/// The partitioned queue simulation.
///
/// Each step runs every partition (in parallel with the `parallel` feature),
/// waits at the barrier, delivers cross-partition messages, merges the
/// partitions' events by `(time, partition, seq)` and hands them to the
/// event handlers and the observer.
///
/// Create via [`QSimBuilder`][crate::QSimBuilder].  A run that returned an
/// error cannot be resumed.
pub struct QSim {
    pub(crate) shared:     Shared,
    pub(crate) partitions: Vec<Partition>,
    pub(crate) mailboxes:  Mailboxes,
    pub(crate) events:     EventsManager,
    pub(crate) clock:      SimClock,
    pub(crate) stats:      SimStats,
    pub(crate) last_step:  Option<SimTime>,
    pub(crate) done:       bool,
    #[cfg(feature = "parallel")]
    pub(crate) pool:       rayon::ThreadPool,
}

impl QSim {
    // ── Accessors ─────────────────────────────────────────────────────────

    pub fn config(&self) -> &SimConfig {
        &self.shared.config
    }

    pub fn network(&self) -> &Network {
        &self.shared.network
    }

    /// Time of the next step.
    pub fn now(&self) -> SimTime {
        self.clock.now
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Counters so far; complete once the run has finished.
    pub fn stats(&self) -> &SimStats {
        &self.stats
    }

    /// `true` once the run ended (normally or with an error).
    pub fn is_finished(&self) -> bool {
        self.done
    }

    // ── Public API ────────────────────────────────────────────────────────

    /// Run until `end_time` has been simulated or nothing is left to do,
    /// then abort whatever is still alive and report the totals.
    pub fn run<O: SimObserver>(&mut self, observer: &mut O) -> SimResult<SimStats> {
        if self.done {
            return Err(SimError::Config("the run has already finished".into()));
        }
        info!(
            "qsim run starting at {}: {} partition(s), {} link(s)",
            self.clock.now,
            self.partitions.len(),
            self.shared.network.link_count()
        );
        while self.should_continue() {
            self.step(observer)?;
        }
        Ok(self.finish(observer))
    }

    /// Run at most `n` steps without finishing the run.
    ///
    /// Stops early when [`run`](Self::run) would.  Useful for tests and
    /// incremental stepping.
    pub fn run_steps<O: SimObserver>(&mut self, n: u64, observer: &mut O) -> SimResult<()> {
        if self.done {
            return Err(SimError::Config("the run has already finished".into()));
        }
        for _ in 0..n {
            if !self.should_continue() {
                break;
            }
            self.step(observer)?;
        }
        Ok(())
    }

    /// Abort every remaining agent and vehicle, flush events and return the
    /// totals.  Called by [`run`](Self::run); call it yourself after
    /// [`run_steps`](Self::run_steps).
    pub fn finish<O: SimObserver>(&mut self, observer: &mut O) -> SimStats {
        if self.done {
            return self.stats.clone();
        }
        self.done = true;
        let t = self.last_step.unwrap_or(self.shared.config.start_time);
        for p in &mut self.partitions {
            p.abort_remaining(t);
        }
        let events = self.collect_events();
        self.dispatch(&events, observer);

        for p in &self.partitions {
            let c = p.counts();
            self.stats.finished_agents += c.finished_agents;
            self.stats.aborted_agents += c.aborted_agents;
            self.stats.vehicles_left += c.aborted_in_traffic;
        }
        self.stats.end_time = t;
        self.events.finish();
        observer.on_sim_end(&self.stats);

        let s = &self.stats;
        info!(
            "qsim run finished at {t} after {} step(s): {} departures, {} arrivals, {} finished, {} aborted",
            s.steps, s.departures, s.arrivals, s.finished_agents, s.aborted_agents
        );
        if s.vehicles_entered != s.vehicles_left {
            error!("{} vehicles entered traffic but {} left", s.vehicles_entered, s.vehicles_left);
        }
        self.stats.clone()
    }

    // ── Core step processing ──────────────────────────────────────────────

    fn should_continue(&self) -> bool {
        if self.done {
            return false;
        }
        if self.shared.config.end_time.is_some_and(|end| self.clock.now > end) {
            return false;
        }
        self.partitions.iter().any(Partition::is_active) || !self.mailboxes.is_empty()
    }

    fn step<O: SimObserver>(&mut self, observer: &mut O) -> SimResult<()> {
        let now = self.clock.now;
        observer.on_step_start(now);

        let cancel = AtomicBool::new(false);
        let results = self.step_partitions(now, &cancel);

        // Lowest partition with a real error; the others were cancelled.
        let mut failure = None;
        for result in results {
            match result {
                Ok(()) => {}
                Err(SimError::Cancelled) => {
                    failure.get_or_insert(SimError::Cancelled);
                }
                Err(e) => {
                    if failure.as_ref().map_or(true, |f| matches!(f, SimError::Cancelled)) {
                        failure = Some(e);
                    }
                }
            }
        }
        if let Some(e) = failure {
            return self.fail(e, observer);
        }

        for i in 0..self.partitions.len() {
            let inbox = self.mailboxes.drain_for(self.partitions[i].id());
            if let Err(e) = self.partitions[i].receive(inbox) {
                return self.fail(e, observer);
            }
        }

        let events = self.collect_events();
        let (departures, arrivals) = self.dispatch(&events, observer);

        let summary = StepSummary {
            time: now,
            events: events.len(),
            departures,
            arrivals,
            vehicles_on_network: self.partitions.iter().map(Partition::vehicles_on_network).sum(),
            agents_at_activity: self.partitions.iter().map(Partition::agents_at_activity).sum(),
        };
        observer.on_step_end(now, &summary);

        let interval = self.shared.config.snapshot_interval_steps;
        if interval > 0 && self.stats.steps % interval == 0 {
            let mut links: Vec<_> = self.partitions.iter().flat_map(Partition::occupancy).collect();
            links.sort_by_key(|o| o.link);
            observer.on_snapshot(now, &NetworkSnapshot { time: now, links });
        }

        self.stats.steps += 1;
        self.last_step = Some(now);
        self.clock.advance();
        Ok(())
    }

    /// End the run with `e`, delivering the events emitted so far.
    fn fail<O: SimObserver>(&mut self, e: SimError, observer: &mut O) -> SimResult<()> {
        self.done = true;
        let events = self.collect_events();
        self.dispatch(&events, observer);
        self.events.finish();
        Err(e)
    }

    fn step_partitions(&mut self, now: SimTime, cancel: &AtomicBool) -> Vec<SimResult<()>> {
        let shared = &self.shared;
        let mailboxes = &self.mailboxes;

        #[cfg(not(feature = "parallel"))]
        {
            self.partitions
                .iter_mut()
                .map(|p| p.step(now, shared, mailboxes, cancel))
                .collect()
        }

        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;

            let partitions = &mut self.partitions;
            self.pool.install(|| {
                partitions
                    .par_iter_mut()
                    .map(|p| p.step(now, shared, mailboxes, cancel))
                    .collect()
            })
        }
    }

    fn collect_events(&mut self) -> Vec<Event> {
        merge_buffers(self.partitions.iter_mut().map(Partition::take_events))
    }

    /// Count, hand to the handlers, then to the observer.  Returns the
    /// departures and arrivals in `events`.
    fn dispatch<O: SimObserver>(&mut self, events: &[Event], observer: &mut O) -> (u64, u64) {
        let (mut departures, mut arrivals) = (0, 0);
        for e in events {
            match e.kind {
                EventKind::VehicleEntersTraffic { .. } => self.stats.vehicles_entered += 1,
                EventKind::VehicleLeavesTraffic { .. } => self.stats.vehicles_left += 1,
                EventKind::PersonDeparture { .. } => departures += 1,
                EventKind::PersonArrival { .. } => arrivals += 1,
                _ => {}
            }
        }
        self.stats.departures += departures;
        self.stats.arrivals += arrivals;
        self.events.process(events);
        observer.on_events(events);
        (departures, arrivals)
    }
}
