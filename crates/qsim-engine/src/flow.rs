//! Flow capacity accounting.
//!
//! A link may release `per_step = flow_capacity · step_secs · factor` PCE
//! per step.  The accumulator regains `per_step` each step and is capped at
//! `per_step`; a vehicle may leave while the accumulator is positive and
//! leaving subtracts its PCE.  The remainder carries over as debt, so a link
//! with 0.5 veh/s and 1 s steps releases one car every other step, and a bus
//! of 2.5 PCE blocks the link for several steps after it leaves.

use qsim_core::SimTime;

const EPSILON: f64 = 1e-9;

#[derive(Clone, Debug)]
pub struct FlowCapacity {
    per_step:    f64,
    step_secs:   u32,
    accumulated: f64,
    /// Time the accumulator value refers to.  `None` until first use.
    updated_at:  Option<SimTime>,
}

impl FlowCapacity {
    /// `flow_per_sec` in PCE per second, already scaled by the run's factor.
    pub fn new(flow_per_sec: f64, step_secs: u32) -> Self {
        let step_secs = step_secs.max(1);
        let per_step = flow_per_sec * step_secs as f64;
        Self { per_step, step_secs, accumulated: per_step, updated_at: None }
    }

    #[inline]
    pub fn per_step(&self) -> f64 {
        self.per_step
    }

    /// Accumulator value at `now` without mutating state.
    pub fn accumulated_at(&self, now: SimTime) -> f64 {
        match self.updated_at {
            None => self.accumulated,
            Some(t) => {
                let steps = now.since(t) / self.step_secs;
                (self.accumulated + steps as f64 * self.per_step).min(self.per_step)
            }
        }
    }

    /// `true` if a vehicle may leave at `now`.
    #[inline]
    pub fn has_capacity(&self, now: SimTime) -> bool {
        self.accumulated_at(now) > EPSILON
    }

    /// Charge `pce` against the capacity at `now`.
    pub fn consume(&mut self, now: SimTime, pce: f64) {
        self.accumulated = self.accumulated_at(now) - pce;
        self.updated_at = Some(now);
    }
}
