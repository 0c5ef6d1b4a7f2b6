//! Run configuration.
//!
//! Typically loaded from a JSON file by the application crate (with the
//! `serde` feature) and handed to `QSimBuilder`.  Every field has a default,
//! so a config file only needs to name what it changes.

use crate::{CoreError, CoreResult, LegMode, SimClock, SimTime};

// ── VehicleBehavior ───────────────────────────────────────────────────────────

/// What happens when an agent departs on a network leg and its vehicle is
/// not parked on the departure link.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum VehicleBehavior {
    /// The agent waits on the link until the vehicle is parked there.
    #[default]
    Wait,
    /// The run fails with a data-inconsistency error.
    Exception,
}

// ── SimConfig ─────────────────────────────────────────────────────────────────

/// Top-level simulation configuration.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SimConfig {
    /// Time of the first step.
    pub start_time: SimTime,

    /// Last simulated step (inclusive).  `None` runs until every agent has
    /// finished its plan and no vehicle is left on the network.
    pub end_time: Option<SimTime>,

    /// Seconds per step.  Must be ≥ 1.  Default: 1.
    pub time_step_secs: u32,

    /// Number of network partitions (one worker each).  Default: 1.
    pub num_partitions: usize,

    /// Worker thread count passed to Rayon.  `None` uses all logical cores.
    /// Only read with the `parallel` feature of `qsim-sim`.
    pub num_threads: Option<usize>,

    /// Multiplier on every link's flow capacity (sample-size scaling).
    pub flow_capacity_factor: f64,

    /// Multiplier on every link's storage capacity (sample-size scaling).
    pub storage_capacity_factor: f64,

    /// Seconds a vehicle may wait at the front of a buffer before it counts
    /// as stuck.
    pub stuck_time_secs: u32,

    /// Remove stuck vehicles (aborting driver and passengers) instead of
    /// letting them wait for downstream space indefinitely.
    pub remove_stuck_vehicles: bool,

    /// Behavior when a departing agent's vehicle is elsewhere.
    pub vehicle_behavior: VehicleBehavior,

    /// Leg modes simulated on the network.  Legs in other modes (except
    /// transit passenger legs) are teleported.
    pub network_modes: Vec<LegMode>,

    /// Call `SimObserver::on_snapshot` every N steps.  0 disables snapshots.
    pub snapshot_interval_steps: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            start_time:              SimTime::ZERO,
            end_time:                None,
            time_step_secs:          1,
            num_partitions:          1,
            num_threads:             None,
            flow_capacity_factor:    1.0,
            storage_capacity_factor: 1.0,
            stuck_time_secs:         10,
            remove_stuck_vehicles:   false,
            vehicle_behavior:        VehicleBehavior::Wait,
            network_modes:           vec![LegMode::Car],
            snapshot_interval_steps: 0,
        }
    }
}

impl SimConfig {
    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> CoreResult<()> {
        if self.time_step_secs == 0 {
            return Err(CoreError::Config("time_step_secs must be at least 1".into()));
        }
        if self.num_partitions == 0 {
            return Err(CoreError::Config("num_partitions must be at least 1".into()));
        }
        if self.num_threads == Some(0) {
            return Err(CoreError::Config("num_threads must be at least 1 when set".into()));
        }
        if !(self.flow_capacity_factor > 0.0) || !self.flow_capacity_factor.is_finite() {
            return Err(CoreError::Config(format!(
                "flow_capacity_factor must be positive, got {}",
                self.flow_capacity_factor
            )));
        }
        if !(self.storage_capacity_factor > 0.0) || !self.storage_capacity_factor.is_finite() {
            return Err(CoreError::Config(format!(
                "storage_capacity_factor must be positive, got {}",
                self.storage_capacity_factor
            )));
        }
        if let Some(end) = self.end_time {
            if end < self.start_time {
                return Err(CoreError::Config(format!(
                    "end_time {end} is before start_time {}",
                    self.start_time
                )));
            }
        }
        Ok(())
    }

    /// `true` if legs in `mode` are moved over the network.
    #[inline]
    pub fn is_network_mode(&self, mode: LegMode) -> bool {
        self.network_modes.contains(&mode)
    }

    /// Construct a `SimClock` pre-configured for this run.
    pub fn make_clock(&self) -> SimClock {
        SimClock::new(self.start_time, self.time_step_secs)
    }
}
