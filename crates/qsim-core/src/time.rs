//! Simulation time model.
//!
//! # Design
//!
//! Time is an integer number of seconds since midnight of the simulated day
//! (`SimTime`).  Plans and schedules routinely exceed 24:00:00, so the value
//! is not wrapped.  The engine advances in fixed steps of
//! `SimConfig::time_step_secs` seconds, held by `SimClock`.
//!
//! Integer seconds keep every queue and schedule comparison exact; the only
//! floating-point quantities in the engine are capacities and delays.

use std::fmt;

use crate::{CoreError, CoreResult};

// ── SimTime ───────────────────────────────────────────────────────────────────

/// An absolute simulation time in whole seconds.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SimTime(pub u32);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0);
    pub const MAX: SimTime = SimTime(u32::MAX);

    /// Build a time from hours, minutes and seconds.
    #[inline]
    pub const fn hms(h: u32, m: u32, s: u32) -> SimTime {
        SimTime(h * 3_600 + m * 60 + s)
    }

    #[inline]
    pub fn secs(self) -> u32 {
        self.0
    }

    /// Return the time `secs` seconds after `self` (saturating).
    #[inline]
    pub fn offset(self, secs: u32) -> SimTime {
        SimTime(self.0.saturating_add(secs))
    }

    /// Seconds elapsed from `earlier` to `self`, zero if `earlier` is later.
    #[inline]
    pub fn since(self, earlier: SimTime) -> u32 {
        self.0.saturating_sub(earlier.0)
    }

    /// Parse `"HH:MM:SS"`, `"HH:MM"` or a plain number of seconds.
    pub fn parse(s: &str) -> CoreResult<SimTime> {
        let s = s.trim();
        if !s.contains(':') {
            return s
                .parse::<u32>()
                .map(SimTime)
                .map_err(|_| CoreError::Parse(format!("invalid time {s:?}")));
        }
        let mut parts = [0u32; 3];
        let mut count = 0;
        for piece in s.split(':') {
            if count == 3 {
                return Err(CoreError::Parse(format!("invalid time {s:?}: too many fields")));
            }
            parts[count] = piece
                .parse::<u32>()
                .map_err(|_| CoreError::Parse(format!("invalid time {s:?}")))?;
            count += 1;
        }
        if count < 2 || parts[1] >= 60 || parts[2] >= 60 {
            return Err(CoreError::Parse(format!("invalid time {s:?}")));
        }
        Ok(SimTime::hms(parts[0], parts[1], parts[2]))
    }
}

impl std::ops::Add<u32> for SimTime {
    type Output = SimTime;
    #[inline]
    fn add(self, rhs: u32) -> SimTime {
        self.offset(rhs)
    }
}

impl std::ops::Sub for SimTime {
    type Output = u32;
    #[inline]
    fn sub(self, rhs: SimTime) -> u32 {
        self.since(rhs)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let h = self.0 / 3_600;
        let m = (self.0 % 3_600) / 60;
        let s = self.0 % 60;
        write!(f, "{h:02}:{m:02}:{s:02}")
    }
}

// ── SimClock ──────────────────────────────────────────────────────────────────

/// The discrete global clock advanced once per step by the orchestrator.
///
/// `SimClock` is cheap to copy and intentionally holds no heap data.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SimClock {
    /// Time of the first step.
    pub start: SimTime,
    /// Seconds per step.  Default: 1.
    pub step_secs: u32,
    /// The current step time, advanced by `SimClock::advance()`.
    pub now: SimTime,
}

impl SimClock {
    pub fn new(start: SimTime, step_secs: u32) -> Self {
        Self { start, step_secs: step_secs.max(1), now: start }
    }

    /// Advance the clock by one step.
    #[inline]
    pub fn advance(&mut self) {
        self.now = self.now.offset(self.step_secs);
    }

    /// Number of steps taken since `start`.
    #[inline]
    pub fn steps_elapsed(&self) -> u64 {
        (self.now.since(self.start) / self.step_secs) as u64
    }

    /// Steps needed to cover `secs` seconds (rounds up so nothing happens early).
    #[inline]
    pub fn steps_for_secs(&self, secs: u32) -> u32 {
        secs.div_ceil(self.step_secs)
    }
}

impl fmt::Display for SimClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (step {})", self.now, self.steps_elapsed())
    }
}
