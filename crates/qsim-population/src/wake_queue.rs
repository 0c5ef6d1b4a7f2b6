//! `WakeQueue` — sparse time-ordered activation queue.
//!
//! Most agents are idle most steps (performing an activity, or teleporting).
//! Iterating all of them every step to ask "do you need attention?" would
//! cost O(N) per step regardless of how many are actually due.
//!
//! `WakeQueue` inverts the problem: an entity registers the time at which it
//! needs attention next, and each step drains only what is due.  The same
//! structure serves activity ends (`PersonId`), transit departures, and
//! teleport arrivals, so it is generic over the queued item.
//!
//! Items due at the same time come out in push order, which keeps the
//! processing order independent of hashing or thread scheduling.

use std::collections::BTreeMap;

use qsim_core::SimTime;

/// A priority queue mapping simulation times → items due at that time.
#[derive(Debug, Clone)]
pub struct WakeQueue<T> {
    inner: BTreeMap<SimTime, Vec<T>>,
    /// Cached total item count for O(1) `len()`.
    total: usize,
}

impl<T> Default for WakeQueue<T> {
    fn default() -> Self {
        Self { inner: BTreeMap::new(), total: 0 }
    }
}

impl<T> WakeQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `item` to wake at `time`.
    pub fn push(&mut self, time: SimTime, item: T) {
        self.inner.entry(time).or_default().push(item);
        self.total += 1;
    }

    /// Remove and return all items scheduled for exactly `time`.
    ///
    /// Returns `None` if nothing is queued for that time (avoids allocation
    /// on the common empty step).
    pub fn drain_at(&mut self, time: SimTime) -> Option<Vec<T>> {
        let items = self.inner.remove(&time)?;
        self.total -= items.len();
        Some(items)
    }

    /// Remove and return every item due at or before `now`, earliest first.
    ///
    /// With a step size above one second, several distinct wake times fall
    /// into one step; this collects all of them.
    pub fn drain_until(&mut self, now: SimTime) -> Vec<T> {
        let mut out = Vec::new();
        while let Some(entry) = self.inner.first_entry() {
            if *entry.key() > now {
                break;
            }
            let items = entry.remove();
            self.total -= items.len();
            out.extend(items);
        }
        out
    }

    /// Remove everything, earliest first.
    pub fn drain_all(&mut self) -> Vec<T> {
        self.total = 0;
        std::mem::take(&mut self.inner).into_values().flatten().collect()
    }

    /// The earliest time with at least one queued item, or `None` if empty.
    pub fn next_time(&self) -> Option<SimTime> {
        self.inner.keys().next().copied()
    }

    /// Total number of queued items across all future times.
    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Number of distinct future times that have at least one queued item.
    pub fn time_count(&self) -> usize {
        self.inner.len()
    }

    /// Iterate queued items in wake order without removing them.
    pub fn iter(&self) -> impl Iterator<Item = (SimTime, &T)> + '_ {
        self.inner.iter().flat_map(|(t, v)| v.iter().map(move |item| (*t, item)))
    }
}
