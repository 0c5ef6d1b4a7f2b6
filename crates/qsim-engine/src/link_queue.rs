//! Per-link queue state.
//!
//! ```text
//!            enter()                 advance()                 pop_front()
//!  upstream ────────► q (FIFO, exit time) ───────► buffer (FIFO) ──────────► node mover
//!                     waiting (from activities) ─┘     ▲
//!                     held (transit dwell) ────────────┘
//! ```
//!
//! Every vehicle on the link proper (q, buffer, held) occupies storage
//! until it leaves.  A vehicle entering traffic from an activity moves from
//! the waiting list to the buffer only while the link has flow capacity
//! left beyond what is already buffered and storage for its PCE, so the
//! buffer never outgrows the link.
//!
//! On a split link the upstream partition tracks storage in a
//! [`SplitOutLink`] mirror.  The owner reports both what it releases and
//! what departures consume ([`StorageSync`]).  A hand-off that meets a link
//! filled by a departure in the same step waits in `inbound` at the
//! upstream end and enters once storage frees.

use std::collections::VecDeque;

use qsim_core::{LinkId, NodeId, PartitionId, SimTime};
use qsim_network::Link;

use crate::flow::FlowCapacity;
use crate::{EngineError, EngineResult, QVehicle};

const EPSILON: f64 = 1e-9;

/// Where a vehicle handed to [`VehicleHandler::on_ready`] came from.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Origin {
    /// Hold at a stop elapsed.
    Held,
    /// Entering traffic from the waiting list.
    Waiting,
    /// Reached the end of the link.
    Queue,
}

/// What happens to a vehicle that is ready to leave the link.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// Move to the buffer and wait for the node mover.
    Buffer,
    /// Stay on the link until `until` (transit dwell).
    Hold { until: SimTime },
    /// Leave the network here (arrival).
    Leave,
}

/// Decides the fate of vehicles during [`LinkQueue::advance`].
pub trait VehicleHandler {
    fn on_ready(
        &mut self,
        vehicle: &mut QVehicle,
        link:    LinkId,
        origin:  Origin,
        now:     SimTime,
    ) -> EngineResult<Disposition>;
}

#[derive(Debug)]
struct Slot {
    vehicle:  QVehicle,
    /// PCE this vehicle holds of the link's storage.
    occupies: f64,
}

#[derive(Debug)]
struct QEntry {
    slot:      Slot,
    /// Earliest time the vehicle reaches the downstream end.
    exit_time: SimTime,
}

/// A vehicle dwelling at a stop on this link.
#[derive(Debug)]
struct Held {
    slot:  Slot,
    /// End of the dwell.
    until: SimTime,
}

/// Storage changes on a split link not yet reported upstream.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct StorageSync {
    /// PCE freed by vehicles leaving the link.
    pub released: f64,
    /// PCE taken by vehicles entering traffic from the waiting list.
    pub consumed: f64,
}

impl StorageSync {
    pub fn is_empty(&self) -> bool {
        self.released <= 0.0 && self.consumed <= 0.0
    }
}

/// Occupancy of one link at one instant.
#[derive(Clone, Debug, PartialEq)]
pub struct LinkOccupancy {
    pub link:             LinkId,
    pub used_storage:     f64,
    pub storage_capacity: f64,
    pub vehicles:         usize,
}

#[derive(Debug)]
pub struct LinkQueue {
    id:               LinkId,
    from:             NodeId,
    to:               NodeId,
    length_m:         f64,
    /// Metres per second.
    free_speed:       f64,
    /// PCE, after the run's storage factor.
    storage_capacity: f64,
    /// PCE held by every slot in q, buffer and held.
    used_storage:     f64,
    flow:             FlowCapacity,
    /// Vehicles travelling along the link, ordered by entry.
    q:                VecDeque<QEntry>,
    /// Vehicles at the downstream end, waiting for the node mover.
    buffer:           VecDeque<Slot>,
    /// Vehicles entering traffic from an activity on this link.
    waiting:          VecDeque<QVehicle>,
    held:             Vec<Held>,
    /// Hand-offs that found no storage on arrival; see [`LinkQueue::accept`].
    inbound:          VecDeque<QVehicle>,
    /// Since when the buffer front has been unable to move.
    blocked_since:    Option<SimTime>,
    /// Partition of the from-node when it differs from the owner.
    upstream:         Option<PartitionId>,
    unsynced:         StorageSync,
}

impl LinkQueue {
    /// Queue state for `link` with run-level capacity factors applied.
    pub fn new(link: &Link, step_secs: u32, flow_factor: f64, storage_factor: f64) -> Self {
        Self {
            id:               link.id,
            from:             link.from,
            to:               link.to,
            length_m:         link.length_m,
            free_speed:       link.free_speed,
            storage_capacity: link.storage_capacity * storage_factor,
            used_storage:     0.0,
            flow:             FlowCapacity::new(link.flow_capacity * flow_factor, step_secs),
            q:                VecDeque::new(),
            buffer:           VecDeque::new(),
            waiting:          VecDeque::new(),
            held:             Vec::new(),
            inbound:          VecDeque::new(),
            blocked_since:    None,
            upstream:         None,
            unsynced:         StorageSync::default(),
        }
    }

    /// Mark the link as split: vehicles arrive from partition `upstream`.
    pub fn with_upstream(mut self, upstream: PartitionId) -> Self {
        self.upstream = Some(upstream);
        self
    }

    #[inline]
    pub fn id(&self) -> LinkId {
        self.id
    }

    pub fn from_node(&self) -> NodeId {
        self.from
    }

    pub fn to_node(&self) -> NodeId {
        self.to
    }

    pub fn upstream(&self) -> Option<PartitionId> {
        self.upstream
    }

    pub fn storage_capacity(&self) -> f64 {
        self.storage_capacity
    }

    pub fn used_storage(&self) -> f64 {
        self.used_storage
    }

    pub fn flow(&self) -> &FlowCapacity {
        &self.flow
    }

    /// `true` if a vehicle of `pce` fits.
    #[inline]
    pub fn has_space_for(&self, pce: f64) -> bool {
        self.used_storage + pce <= self.storage_capacity + EPSILON
    }

    /// Vehicles on the link in any state.
    pub fn vehicle_count(&self) -> usize {
        self.q.len() + self.buffer.len() + self.waiting.len() + self.held.len() + self.inbound.len()
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn waiting_len(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_active(&self) -> bool {
        self.vehicle_count() > 0
    }

    pub fn occupancy(&self) -> LinkOccupancy {
        LinkOccupancy {
            link:             self.id,
            used_storage:     self.used_storage,
            storage_capacity: self.storage_capacity,
            vehicles:         self.vehicle_count(),
        }
    }

    /// Free-flow traversal time for `vehicle`, at least one second.
    pub fn travel_secs(&self, vehicle: &QVehicle) -> u32 {
        let speed = self.free_speed.min(vehicle.max_velocity());
        ((self.length_m / speed).floor() as u32).max(1)
    }

    // ── Entry ─────────────────────────────────────────────────────────────

    /// Admit `vehicle` at the upstream end at `now`.
    pub fn enter(&mut self, vehicle: QVehicle, now: SimTime) -> EngineResult<()> {
        let pce = vehicle.pce();
        if !self.has_space_for(pce) {
            return Err(EngineError::CapacityExceeded { link: self.id, vehicle: vehicle.id });
        }
        let exit_time = now + self.travel_secs(&vehicle);
        self.used_storage += pce;
        self.q.push_back(QEntry { slot: Slot { vehicle, occupies: pce }, exit_time });
        Ok(())
    }

    /// Admit a vehicle handed over by the upstream partition.
    ///
    /// The upstream mirror may not yet know about departures the owner let
    /// onto the link in the same step.  If those took the space, the
    /// vehicle waits at the upstream end and enters during the first
    /// [`advance`](Self::advance) that finds room, ahead of any departure.
    pub fn accept(&mut self, vehicle: QVehicle, entered_at: SimTime) -> EngineResult<()> {
        if self.inbound.is_empty() && self.has_space_for(vehicle.pce()) {
            return self.enter(vehicle, entered_at);
        }
        self.inbound.push_back(vehicle);
        Ok(())
    }

    /// Add a vehicle entering traffic from an activity on this link.
    pub fn push_waiting(&mut self, vehicle: QVehicle) {
        self.waiting.push_back(vehicle);
    }

    // ── Step ──────────────────────────────────────────────────────────────

    /// Move ready vehicles toward the buffer: deferred hand-offs enter
    /// first, then elapsed holds, then the waiting list while flow and
    /// storage allow, then every queued vehicle whose exit time has come.
    ///
    /// Returns the vehicles whose disposition was `Leave`, in order.
    pub fn advance<H: VehicleHandler>(&mut self, now: SimTime, handler: &mut H) -> EngineResult<Vec<QVehicle>> {
        let mut leaving = Vec::new();

        while self.inbound.front().is_some_and(|v| self.has_space_for(v.pce())) {
            if let Some(vehicle) = self.inbound.pop_front() {
                self.enter(vehicle, now)?;
            }
        }

        let held = std::mem::take(&mut self.held);
        for h in held {
            if h.until > now {
                self.held.push(h);
                continue;
            }
            self.dispatch(h.slot, Origin::Held, now, handler, &mut leaving)?;
        }

        while self.accepts_from_waiting(now) {
            let Some(vehicle) = self.waiting.pop_front() else { break };
            let pce = vehicle.pce();
            self.used_storage += pce;
            self.unsynced.consumed += pce;
            self.dispatch(Slot { vehicle, occupies: pce }, Origin::Waiting, now, handler, &mut leaving)?;
        }

        while self.q.front().is_some_and(|e| e.exit_time <= now) {
            if let Some(entry) = self.q.pop_front() {
                self.dispatch(entry.slot, Origin::Queue, now, handler, &mut leaving)?;
            }
        }

        Ok(leaving)
    }

    fn dispatch<H: VehicleHandler>(
        &mut self,
        mut slot: Slot,
        origin:   Origin,
        now:      SimTime,
        handler:  &mut H,
        leaving:  &mut Vec<QVehicle>,
    ) -> EngineResult<()> {
        match handler.on_ready(&mut slot.vehicle, self.id, origin, now)? {
            Disposition::Buffer => self.buffer.push_back(slot),
            Disposition::Hold { until } => self.held.push(Held { slot, until }),
            Disposition::Leave => {
                self.release(slot.occupies);
                leaving.push(slot.vehicle);
            }
        }
        Ok(())
    }

    /// The waiting front may join the buffer: no deferred hand-off is
    /// ahead of it, flow capacity exceeds the PCE already buffered, and its
    /// PCE fits in storage.
    fn accepts_from_waiting(&self, now: SimTime) -> bool {
        let Some(front) = self.waiting.front() else {
            return false;
        };
        let buffered: f64 = self.buffer.iter().map(|s| s.vehicle.pce()).sum();
        self.inbound.is_empty()
            && self.flow.accumulated_at(now) - buffered > EPSILON
            && self.has_space_for(front.pce())
    }

    fn release(&mut self, pce: f64) {
        if pce > 0.0 {
            self.used_storage = (self.used_storage - pce).max(0.0);
            self.unsynced.released += pce;
        }
    }

    // ── Node mover interface ──────────────────────────────────────────────

    /// The buffer front, if flow capacity allows it to leave at `now`.
    pub fn peek_front(&self, now: SimTime) -> Option<&QVehicle> {
        let front = self.buffer.front()?;
        self.flow.has_capacity(now).then_some(&front.vehicle)
    }

    /// Remove the buffer front, charging flow capacity and releasing its
    /// storage.
    pub fn pop_front(&mut self, now: SimTime) -> Option<QVehicle> {
        let slot = self.buffer.pop_front()?;
        self.flow.consume(now, slot.vehicle.pce());
        self.release(slot.occupies);
        self.blocked_since = None;
        Some(slot.vehicle)
    }

    /// Remove the buffer front without charging flow capacity (abort).
    pub fn remove_front(&mut self) -> Option<QVehicle> {
        let slot = self.buffer.pop_front()?;
        self.release(slot.occupies);
        self.blocked_since = None;
        Some(slot.vehicle)
    }

    /// Record that the buffer front could not move at `now`.
    pub fn mark_blocked(&mut self, now: SimTime) {
        self.blocked_since.get_or_insert(now);
    }

    /// Seconds the buffer front has been blocked.
    pub fn blocked_for(&self, now: SimTime) -> u32 {
        self.blocked_since.map_or(0, |t| now.since(t))
    }

    /// Storage changes since the last call; reported to the upstream
    /// partition of a split link.
    pub fn take_sync(&mut self) -> StorageSync {
        std::mem::take(&mut self.unsynced)
    }

    /// Remove every vehicle (end of run), in inbound, q, held, waiting,
    /// buffer order.
    pub fn drain_all(&mut self) -> Vec<QVehicle> {
        let mut out: Vec<QVehicle> = self.inbound.drain(..).collect();
        out.extend(self.q.drain(..).map(|e| e.slot.vehicle));
        out.extend(self.held.drain(..).map(|h| h.slot.vehicle));
        out.extend(self.waiting.drain(..));
        out.extend(self.buffer.drain(..).map(|s| s.vehicle));
        self.used_storage = 0.0;
        out
    }
}

// ── SplitOutLink ──────────────────────────────────────────────────────────────

/// Upstream mirror of a link owned by another partition.
///
/// Consumed when this partition hands a vehicle over and when the owner
/// reports departures; released when the owner reports freed storage.
/// Only departures of the current step are missing from it, which is what
/// [`LinkQueue::accept`] absorbs.
#[derive(Clone, Debug)]
pub struct SplitOutLink {
    pub id:           LinkId,
    /// Partition owning the to-node.
    pub owner:        PartitionId,
    storage_capacity: f64,
    /// PCE believed to be on the link.
    used:             f64,
}

impl SplitOutLink {
    pub fn new(link: &Link, owner: PartitionId, storage_factor: f64) -> Self {
        Self { id: link.id, owner, storage_capacity: link.storage_capacity * storage_factor, used: 0.0 }
    }

    #[inline]
    pub fn has_space_for(&self, pce: f64) -> bool {
        self.used + pce <= self.storage_capacity + EPSILON
    }

    pub fn consume(&mut self, pce: f64) {
        self.used += pce;
    }

    /// Apply a report from the owner.
    pub fn apply(&mut self, sync: StorageSync) {
        self.used = (self.used + sync.consumed - sync.released).max(0.0);
    }

    pub fn used(&self) -> f64 {
        self.used
    }
}
