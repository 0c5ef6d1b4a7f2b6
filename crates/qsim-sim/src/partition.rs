//! One partition of the network and everything living on it.
//!
//! A partition owns the links whose to-node it holds, the agents at
//! activities on those links, the vehicles parked there, and the agents
//! waiting at its stops.  [`Partition::step`] runs the phases of one step:
//!
//! ```text
//! ① teleport arrivals          (agents whose teleport ends by `now`)
//! ② activity ends              (wake queue), departures
//! ③ transit driver departures
//! ④ link advance               (ascending LinkId; arrivals, stops, holds)
//! ⑤ deferred departures        (zero-length activities, consecutive legs)
//! ⑥ node mover                 (ascending NodeId)
//! ⑦ storage sync + outbox     (posted to the mailboxes)
//! ```
//!
//! The cancellation flag is checked between phases so a failing partition
//! stops the others at their next boundary.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use log::{debug, error};

use qsim_core::{LegMode, LinkId, NodeId, PartitionId, PersonId, SimConfig, SimTime, VehicleId, Vehicles};
use qsim_engine::{
    move_node, AccessEgress, AfterLeg, AgentState, Driver, EngineError, LegState, LinkAdvance,
    LinkOccupancy, LinkTable, MovableOnNetwork, MoverSettings, NodeMoveResult, PersonAgent,
    QVehicle, StopAgentTracker, TransitDriverAgent,
};
use qsim_events::{AbortSubject, EventBuffer, EventKind, SequencedEvent};
use qsim_network::{Network, Partitioning};
use qsim_population::{Leg, NetworkRoute, Route, TransitPassengerRoute, WakeQueue};
use qsim_transit::TransitSchedule;

use crate::mailbox::{Mailboxes, Message};
use crate::{SimError, SimResult};

#[cfg(feature = "fx-hash")]
type VehicleMap<V> = rustc_hash::FxHashMap<VehicleId, V>;
#[cfg(not(feature = "fx-hash"))]
type VehicleMap<V> = std::collections::HashMap<VehicleId, V>;

/// Read-only run data shared by all partitions.
pub(crate) struct Shared {
    pub network:      Network,
    pub partitioning: Partitioning,
    pub config:       SimConfig,
    pub schedule:     TransitSchedule,
    pub vehicles:     Vehicles,
}

#[derive(Debug)]
struct Parked {
    link:    LinkId,
    vehicle: QVehicle,
}

/// Population counters of one partition.
#[derive(Copy, Clone, Debug, Default)]
pub(crate) struct PartitionCounts {
    pub finished_agents:    u64,
    pub aborted_agents:     u64,
    /// Vehicles removed while in traffic (they never emit a leave event).
    pub aborted_in_traffic: u64,
}

pub(crate) struct Partition {
    id:           PartitionId,
    /// Nodes assigned to this partition, ascending; the node mover visits
    /// them in this order.
    nodes:        Vec<NodeId>,
    /// Links whose to-node is ours, ascending.
    local_links:  Vec<LinkId>,
    links:        LinkTable,
    events:       EventBuffer,
    /// Agents performing an activity on one of our links.
    at_activity:  BTreeMap<PersonId, PersonAgent>,
    /// When each activity in `at_activity` ends.
    activity_end: WakeQueue<PersonId>,
    /// Agents on a teleported leg ending on one of our links, keyed by
    /// arrival time.
    teleports:    WakeQueue<PersonAgent>,
    /// Transit drivers keyed by scheduled departure.
    transit:      WakeQueue<TransitDriverAgent>,
    /// Vehicles not in traffic, with the link they stand on.
    parked:       VehicleMap<Parked>,
    /// Agents waiting for a vehicle that is not parked on their link, FIFO
    /// per vehicle.
    waiting_for:  BTreeMap<VehicleId, VecDeque<PersonAgent>>,
    /// Passengers waiting at our stops.
    stops:        Box<dyn AccessEgress>,
    /// Agents whose next leg starts in this step, after link advance.
    deferred:     VecDeque<PersonAgent>,
    /// Messages for other partitions, posted at the end of the step.
    outbox:       BTreeMap<PartitionId, Vec<Message>>,
    counts:       PartitionCounts,
}

impl Partition {
    pub fn new(id: PartitionId, shared: &Shared) -> Self {
        let links = LinkTable::new(&shared.network, &shared.partitioning, id, &shared.config);
        Self {
            id,
            nodes: shared.partitioning.nodes_of(id),
            local_links: links.local_ids().to_vec(),
            links,
            events: EventBuffer::new(id),
            at_activity: BTreeMap::new(),
            activity_end: WakeQueue::new(),
            teleports: WakeQueue::new(),
            transit: WakeQueue::new(),
            parked: VehicleMap::default(),
            waiting_for: BTreeMap::new(),
            stops: Box::new(StopAgentTracker::new()),
            deferred: VecDeque::new(),
            outbox: BTreeMap::new(),
            counts: PartitionCounts::default(),
        }
    }

    pub fn id(&self) -> PartitionId {
        self.id
    }

    // ── Setup ─────────────────────────────────────────────────────────────

    /// Place an agent in its first activity.
    pub fn insert_agent(&mut self, agent: PersonAgent) {
        if let Some(end) = agent.activity_end_time() {
            self.activity_end.push(end, agent.id());
        }
        self.at_activity.insert(agent.id(), agent);
    }

    pub fn park_vehicle(&mut self, link: LinkId, vehicle: QVehicle) {
        self.parked.insert(vehicle.id, Parked { link, vehicle });
    }

    pub fn schedule_transit(&mut self, time: SimTime, driver: TransitDriverAgent) {
        self.transit.push(time, driver);
    }

    // ── Queries ───────────────────────────────────────────────────────────

    /// `true` while something here will still change without outside input.
    pub fn is_active(&self) -> bool {
        !self.activity_end.is_empty()
            || !self.teleports.is_empty()
            || !self.transit.is_empty()
            || !self.deferred.is_empty()
            || self.links.vehicle_count() > 0
    }

    pub fn vehicles_on_network(&self) -> usize {
        self.links.vehicle_count()
    }

    pub fn agents_at_activity(&self) -> usize {
        self.at_activity.len()
    }

    pub fn occupancy(&self) -> Vec<LinkOccupancy> {
        self.links.occupancy()
    }

    pub fn counts(&self) -> PartitionCounts {
        self.counts
    }

    pub fn take_events(&mut self) -> Vec<SequencedEvent> {
        self.events.take()
    }

    // ── Step ──────────────────────────────────────────────────────────────

    /// Run one step.  On error the cancellation flag is raised.
    pub fn step(&mut self, now: SimTime, shared: &Shared, mailboxes: &Mailboxes, cancel: &AtomicBool) -> SimResult<()> {
        let started = Instant::now();
        let result = self.run_phases(now, shared, mailboxes, cancel);
        if let Err(e) = &result {
            if !matches!(e, SimError::Cancelled) {
                error!("partition {} failed at {now}: {e}", self.id);
            }
            cancel.store(true, Ordering::Relaxed);
        }
        debug!(
            "partition {} step {now}: {} vehicles on links, {} at activity, {:?}",
            self.id,
            self.links.vehicle_count(),
            self.at_activity.len(),
            started.elapsed()
        );
        result
    }

    fn run_phases(&mut self, now: SimTime, shared: &Shared, mailboxes: &Mailboxes, cancel: &AtomicBool) -> SimResult<()> {
        let check = || if cancel.load(Ordering::Relaxed) { Err(SimError::Cancelled) } else { Ok(()) };

        check()?;
        for agent in self.teleports.drain_until(now) {
            self.arrive_teleported(agent, now)?;
        }

        check()?;
        for person in self.activity_end.drain_until(now) {
            if let Some(agent) = self.at_activity.remove(&person) {
                self.end_activity(agent, now, shared)?;
            }
        }

        check()?;
        for driver in self.transit.drain_until(now) {
            self.start_transit_driver(driver, now, shared)?;
        }

        check()?;
        self.advance_links(now, shared)?;

        check()?;
        while let Some(agent) = self.deferred.pop_front() {
            match agent.state() {
                AgentState::Activity => self.end_activity(agent, now, shared)?,
                _ => self.depart(agent, now, shared)?,
            }
        }

        check()?;
        self.move_nodes(now, shared)?;

        check()?;
        self.post_outbox(mailboxes);
        Ok(())
    }

    /// Apply messages received after the barrier, in the given order.
    pub fn receive(&mut self, messages: Vec<Message>) -> SimResult<()> {
        for message in messages {
            match message {
                Message::Vehicle { link, vehicle, entered_at } => {
                    self.links.expect_local(link)?.accept(vehicle, entered_at)?;
                }
                Message::Teleport { arrival, agent } => self.teleports.push(arrival, agent),
                Message::StorageSync { link, sync } => self.links.sync_mirror(link, sync),
            }
        }
        Ok(())
    }

    // ── Agents ────────────────────────────────────────────────────────────

    fn end_activity(&mut self, mut agent: PersonAgent, now: SimTime, shared: &Shared) -> SimResult<()> {
        if let Some(act) = agent.current_activity() {
            self.events.emit(now, EventKind::ActivityEnd {
                person:   agent.id(),
                link:     act.link,
                act_type: act.act_type.clone(),
            });
        }
        agent.end_activity()?;
        self.depart(agent, now, shared)
    }

    fn depart(&mut self, agent: PersonAgent, now: SimTime, shared: &Shared) -> SimResult<()> {
        let Some(leg) = agent.current_leg().cloned() else {
            return Err(EngineError::NoNextLeg { person: agent.id() }.into());
        };
        self.events.emit(now, EventKind::PersonDeparture {
            person: agent.id(),
            link:   agent.current_link(),
            mode:   leg.mode,
        });
        match &leg.route {
            Route::Network(route) if shared.config.is_network_mode(leg.mode) => {
                self.depart_network(agent, Arc::clone(route), leg.mode, now, shared)
            }
            Route::TransitPassenger(route) => self.depart_transit(agent, route, shared),
            _ => {
                self.teleport(agent, &leg, now, shared);
                Ok(())
            }
        }
    }

    fn depart_network(
        &mut self,
        mut agent: PersonAgent,
        route:     Arc<NetworkRoute>,
        mode:      LegMode,
        now:       SimTime,
        shared:    &Shared,
    ) -> SimResult<()> {
        let link = agent.current_link();
        if route.is_trivial() {
            self.events.emit(now, EventKind::PersonArrival { person: agent.id(), link, mode });
            return self.after_leg(agent, now);
        }

        let vehicle = route.vehicle.unwrap_or_else(|| qsim_engine::default_vehicle_of(agent.id()));
        if self.parked.get(&vehicle).is_some_and(|p| p.link == link) {
            return self.board_parked(agent, vehicle, route, now);
        }
        match shared.config.vehicle_behavior {
            qsim_core::VehicleBehavior::Wait => {
                agent.set_leg_state(LegState::WaitingForVehicle(vehicle));
                self.waiting_for.entry(vehicle).or_default().push_back(agent);
                Ok(())
            }
            qsim_core::VehicleBehavior::Exception => {
                error!("vehicle {vehicle} of person {} is not parked on link {link}", agent.id());
                Err(EngineError::VehicleNotAvailable { person: agent.id(), vehicle, link }.into())
            }
        }
    }

    /// Take the parked `vehicle` and put it on the departure link's waiting
    /// list with `agent` driving.
    fn board_parked(&mut self, mut agent: PersonAgent, vehicle: VehicleId, route: Arc<NetworkRoute>, now: SimTime) -> SimResult<()> {
        let Some(Parked { link, vehicle: mut v }) = self.parked.remove(&vehicle) else {
            return Err(EngineError::VehicleNotAvailable { person: agent.id(), vehicle, link: agent.current_link() }.into());
        };
        agent.begin_route(route);
        agent.set_leg_state(LegState::Driving(vehicle));
        self.events.emit(now, EventKind::PersonEntersVehicle { person: agent.id(), vehicle });
        v.set_driver(Driver::Person(Box::new(agent)));
        self.links.expect_local(link)?.push_waiting(v);
        Ok(())
    }

    /// Hand a just-parked vehicle to the first agent waiting for it there.
    fn serve_waiting(&mut self, vehicle: VehicleId, link: LinkId, now: SimTime) -> SimResult<()> {
        let Some(queue) = self.waiting_for.get_mut(&vehicle) else {
            return Ok(());
        };
        let Some(pos) = queue.iter().position(|a| a.current_link() == link) else {
            return Ok(());
        };
        let agent = queue.remove(pos);
        if queue.is_empty() {
            self.waiting_for.remove(&vehicle);
        }
        if let Some(agent) = agent {
            let Some(route) = agent.network_route().cloned() else {
                return Err(EngineError::InvalidPlan {
                    person: agent.id(),
                    reason: "waiting for a vehicle without a network route".into(),
                }
                .into());
            };
            self.board_parked(agent, vehicle, route, now)?;
        }
        Ok(())
    }

    fn depart_transit(&mut self, agent: PersonAgent, route: &TransitPassengerRoute, shared: &Shared) -> SimResult<()> {
        let stop = route.access_stop;
        let stop_link = shared
            .schedule
            .facility(stop)
            .map(|f| f.link)
            .ok_or(EngineError::UnknownStop(stop))?;
        let link = agent.current_link();
        if stop_link != link {
            error!("person {} waits for stop {stop} on link {stop_link} but is on link {link}", agent.id());
            return Err(EngineError::AccessStopNotOnLink { person: agent.id(), stop, stop_link, link }.into());
        }
        self.stops.add_waiting(stop, agent);
        Ok(())
    }

    fn teleport(&mut self, mut agent: PersonAgent, leg: &Leg, now: SimTime, shared: &Shared) {
        let arrival = now + leg.travel_time.unwrap_or(0);
        let end = leg.route.end_link();
        agent.set_leg_state(LegState::Teleporting(arrival));
        let owner = shared.partitioning.owner_of_link(&shared.network, end);
        if owner == self.id {
            self.teleports.push(arrival, agent);
        } else {
            self.outbox.entry(owner).or_default().push(Message::Teleport { arrival, agent });
        }
    }

    fn arrive_teleported(&mut self, mut agent: PersonAgent, now: SimTime) -> SimResult<()> {
        let Some(leg) = agent.current_leg() else {
            return Err(EngineError::NoNextLeg { person: agent.id() }.into());
        };
        let (link, mode) = (leg.route.end_link(), leg.mode);
        agent.set_link(link);
        self.events.emit(now, EventKind::PersonArrival { person: agent.id(), link, mode });
        self.after_leg(agent, now)
    }

    /// Move `agent` past the leg it just finished.
    fn after_leg(&mut self, mut agent: PersonAgent, now: SimTime) -> SimResult<()> {
        let outcome = agent.end_leg(now);
        if matches!(outcome, AfterLeg::Activity(_) | AfterLeg::FinalActivity) {
            if let Some(act) = agent.current_activity() {
                self.events.emit(now, EventKind::ActivityStart {
                    person:   agent.id(),
                    link:     act.link,
                    act_type: act.act_type.clone(),
                });
            }
        }
        match outcome {
            AfterLeg::Activity(Some(end)) if end <= now => self.deferred.push_back(agent),
            AfterLeg::Activity(Some(end)) => {
                self.activity_end.push(end, agent.id());
                self.at_activity.insert(agent.id(), agent);
            }
            AfterLeg::Activity(None) => {
                self.at_activity.insert(agent.id(), agent);
            }
            AfterLeg::Leg => self.deferred.push_back(agent),
            AfterLeg::FinalActivity | AfterLeg::Done => self.counts.finished_agents += 1,
        }
        Ok(())
    }

    // ── Transit ───────────────────────────────────────────────────────────

    fn start_transit_driver(&mut self, driver: TransitDriverAgent, now: SimTime, shared: &Shared) -> SimResult<()> {
        let vehicle = driver.vehicle_id();
        let vehicle_type = shared
            .vehicles
            .type_of(vehicle)
            .ok_or_else(|| SimError::Config(format!("transit vehicle {vehicle} is not registered")))?;
        let link = driver.start_link();
        self.events.emit(now, EventKind::TransitDriverStarts {
            driver: driver.id(),
            vehicle,
            line: driver.line(),
            route: driver.transit_route().id,
            departure: driver.departure().id,
        });
        self.events.emit(now, EventKind::PersonDeparture { person: driver.id(), link, mode: LegMode::Pt });
        self.events.emit(now, EventKind::PersonEntersVehicle { person: driver.id(), vehicle });

        let mut v = QVehicle::new(vehicle, Arc::clone(vehicle_type));
        v.set_driver(Driver::Transit(Box::new(driver)));
        self.links.expect_local(link)?.push_waiting(v);
        Ok(())
    }

    // ── Links and nodes ───────────────────────────────────────────────────

    fn advance_links(&mut self, now: SimTime, shared: &Shared) -> SimResult<()> {
        let mut leaving = Vec::new();
        let alighted = {
            let mut handler = LinkAdvance::new(&mut self.events, &mut *self.stops, &shared.schedule);
            for &link in &self.local_links {
                let q = self.links.expect_local(link)?;
                leaving.extend(q.advance(now, &mut handler)?.into_iter().map(|v| (link, v)));
            }
            handler.alighted
        };

        for agent in alighted {
            self.arrive_passenger(agent, now)?;
        }
        for (link, vehicle) in leaving {
            self.arrive_vehicle(link, vehicle, now)?;
        }
        Ok(())
    }

    fn arrive_passenger(&mut self, mut agent: PersonAgent, now: SimTime) -> SimResult<()> {
        let Some(route) = agent.transit_route() else {
            return Err(EngineError::InvalidPlan {
                person: agent.id(),
                reason: "alighted without a transit leg".into(),
            }
            .into());
        };
        let link = route.end_link;
        agent.set_link(link);
        self.events.emit(now, EventKind::PersonArrival { person: agent.id(), link, mode: LegMode::Pt });
        self.after_leg(agent, now)
    }

    fn arrive_vehicle(&mut self, link: LinkId, mut vehicle: QVehicle, now: SimTime) -> SimResult<()> {
        let id = vehicle.id;
        let driver = vehicle.take_driver().ok_or(EngineError::NoDriver(id))?;
        if let Err(e) = driver.check_route_end() {
            error!("vehicle {id} arrived on link {link} at {now}: {e}");
            return Err(e.into());
        }
        let person = driver.id();
        let mode = driver.mode();
        self.events.emit(now, EventKind::PersonLeavesVehicle { person, vehicle: id });
        self.events.emit(now, EventKind::VehicleLeavesTraffic { driver: person, vehicle: id, link, mode });
        vehicle.in_traffic = false;
        self.events.emit(now, EventKind::PersonArrival { person, link, mode });

        match driver {
            Driver::Person(agent) => {
                self.park_vehicle(link, vehicle);
                self.after_leg(*agent, now)?;
                self.serve_waiting(id, link, now)
            }
            Driver::Transit(mut transit) => {
                transit.finish();
                Ok(())
            }
        }
    }

    fn move_nodes(&mut self, now: SimTime, shared: &Shared) -> SimResult<()> {
        let settings = MoverSettings {
            stuck_time_secs:       shared.config.stuck_time_secs,
            remove_stuck_vehicles: shared.config.remove_stuck_vehicles,
        };
        let mut result = NodeMoveResult::default();
        for &node in &self.nodes {
            move_node(node, now, &shared.network, &mut self.links, settings, &mut self.events, &mut result)?;
        }
        for h in result.handoffs {
            self.outbox.entry(h.to).or_default().push(Message::Vehicle {
                link:       h.link,
                vehicle:    h.vehicle,
                entered_at: h.entered_at,
            });
        }
        for (vehicle, link) in result.aborted {
            self.abort_vehicle(vehicle, link, now);
        }
        Ok(())
    }

    fn post_outbox(&mut self, mailboxes: &Mailboxes) {
        for &link in &self.local_links {
            if let Some(q) = self.links.local_mut(link) {
                let sync = q.take_sync();
                if let Some(upstream) = q.upstream() {
                    if !sync.is_empty() {
                        self.outbox.entry(upstream).or_default().push(Message::StorageSync { link, sync });
                    }
                }
            }
        }
        for (to, messages) in std::mem::take(&mut self.outbox) {
            mailboxes.post(self.id, to, messages);
        }
    }

    // ── Aborts ────────────────────────────────────────────────────────────

    fn abort_agent(&mut self, mut agent: PersonAgent, link: LinkId, now: SimTime) {
        agent.abort();
        self.events.emit(now, EventKind::StuckAndAbort { subject: AbortSubject::Person(agent.id()), link });
        self.counts.aborted_agents += 1;
    }

    /// Remove a vehicle with its driver and passengers.
    fn abort_vehicle(&mut self, mut vehicle: QVehicle, link: LinkId, now: SimTime) {
        match vehicle.take_driver() {
            Some(Driver::Person(agent)) => self.abort_agent(*agent, link, now),
            Some(Driver::Transit(t)) => {
                self.events.emit(now, EventKind::StuckAndAbort { subject: AbortSubject::Person(t.id()), link });
            }
            None => {}
        }
        for passenger in vehicle.cabin.drain() {
            self.abort_agent(passenger, link, now);
        }
        self.events.emit(now, EventKind::StuckAndAbort { subject: AbortSubject::Vehicle(vehicle.id), link });
        if vehicle.in_traffic {
            self.counts.aborted_in_traffic += 1;
        }
    }

    /// Abort everything still alive at the end of the run.
    pub fn abort_remaining(&mut self, now: SimTime) {
        self.activity_end.drain_all();
        for agent in std::mem::take(&mut self.at_activity).into_values() {
            let link = agent.current_link();
            self.abort_agent(agent, link, now);
        }
        for agent in std::mem::take(&mut self.deferred) {
            let link = agent.current_link();
            self.abort_agent(agent, link, now);
        }
        for agent in self.teleports.drain_all() {
            let link = agent.current_link();
            self.abort_agent(agent, link, now);
        }
        for agent in std::mem::take(&mut self.waiting_for).into_values().flatten() {
            let link = agent.current_link();
            self.abort_agent(agent, link, now);
        }
        for agent in self.stops.drain_waiting() {
            let link = agent.current_link();
            self.abort_agent(agent, link, now);
        }
        self.transit.drain_all();
        for link in self.local_links.clone() {
            let vehicles = match self.links.local_mut(link) {
                Some(q) => q.drain_all(),
                None => continue,
            };
            for v in vehicles {
                self.abort_vehicle(v, link, now);
            }
        }
    }
}
