//! Boarding and alighting at transit stops.
//!
//! The transit driver asks an [`AccessEgress`] collaborator what happens at
//! each stop.  The collaborator owns the agents waiting at stops, moves them
//! in and out of the vehicle, and reports how long that takes.

use std::collections::{BTreeMap, VecDeque};

use qsim_core::{LineId, SimTime, StopId, TransitRouteId, VehicleId, VehicleType};
use qsim_events::{EventBuffer, EventKind};
use qsim_transit::TransitRouteStop;

use crate::vehicle::{Cabin, CarriesPassengers};
use crate::{LegState, PersonAgent};

/// Everything the collaborator may look at while a vehicle serves a stop.
pub struct StopContext<'a> {
    pub stop:            StopId,
    pub line:            LineId,
    pub route:           TransitRouteId,
    /// Stops after the current one, in service order.
    pub remaining_stops: &'a [TransitRouteStop],
    pub vehicle:         VehicleId,
    pub vehicle_type:    &'a VehicleType,
    pub now:             SimTime,
}

impl StopContext<'_> {
    fn serves_later(&self, stop: StopId) -> bool {
        self.remaining_stops.iter().any(|s| s.stop == stop)
    }
}

#[derive(Debug, Default)]
pub struct BoardingOutcome {
    /// Seconds the vehicle must stay; 0 if nobody boarded or alighted.
    pub dwell_secs: f64,
    /// Passengers that got off, in cabin order.
    pub alighted:   Vec<PersonAgent>,
}

/// Boarding/alighting collaborator of the transit driver.
pub trait AccessEgress: Send {
    /// `agent` starts waiting at `stop`.
    fn add_waiting(&mut self, stop: StopId, agent: PersonAgent);

    /// Serve one stop: let passengers off and on, emit the corresponding
    /// events, and report the dwell.
    fn handle_stop(&mut self, ctx: &StopContext<'_>, cabin: &mut Cabin, events: &mut EventBuffer) -> BoardingOutcome;

    /// Remove every waiting agent (end of run).
    fn drain_waiting(&mut self) -> Vec<PersonAgent>;

    fn waiting_count(&self) -> usize;
}

/// Default collaborator: FIFO queues per stop.
#[derive(Debug, Default)]
pub struct StopAgentTracker {
    waiting: BTreeMap<StopId, VecDeque<PersonAgent>>,
}

impl StopAgentTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn waiting_at(&self, stop: StopId) -> usize {
        self.waiting.get(&stop).map_or(0, VecDeque::len)
    }
}

impl AccessEgress for StopAgentTracker {
    fn add_waiting(&mut self, stop: StopId, mut agent: PersonAgent) {
        agent.set_leg_state(LegState::WaitingAtStop(stop));
        self.waiting.entry(stop).or_default().push_back(agent);
    }

    fn handle_stop(&mut self, ctx: &StopContext<'_>, cabin: &mut Cabin, events: &mut EventBuffer) -> BoardingOutcome {
        let alighted = cabin.take_passengers_where(&mut |p| p.egress_stop() == Some(ctx.stop));
        for p in &alighted {
            events.emit(ctx.now, EventKind::PersonLeavesVehicle { person: p.id(), vehicle: ctx.vehicle });
        }

        let mut boarded = 0usize;
        if let Some(queue) = self.waiting.get_mut(&ctx.stop) {
            let mut stay = VecDeque::with_capacity(queue.len());
            while let Some(mut agent) = queue.pop_front() {
                let wants = agent.transit_route().is_some_and(|r| {
                    r.line == ctx.line && r.route == ctx.route && ctx.serves_later(r.egress_stop)
                });
                if !wants || cabin.free_seats() == 0 {
                    stay.push_back(agent);
                    continue;
                }
                let person = agent.id();
                agent.set_leg_state(LegState::Riding(ctx.vehicle));
                match cabin.add_passenger(agent) {
                    Ok(()) => {
                        events.emit(ctx.now, EventKind::PersonEntersVehicle { person, vehicle: ctx.vehicle });
                        boarded += 1;
                    }
                    Err(mut agent) => {
                        agent.set_leg_state(LegState::WaitingAtStop(ctx.stop));
                        stay.push_back(agent);
                    }
                }
            }
            *queue = stay;
            if queue.is_empty() {
                self.waiting.remove(&ctx.stop);
            }
        }

        let dwell_secs = if boarded + alighted.len() > 0 {
            let t = ctx.vehicle_type;
            t.door_operation_secs
                + boarded as f64 * t.access_secs_per_person
                + alighted.len() as f64 * t.egress_secs_per_person
        } else {
            0.0
        };
        BoardingOutcome { dwell_secs, alighted }
    }

    fn drain_waiting(&mut self) -> Vec<PersonAgent> {
        std::mem::take(&mut self.waiting).into_values().flatten().collect()
    }

    fn waiting_count(&self) -> usize {
        self.waiting.values().map(VecDeque::len).sum()
    }
}
