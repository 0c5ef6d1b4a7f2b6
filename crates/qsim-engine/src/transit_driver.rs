//! Transit driver: drives a scheduled vehicle through its stop sequence.
//!
//! # Stop handling
//!
//! Each call of [`handle_transit_stop`](SchedulesStops::handle_transit_stop)
//! serves the driver's next stop:
//!
//! 1. The stop must be the expected next stop.
//! 2. The first call for a stop emits `VehicleArrivesAtFacility`.
//! 3. The [`AccessEgress`] collaborator lets passengers off and on and
//!    returns the dwell.
//! 4. With no dwell, an early vehicle at an `await_departure` stop is held
//!    until its scheduled departure.
//! 5. With still no dwell the vehicle departs: `VehicleDepartsAtFacility`,
//!    and the stop pointer moves on.  Leaving the last stop with passengers
//!    on board is fatal.
//!
//! A positive return value holds the vehicle; the stop is handled again
//! when the hold elapses.

use std::sync::Arc;

use log::{error, warn};

use qsim_core::{LineId, LinkId, PersonId, SimTime, StopId, VehicleId, VehicleType};
use qsim_events::{EventBuffer, EventKind};
use qsim_population::NetworkRoute;
use qsim_transit::{Departure, TransitRoute, TransitRouteStop};

use crate::boarding::{AccessEgress, StopContext};
use crate::vehicle::Cabin;
use crate::{EngineError, EngineResult, MovableOnNetwork, PersonAgent, RouteCursor};

/// A route shared by all drivers of a transit route, plus the vehicle this
/// particular driver uses.
#[derive(Clone, Debug)]
pub struct SharedRoute {
    pub route:   Arc<NetworkRoute>,
    pub vehicle: VehicleId,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DriverState {
    Driving,
    /// Serving the stop with this index.
    AtStop(usize),
    Finished,
}

/// The vehicle side of a stop: what the driver may touch.
pub struct StopVehicle<'a> {
    pub id:           VehicleId,
    pub vehicle_type: &'a VehicleType,
    pub cabin:        &'a mut Cabin,
}

/// Collaborators used while serving a stop.
pub struct StopServices<'a> {
    pub access_egress: &'a mut dyn AccessEgress,
    pub events:        &'a mut EventBuffer,
    /// Receives passengers that got off.
    pub alighted:      &'a mut Vec<PersonAgent>,
}

/// Capability of serving a stop sequence.
pub trait SchedulesStops {
    fn next_stop(&self) -> Option<&TransitRouteStop>;

    /// Serve `stop` at `now`.  Returns the dwell in seconds; 0 means the
    /// vehicle has departed from the stop.
    fn handle_transit_stop(
        &mut self,
        stop:     StopId,
        now:      SimTime,
        vehicle:  StopVehicle<'_>,
        services: &mut StopServices<'_>,
    ) -> EngineResult<f64>;
}

#[derive(Clone, Debug)]
pub struct TransitDriverAgent {
    id:            PersonId,
    line:          LineId,
    transit_route: Arc<TransitRoute>,
    departure:     Departure,
    shared:        SharedRoute,
    cursor:        RouteCursor,
    next_stop:     usize,
    current_stop:  Option<StopId>,
    state:         DriverState,
}

impl TransitDriverAgent {
    pub fn new(id: PersonId, line: LineId, transit_route: Arc<TransitRoute>, departure: Departure) -> Self {
        let shared = SharedRoute { route: Arc::clone(&transit_route.route), vehicle: departure.vehicle };
        let cursor = RouteCursor::new(Arc::clone(&shared.route));
        Self {
            id,
            line,
            transit_route,
            departure,
            shared,
            cursor,
            next_stop: 0,
            current_stop: None,
            state: DriverState::Driving,
        }
    }

    pub fn id(&self) -> PersonId {
        self.id
    }

    pub fn line(&self) -> LineId {
        self.line
    }

    pub fn transit_route(&self) -> &Arc<TransitRoute> {
        &self.transit_route
    }

    pub fn departure(&self) -> &Departure {
        &self.departure
    }

    pub fn vehicle_id(&self) -> VehicleId {
        self.shared.vehicle
    }

    pub fn start_link(&self) -> LinkId {
        self.shared.route.start_link
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn current_stop(&self) -> Option<StopId> {
        self.current_stop
    }

    pub fn remaining_stops(&self) -> usize {
        self.transit_route.stops.len().saturating_sub(self.next_stop)
    }

    /// Mark the driver as done after its vehicle left traffic.
    pub fn finish(&mut self) {
        self.state = DriverState::Finished;
    }
}

impl SchedulesStops for TransitDriverAgent {
    fn next_stop(&self) -> Option<&TransitRouteStop> {
        self.transit_route.stops.get(self.next_stop)
    }

    fn handle_transit_stop(
        &mut self,
        stop:     StopId,
        now:      SimTime,
        vehicle:  StopVehicle<'_>,
        services: &mut StopServices<'_>,
    ) -> EngineResult<f64> {
        let expected = self.next_stop().map(|s| s.stop);
        if expected != Some(stop) {
            error!("vehicle {} reached stop {stop}, expected {expected:?}", vehicle.id);
            return Err(EngineError::UnexpectedStop { vehicle: vehicle.id, expected, got: stop });
        }
        let index = self.next_stop;
        let route = Arc::clone(&self.transit_route);
        let route_stop = &route.stops[index];
        let base = self.departure.time;

        if self.state != DriverState::AtStop(index) {
            self.state = DriverState::AtStop(index);
            self.current_stop = Some(stop);
            services.events.emit(now, EventKind::VehicleArrivesAtFacility {
                vehicle: vehicle.id,
                stop,
                delay: arrival_delay(route_stop, base, now, vehicle.id),
            });
        }

        let ctx = StopContext {
            stop,
            line: self.line,
            route: route.id,
            remaining_stops: &route.stops[index + 1..],
            vehicle: vehicle.id,
            vehicle_type: vehicle.vehicle_type,
            now,
        };
        let outcome = services.access_egress.handle_stop(&ctx, &mut *vehicle.cabin, &mut *services.events);
        services.alighted.extend(outcome.alighted);

        let mut dwell = outcome.dwell_secs.max(0.0);
        if dwell == 0.0 && route_stop.await_departure {
            if let Some(offset) = route_stop.departure_offset {
                let scheduled = base.offset(offset);
                if scheduled > now {
                    dwell = f64::from(scheduled - now);
                }
            }
        }
        if dwell > 0.0 {
            return Ok(dwell);
        }

        services.events.emit(now, EventKind::VehicleDepartsAtFacility {
            vehicle: vehicle.id,
            stop,
            delay: departure_delay(route_stop, base, now, vehicle.id),
        });
        self.next_stop += 1;
        self.current_stop = None;
        self.state = DriverState::Driving;

        if self.next_stop >= route.stops.len() && !vehicle.cabin.is_empty() {
            let passengers = vehicle.cabin.passenger_ids();
            error!(
                "vehicle {} left its last stop {stop} with passengers {passengers:?}",
                vehicle.id
            );
            return Err(EngineError::VehicleNotEmpty { vehicle: vehicle.id, passengers });
        }
        Ok(0.0)
    }
}

impl MovableOnNetwork for TransitDriverAgent {
    fn current_link(&self) -> LinkId {
        self.cursor.current_link()
    }

    fn choose_next_link(&self) -> Option<LinkId> {
        self.cursor.next_link()
    }

    fn notify_move_over_node(&mut self, link: LinkId) -> EngineResult<()> {
        self.cursor.advance(link)
    }

    fn check_route_end(&self) -> EngineResult<()> {
        match self.remaining_stops() {
            0 => Ok(()),
            remaining => Err(EngineError::StopsNotServed { vehicle: self.shared.vehicle, remaining }),
        }
    }
}

// ── Delays ────────────────────────────────────────────────────────────────────

fn delay_from(base: SimTime, offset: u32, now: SimTime) -> f64 {
    f64::from(now.secs()) - f64::from(base.offset(offset).secs())
}

/// Seconds behind the scheduled arrival.  Falls back to the departure offset,
/// then to 0 with a warning.
pub fn arrival_delay(stop: &TransitRouteStop, base: SimTime, now: SimTime, vehicle: VehicleId) -> f64 {
    match (stop.arrival_offset, stop.departure_offset) {
        (Some(o), _) | (None, Some(o)) => delay_from(base, o, now),
        (None, None) => {
            warn!("stop {} has no offsets; arrival delay of {vehicle} reported as 0", stop.stop);
            0.0
        }
    }
}

/// Seconds behind the scheduled departure.  Falls back to the arrival
/// offset, then to 0 with a warning.
pub fn departure_delay(stop: &TransitRouteStop, base: SimTime, now: SimTime, vehicle: VehicleId) -> f64 {
    match (stop.departure_offset, stop.arrival_offset) {
        (Some(o), _) | (None, Some(o)) => delay_from(base, o, now),
        (None, None) => {
            warn!("stop {} has no offsets; departure delay of {vehicle} reported as 0", stop.stop);
            0.0
        }
    }
}
