//! Unit tests for qsim-engine.

use std::sync::Arc;

use qsim_core::{
    LegMode, LineId, LinkId, NodeId, PersonId, SimTime, StopId, TransitRouteId, VehicleId,
    VehicleType, VehicleTypeId,
};
use qsim_network::{LinkAttributes, Network, NetworkBuilder};
use qsim_population::{Activity, Leg, NetworkRoute, Plan, TransitPassengerRoute};

use crate::{
    Disposition, Driver, EngineResult, MovableOnNetwork, Origin, PersonAgent, QVehicle,
    VehicleHandler,
};

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Straight corridor `n0 ─l0─► n1 ─l1─► n2 ─l2─► n3`, 100 m at 10 m/s, 1 veh/s.
fn corridor() -> Network {
    corridor_with(|_| None)
}

fn corridor_with(storage: impl Fn(usize) -> Option<f64>) -> Network {
    let mut b = NetworkBuilder::new();
    let nodes: Vec<NodeId> = (0..4).map(|i| b.add_node(qsim_core::Coord::new(i as f64 * 100.0, 0.0))).collect();
    for i in 0..3 {
        let mut attrs = LinkAttributes::new(100.0, 10.0, 1.0);
        if let Some(s) = storage(i) {
            attrs = attrs.with_storage(s);
        }
        b.add_link(nodes[i], nodes[i + 1], attrs);
    }
    b.build().unwrap()
}

fn car(id: u32) -> QVehicle {
    QVehicle::new(VehicleId(id), Arc::new(VehicleType::car(VehicleTypeId(0))))
}

fn bus(id: u32) -> QVehicle {
    QVehicle::new(VehicleId(id), Arc::new(VehicleType::bus(VehicleTypeId(1))))
}

fn car_plan(route: NetworkRoute) -> Plan {
    let end = route.end_link;
    Plan::new()
        .activity(Activity::new("home", route.start_link).with_end_time(SimTime(0)))
        .leg(Leg::network(LegMode::Car, route))
        .activity(Activity::new("work", end))
}

/// A person on the road, driving `route` from its start link.
fn driver_on(person: u32, route: NetworkRoute) -> PersonAgent {
    let mut agent = PersonAgent::new(PersonId(person), Arc::new(car_plan(route)), SimTime::ZERO).unwrap();
    agent.end_activity().unwrap();
    let route = Arc::clone(agent.network_route().unwrap());
    agent.begin_route(route);
    agent
}

fn driven_car(id: u32, route: NetworkRoute) -> QVehicle {
    let mut v = car(id);
    v.set_driver(Driver::Person(Box::new(driver_on(id, route))));
    v
}

/// Buffers vehicles with a next link, lets the others leave.
struct PassThrough;

impl VehicleHandler for PassThrough {
    fn on_ready(&mut self, vehicle: &mut QVehicle, _: LinkId, _: Origin, _: SimTime) -> EngineResult<Disposition> {
        Ok(match vehicle.driver().and_then(|d| d.choose_next_link()) {
            Some(_) => Disposition::Buffer,
            None => Disposition::Leave,
        })
    }
}

fn l(i: u32) -> LinkId {
    LinkId(i)
}

// ── FlowCapacity ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod flow {
    use super::*;
    use crate::FlowCapacity;

    #[test]
    fn half_vehicle_per_second_releases_every_other_step() {
        let mut f = FlowCapacity::new(0.5, 1);
        let mut released = Vec::new();
        for t in 0..6 {
            let now = SimTime(t);
            if f.has_capacity(now) {
                f.consume(now, 1.0);
                released.push(t);
            }
        }
        assert_eq!(released, vec![0, 2, 4]);
    }

    #[test]
    fn accumulator_is_capped_at_one_step() {
        let mut f = FlowCapacity::new(1.0, 1);
        f.consume(SimTime(0), 1.0);
        assert_eq!(f.accumulated_at(SimTime(100)), 1.0);
    }

    #[test]
    fn large_vehicle_leaves_debt() {
        let mut f = FlowCapacity::new(1.0, 1);
        f.consume(SimTime(0), 2.5);
        assert!(!f.has_capacity(SimTime(1)));
        assert!(f.has_capacity(SimTime(2)));
    }

    #[test]
    fn per_step_scales_with_step_size() {
        let f = FlowCapacity::new(0.5, 10);
        assert_eq!(f.per_step(), 5.0);
    }
}

// ── LinkQueue ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod link_queue {
    use super::*;
    use crate::{EngineError, LinkQueue};

    fn queue(net: &Network, link: u32) -> LinkQueue {
        LinkQueue::new(net.link(l(link)), 1, 1.0, 1.0)
    }

    #[test]
    fn enter_beyond_storage_fails() {
        let net = corridor_with(|_| Some(1.0));
        let mut q = queue(&net, 0);
        q.enter(car(0), SimTime(0)).unwrap();
        let err = q.enter(car(1), SimTime(0)).unwrap_err();
        assert!(matches!(err, EngineError::CapacityExceeded { link, vehicle } if link == l(0) && vehicle == VehicleId(1)));
    }

    #[test]
    fn vehicle_reaches_buffer_after_free_flow_time() {
        let net = corridor();
        let mut q = queue(&net, 0);
        q.enter(driven_car(0, NetworkRoute::new(l(0), vec![], l(1))), SimTime(0)).unwrap();

        assert!(q.advance(SimTime(9), &mut PassThrough).unwrap().is_empty());
        assert!(q.peek_front(SimTime(9)).is_none());

        q.advance(SimTime(10), &mut PassThrough).unwrap();
        assert_eq!(q.peek_front(SimTime(10)).map(|v| v.id), Some(VehicleId(0)));
    }

    #[test]
    fn travel_time_respects_vehicle_speed() {
        let net = corridor();
        let q = queue(&net, 0);
        let mut slow = VehicleType::car(VehicleTypeId(3));
        slow.max_velocity = 4.0;
        let v = QVehicle::new(VehicleId(0), Arc::new(slow));
        assert_eq!(q.travel_secs(&v), 25);
        assert_eq!(q.travel_secs(&car(1)), 10);
    }

    #[test]
    fn buffer_is_fifo_and_flow_limited() {
        let net = corridor();
        let mut q = queue(&net, 0);
        q.enter(driven_car(0, NetworkRoute::new(l(0), vec![], l(1))), SimTime(0)).unwrap();
        q.enter(driven_car(1, NetworkRoute::new(l(0), vec![], l(1))), SimTime(0)).unwrap();
        q.advance(SimTime(10), &mut PassThrough).unwrap();

        assert_eq!(q.pop_front(SimTime(10)).map(|v| v.id), Some(VehicleId(0)));
        assert!(q.peek_front(SimTime(10)).is_none());
        assert_eq!(q.pop_front(SimTime(11)).map(|v| v.id), Some(VehicleId(1)));
        assert_eq!(q.used_storage(), 0.0);
    }

    #[test]
    fn full_link_keeps_departures_waiting() {
        let net = corridor_with(|_| Some(1.0));
        let mut q = queue(&net, 0);
        q.enter(driven_car(0, NetworkRoute::new(l(0), vec![], l(1))), SimTime(0)).unwrap();
        for id in 1..6 {
            q.push_waiting(driven_car(id, NetworkRoute::new(l(0), vec![], l(1))));
        }

        q.advance(SimTime(0), &mut PassThrough).unwrap();
        assert!(q.used_storage() <= q.storage_capacity());
        assert_eq!(q.buffer_len(), 0);
        assert_eq!(q.waiting_len(), 5);

        // The entered car frees the link; one departure takes its place.
        q.advance(SimTime(10), &mut PassThrough).unwrap();
        assert_eq!(q.pop_front(SimTime(10)).map(|v| v.id), Some(VehicleId(0)));
        q.advance(SimTime(11), &mut PassThrough).unwrap();
        assert_eq!(q.buffer_len(), 1);
        assert_eq!(q.waiting_len(), 4);
        assert_eq!(q.used_storage(), 1.0);
    }

    #[test]
    fn departures_join_buffer_at_flow_rate() {
        let net = corridor();
        let mut q = queue(&net, 0);
        for id in 0..3 {
            q.push_waiting(driven_car(id, NetworkRoute::new(l(0), vec![], l(1))));
        }

        let mut left = Vec::new();
        for t in 0..3 {
            q.advance(SimTime(t), &mut PassThrough).unwrap();
            assert_eq!(q.buffer_len(), 1, "t={t}");
            assert_eq!(q.used_storage(), 1.0);
            left.extend(q.pop_front(SimTime(t)).map(|v| v.id));
        }
        assert_eq!(left, vec![VehicleId(0), VehicleId(1), VehicleId(2)]);

        let sync = q.take_sync();
        assert_eq!((sync.consumed, sync.released), (3.0, 3.0));
        assert!(q.take_sync().is_empty());
    }

    #[test]
    fn unreleased_buffer_holds_back_departures() {
        let net = corridor();
        let mut q = queue(&net, 0);
        q.push_waiting(driven_car(0, NetworkRoute::new(l(0), vec![], l(1))));
        q.push_waiting(driven_car(1, NetworkRoute::new(l(0), vec![], l(1))));

        q.advance(SimTime(0), &mut PassThrough).unwrap();
        q.advance(SimTime(1), &mut PassThrough).unwrap();
        q.advance(SimTime(2), &mut PassThrough).unwrap();
        assert_eq!(q.buffer_len(), 1);
        assert_eq!(q.waiting_len(), 1);
    }

    #[test]
    fn handoff_onto_full_link_waits_upstream() {
        let net = corridor_with(|_| Some(1.0));
        let mut q = queue(&net, 0);
        q.push_waiting(driven_car(0, NetworkRoute::new(l(0), vec![], l(1))));
        q.advance(SimTime(0), &mut PassThrough).unwrap();

        // Same-step hand-off from upstream: no room, so it is deferred.
        q.accept(driven_car(1, NetworkRoute::new(l(0), vec![], l(1))), SimTime(0)).unwrap();
        q.push_waiting(driven_car(2, NetworkRoute::new(l(0), vec![], l(1))));
        assert_eq!(q.used_storage(), 1.0);
        assert_eq!(q.vehicle_count(), 3);

        q.pop_front(SimTime(1));
        q.advance(SimTime(1), &mut PassThrough).unwrap();
        // The deferred hand-off entered; the departure still waits.
        assert_eq!(q.used_storage(), 1.0);
        assert_eq!(q.waiting_len(), 1);
        assert_eq!(q.buffer_len(), 0);

        q.advance(SimTime(11), &mut PassThrough).unwrap();
        assert_eq!(q.peek_front(SimTime(11)).map(|v| v.id), Some(VehicleId(1)));
    }

    #[test]
    fn arriving_vehicle_releases_storage() {
        let net = corridor();
        let mut q = queue(&net, 1);
        let mut v = driven_car(0, NetworkRoute::new(l(0), vec![], l(1)));
        v.driver_mut().unwrap().notify_move_over_node(l(1)).unwrap();
        q.enter(v, SimTime(0)).unwrap();
        assert_eq!(q.used_storage(), 1.0);

        let leaving = q.advance(SimTime(10), &mut PassThrough).unwrap();
        assert_eq!(leaving.len(), 1);
        assert_eq!(q.used_storage(), 0.0);
        assert_eq!(q.take_sync().released, 1.0);
        assert!(q.take_sync().is_empty());
    }

    #[test]
    fn held_vehicle_returns_when_hold_elapses() {
        struct HoldOnce(bool);
        impl VehicleHandler for HoldOnce {
            fn on_ready(&mut self, _: &mut QVehicle, _: LinkId, origin: Origin, now: SimTime) -> EngineResult<Disposition> {
                if !self.0 {
                    self.0 = true;
                    return Ok(Disposition::Hold { until: now + 5 });
                }
                assert_eq!(origin, Origin::Held);
                Ok(Disposition::Buffer)
            }
        }

        let net = corridor();
        let mut q = queue(&net, 0);
        q.push_waiting(car(0));
        let mut h = HoldOnce(false);
        q.advance(SimTime(0), &mut h).unwrap();
        q.advance(SimTime(4), &mut h).unwrap();
        assert!(q.peek_front(SimTime(4)).is_none());
        q.advance(SimTime(5), &mut h).unwrap();
        assert!(q.peek_front(SimTime(5)).is_some());
    }

    #[test]
    fn blocked_time_resets_on_pop() {
        let net = corridor();
        let mut q = queue(&net, 0);
        q.push_waiting(driven_car(0, NetworkRoute::new(l(0), vec![], l(1))));
        q.advance(SimTime(0), &mut PassThrough).unwrap();
        q.mark_blocked(SimTime(10));
        q.mark_blocked(SimTime(20));
        assert_eq!(q.blocked_for(SimTime(25)), 15);
        q.pop_front(SimTime(25));
        assert_eq!(q.blocked_for(SimTime(30)), 0);
    }
}

// ── Routes and person agents ──────────────────────────────────────────────────

#[cfg(test)]
mod agent {
    use super::*;
    use crate::{AfterLeg, AgentState, EngineError, LegState, RouteCursor};

    #[test]
    fn cursor_walks_route_then_end_link() {
        let mut c = RouteCursor::new(Arc::new(NetworkRoute::new(l(0), vec![l(1)], l(2))));
        assert_eq!(c.current_link(), l(0));
        assert_eq!(c.next_link(), Some(l(1)));
        c.advance(l(1)).unwrap();
        assert_eq!(c.next_link(), Some(l(2)));
        c.advance(l(2)).unwrap();
        assert_eq!(c.next_link(), None);
        assert!(c.is_at_end());
    }

    #[test]
    fn degenerate_route_ends_immediately() {
        let c = RouteCursor::new(Arc::new(NetworkRoute::new(l(0), vec![], l(0))));
        assert!(c.is_at_end());
    }

    #[test]
    fn loop_back_to_start_link_is_not_degenerate() {
        let mut c = RouteCursor::new(Arc::new(NetworkRoute::new(l(0), vec![l(1), l(2)], l(0))));
        for link in [l(1), l(2), l(0)] {
            assert_eq!(c.next_link(), Some(link));
            c.advance(link).unwrap();
        }
        assert!(c.is_at_end());
    }

    #[test]
    fn moving_off_route_is_an_error() {
        let mut c = RouteCursor::new(Arc::new(NetworkRoute::new(l(0), vec![l(1)], l(2))));
        let err = c.advance(l(2)).unwrap_err();
        assert!(matches!(err, EngineError::RouteMismatch { expected: Some(e), got } if e == l(1) && got == l(2)));
    }

    #[test]
    fn plan_progression() {
        let plan = Plan::new()
            .activity(Activity::new("home", l(0)).with_end_time(SimTime(100)))
            .leg(Leg::network(LegMode::Car, NetworkRoute::new(l(0), vec![l(1)], l(2))))
            .activity(Activity::new("shop", l(2)).with_duration(60))
            .leg(Leg::teleported(LegMode::Walk, l(2), l(0), 300))
            .activity(Activity::new("home", l(0)));
        let mut a = PersonAgent::new(PersonId(1), Arc::new(plan), SimTime::ZERO).unwrap();

        assert_eq!(a.activity_end_time(), Some(SimTime(100)));
        a.end_activity().unwrap();
        assert_eq!(a.state(), AgentState::Leg(LegState::Departing));
        assert_eq!(a.leg_vehicle(), Some(VehicleId(1)));

        assert_eq!(a.end_leg(SimTime(130)), AfterLeg::Activity(Some(SimTime(190))));
        assert_eq!(a.current_link(), l(2));
        a.end_activity().unwrap();
        assert_eq!(a.leg_vehicle(), None);
        assert_eq!(a.end_leg(SimTime(500)), AfterLeg::FinalActivity);
        assert_eq!(a.activity_end_time(), None);
    }

    #[test]
    fn consecutive_legs() {
        let plan = Plan::new()
            .activity(Activity::new("home", l(0)).with_end_time(SimTime(0)))
            .leg(Leg::teleported(LegMode::Walk, l(0), l(1), 10))
            .leg(Leg::teleported(LegMode::Walk, l(1), l(2), 10));
        let mut a = PersonAgent::new(PersonId(0), Arc::new(plan), SimTime::ZERO).unwrap();
        a.end_activity().unwrap();
        assert_eq!(a.end_leg(SimTime(10)), AfterLeg::Leg);
        assert_eq!(a.end_leg(SimTime(20)), AfterLeg::Done);
    }

    #[test]
    fn ending_activity_without_leg_fails() {
        let plan = Plan::new()
            .activity(Activity::new("a", l(0)).with_end_time(SimTime(0)))
            .activity(Activity::new("b", l(0)));
        let mut a = PersonAgent::new(PersonId(4), Arc::new(plan), SimTime::ZERO).unwrap();
        assert!(matches!(a.end_activity(), Err(EngineError::NoNextLeg { person }) if person == PersonId(4)));
    }

    #[test]
    fn route_vehicle_overrides_default() {
        let route = NetworkRoute::new(l(0), vec![], l(1)).with_vehicle(VehicleId(77));
        let a = driver_on(3, route);
        assert_eq!(a.leg_vehicle(), Some(VehicleId(77)));
        assert_eq!(a.choose_next_link(), Some(l(1)));
    }
}

// ── Transit drivers and boarding ──────────────────────────────────────────────

#[cfg(test)]
mod transit {
    use super::*;
    use qsim_events::EventBuffer;
    use qsim_transit::{Departure, TransitRoute, TransitRouteStop};
    use qsim_core::{DepartureId, PartitionId};
    use crate::{
        arrival_delay, departure_delay, AccessEgress, CarriesPassengers, DriverState, EngineError,
        SchedulesStops, StopAgentTracker, StopServices, StopVehicle, TransitDriverAgent,
    };

    const LINE: LineId = LineId(1);
    const ROUTE: TransitRouteId = TransitRouteId(1);

    fn transit_route(stops: Vec<TransitRouteStop>) -> Arc<TransitRoute> {
        let mut r = TransitRoute::new(ROUTE, NetworkRoute::new(l(0), vec![l(1)], l(2)));
        r.stops = stops;
        Arc::new(r)
    }

    fn driver(stops: Vec<TransitRouteStop>) -> TransitDriverAgent {
        let departure = Departure { id: DepartureId(0), time: SimTime(1_000), vehicle: VehicleId(500) };
        TransitDriverAgent::new(PersonId(900), LINE, transit_route(stops), departure)
    }

    fn passenger(id: u32, access: StopId, egress: StopId) -> PersonAgent {
        let route = TransitPassengerRoute {
            start_link:  l(0),
            end_link:    l(1),
            access_stop: access,
            egress_stop: egress,
            line:        LINE,
            route:       ROUTE,
        };
        let plan = Plan::new()
            .activity(Activity::new("home", l(0)).with_end_time(SimTime(0)))
            .leg(Leg::transit(route))
            .activity(Activity::new("work", l(1)));
        let mut a = PersonAgent::new(PersonId(id), Arc::new(plan), SimTime::ZERO).unwrap();
        a.end_activity().unwrap();
        a
    }

    struct Harness {
        vehicle:  QVehicle,
        tracker:  StopAgentTracker,
        events:   EventBuffer,
        alighted: Vec<PersonAgent>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                vehicle:  bus(500),
                tracker:  StopAgentTracker::new(),
                events:   EventBuffer::new(PartitionId(0)),
                alighted: Vec::new(),
            }
        }

        fn serve(&mut self, d: &mut TransitDriverAgent, stop: StopId, now: SimTime) -> EngineResult<f64> {
            let QVehicle { id, vehicle_type, cabin, .. } = &mut self.vehicle;
            let mut services = StopServices {
                access_egress: &mut self.tracker,
                events:        &mut self.events,
                alighted:      &mut self.alighted,
            };
            d.handle_transit_stop(stop, now, StopVehicle { id: *id, vehicle_type: &**vehicle_type, cabin }, &mut services)
        }

        fn names(&self) -> Vec<&'static str> {
            self.events.events().map(|e| e.type_name()).collect()
        }
    }

    #[test]
    fn arrival_delay_falls_back_to_departure_offset() {
        let stop = TransitRouteStop::new(StopId(0), None, Some(100));
        assert_eq!(arrival_delay(&stop, SimTime(1_000), SimTime(1_150), VehicleId(0)), 50.0);
        let stop = TransitRouteStop::new(StopId(0), Some(100), Some(200));
        assert_eq!(arrival_delay(&stop, SimTime(1_000), SimTime(1_090), VehicleId(0)), -10.0);
        assert_eq!(departure_delay(&stop, SimTime(1_000), SimTime(1_200), VehicleId(0)), 0.0);
    }

    #[test]
    fn missing_offsets_report_zero_delay() {
        let stop = TransitRouteStop::new(StopId(0), None, None);
        assert_eq!(arrival_delay(&stop, SimTime(0), SimTime(999), VehicleId(0)), 0.0);
        assert_eq!(departure_delay(&stop, SimTime(0), SimTime(999), VehicleId(0)), 0.0);
    }

    #[test]
    fn on_time_stop_without_passengers_departs_at_once() {
        let mut d = driver(vec![
            TransitRouteStop::new(StopId(0), None, Some(0)),
            TransitRouteStop::new(StopId(1), Some(60), Some(60)),
        ]);
        let mut h = Harness::new();
        assert_eq!(h.serve(&mut d, StopId(0), SimTime(1_000)).unwrap(), 0.0);
        assert_eq!(h.names(), vec!["VehicleArrivesAtFacility", "VehicleDepartsAtFacility"]);
        assert_eq!(d.next_stop().map(|s| s.stop), Some(StopId(1)));
        assert_eq!(d.state(), DriverState::Driving);
    }

    #[test]
    fn early_vehicle_is_held_at_awaiting_stop() {
        let mut d = driver(vec![TransitRouteStop::new(StopId(0), Some(60), Some(70)).awaiting_departure()]);
        let mut h = Harness::new();

        assert_eq!(h.serve(&mut d, StopId(0), SimTime(1_060)).unwrap(), 10.0);
        assert_eq!(d.state(), DriverState::AtStop(0));
        assert_eq!(h.serve(&mut d, StopId(0), SimTime(1_070)).unwrap(), 0.0);

        // One arrival, one departure, whatever the number of calls.
        assert_eq!(h.names(), vec!["VehicleArrivesAtFacility", "VehicleDepartsAtFacility"]);
        assert_eq!(d.remaining_stops(), 0);
        assert!(d.check_route_end().is_ok());
    }

    #[test]
    fn wrong_stop_is_rejected() {
        let mut d = driver(vec![
            TransitRouteStop::new(StopId(0), None, Some(0)),
            TransitRouteStop::new(StopId(1), None, Some(60)),
        ]);
        let mut h = Harness::new();
        let err = h.serve(&mut d, StopId(1), SimTime(1_000)).unwrap_err();
        assert!(matches!(
            err,
            EngineError::UnexpectedStop { expected: Some(e), got, .. } if e == StopId(0) && got == StopId(1)
        ));
    }

    #[test]
    fn unserved_stops_fail_route_end() {
        let d = driver(vec![TransitRouteStop::new(StopId(0), None, Some(0))]);
        assert!(matches!(d.check_route_end(), Err(EngineError::StopsNotServed { remaining: 1, .. })));
    }

    #[test]
    fn passengers_board_and_alight() {
        let mut d = driver(vec![
            TransitRouteStop::new(StopId(0), None, Some(0)),
            TransitRouteStop::new(StopId(1), Some(60), Some(60)),
        ]);
        let mut h = Harness::new();
        h.tracker.add_waiting(StopId(0), passenger(1, StopId(0), StopId(1)));
        // Wants a stop this vehicle never serves afterwards: stays.
        h.tracker.add_waiting(StopId(0), passenger(2, StopId(0), StopId(7)));

        // door 2 s + one boarding at 2 s.
        assert_eq!(h.serve(&mut d, StopId(0), SimTime(1_000)).unwrap(), 4.0);
        assert_eq!(h.vehicle.cabin.len(), 1);
        assert_eq!(h.tracker.waiting_at(StopId(0)), 1);
        assert_eq!(h.serve(&mut d, StopId(0), SimTime(1_004)).unwrap(), 0.0);

        // door 2 s + one alighting at 1.5 s.
        assert_eq!(h.serve(&mut d, StopId(1), SimTime(1_060)).unwrap(), 3.5);
        assert_eq!(h.alighted.iter().map(|p| p.id()).collect::<Vec<_>>(), vec![PersonId(1)]);
        assert!(h.vehicle.cabin.is_empty());

        let names = h.names();
        assert_eq!(names.iter().filter(|n| **n == "PersonEntersVehicle").count(), 1);
        assert_eq!(names.iter().filter(|n| **n == "PersonLeavesVehicle").count(), 1);
    }

    #[test]
    fn full_vehicle_leaves_agents_waiting() {
        let mut small = VehicleType::bus(VehicleTypeId(2));
        small.seats = 1;
        small.standing_room = 0;
        let mut d = driver(vec![
            TransitRouteStop::new(StopId(0), None, Some(0)),
            TransitRouteStop::new(StopId(1), None, Some(60)),
        ]);
        let mut h = Harness::new();
        h.vehicle = QVehicle::new(VehicleId(500), Arc::new(small));
        h.tracker.add_waiting(StopId(0), passenger(1, StopId(0), StopId(1)));
        h.tracker.add_waiting(StopId(0), passenger(2, StopId(0), StopId(1)));

        h.serve(&mut d, StopId(0), SimTime(1_000)).unwrap();
        assert_eq!(h.vehicle.cabin.passenger_ids(), vec![PersonId(1)]);
        assert_eq!(h.tracker.waiting_at(StopId(0)), 1);
        assert_eq!(h.vehicle.free_seats(), 0);
    }

    #[test]
    fn leaving_last_stop_with_passengers_fails() {
        let mut d = driver(vec![TransitRouteStop::new(StopId(0), None, Some(0))]);
        let mut h = Harness::new();
        h.vehicle.cabin.add_passenger(passenger(1, StopId(5), StopId(9))).unwrap();

        let err = h.serve(&mut d, StopId(0), SimTime(1_000)).unwrap_err();
        assert!(matches!(err, EngineError::VehicleNotEmpty { ref passengers, .. } if passengers == &vec![PersonId(1)]));
    }

    #[test]
    fn drained_tracker_is_empty() {
        let mut t = StopAgentTracker::new();
        t.add_waiting(StopId(0), passenger(1, StopId(0), StopId(1)));
        t.add_waiting(StopId(3), passenger(2, StopId(3), StopId(1)));
        assert_eq!(t.waiting_count(), 2);
        assert_eq!(t.drain_waiting().len(), 2);
        assert_eq!(t.waiting_count(), 0);
    }
}

// ── Link advance handler ──────────────────────────────────────────────────────

#[cfg(test)]
mod advance {
    use super::*;
    use qsim_core::{DepartureId, PartitionId};
    use qsim_events::{EventBuffer, EventKind};
    use qsim_transit::{
        Departure, TransitLine, TransitRoute, TransitRouteStop, TransitSchedule, TransitStopFacility,
    };
    use crate::{AccessEgress, LinkAdvance, LinkQueue, StopAgentTracker, TransitDriverAgent};

    #[test]
    fn departing_car_enters_traffic() {
        let net = corridor();
        let mut q = LinkQueue::new(net.link(l(0)), 1, 1.0, 1.0);
        q.push_waiting(driven_car(4, NetworkRoute::new(l(0), vec![], l(1))));

        let mut events = EventBuffer::new(PartitionId(0));
        let mut tracker = StopAgentTracker::new();
        let schedule = TransitSchedule::new();
        let mut handler = LinkAdvance::new(&mut events, &mut tracker, &schedule);
        assert!(q.advance(SimTime(3), &mut handler).unwrap().is_empty());

        assert!(q.peek_front(SimTime(3)).is_some_and(|v| v.in_traffic));
        let kinds: Vec<_> = events.events().map(|e| e.kind.clone()).collect();
        assert_eq!(kinds, vec![EventKind::VehicleEntersTraffic {
            driver:  PersonId(4),
            vehicle: VehicleId(4),
            link:    l(0),
            mode:    LegMode::Car,
        }]);
    }

    #[test]
    fn bus_dwells_at_stop_on_start_link() {
        let net = corridor();
        let mut schedule = TransitSchedule::new();
        schedule.add_facility(TransitStopFacility::new(StopId(0), l(0), "a")).unwrap();
        schedule.add_facility(TransitStopFacility::new(StopId(1), l(2), "b")).unwrap();
        let route = TransitRoute::new(TransitRouteId(1), NetworkRoute::new(l(0), vec![l(1)], l(2)))
            .with_stop(TransitRouteStop::new(StopId(0), None, Some(0)))
            .with_stop(TransitRouteStop::new(StopId(1), None, Some(60)))
            .with_departure(DepartureId(0), SimTime(0), VehicleId(9));
        let mut line = TransitLine::new(LineId(1), "1");
        line.add_route(route).unwrap();
        schedule.add_line(line).unwrap();
        let tr = Arc::clone(schedule.route(LineId(1), TransitRouteId(1)).unwrap());

        let departure = Departure { id: DepartureId(0), time: SimTime(0), vehicle: VehicleId(9) };
        let mut v = bus(9);
        v.set_driver(Driver::Transit(Box::new(TransitDriverAgent::new(PersonId(99), LineId(1), tr, departure))));

        let passenger_route = TransitPassengerRoute {
            start_link:  l(0),
            end_link:    l(2),
            access_stop: StopId(0),
            egress_stop: StopId(1),
            line:        LineId(1),
            route:       TransitRouteId(1),
        };
        let plan = Plan::new()
            .activity(Activity::new("home", l(0)).with_end_time(SimTime(0)))
            .leg(Leg::transit(passenger_route))
            .activity(Activity::new("work", l(2)));
        let mut p = PersonAgent::new(PersonId(1), Arc::new(plan), SimTime::ZERO).unwrap();
        p.end_activity().unwrap();

        let mut q = LinkQueue::new(net.link(l(0)), 1, 1.0, 1.0);
        q.push_waiting(v);
        let mut events = EventBuffer::new(PartitionId(0));
        let mut tracker = StopAgentTracker::new();
        tracker.add_waiting(StopId(0), p);

        {
            let mut handler = LinkAdvance::new(&mut events, &mut tracker, &schedule);
            q.advance(SimTime(0), &mut handler).unwrap();
        }
        // door 2 s + one boarding at 2 s.
        assert!(q.peek_front(SimTime(0)).is_none());
        assert_eq!(tracker.waiting_count(), 0);

        {
            let mut handler = LinkAdvance::new(&mut events, &mut tracker, &schedule);
            q.advance(SimTime(3), &mut handler).unwrap();
            assert!(q.peek_front(SimTime(3)).is_none());
            q.advance(SimTime(4), &mut handler).unwrap();
        }
        assert!(q.peek_front(SimTime(4)).is_some());

        let names: Vec<_> = events.events().map(|e| e.type_name()).collect();
        assert_eq!(names, vec![
            "vehicle enters traffic",
            "VehicleArrivesAtFacility",
            "PersonEntersVehicle",
            "VehicleDepartsAtFacility",
        ]);
    }

    #[test]
    fn vehicle_without_driver_is_an_error() {
        let net = corridor();
        let mut q = LinkQueue::new(net.link(l(0)), 1, 1.0, 1.0);
        q.push_waiting(car(1));
        let mut events = EventBuffer::new(PartitionId(0));
        let mut tracker = StopAgentTracker::new();
        let schedule = TransitSchedule::new();
        let mut handler = LinkAdvance::new(&mut events, &mut tracker, &schedule);
        assert!(matches!(q.advance(SimTime(0), &mut handler), Err(crate::EngineError::NoDriver(_))));
    }
}

// ── Node mover ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod node_mover {
    use super::*;
    use qsim_core::{PartitionId, SimConfig};
    use qsim_events::{EventBuffer, EventKind};
    use qsim_network::Partitioning;
    use crate::{move_node, LinkTable, MoverSettings, NodeMoveResult, StorageSync};

    const KEEP: MoverSettings = MoverSettings { stuck_time_secs: 10, remove_stuck_vehicles: false };

    /// One car on l0's buffer at t=10, heading for `route`.
    fn table_with_buffered(net: &Network, partitioning: &Partitioning, route: NetworkRoute) -> LinkTable {
        let mut table = LinkTable::new(net, partitioning, PartitionId(0), &SimConfig::default());
        let q = table.expect_local(l(0)).unwrap();
        q.enter(driven_car(0, route), SimTime(0)).unwrap();
        q.advance(SimTime(10), &mut PassThrough).unwrap();
        table
    }

    fn run(net: &Network, table: &mut LinkTable, settings: MoverSettings, now: u32) -> (NodeMoveResult, EventBuffer) {
        let mut events = EventBuffer::new(PartitionId(0));
        let mut result = NodeMoveResult::default();
        move_node(NodeId(1), SimTime(now), net, table, settings, &mut events, &mut result).unwrap();
        (result, events)
    }

    #[test]
    fn vehicle_crosses_node() {
        let net = corridor();
        let p = Partitioning::single(&net);
        let mut table = table_with_buffered(&net, &p, NetworkRoute::new(l(0), vec![l(1)], l(2)));

        let (result, events) = run(&net, &mut table, KEEP, 10);
        assert_eq!(result.moved, 1);
        assert_eq!(table.local(l(0)).unwrap().vehicle_count(), 0);
        assert_eq!(table.local(l(1)).unwrap().vehicle_count(), 1);
        let names: Vec<_> = events.events().map(|e| e.type_name()).collect();
        assert_eq!(names, vec!["left link", "entered link"]);
    }

    #[test]
    fn full_downstream_link_blocks() {
        let net = corridor_with(|i| (i == 1).then_some(1.0));
        let p = Partitioning::single(&net);
        let mut table = table_with_buffered(&net, &p, NetworkRoute::new(l(0), vec![l(1)], l(2)));
        table.expect_local(l(1)).unwrap().enter(car(7), SimTime(0)).unwrap();

        let (result, events) = run(&net, &mut table, KEEP, 10);
        assert_eq!(result.moved, 0);
        assert!(events.is_empty());
        assert_eq!(table.local(l(0)).unwrap().vehicle_count(), 1);

        // Still blocked long after stuck time, but removal is off.
        let (result, _) = run(&net, &mut table, KEEP, 500);
        assert!(result.aborted.is_empty());
    }

    #[test]
    fn stuck_vehicle_is_removed_when_enabled() {
        let net = corridor_with(|i| (i == 1).then_some(1.0));
        let p = Partitioning::single(&net);
        let mut table = table_with_buffered(&net, &p, NetworkRoute::new(l(0), vec![l(1)], l(2)));
        table.expect_local(l(1)).unwrap().enter(car(7), SimTime(0)).unwrap();
        let remove = MoverSettings { stuck_time_secs: 10, remove_stuck_vehicles: true };

        let (result, _) = run(&net, &mut table, remove, 10);
        assert!(result.aborted.is_empty());
        let (result, _) = run(&net, &mut table, remove, 20);
        assert_eq!(result.aborted.len(), 1);
        assert_eq!(result.aborted[0].1, l(0));
        assert_eq!(table.local(l(0)).unwrap().used_storage(), 0.0);
    }

    /// Feeders `l0: n0 → n2` and `l1: n1 → n2` into `l2: n2 → n3`, which
    /// stores one car.
    fn merge() -> Network {
        let mut b = NetworkBuilder::new();
        let n0 = b.add_node(qsim_core::Coord::new(0.0, 0.0));
        let n1 = b.add_node(qsim_core::Coord::new(0.0, 200.0));
        let n2 = b.add_node(qsim_core::Coord::new(100.0, 100.0));
        let n3 = b.add_node(qsim_core::Coord::new(110.0, 100.0));
        b.add_link(n0, n2, LinkAttributes::new(100.0, 10.0, 1.0));
        b.add_link(n1, n2, LinkAttributes::new(100.0, 10.0, 1.0));
        b.add_link(n2, n3, LinkAttributes::new(10.0, 10.0, 1.0).with_storage(1.0));
        b.build().unwrap()
    }

    #[test]
    fn lower_in_link_wins_contested_space() {
        let net = merge();
        let p = Partitioning::single(&net);
        let mut table = LinkTable::new(&net, &p, PartitionId(0), &SimConfig::default());
        // l1 is filled first so that only link order can favour l0.
        for (link, id) in [(l(1), 1), (l(0), 0)] {
            let q = table.expect_local(link).unwrap();
            q.enter(driven_car(id, NetworkRoute::new(link, vec![], l(2))), SimTime(0)).unwrap();
            q.advance(SimTime(10), &mut PassThrough).unwrap();
        }

        let mut events = EventBuffer::new(PartitionId(0));
        let mut result = NodeMoveResult::default();
        move_node(NodeId(2), SimTime(10), &net, &mut table, KEEP, &mut events, &mut result).unwrap();
        assert_eq!(result.moved, 1);
        assert_eq!(table.local(l(0)).unwrap().vehicle_count(), 0);
        assert_eq!(table.local(l(1)).unwrap().vehicle_count(), 1);
        assert_eq!(table.local(l(1)).unwrap().blocked_for(SimTime(11)), 1);

        // Car 0 reaches the end of l2 and leaves, making room for l1.
        let leaving = table.expect_local(l(2)).unwrap().advance(SimTime(11), &mut PassThrough).unwrap();
        assert_eq!(leaving.len(), 1);
        move_node(NodeId(2), SimTime(11), &net, &mut table, KEEP, &mut events, &mut result).unwrap();
        assert_eq!(result.moved, 2);
        assert_eq!(table.local(l(1)).unwrap().vehicle_count(), 0);
        assert_eq!(table.local(l(1)).unwrap().blocked_for(SimTime(12)), 0);

        let entered: Vec<_> = events
            .events()
            .filter_map(|e| match e.kind {
                EventKind::VehicleEntersLink { vehicle, .. } => Some((e.time, vehicle)),
                _ => None,
            })
            .collect();
        assert_eq!(entered, vec![(SimTime(10), VehicleId(0)), (SimTime(11), VehicleId(1))]);
    }

    #[test]
    fn next_link_not_leaving_node_aborts() {
        let net = corridor();
        let p = Partitioning::single(&net);
        // l2 starts at n2, not at n1.
        let mut table = table_with_buffered(&net, &p, NetworkRoute::new(l(0), vec![l(2)], l(2)));

        let (result, events) = run(&net, &mut table, KEEP, 10);
        assert_eq!(result.aborted.len(), 1);
        assert!(events.is_empty());
    }

    #[test]
    fn split_link_produces_handoff() {
        let net = corridor();
        // n0, n1 in partition 0; n2, n3 in partition 1.  l1 is owned by 1.
        let p = Partitioning::from_assignment(&net, vec![0, 0, 1, 1]).unwrap();
        let mut table = table_with_buffered(&net, &p, NetworkRoute::new(l(0), vec![l(1)], l(2)));

        let (result, _) = run(&net, &mut table, KEEP, 10);
        assert_eq!(result.handoffs.len(), 1);
        let h = &result.handoffs[0];
        assert_eq!((h.to, h.link, h.entered_at), (PartitionId(1), l(1), SimTime(10)));
        assert_eq!(table.split_out_mut(l(1)).unwrap().used(), 1.0);

        table.sync_mirror(l(1), StorageSync { released: 1.0, consumed: 0.0 });
        assert_eq!(table.split_out_mut(l(1)).unwrap().used(), 0.0);
        table.sync_mirror(l(1), StorageSync { released: 0.0, consumed: 1.0 });
        assert!(!table.split_out_mut(l(1)).unwrap().has_space_for(net.link(l(1)).storage_capacity));
    }
}
