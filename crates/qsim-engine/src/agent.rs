//! Person agents and route following.
//!
//! # Capability traits
//!
//! Entities that move over the network implement [`MovableOnNetwork`]; the
//! node mover and link queues only talk to that trait.  Person agents and
//! transit drivers both implement it and are carried by a vehicle inside the
//! [`Driver`](crate::Driver) enum.

use std::sync::Arc;

use qsim_core::{LinkId, PersonId, SimTime, StopId, VehicleId};
use qsim_population::{
    Activity, Leg, NetworkRoute, Plan, PlanElement, Route, TransitPassengerRoute,
};

use crate::{EngineError, EngineResult};

// ── Capability traits ─────────────────────────────────────────────────────────

/// Something that drives a vehicle along a link sequence.
pub trait MovableOnNetwork {
    /// The link the entity is currently on.
    fn current_link(&self) -> LinkId;

    /// The link the entity wants to move onto when crossing the next node,
    /// or `None` if it wants to arrive on the current link.
    fn choose_next_link(&self) -> Option<LinkId>;

    /// Called after the vehicle crossed a node onto `link`.
    fn notify_move_over_node(&mut self, link: LinkId) -> EngineResult<()>;

    /// Called when the vehicle arrives.  Fails if the entity still had
    /// obligations on the route.
    fn check_route_end(&self) -> EngineResult<()>;
}

// ── RouteCursor ───────────────────────────────────────────────────────────────

/// Position along a shared [`NetworkRoute`].
///
/// The vehicle starts at the downstream end of `start_link`.  `next_link`
/// yields the intermediate links, then `end_link`, then `None`.  The
/// degenerate route (`start == end`, no links) yields `None` immediately.
#[derive(Clone, Debug)]
pub struct RouteCursor {
    route:   Arc<NetworkRoute>,
    index:   usize,
    current: LinkId,
}

impl RouteCursor {
    pub fn new(route: Arc<NetworkRoute>) -> Self {
        let current = route.start_link;
        Self { route, index: 0, current }
    }

    #[inline]
    pub fn current_link(&self) -> LinkId {
        self.current
    }

    pub fn next_link(&self) -> Option<LinkId> {
        let n = self.route.links.len();
        if self.index < n {
            Some(self.route.links[self.index])
        } else if self.index == n && !self.route.is_trivial() {
            Some(self.route.end_link)
        } else {
            None
        }
    }

    /// Move onto `link`, which must be the next link of the route.
    pub fn advance(&mut self, link: LinkId) -> EngineResult<()> {
        let expected = self.next_link();
        if expected != Some(link) {
            return Err(EngineError::RouteMismatch { expected, got: link });
        }
        self.index += 1;
        self.current = link;
        Ok(())
    }

    /// `true` once the end link has been reached.
    pub fn is_at_end(&self) -> bool {
        self.next_link().is_none()
    }

    pub fn route(&self) -> &Arc<NetworkRoute> {
        &self.route
    }
}

// ── PersonAgent ───────────────────────────────────────────────────────────────

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LegState {
    /// Driving a vehicle over the network.
    Driving(VehicleId),
    /// Vehicle not yet parked on the current link.
    WaitingForVehicle(VehicleId),
    /// Waiting at a transit stop.
    WaitingAtStop(StopId),
    /// Passenger of a transit vehicle.
    Riding(VehicleId),
    /// Teleported; arrives at the given time.
    Teleporting(SimTime),
    /// Leg started but not yet assigned to any of the above.
    Departing,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AgentState {
    Activity,
    Leg(LegState),
    Abort,
}

/// What an agent does after its current leg ended.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AfterLeg {
    /// Started an intermediate activity ending at the given time, if any.
    Activity(Option<SimTime>),
    /// Started the last activity of the plan; the agent is finished.
    FinalActivity,
    /// Continues directly with another leg.
    Leg,
    /// The plan ended with this leg; the agent is finished.
    Done,
}

/// A population member executing its plan.
#[derive(Clone, Debug)]
pub struct PersonAgent {
    id:             PersonId,
    plan:           Arc<Plan>,
    element:        usize,
    state:          AgentState,
    link:           LinkId,
    cursor:         Option<RouteCursor>,
    activity_start: SimTime,
}

impl PersonAgent {
    /// Place the agent in the first activity of `plan`, started at `start`.
    pub fn new(id: PersonId, plan: Arc<Plan>, start: SimTime) -> EngineResult<Self> {
        let link = match plan.element(0) {
            Some(PlanElement::Activity(a)) => a.link,
            _ => {
                return Err(EngineError::InvalidPlan {
                    person: id,
                    reason: "plan must start with an activity".into(),
                })
            }
        };
        Ok(Self {
            id,
            plan,
            element: 0,
            state: AgentState::Activity,
            link,
            cursor: None,
            activity_start: start,
        })
    }

    #[inline]
    pub fn id(&self) -> PersonId {
        self.id
    }

    #[inline]
    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn element_index(&self) -> usize {
        self.element
    }

    pub fn plan(&self) -> &Arc<Plan> {
        &self.plan
    }

    pub fn current_activity(&self) -> Option<&Activity> {
        match self.plan.element(self.element) {
            Some(PlanElement::Activity(a)) => Some(a),
            _ => None,
        }
    }

    pub fn current_leg(&self) -> Option<&Leg> {
        match self.plan.element(self.element) {
            Some(PlanElement::Leg(l)) => Some(l),
            _ => None,
        }
    }

    fn is_last_element(&self) -> bool {
        self.element + 1 >= self.plan.len()
    }

    /// When the current activity ends.  `None` if the agent is not in an
    /// activity, the activity has no end, or it is the last plan element.
    pub fn activity_end_time(&self) -> Option<SimTime> {
        if self.state != AgentState::Activity || self.is_last_element() {
            return None;
        }
        self.current_activity()?.end_after(self.activity_start)
    }

    /// Leave the current activity for the following leg.
    pub fn end_activity(&mut self) -> EngineResult<()> {
        match self.plan.element(self.element + 1) {
            Some(PlanElement::Leg(_)) => {}
            _ => return Err(EngineError::NoNextLeg { person: self.id }),
        }
        self.element += 1;
        self.state = AgentState::Leg(LegState::Departing);
        self.cursor = None;
        Ok(())
    }

    /// Finish the current leg at `now` and move to the next plan element.
    pub fn end_leg(&mut self, now: SimTime) -> AfterLeg {
        self.cursor = None;
        self.element += 1;
        match self.plan.element(self.element) {
            None => AfterLeg::Done,
            Some(PlanElement::Leg(_)) => {
                self.state = AgentState::Leg(LegState::Departing);
                AfterLeg::Leg
            }
            Some(PlanElement::Activity(a)) => {
                self.link = a.link;
                self.state = AgentState::Activity;
                self.activity_start = now;
                if self.is_last_element() {
                    AfterLeg::FinalActivity
                } else {
                    AfterLeg::Activity(self.activity_end_time())
                }
            }
        }
    }

    pub fn abort(&mut self) {
        self.state = AgentState::Abort;
    }

    pub fn set_leg_state(&mut self, leg_state: LegState) {
        self.state = AgentState::Leg(leg_state);
    }

    /// Start following `route` from its start link.
    pub fn begin_route(&mut self, route: Arc<NetworkRoute>) {
        self.link = route.start_link;
        self.cursor = Some(RouteCursor::new(route));
    }

    /// Put the agent on `link` without moving (teleport and transit
    /// arrivals).
    pub fn set_link(&mut self, link: LinkId) {
        self.link = link;
    }

    /// The network route of the current leg, if it has one.
    pub fn network_route(&self) -> Option<&Arc<NetworkRoute>> {
        match &self.current_leg()?.route {
            Route::Network(r) => Some(r),
            _ => None,
        }
    }

    pub fn transit_route(&self) -> Option<&TransitPassengerRoute> {
        match &self.current_leg()?.route {
            Route::TransitPassenger(r) => Some(r),
            _ => None,
        }
    }

    /// Where a transit passenger wants to get off.
    pub fn egress_stop(&self) -> Option<StopId> {
        self.transit_route().map(|r| r.egress_stop)
    }

    /// Vehicle for the current network leg: the one named by the route, or
    /// the person's default vehicle.
    pub fn leg_vehicle(&self) -> Option<VehicleId> {
        self.network_route()
            .map(|r| r.vehicle.unwrap_or_else(|| default_vehicle_of(self.id)))
    }
}

/// Id of the vehicle every person owns unless a route says otherwise.
#[inline]
pub fn default_vehicle_of(person: PersonId) -> VehicleId {
    VehicleId(person.0)
}

impl MovableOnNetwork for PersonAgent {
    fn current_link(&self) -> LinkId {
        self.link
    }

    fn choose_next_link(&self) -> Option<LinkId> {
        self.cursor.as_ref()?.next_link()
    }

    fn notify_move_over_node(&mut self, link: LinkId) -> EngineResult<()> {
        match self.cursor.as_mut() {
            Some(c) => c.advance(link)?,
            None => return Err(EngineError::RouteMismatch { expected: None, got: link }),
        }
        self.link = link;
        Ok(())
    }

    fn check_route_end(&self) -> EngineResult<()> {
        Ok(())
    }
}
