//! Plans: the already-decided day of one person.
//!
//! A plan is an alternating sequence of [`Activity`] and [`Leg`] elements.
//! It must start with an activity.  Consecutive legs are allowed (for
//! example an access walk followed by a car leg); consecutive activities are
//! not.  A plan may end with either kind: a trailing leg means the person is
//! finished once it arrives.
//!
//! Plans are shared read-only between the population and the running agent
//! through `Arc<Plan>`.

use std::collections::BTreeMap;
use std::sync::Arc;

use qsim_core::{LegMode, LineId, LinkId, PersonId, SimTime, StopId, TransitRouteId, VehicleId};

use crate::{PopulationError, PopulationResult};

// ── Activity ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Activity {
    /// Free-form type label (`"home"`, `"work"`, …).
    pub act_type: String,
    /// Link the activity takes place on.
    pub link: LinkId,
    /// Absolute end time.
    pub end_time: Option<SimTime>,
    /// Maximum duration in seconds, counted from the activity start.
    pub max_duration: Option<u32>,
}

impl Activity {
    pub fn new(act_type: impl Into<String>, link: LinkId) -> Self {
        Self { act_type: act_type.into(), link, end_time: None, max_duration: None }
    }

    pub fn with_end_time(mut self, end: SimTime) -> Self {
        self.end_time = Some(end);
        self
    }

    pub fn with_duration(mut self, secs: u32) -> Self {
        self.max_duration = Some(secs);
        self
    }

    /// When an activity started at `start` ends: the earlier of the end time
    /// and `start + max_duration`, whichever of the two is set.
    pub fn end_after(&self, start: SimTime) -> Option<SimTime> {
        let by_duration = self.max_duration.map(|d| start.offset(d));
        match (self.end_time, by_duration) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

// ── Routes ────────────────────────────────────────────────────────────────────

/// A link sequence driven by a vehicle.
///
/// `links` are the links strictly between `start_link` and `end_link`.  The
/// vehicle starts at the downstream end of `start_link`, so a route of one
/// link has `start_link == end_link` and no intermediate links, and is
/// *trivial*: the leg arrives without moving.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NetworkRoute {
    pub start_link: LinkId,
    pub links:      Vec<LinkId>,
    pub end_link:   LinkId,
    /// Vehicle to use; the person's default vehicle when `None`.
    pub vehicle:    Option<VehicleId>,
}

impl NetworkRoute {
    pub fn new(start_link: LinkId, links: Vec<LinkId>, end_link: LinkId) -> Self {
        Self { start_link, links, end_link, vehicle: None }
    }

    pub fn with_vehicle(mut self, vehicle: VehicleId) -> Self {
        self.vehicle = Some(vehicle);
        self
    }

    /// `true` for the degenerate single-link route.
    #[inline]
    pub fn is_trivial(&self) -> bool {
        self.start_link == self.end_link && self.links.is_empty()
    }

    /// All links touched, start and end included (end only if distinct).
    pub fn all_links(&self) -> impl Iterator<Item = LinkId> + '_ {
        let tail = (!self.is_trivial()).then_some(self.end_link);
        std::iter::once(self.start_link)
            .chain(self.links.iter().copied())
            .chain(tail)
    }
}

/// A ride on a scheduled transit line from an access stop to an egress stop.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TransitPassengerRoute {
    pub start_link:  LinkId,
    pub end_link:    LinkId,
    pub access_stop: StopId,
    pub egress_stop: StopId,
    pub line:        LineId,
    pub route:       TransitRouteId,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Route {
    Network(Arc<NetworkRoute>),
    TransitPassenger(TransitPassengerRoute),
    /// Start and end only; moved by teleportation.
    Generic { start_link: LinkId, end_link: LinkId },
}

impl Route {
    pub fn start_link(&self) -> LinkId {
        match self {
            Route::Network(r) => r.start_link,
            Route::TransitPassenger(r) => r.start_link,
            Route::Generic { start_link, .. } => *start_link,
        }
    }

    pub fn end_link(&self) -> LinkId {
        match self {
            Route::Network(r) => r.end_link,
            Route::TransitPassenger(r) => r.end_link,
            Route::Generic { end_link, .. } => *end_link,
        }
    }
}

// ── Leg ───────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Leg {
    pub mode:  LegMode,
    pub route: Route,
    /// Expected travel time in seconds.  Used as the teleportation time for
    /// legs that are not simulated on the network.
    pub travel_time: Option<u32>,
}

impl Leg {
    pub fn network(mode: LegMode, route: NetworkRoute) -> Self {
        Self { mode, route: Route::Network(Arc::new(route)), travel_time: None }
    }

    pub fn teleported(mode: LegMode, start_link: LinkId, end_link: LinkId, travel_time: u32) -> Self {
        Self {
            mode,
            route: Route::Generic { start_link, end_link },
            travel_time: Some(travel_time),
        }
    }

    pub fn transit(route: TransitPassengerRoute) -> Self {
        Self { mode: LegMode::Pt, route: Route::TransitPassenger(route), travel_time: None }
    }

    pub fn with_travel_time(mut self, secs: u32) -> Self {
        self.travel_time = Some(secs);
        self
    }
}

// ── Plan ──────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PlanElement {
    Activity(Activity),
    Leg(Leg),
}

#[derive(Clone, Debug, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Plan {
    pub elements: Vec<PlanElement>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn activity(mut self, activity: Activity) -> Self {
        self.elements.push(PlanElement::Activity(activity));
        self
    }

    pub fn leg(mut self, leg: Leg) -> Self {
        self.elements.push(PlanElement::Leg(leg));
        self
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    #[inline]
    pub fn element(&self, index: usize) -> Option<&PlanElement> {
        self.elements.get(index)
    }

    pub fn legs(&self) -> impl Iterator<Item = &Leg> + '_ {
        self.elements.iter().filter_map(|e| match e {
            PlanElement::Leg(l) => Some(l),
            PlanElement::Activity(_) => None,
        })
    }

    /// Check the structural rules: non-empty, starts with an activity, no two
    /// activities in a row, consecutive elements meet on the same link.
    pub fn validate(&self, person: PersonId) -> PopulationResult<()> {
        let invalid = |reason: String| PopulationError::InvalidPlan { person, reason };
        match self.elements.first() {
            None => return Err(invalid("plan is empty".into())),
            Some(PlanElement::Leg(_)) => return Err(invalid("plan must start with an activity".into())),
            Some(PlanElement::Activity(_)) => {}
        }
        let mut at = None;
        for (i, el) in self.elements.iter().enumerate() {
            let (start, end) = match el {
                PlanElement::Activity(a) => (a.link, a.link),
                PlanElement::Leg(l) => (l.route.start_link(), l.route.end_link()),
            };
            if let Some(prev) = at {
                if prev != start {
                    return Err(invalid(format!(
                        "element {i} starts on {start} but the previous element ends on {prev}"
                    )));
                }
            }
            if i > 0 {
                if let (PlanElement::Activity(_), Some(PlanElement::Activity(_))) =
                    (el, self.elements.get(i - 1))
                {
                    return Err(invalid(format!("elements {} and {i} are both activities", i - 1)));
                }
            }
            at = Some(end);
        }
        Ok(())
    }
}

// ── Population ────────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct Person {
    pub id:   PersonId,
    pub plan: Arc<Plan>,
}

/// All persons of a run, ordered by id.
#[derive(Clone, Debug, Default)]
pub struct Population {
    persons: BTreeMap<PersonId, Person>,
}

impl Population {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a person after validating its plan.
    pub fn add_person(&mut self, id: PersonId, plan: Plan) -> PopulationResult<()> {
        if self.persons.contains_key(&id) {
            return Err(PopulationError::DuplicatePerson(id));
        }
        plan.validate(id)?;
        self.persons.insert(id, Person { id, plan: Arc::new(plan) });
        Ok(())
    }

    pub fn get(&self, id: PersonId) -> Option<&Person> {
        self.persons.get(&id)
    }

    /// Persons in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &Person> + '_ {
        self.persons.values()
    }

    pub fn len(&self) -> usize {
        self.persons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.persons.is_empty()
    }

    /// Largest person id, if any.  Synthetic ids (transit drivers) are
    /// allocated above it.
    pub fn max_person_id(&self) -> Option<PersonId> {
        self.persons.keys().next_back().copied()
    }
}
