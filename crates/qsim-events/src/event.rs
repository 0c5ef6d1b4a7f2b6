//! Event types.
//!
//! Every observable state change of the simulation is one [`Event`].  Names
//! returned by [`Event::type_name`] follow the conventions established by
//! existing traffic-simulation tooling, so downstream analysis scripts can
//! key on them.

use qsim_core::{
    DepartureId, LegMode, LineId, LinkId, PersonId, SimTime, StopId, TransitRouteId, VehicleId,
};

/// Who a `StuckAndAbort` event is about.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AbortSubject {
    Person(PersonId),
    Vehicle(VehicleId),
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EventKind {
    ActivityStart { person: PersonId, link: LinkId, act_type: String },
    ActivityEnd { person: PersonId, link: LinkId, act_type: String },
    PersonDeparture { person: PersonId, link: LinkId, mode: LegMode },
    PersonArrival { person: PersonId, link: LinkId, mode: LegMode },
    PersonEntersVehicle { person: PersonId, vehicle: VehicleId },
    PersonLeavesVehicle { person: PersonId, vehicle: VehicleId },
    VehicleEntersTraffic { driver: PersonId, vehicle: VehicleId, link: LinkId, mode: LegMode },
    VehicleLeavesTraffic { driver: PersonId, vehicle: VehicleId, link: LinkId, mode: LegMode },
    VehicleEntersLink { vehicle: VehicleId, link: LinkId },
    VehicleLeavesLink { vehicle: VehicleId, link: LinkId },
    TransitDriverStarts {
        driver:    PersonId,
        vehicle:   VehicleId,
        line:      LineId,
        route:     TransitRouteId,
        departure: DepartureId,
    },
    /// `delay` is seconds behind schedule (negative when early).
    VehicleArrivesAtFacility { vehicle: VehicleId, stop: StopId, delay: f64 },
    VehicleDepartsAtFacility { vehicle: VehicleId, stop: StopId, delay: f64 },
    StuckAndAbort { subject: AbortSubject, link: LinkId },
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Event {
    pub time: SimTime,
    pub kind: EventKind,
}

impl Event {
    pub fn new(time: SimTime, kind: EventKind) -> Self {
        Self { time, kind }
    }

    /// Canonical event type name.
    pub fn type_name(&self) -> &'static str {
        match self.kind {
            EventKind::ActivityStart { .. } => "actstart",
            EventKind::ActivityEnd { .. } => "actend",
            EventKind::PersonDeparture { .. } => "departure",
            EventKind::PersonArrival { .. } => "arrival",
            EventKind::PersonEntersVehicle { .. } => "PersonEntersVehicle",
            EventKind::PersonLeavesVehicle { .. } => "PersonLeavesVehicle",
            EventKind::VehicleEntersTraffic { .. } => "vehicle enters traffic",
            EventKind::VehicleLeavesTraffic { .. } => "vehicle leaves traffic",
            EventKind::VehicleEntersLink { .. } => "entered link",
            EventKind::VehicleLeavesLink { .. } => "left link",
            EventKind::TransitDriverStarts { .. } => "TransitDriverStarts",
            EventKind::VehicleArrivesAtFacility { .. } => "VehicleArrivesAtFacility",
            EventKind::VehicleDepartsAtFacility { .. } => "VehicleDepartsAtFacility",
            EventKind::StuckAndAbort { .. } => "stuckAndAbort",
        }
    }

    /// The person the event is about, if any.
    pub fn person(&self) -> Option<PersonId> {
        match self.kind {
            EventKind::ActivityStart { person, .. }
            | EventKind::ActivityEnd { person, .. }
            | EventKind::PersonDeparture { person, .. }
            | EventKind::PersonArrival { person, .. }
            | EventKind::PersonEntersVehicle { person, .. }
            | EventKind::PersonLeavesVehicle { person, .. } => Some(person),
            EventKind::VehicleEntersTraffic { driver, .. }
            | EventKind::VehicleLeavesTraffic { driver, .. }
            | EventKind::TransitDriverStarts { driver, .. } => Some(driver),
            EventKind::StuckAndAbort { subject: AbortSubject::Person(p), .. } => Some(p),
            _ => None,
        }
    }

    /// The vehicle the event is about, if any.
    pub fn vehicle(&self) -> Option<VehicleId> {
        match self.kind {
            EventKind::PersonEntersVehicle { vehicle, .. }
            | EventKind::PersonLeavesVehicle { vehicle, .. }
            | EventKind::VehicleEntersTraffic { vehicle, .. }
            | EventKind::VehicleLeavesTraffic { vehicle, .. }
            | EventKind::VehicleEntersLink { vehicle, .. }
            | EventKind::VehicleLeavesLink { vehicle, .. }
            | EventKind::TransitDriverStarts { vehicle, .. }
            | EventKind::VehicleArrivesAtFacility { vehicle, .. }
            | EventKind::VehicleDepartsAtFacility { vehicle, .. } => Some(vehicle),
            EventKind::StuckAndAbort { subject: AbortSubject::Vehicle(v), .. } => Some(v),
            _ => None,
        }
    }

    /// The link the event happened on, if it names one.
    pub fn link(&self) -> Option<LinkId> {
        match self.kind {
            EventKind::ActivityStart { link, .. }
            | EventKind::ActivityEnd { link, .. }
            | EventKind::PersonDeparture { link, .. }
            | EventKind::PersonArrival { link, .. }
            | EventKind::VehicleEntersTraffic { link, .. }
            | EventKind::VehicleLeavesTraffic { link, .. }
            | EventKind::VehicleEntersLink { link, .. }
            | EventKind::VehicleLeavesLink { link, .. }
            | EventKind::StuckAndAbort { link, .. } => Some(link),
            _ => None,
        }
    }
}
