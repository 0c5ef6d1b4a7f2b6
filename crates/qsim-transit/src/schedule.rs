//! Transit schedule data model.
//!
//! ```text
//! TransitSchedule
//!  ├── facilities: StopId → TransitStopFacility (on one link)
//!  └── lines: LineId → TransitLine
//!                        └── routes: TransitRouteId → Arc<TransitRoute>
//!                                      ├── route:  Arc<NetworkRoute>
//!                                      ├── stops:  [TransitRouteStop] (in service order)
//!                                      └── departures: [Departure]
//! ```
//!
//! Offsets on a route stop are seconds after the departure's start time.
//! Either may be missing; the driver falls back to the other one when
//! computing delays.

use std::collections::BTreeMap;
use std::sync::Arc;

use qsim_core::{DepartureId, LineId, LinkId, SimTime, StopId, TransitRouteId, VehicleId};
use qsim_network::Network;
use qsim_population::NetworkRoute;

use crate::{TransitError, TransitResult};

// ── Stops ─────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub struct TransitStopFacility {
    pub id:   StopId,
    /// The link the stop is served from.  A vehicle serves the stop while it
    /// is on this link.
    pub link: LinkId,
    pub name: String,
}

impl TransitStopFacility {
    pub fn new(id: StopId, link: LinkId, name: impl Into<String>) -> Self {
        Self { id, link, name: name.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitRouteStop {
    pub stop: StopId,
    /// Seconds after departure start.
    pub arrival_offset:   Option<u32>,
    /// Seconds after departure start.
    pub departure_offset: Option<u32>,
    /// Hold the vehicle until the scheduled departure when it is early.
    pub await_departure:  bool,
}

impl TransitRouteStop {
    pub fn new(stop: StopId, arrival_offset: Option<u32>, departure_offset: Option<u32>) -> Self {
        Self { stop, arrival_offset, departure_offset, await_departure: false }
    }

    pub fn awaiting_departure(mut self) -> Self {
        self.await_departure = true;
        self
    }
}

// ── Routes and lines ──────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Departure {
    pub id:      DepartureId,
    pub time:    SimTime,
    pub vehicle: VehicleId,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TransitRoute {
    pub id:         TransitRouteId,
    /// Shared by every driver serving this route.
    pub route:      Arc<NetworkRoute>,
    pub stops:      Vec<TransitRouteStop>,
    pub departures: Vec<Departure>,
}

impl TransitRoute {
    pub fn new(id: TransitRouteId, route: NetworkRoute) -> Self {
        Self { id, route: Arc::new(route), stops: Vec::new(), departures: Vec::new() }
    }

    pub fn with_stop(mut self, stop: TransitRouteStop) -> Self {
        self.stops.push(stop);
        self
    }

    pub fn with_departure(mut self, id: DepartureId, time: SimTime, vehicle: VehicleId) -> Self {
        self.departures.push(Departure { id, time, vehicle });
        self
    }

    /// Index of `stop` among this route's stops at or after `from`.
    pub fn stop_index(&self, stop: StopId, from: usize) -> Option<usize> {
        self.stops.iter().skip(from).position(|s| s.stop == stop).map(|i| i + from)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TransitLine {
    pub id:     LineId,
    pub name:   String,
    pub routes: BTreeMap<TransitRouteId, Arc<TransitRoute>>,
}

impl TransitLine {
    pub fn new(id: LineId, name: impl Into<String>) -> Self {
        Self { id, name: name.into(), routes: BTreeMap::new() }
    }

    pub fn add_route(&mut self, route: TransitRoute) -> TransitResult<()> {
        if self.routes.contains_key(&route.id) {
            return Err(TransitError::DuplicateRoute { line: self.id, route: route.id });
        }
        self.routes.insert(route.id, Arc::new(route));
        Ok(())
    }
}

// ── Schedule ──────────────────────────────────────────────────────────────────

/// All stops and lines of a run.  Iteration is by ascending id everywhere.
#[derive(Clone, Debug, Default)]
pub struct TransitSchedule {
    facilities: BTreeMap<StopId, TransitStopFacility>,
    lines:      BTreeMap<LineId, TransitLine>,
}

/// One scheduled vehicle run, as handed to the engine.
#[derive(Clone, Debug)]
pub struct ScheduledDeparture {
    pub line:      LineId,
    pub route:     Arc<TransitRoute>,
    pub departure: Departure,
}

impl TransitSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_facility(&mut self, facility: TransitStopFacility) -> TransitResult<()> {
        if self.facilities.contains_key(&facility.id) {
            return Err(TransitError::DuplicateStop(facility.id));
        }
        self.facilities.insert(facility.id, facility);
        Ok(())
    }

    pub fn add_line(&mut self, line: TransitLine) -> TransitResult<()> {
        if self.lines.contains_key(&line.id) {
            return Err(TransitError::DuplicateLine(line.id));
        }
        self.lines.insert(line.id, line);
        Ok(())
    }

    pub fn facility(&self, id: StopId) -> Option<&TransitStopFacility> {
        self.facilities.get(&id)
    }

    pub fn facilities(&self) -> impl Iterator<Item = &TransitStopFacility> + '_ {
        self.facilities.values()
    }

    pub fn line(&self, id: LineId) -> Option<&TransitLine> {
        self.lines.get(&id)
    }

    pub fn lines(&self) -> impl Iterator<Item = &TransitLine> + '_ {
        self.lines.values()
    }

    pub fn route(&self, line: LineId, route: TransitRouteId) -> Option<&Arc<TransitRoute>> {
        self.lines.get(&line)?.routes.get(&route)
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty() && self.facilities.is_empty()
    }

    /// Every departure of every route, ordered by (line, route, position).
    pub fn departures(&self) -> Vec<ScheduledDeparture> {
        self.lines
            .values()
            .flat_map(|line| {
                line.routes.values().flat_map(move |route| {
                    route.departures.iter().map(move |d| ScheduledDeparture {
                        line:      line.id,
                        route:     Arc::clone(route),
                        departure: *d,
                    })
                })
            })
            .collect()
    }

    /// Check the schedule against `network`:
    ///
    /// - every stop facility is on an existing link
    /// - every route link exists and consecutive links connect
    /// - every route has stops, all of them known, and each stop's link
    ///   appears on the route at or after the previous stop's position
    /// - no vehicle serves two departures
    pub fn validate(&self, network: &Network) -> TransitResult<()> {
        for f in self.facilities.values() {
            if !network.contains_link(f.link) {
                return Err(TransitError::StopOnUnknownLink { stop: f.id, link: f.link });
            }
        }

        let mut vehicles: BTreeMap<VehicleId, DepartureId> = BTreeMap::new();
        for line in self.lines.values() {
            for route in line.routes.values() {
                self.validate_route(network, line.id, route)?;
                for d in &route.departures {
                    if let Some(first) = vehicles.insert(d.vehicle, d.id) {
                        return Err(TransitError::VehicleReused {
                            vehicle: d.vehicle,
                            first,
                            second:  d.id,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn validate_route(&self, network: &Network, line: LineId, route: &TransitRoute) -> TransitResult<()> {
        let links: Vec<LinkId> = route.route.all_links().collect();
        for &link in &links {
            if !network.contains_link(link) {
                return Err(TransitError::UnknownLink { line, route: route.id, link });
            }
        }
        for pair in links.windows(2) {
            if !network.is_connected(pair[0], pair[1]) {
                return Err(TransitError::Disconnected {
                    line,
                    route: route.id,
                    from:  pair[0],
                    to:    pair[1],
                });
            }
        }
        if route.stops.is_empty() {
            return Err(TransitError::NoStops { line, route: route.id });
        }
        let mut pos = 0;
        for s in &route.stops {
            let facility = self
                .facilities
                .get(&s.stop)
                .ok_or(TransitError::UnknownStop { line, route: route.id, stop: s.stop })?;
            pos = links
                .iter()
                .skip(pos)
                .position(|&l| l == facility.link)
                .map(|i| i + pos)
                .ok_or(TransitError::StopNotOnRoute { line, route: route.id, stop: s.stop })?;
        }
        Ok(())
    }
}
