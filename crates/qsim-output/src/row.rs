//! Plain data rows written by the output backends.

use qsim_events::{Event, EventKind};
use qsim_sim::StepSummary;

/// One event, flattened to nullable columns.
///
/// Only the columns the event type defines are set; the rest are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRow {
    pub time:          u32,
    pub event_type:    String,
    pub person:        Option<u32>,
    pub vehicle:       Option<u32>,
    pub link:          Option<u32>,
    pub mode:          Option<String>,
    pub act_type:      Option<String>,
    pub stop:          Option<u32>,
    pub line:          Option<u32>,
    pub transit_route: Option<u32>,
    pub departure:     Option<u32>,
    /// Seconds behind schedule at a facility.
    pub delay:         Option<f64>,
}

/// Column names, in the order every backend writes them.
pub const EVENT_COLUMNS: [&str; 12] = [
    "time", "type", "person", "vehicle", "link", "mode", "act_type", "stop", "line",
    "transit_route", "departure", "delay",
];

impl EventRow {
    fn bare(event: &Event) -> Self {
        Self {
            time:          event.time.secs(),
            event_type:    event.type_name().to_owned(),
            person:        event.person().map(|p| p.0),
            vehicle:       event.vehicle().map(|v| v.0),
            link:          event.link().map(|l| l.0),
            mode:          None,
            act_type:      None,
            stop:          None,
            line:          None,
            transit_route: None,
            departure:     None,
            delay:         None,
        }
    }
}

impl From<&Event> for EventRow {
    fn from(event: &Event) -> Self {
        let mut row = Self::bare(event);
        match &event.kind {
            EventKind::ActivityStart { act_type, .. } | EventKind::ActivityEnd { act_type, .. } => {
                row.act_type = Some(act_type.clone());
            }
            EventKind::PersonDeparture { mode, .. }
            | EventKind::PersonArrival { mode, .. }
            | EventKind::VehicleEntersTraffic { mode, .. }
            | EventKind::VehicleLeavesTraffic { mode, .. } => {
                row.mode = Some(mode.as_str().to_owned());
            }
            EventKind::TransitDriverStarts { line, route, departure, .. } => {
                row.line = Some(line.0);
                row.transit_route = Some(route.0);
                row.departure = Some(departure.0);
            }
            EventKind::VehicleArrivesAtFacility { stop, delay, .. }
            | EventKind::VehicleDepartsAtFacility { stop, delay, .. } => {
                row.stop = Some(stop.0);
                row.delay = Some(*delay);
            }
            EventKind::StuckAndAbort { .. }
            | EventKind::PersonEntersVehicle { .. }
            | EventKind::PersonLeavesVehicle { .. }
            | EventKind::VehicleEntersLink { .. }
            | EventKind::VehicleLeavesLink { .. } => {}
        }
        row
    }
}

/// Counts for one simulated step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepSummaryRow {
    pub time:                u32,
    pub events:              u64,
    pub departures:          u64,
    pub arrivals:            u64,
    pub vehicles_on_network: u64,
    pub agents_at_activity:  u64,
}

impl From<&StepSummary> for StepSummaryRow {
    fn from(s: &StepSummary) -> Self {
        Self {
            time:                s.time.secs(),
            events:              s.events as u64,
            departures:          s.departures,
            arrivals:            s.arrivals,
            vehicles_on_network: s.vehicles_on_network as u64,
            agents_at_activity:  s.agents_at_activity as u64,
        }
    }
}
