//! CSV plan loader.
//!
//! # CSV format
//!
//! One row per plan element, in plan order.  Rows of the same person must be
//! contiguous; empty fields mean "not set".
//!
//! ```csv
//! person_id,kind,act_type,link,end_time,duration,mode,start_link,route,end_link,vehicle_id,travel_time,access_stop,egress_stop,line,transit_route
//! 0,act,home,0,08:00:00,,,,,,,,,,,
//! 0,leg,,,,,car,0,1 2,3,,,,,,
//! 0,act,work,3,,8:00:00,,,,,,,,,,
//! 1,act,home,5,07:30:00,,,,,,,,,,,
//! 1,leg,,,,,pt,5,,9,,,4,7,0,1
//! 1,act,work,9,,,,,,,,,,,,
//! ```
//!
//! Leg rows are interpreted as follows:
//!
//! | Columns present             | Route                                   |
//! |-----------------------------|-----------------------------------------|
//! | `access_stop`               | transit passenger route                 |
//! | `travel_time`, no `route`   | generic route (teleported)              |
//! | otherwise                   | network route; `route` is space-separated link ids |
//!
//! Times are `HH:MM:SS`, `HH:MM` or plain seconds; `duration` likewise.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use qsim_core::{LegMode, LineId, LinkId, PersonId, SimTime, StopId, TransitRouteId, VehicleId};

use crate::plan::{Activity, Leg, NetworkRoute, Plan, PlanElement, TransitPassengerRoute};
use crate::{Population, PopulationError, PopulationResult};

// ── CSV record ────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct PlanRecord {
    person_id:     u32,
    kind:          String,
    act_type:      Option<String>,
    link:          Option<u32>,
    end_time:      Option<String>,
    duration:      Option<String>,
    mode:          Option<String>,
    start_link:    Option<u32>,
    route:         Option<String>,
    end_link:      Option<u32>,
    vehicle_id:    Option<u32>,
    travel_time:   Option<String>,
    access_stop:   Option<u32>,
    egress_stop:   Option<u32>,
    line:          Option<u32>,
    transit_route: Option<u32>,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Load a population from a CSV file.
pub fn load_population_csv(path: &Path) -> PopulationResult<Population> {
    let file = std::fs::File::open(path)?;
    load_population_reader(file)
}

/// Like [`load_population_csv`] but accepts any `Read` source.
///
/// Useful for testing (pass a `std::io::Cursor`).
pub fn load_population_reader<R: Read>(reader: R) -> PopulationResult<Population> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut by_person: BTreeMap<u32, Vec<PlanElement>> = BTreeMap::new();
    let mut last: Option<u32> = None;

    for (row, result) in csv_reader.deserialize::<PlanRecord>().enumerate() {
        let rec = result?;
        let line_no = row + 2; // header is line 1
        if last != Some(rec.person_id) && by_person.contains_key(&rec.person_id) {
            return Err(PopulationError::Parse(format!(
                "line {line_no}: rows of person {} are not contiguous",
                rec.person_id
            )));
        }
        last = Some(rec.person_id);
        let element = parse_element(&rec)
            .map_err(|e| PopulationError::Parse(format!("line {line_no}: {e}")))?;
        by_person.entry(rec.person_id).or_default().push(element);
    }

    let mut population = Population::new();
    for (id, elements) in by_person {
        population.add_person(PersonId(id), Plan { elements })?;
    }
    Ok(population)
}

// ── Row parsing ───────────────────────────────────────────────────────────────

fn parse_element(rec: &PlanRecord) -> Result<PlanElement, String> {
    match rec.kind.trim() {
        "act" | "activity" => parse_activity(rec).map(PlanElement::Activity),
        "leg" => parse_leg(rec).map(PlanElement::Leg),
        other => Err(format!("unknown element kind {other:?}")),
    }
}

fn parse_activity(rec: &PlanRecord) -> Result<Activity, String> {
    let link = rec.link.ok_or("activity without link")?;
    let mut act = Activity::new(rec.act_type.clone().unwrap_or_default(), LinkId(link));
    if let Some(s) = &rec.end_time {
        act.end_time = Some(parse_time(s)?);
    }
    if let Some(s) = &rec.duration {
        act.max_duration = Some(parse_time(s)?.secs());
    }
    Ok(act)
}

fn parse_leg(rec: &PlanRecord) -> Result<Leg, String> {
    let mode: LegMode = rec
        .mode
        .as_deref()
        .ok_or("leg without mode")?
        .parse()
        .map_err(|e| format!("{e}"))?;
    let start = LinkId(rec.start_link.ok_or("leg without start_link")?);
    let end = LinkId(rec.end_link.ok_or("leg without end_link")?);
    let travel_time = rec.travel_time.as_deref().map(parse_time).transpose()?.map(SimTime::secs);

    if let Some(access) = rec.access_stop {
        let need = |v: Option<u32>, what: &str| v.ok_or_else(|| format!("transit leg without {what}"));
        let route = TransitPassengerRoute {
            start_link:  start,
            end_link:    end,
            access_stop: StopId(access),
            egress_stop: StopId(need(rec.egress_stop, "egress_stop")?),
            line:        LineId(need(rec.line, "line")?),
            route:       TransitRouteId(need(rec.transit_route, "transit_route")?),
        };
        let mut leg = Leg::transit(route);
        leg.mode = mode;
        leg.travel_time = travel_time;
        return Ok(leg);
    }

    match (&rec.route, travel_time) {
        (None, Some(tt)) => Ok(Leg::teleported(mode, start, end, tt)),
        (links, tt) => {
            let links = match links {
                Some(s) => parse_links(s)?,
                None => Vec::new(),
            };
            let mut route = NetworkRoute::new(start, links, end);
            if let Some(v) = rec.vehicle_id {
                route = route.with_vehicle(VehicleId(v));
            }
            let mut leg = Leg::network(mode, route);
            leg.travel_time = tt;
            Ok(leg)
        }
    }
}

fn parse_time(s: &str) -> Result<SimTime, String> {
    SimTime::parse(s).map_err(|e| e.to_string())
}

fn parse_links(s: &str) -> Result<Vec<LinkId>, String> {
    s.split_whitespace()
        .map(|t| t.parse::<u32>().map(LinkId).map_err(|_| format!("invalid link id {t:?} in route")))
        .collect()
}
