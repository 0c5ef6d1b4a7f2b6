//! bus_line — a scheduled bus line with riders along a corridor.
//!
//! ```text
//! s0        s1        s2
//! n0 ─l0─► n1 ─l1─► n2 ─l2─► n3 ─l3─► n4 ─l4─► n5
//! ```
//!
//! One line runs every ten minutes from 06:00 to 08:00.  Riders show up at
//! `s0` or `s1` at random times and ride to a later stop.  A handful of cars
//! share the corridor with the buses.
//!
//! ```text
//! bus_line [config.json] [output_dir]
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use log::info;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use qsim_core::{
    Coord, DepartureId, LegMode, LineId, LinkId, PersonId, SimConfig, SimTime, StopId,
    TransitRouteId, VehicleId, VehicleType, VehicleTypeId, Vehicles,
};
use qsim_network::{LinkAttributes, Network, NetworkBuilder};
use qsim_output::{CsvWriter, SimOutputObserver};
use qsim_population::{Activity, Leg, NetworkRoute, Plan, Population, TransitPassengerRoute};
use qsim_sim::{NetworkSnapshot, QSimBuilder, SimObserver, SimStats, StepSummary};
use qsim_transit::{TransitLine, TransitRoute, TransitRouteStop, TransitSchedule, TransitStopFacility};

// ── Constants ─────────────────────────────────────────────────────────────────

const SEED:          u64 = 7;
const RIDERS:        u32 = 60;
const DRIVERS:       u32 = 10;
const HEADWAY_SECS:  u32 = 600;
const DEPARTURES:    u32 = 13;
const FIRST_BUS:     SimTime = SimTime::hms(6, 0, 0);
const LINE:          LineId = LineId(0);
const ROUTE:         TransitRouteId = TransitRouteId(0);
const BUS_TYPE:      VehicleTypeId = VehicleTypeId(1);
const FIRST_BUS_ID:  u32 = 1_000;

/// `(stop, link, name)`.
const STOPS: [(StopId, LinkId, &str); 3] = [
    (StopId(0), LinkId(0), "Market Street"),
    (StopId(1), LinkId(2), "Library"),
    (StopId(2), LinkId(4), "Harbour"),
];

fn build_network() -> Result<Network> {
    let mut b = NetworkBuilder::new();
    let nodes: Vec<_> = (0..6).map(|i| b.add_node(Coord::new(i as f64 * 500.0, 0.0))).collect();
    for w in nodes.windows(2) {
        b.add_link(w[0], w[1], LinkAttributes::per_hour(500.0, 13.9, 1_200.0));
    }
    Ok(b.build()?)
}

fn corridor_route() -> NetworkRoute {
    NetworkRoute::new(LinkId(0), vec![LinkId(1), LinkId(2), LinkId(3)], LinkId(4))
}

// ── Transit supply ────────────────────────────────────────────────────────────

fn build_schedule() -> Result<TransitSchedule> {
    let mut schedule = TransitSchedule::new();
    for (stop, link, name) in STOPS {
        schedule.add_facility(TransitStopFacility::new(stop, link, name))?;
    }

    let mut route = TransitRoute::new(ROUTE, corridor_route())
        .with_stop(TransitRouteStop::new(StopId(0), Some(0), Some(0)))
        .with_stop(TransitRouteStop::new(StopId(1), Some(120), Some(150)))
        .with_stop(TransitRouteStop::new(StopId(2), Some(270), Some(270)));
    for d in 0..DEPARTURES {
        route = route.with_departure(
            DepartureId(d),
            FIRST_BUS + d * HEADWAY_SECS,
            VehicleId(FIRST_BUS_ID + d),
        );
    }

    let mut line = TransitLine::new(LINE, "Harbour Express");
    line.add_route(route)?;
    schedule.add_line(line)?;
    Ok(schedule)
}

fn build_vehicles() -> Result<Vehicles> {
    let mut vehicles = Vehicles::new();
    vehicles.add_type(VehicleType::bus(BUS_TYPE))?;
    for d in 0..DEPARTURES {
        vehicles.add_vehicle(VehicleId(FIRST_BUS_ID + d), BUS_TYPE)?;
    }
    Ok(vehicles)
}

// ── Demand ────────────────────────────────────────────────────────────────────

fn build_population(rng: &mut SmallRng) -> Result<Population> {
    let mut pop = Population::new();

    for p in 0..RIDERS {
        let board = rng.gen_range(0..2);
        let alight = rng.gen_range(board + 1..STOPS.len());
        let (access_stop, start_link, _) = STOPS[board];
        let (egress_stop, end_link, _) = STOPS[alight];
        let leave = FIRST_BUS + rng.gen_range(0..(DEPARTURES - 2) * HEADWAY_SECS);

        let ride = TransitPassengerRoute {
            start_link,
            end_link,
            access_stop,
            egress_stop,
            line: LINE,
            route: ROUTE,
        };
        let plan = Plan::new()
            .activity(Activity::new("home", start_link).with_end_time(leave))
            .leg(Leg::transit(ride))
            .activity(Activity::new("work", end_link));
        pop.add_person(PersonId(p), plan)?;
    }

    for i in 0..DRIVERS {
        let leave = FIRST_BUS + rng.gen_range(0..3_600);
        let plan = Plan::new()
            .activity(Activity::new("home", LinkId(0)).with_end_time(leave))
            .leg(Leg::network(LegMode::Car, corridor_route()))
            .activity(Activity::new("work", LinkId(4)));
        pop.add_person(PersonId(RIDERS + i), plan)?;
    }
    Ok(pop)
}

// ── Observer ──────────────────────────────────────────────────────────────────

/// Forwards to the output observer and tracks the busiest step.
struct PeakTracker<O> {
    inner:            O,
    peak_on_network:  usize,
    peak_time:        SimTime,
}

impl<O: SimObserver> SimObserver for PeakTracker<O> {
    fn on_events(&mut self, events: &[qsim_events::Event]) {
        self.inner.on_events(events);
    }

    fn on_step_end(&mut self, now: SimTime, summary: &StepSummary) {
        if summary.vehicles_on_network > self.peak_on_network {
            self.peak_on_network = summary.vehicles_on_network;
            self.peak_time = now;
        }
        self.inner.on_step_end(now, summary);
    }

    fn on_snapshot(&mut self, now: SimTime, snapshot: &NetworkSnapshot) {
        self.inner.on_snapshot(now, snapshot);
    }

    fn on_sim_end(&mut self, stats: &SimStats) {
        self.inner.on_sim_end(stats);
    }
}

// ── main ──────────────────────────────────────────────────────────────────────

fn load_config(path: Option<&PathBuf>) -> Result<SimConfig> {
    match path {
        None => Ok(SimConfig {
            end_time: Some(SimTime::hms(10, 0, 0)),
            ..SimConfig::default()
        }),
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = load_config(args.first().map(PathBuf::from).as_ref())?;
    let out_dir = args.get(1).map_or_else(|| PathBuf::from("output/bus_line"), PathBuf::from);

    let mut rng = SmallRng::seed_from_u64(SEED);
    let network = build_network()?;
    let schedule = build_schedule()?;
    let population = build_population(&mut rng)?;
    info!(
        "{} departures of line {LINE}, {} persons",
        DEPARTURES,
        population.len()
    );

    let mut sim = QSimBuilder::new(config, network)
        .population(population)
        .vehicles(build_vehicles()?)
        .transit_schedule(schedule)
        .build()?;

    std::fs::create_dir_all(&out_dir)?;
    let mut obs = PeakTracker {
        inner:           SimOutputObserver::new(CsvWriter::new(&out_dir)?),
        peak_on_network: 0,
        peak_time:       SimTime::ZERO,
    };
    let stats = sim.run(&mut obs)?;

    if let Some(e) = obs.inner.take_error() {
        eprintln!("output error: {e}");
    }

    println!("Run ended at {} after {} steps", stats.end_time, stats.steps);
    println!("  riders and drivers finished : {}", stats.finished_agents);
    println!("  aborted                     : {}", stats.aborted_agents);
    println!("  departures / arrivals       : {} / {}", stats.departures, stats.arrivals);
    println!(
        "  busiest step                : {} vehicles at {}",
        obs.peak_on_network, obs.peak_time
    );
    println!("Output written to {}", out_dir.display());

    if stats.vehicles_entered != stats.vehicles_left {
        bail!(
            "{} vehicles entered traffic but {} left",
            stats.vehicles_entered,
            stats.vehicles_left
        );
    }
    Ok(())
}
