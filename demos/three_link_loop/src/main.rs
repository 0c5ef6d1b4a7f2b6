//! three_link_loop — shared-vehicle laps and commuters on a triangle.
//!
//! Four persons take turns driving one car around a 3-link loop while a
//! few dozen commuters with their own cars drive to work and back.  The
//! network is split into three partitions so every lap crosses partition
//! boundaries.
//!
//! ```text
//! three_link_loop [config.json] [output_dir]
//! ```
//!
//! `config.json` is an optional `SimConfig` in JSON; fields not named keep
//! their defaults.  Events and step summaries go to `output_dir`
//! (default `output/three_link_loop`).

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use log::info;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use qsim_core::{Coord, LegMode, LinkId, PersonId, SimConfig, SimTime, VehicleId};
use qsim_events::EventCounter;
use qsim_network::{DijkstraRouter, LinkAttributes, Network, NetworkBuilder, Router};
use qsim_output::{CsvWriter, SimOutputObserver};
use qsim_population::{Activity, Leg, NetworkRoute, Plan, Population};
use qsim_sim::QSimBuilder;

// ── Constants ─────────────────────────────────────────────────────────────────

const LAPS:          usize = 4;
const LAP_DRIVERS:   u32   = 4;
const COMMUTERS:     u32   = 40;
const SEED:          u64   = 42;
const LINK_LENGTH_M: f64   = 1_000.0;
const SPEED_MPS:     f64   = 13.9; // 50 km/h
const CAPACITY_VPH:  f64   = 1_800.0;

// ── Network ───────────────────────────────────────────────────────────────────

/// `home ─l0─► mid ─l1─► work ─l2─► home`.
fn build_network() -> Result<Network> {
    let mut b = NetworkBuilder::new();
    let home = b.add_node(Coord::new(0.0, 0.0));
    let mid = b.add_node(Coord::new(0.0, LINK_LENGTH_M));
    let work = b.add_node(Coord::new(LINK_LENGTH_M, LINK_LENGTH_M));
    for (from, to) in [(home, mid), (mid, work), (work, home)] {
        b.add_link(from, to, LinkAttributes::per_hour(LINK_LENGTH_M, SPEED_MPS, CAPACITY_VPH));
    }
    Ok(b.build()?)
}

// ── Population ────────────────────────────────────────────────────────────────

fn route(net: &Network, from: LinkId, to: LinkId) -> Result<NetworkRoute> {
    let r = DijkstraRouter.route_between_links(net, from, to)?;
    Ok(NetworkRoute::new(from, r.links, to))
}

/// Persons `0..LAP_DRIVERS` share vehicle 0; each drives `LAPS` laps with a
/// zero-length stop halfway round.
fn lap_drivers(net: &Network, pop: &mut Population) -> Result<()> {
    let (l0, l2) = (LinkId(0), LinkId(2));
    let out = route(net, l0, l2)?.with_vehicle(VehicleId(0));
    let back = route(net, l2, l0)?.with_vehicle(VehicleId(0));

    for p in 0..LAP_DRIVERS {
        let mut plan = Plan::new().activity(Activity::new("home", l0).with_end_time(SimTime::hms(6, 0, 0)));
        for _ in 0..LAPS {
            plan = plan
                .leg(Leg::network(LegMode::Car, out.clone()))
                .activity(Activity::new("turn", l2).with_duration(0))
                .leg(Leg::network(LegMode::Car, back.clone()))
                .activity(Activity::new("turn", l0).with_duration(0));
        }
        pop.add_person(PersonId(p), plan)?;
    }
    Ok(())
}

/// Commuters leave home between 07:00 and 07:30 and stay at work for eight
/// hours.  Every fourth one walks instead.
fn commuters(net: &Network, pop: &mut Population, rng: &mut SmallRng) -> Result<()> {
    let (home, work) = (LinkId(0), LinkId(2));
    let to_work = route(net, home, work)?;
    let to_home = route(net, work, home)?;

    for i in 0..COMMUTERS {
        let leave = SimTime::hms(7, 0, 0) + rng.gen_range(0..1_800);
        let plan = if i % 4 == 3 {
            Plan::new()
                .activity(Activity::new("home", home).with_end_time(leave))
                .leg(Leg::teleported(LegMode::Walk, home, work, 1_500))
                .activity(Activity::new("work", work).with_duration(8 * 3_600))
                .leg(Leg::teleported(LegMode::Walk, work, home, 1_500))
                .activity(Activity::new("home", home))
        } else {
            Plan::new()
                .activity(Activity::new("home", home).with_end_time(leave))
                .leg(Leg::network(LegMode::Car, to_work.clone()))
                .activity(Activity::new("work", work).with_duration(8 * 3_600))
                .leg(Leg::network(LegMode::Car, to_home.clone()))
                .activity(Activity::new("home", home))
        };
        pop.add_person(PersonId(LAP_DRIVERS + i), plan)?;
    }
    Ok(())
}

// ── Configuration ─────────────────────────────────────────────────────────────

fn load_config(path: Option<&PathBuf>) -> Result<SimConfig> {
    let Some(path) = path else {
        return Ok(SimConfig {
            num_partitions: 3,
            snapshot_interval_steps: 0,
            ..SimConfig::default()
        });
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
}

// ── main ──────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config_path = args.first().map(PathBuf::from);
    let out_dir = args.get(1).map_or_else(|| PathBuf::from("output/three_link_loop"), PathBuf::from);

    let config = load_config(config_path.as_ref())?;
    let network = build_network()?;

    let mut rng = SmallRng::seed_from_u64(SEED);
    let mut population = Population::new();
    lap_drivers(&network, &mut population)?;
    commuters(&network, &mut population, &mut rng)?;
    info!(
        "{} persons on {} nodes / {} links, {} partitions",
        population.len(),
        network.node_count(),
        network.link_count(),
        config.num_partitions
    );

    let mut sim = QSimBuilder::new(config, network).population(population).build()?;

    std::fs::create_dir_all(&out_dir)?;
    let mut obs = SimOutputObserver::new(CsvWriter::new(&out_dir)?);
    let mut counter = EventCounter::new();

    let t0 = Instant::now();
    let stats = sim.run(&mut (&mut counter, &mut obs))?;
    let elapsed = t0.elapsed();

    if let Some(e) = obs.take_error() {
        eprintln!("output error: {e}");
    }

    println!("Simulation complete in {:.3} s", elapsed.as_secs_f64());
    println!("  steps            : {}", stats.steps);
    println!("  end time         : {}", stats.end_time);
    println!("  departures       : {}", stats.departures);
    println!("  arrivals         : {}", stats.arrivals);
    println!("  finished agents  : {}", stats.finished_agents);
    println!("  aborted agents   : {}", stats.aborted_agents);
    println!();
    println!("{:<26} {:>8}", "Event", "Count");
    println!("{}", "-".repeat(35));
    for (kind, n) in counter.counts() {
        println!("{kind:<26} {n:>8}");
    }
    println!();
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
