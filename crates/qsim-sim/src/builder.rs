//! Fluent builder for constructing a [`QSim`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use qsim_core::{LinkId, PartitionId, PersonId, SimConfig, VehicleId, Vehicles};
use qsim_engine::{default_vehicle_of, MovableOnNetwork, PersonAgent, QVehicle, TransitDriverAgent};
use qsim_events::{EventHandler, EventsManager};
use qsim_network::{Network, Partitioning};
use qsim_population::{Plan, PlanElement, Population, Route};
use qsim_transit::TransitSchedule;

use crate::mailbox::Mailboxes;
use crate::partition::{Partition, Shared};
use crate::{QSim, SimError, SimResult, SimStats};

const EPSILON: f64 = 1e-9;

/// Fluent builder for [`QSim`].
///
/// # Required inputs
///
/// - [`SimConfig`]: time window, step size, partitions, capacities
/// - [`Network`]: from [`qsim_network::NetworkBuilder`] or the CSV loader
///
/// # Optional inputs (have defaults)
///
/// | Method                    | Default                                      |
/// |---------------------------|----------------------------------------------|
/// | `.population(p)`          | empty                                        |
/// | `.vehicles(v)`            | `Vehicles::new()` (default car type only)    |
/// | `.transit_schedule(s)`    | empty                                        |
/// | `.partitioning(p)`        | `Partitioning::contiguous(num_partitions)`   |
/// | `.add_event_handler(h)`   | none                                         |
///
/// Persons get their vehicle (the route's, else `VehicleId(person id)`)
/// parked on the start link of their first network leg.  Vehicles not
/// registered in `Vehicles` are of [`Vehicles::DEFAULT_TYPE`].
///
/// # Example
///
/// ```rust,ignore
/// let mut sim = QSimBuilder::new(config, network)
///     .population(population)
///     .transit_schedule(schedule)
///     .vehicles(vehicles)
///     .build()?;
/// let stats = sim.run(&mut NoopObserver)?;
/// ```
pub struct QSimBuilder {
    config:       SimConfig,
    network:      Network,
    population:   Population,
    vehicles:     Vehicles,
    schedule:     TransitSchedule,
    partitioning: Option<Partitioning>,
    handlers:     Vec<Box<dyn EventHandler>>,
}

impl QSimBuilder {
    pub fn new(config: SimConfig, network: Network) -> Self {
        Self {
            config,
            network,
            population:   Population::new(),
            vehicles:     Vehicles::new(),
            schedule:     TransitSchedule::new(),
            partitioning: None,
            handlers:     Vec::new(),
        }
    }

    pub fn population(mut self, population: Population) -> Self {
        self.population = population;
        self
    }

    pub fn vehicles(mut self, vehicles: Vehicles) -> Self {
        self.vehicles = vehicles;
        self
    }

    pub fn transit_schedule(mut self, schedule: TransitSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Use an explicit node-to-partition assignment instead of the
    /// contiguous split.  Its partition count overrides
    /// `config.num_partitions`.
    pub fn partitioning(mut self, partitioning: Partitioning) -> Self {
        self.partitioning = Some(partitioning);
        self
    }

    /// Register a listener for the merged event stream.
    pub fn add_event_handler(mut self, handler: Box<dyn EventHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Validate inputs, place agents, vehicles and transit drivers in their
    /// partitions, and return a ready-to-run [`QSim`].
    pub fn build(self) -> SimResult<QSim> {
        let config = self.config;
        config.validate().map_err(|e| SimError::Config(e.to_string()))?;
        let network = self.network;

        // ── Partitioning ──────────────────────────────────────────────────
        let partitioning = match self.partitioning {
            Some(p) => {
                if p.node_count() != network.node_count() {
                    return Err(SimError::Config(format!(
                        "partitioning covers {} nodes, network has {}",
                        p.node_count(),
                        network.node_count()
                    )));
                }
                p
            }
            None => Partitioning::contiguous(&network, config.num_partitions)
                .map_err(|e| SimError::Config(e.to_string()))?,
        };

        // ── Links must hold the largest vehicle ───────────────────────────
        let max_pce = self.vehicles.max_pce();
        for link in &network.links {
            let storage = link.storage_capacity * config.storage_capacity_factor;
            if storage + EPSILON < max_pce {
                return Err(SimError::Config(format!(
                    "link {} stores {storage:.2} PCE, less than the largest vehicle ({max_pce})",
                    link.id
                )));
            }
        }

        // ── Transit ───────────────────────────────────────────────────────
        self.schedule.validate(&network).map_err(|e| SimError::Config(e.to_string()))?;
        let departures = self.schedule.departures();
        let mut transit_vehicles = BTreeSet::new();
        for d in &departures {
            let vehicle = d.departure.vehicle;
            if !self.vehicles.contains(vehicle) {
                return Err(SimError::Config(format!(
                    "transit vehicle {vehicle} of line {} is not registered",
                    d.line
                )));
            }
            transit_vehicles.insert(vehicle);
        }

        // ── Persons: plans, vehicles ──────────────────────────────────────
        let mut person_vehicles: BTreeMap<VehicleId, LinkId> = BTreeMap::new();
        for person in self.population.iter() {
            check_plan(&network, &self.schedule, person.id, &person.plan)?;
            for leg in person.plan.legs() {
                let Route::Network(route) = &leg.route else { continue };
                if !config.is_network_mode(leg.mode) || route.is_trivial() {
                    continue;
                }
                let vehicle = route.vehicle.unwrap_or_else(|| default_vehicle_of(person.id));
                if transit_vehicles.contains(&vehicle) {
                    return Err(SimError::Config(format!(
                        "vehicle {vehicle} is used by person {} and by a transit departure",
                        person.id
                    )));
                }
                person_vehicles.entry(vehicle).or_insert(route.start_link);
            }
        }

        let shared = Shared {
            network,
            partitioning,
            config,
            schedule: self.schedule,
            vehicles: self.vehicles,
        };
        let n = shared.partitioning.count();
        let mut partitions: Vec<Partition> =
            (0..n).map(|i| Partition::new(PartitionId(i as u32), &shared)).collect();
        let owner = |link| shared.partitioning.owner_of_link(&shared.network, link).index();

        let default_type = shared
            .vehicles
            .get_type(Vehicles::DEFAULT_TYPE)
            .cloned()
            .ok_or_else(|| SimError::Config("the default vehicle type is not registered".into()))?;
        for (vehicle, link) in person_vehicles {
            let vehicle_type = shared
                .vehicles
                .type_of(vehicle)
                .cloned()
                .unwrap_or_else(|| Arc::clone(&default_type));
            partitions[owner(link)].park_vehicle(link, QVehicle::new(vehicle, vehicle_type));
        }

        for person in self.population.iter() {
            let agent = PersonAgent::new(person.id, Arc::clone(&person.plan), shared.config.start_time)?;
            let link = agent.current_link();
            partitions[owner(link)].insert_agent(agent);
        }

        // Drivers get ids above the population.
        let mut next_driver = self.population.max_person_id().map_or(0, |p| p.0 + 1);
        for d in departures {
            let driver = TransitDriverAgent::new(PersonId(next_driver), d.line, d.route, d.departure);
            next_driver += 1;
            partitions[owner(driver.start_link())].schedule_transit(d.departure.time, driver);
        }

        let mut events = EventsManager::new();
        for h in self.handlers {
            events.add_handler(h);
        }

        #[cfg(feature = "parallel")]
        let pool = {
            let mut b = rayon::ThreadPoolBuilder::new();
            if let Some(threads) = shared.config.num_threads {
                b = b.num_threads(threads);
            }
            b.build().map_err(|e| SimError::Config(e.to_string()))?
        };

        Ok(QSim {
            clock: shared.config.make_clock(),
            mailboxes: Mailboxes::new(n),
            shared,
            partitions,
            events,
            stats: SimStats::default(),
            last_step: None,
            done: false,
            #[cfg(feature = "parallel")]
            pool,
        })
    }
}

/// Links exist, transit legs reference known stops and routes, and egress
/// stops lie on the leg's end link.
fn check_plan(network: &Network, schedule: &TransitSchedule, person: PersonId, plan: &Plan) -> SimResult<()> {
    let unknown = |link| SimError::Config(format!("plan of {person} uses unknown link {link}"));
    for element in &plan.elements {
        match element {
            PlanElement::Activity(a) => {
                if !network.contains_link(a.link) {
                    return Err(unknown(a.link));
                }
            }
            PlanElement::Leg(leg) => match &leg.route {
                Route::Network(r) => {
                    if let Some(link) = r.all_links().find(|l| !network.contains_link(*l)) {
                        return Err(unknown(link));
                    }
                }
                Route::Generic { start_link, end_link } => {
                    for link in [*start_link, *end_link] {
                        if !network.contains_link(link) {
                            return Err(unknown(link));
                        }
                    }
                }
                Route::TransitPassenger(r) => {
                    if schedule.route(r.line, r.route).is_none() {
                        return Err(SimError::Config(format!(
                            "plan of {person} uses unknown transit route {} of line {}",
                            r.route, r.line
                        )));
                    }
                    if schedule.facility(r.access_stop).is_none() {
                        return Err(SimError::Config(format!(
                            "plan of {person} uses unknown stop {}",
                            r.access_stop
                        )));
                    }
                    match schedule.facility(r.egress_stop) {
                        Some(f) if f.link == r.end_link => {}
                        Some(f) => {
                            return Err(SimError::Config(format!(
                                "plan of {person}: egress stop {} is on link {}, leg ends on {}",
                                r.egress_stop, f.link, r.end_link
                            )));
                        }
                        None => {
                            return Err(SimError::Config(format!(
                                "plan of {person} uses unknown stop {}",
                                r.egress_stop
                            )));
                        }
                    }
                }
            },
        }
    }
    Ok(())
}
