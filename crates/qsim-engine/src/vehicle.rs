//! Vehicles and the entities they carry.

use std::sync::Arc;

use qsim_core::{LegMode, LinkId, PersonId, VehicleId, VehicleType};

use crate::{EngineResult, MovableOnNetwork, PersonAgent, TransitDriverAgent};

/// Capability of holding passengers.
pub trait CarriesPassengers {
    fn passengers(&self) -> &[PersonAgent];

    /// Add `agent`; returns it back if the vehicle is full.
    fn add_passenger(&mut self, agent: PersonAgent) -> Result<(), PersonAgent>;

    /// Remove and return every passenger matching `pred`, keeping order.
    fn take_passengers_where(&mut self, pred: &mut dyn FnMut(&PersonAgent) -> bool) -> Vec<PersonAgent>;

    /// Maximum number of passengers (the driver is not counted).
    fn passenger_capacity(&self) -> u32;

    fn free_seats(&self) -> u32 {
        self.passenger_capacity().saturating_sub(self.passengers().len() as u32)
    }
}

/// Passenger compartment of a vehicle.
#[derive(Clone, Debug, Default)]
pub struct Cabin {
    passengers: Vec<PersonAgent>,
    capacity:   u32,
}

impl Cabin {
    pub fn new(capacity: u32) -> Self {
        Self { passengers: Vec::new(), capacity }
    }

    pub fn is_empty(&self) -> bool {
        self.passengers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.passengers.len()
    }

    pub fn passenger_ids(&self) -> Vec<PersonId> {
        self.passengers.iter().map(PersonAgent::id).collect()
    }

    /// Remove everyone (aborts and end of run).
    pub fn drain(&mut self) -> Vec<PersonAgent> {
        std::mem::take(&mut self.passengers)
    }
}

impl CarriesPassengers for Cabin {
    fn passengers(&self) -> &[PersonAgent] {
        &self.passengers
    }

    fn add_passenger(&mut self, agent: PersonAgent) -> Result<(), PersonAgent> {
        if self.passengers.len() as u32 >= self.capacity {
            return Err(agent);
        }
        self.passengers.push(agent);
        Ok(())
    }

    fn take_passengers_where(&mut self, pred: &mut dyn FnMut(&PersonAgent) -> bool) -> Vec<PersonAgent> {
        let (taken, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.passengers)
            .into_iter()
            .partition(|p| pred(p));
        self.passengers = kept;
        taken
    }

    fn passenger_capacity(&self) -> u32 {
        self.capacity
    }
}

// ── Driver ────────────────────────────────────────────────────────────────────

/// The entity steering a vehicle.
#[derive(Clone, Debug)]
pub enum Driver {
    Person(Box<PersonAgent>),
    Transit(Box<TransitDriverAgent>),
}

impl Driver {
    pub fn id(&self) -> PersonId {
        match self {
            Driver::Person(p) => p.id(),
            Driver::Transit(t) => t.id(),
        }
    }

    /// Mode reported in traffic events.
    pub fn mode(&self) -> LegMode {
        match self {
            Driver::Person(p) => p.current_leg().map_or(LegMode::Car, |l| l.mode),
            Driver::Transit(_) => LegMode::Pt,
        }
    }
}

impl MovableOnNetwork for Driver {
    fn current_link(&self) -> LinkId {
        match self {
            Driver::Person(p) => p.current_link(),
            Driver::Transit(t) => t.current_link(),
        }
    }

    fn choose_next_link(&self) -> Option<LinkId> {
        match self {
            Driver::Person(p) => p.choose_next_link(),
            Driver::Transit(t) => t.choose_next_link(),
        }
    }

    fn notify_move_over_node(&mut self, link: LinkId) -> EngineResult<()> {
        match self {
            Driver::Person(p) => p.notify_move_over_node(link),
            Driver::Transit(t) => t.notify_move_over_node(link),
        }
    }

    fn check_route_end(&self) -> EngineResult<()> {
        match self {
            Driver::Person(p) => p.check_route_end(),
            Driver::Transit(t) => t.check_route_end(),
        }
    }
}

// ── QVehicle ──────────────────────────────────────────────────────────────────

/// A vehicle in the queue simulation.
///
/// While on the network a vehicle has exactly one driver.  Parked vehicles
/// have none.
#[derive(Clone, Debug)]
pub struct QVehicle {
    pub id:           VehicleId,
    pub vehicle_type: Arc<VehicleType>,
    pub driver:       Option<Driver>,
    pub cabin:        Cabin,
    /// Set between `VehicleEntersTraffic` and `VehicleLeavesTraffic`.
    pub in_traffic:   bool,
}

impl QVehicle {
    pub fn new(id: VehicleId, vehicle_type: Arc<VehicleType>) -> Self {
        let cabin = Cabin::new(vehicle_type.capacity());
        Self { id, vehicle_type, driver: None, cabin, in_traffic: false }
    }

    #[inline]
    pub fn pce(&self) -> f64 {
        self.vehicle_type.pce
    }

    #[inline]
    pub fn max_velocity(&self) -> f64 {
        self.vehicle_type.max_velocity
    }

    pub fn driver(&self) -> Option<&Driver> {
        self.driver.as_ref()
    }

    pub fn driver_mut(&mut self) -> Option<&mut Driver> {
        self.driver.as_mut()
    }

    pub fn set_driver(&mut self, driver: Driver) {
        self.driver = Some(driver);
    }

    pub fn take_driver(&mut self) -> Option<Driver> {
        self.driver.take()
    }
}

impl CarriesPassengers for QVehicle {
    fn passengers(&self) -> &[PersonAgent] {
        self.cabin.passengers()
    }

    fn add_passenger(&mut self, agent: PersonAgent) -> Result<(), PersonAgent> {
        self.cabin.add_passenger(agent)
    }

    fn take_passengers_where(&mut self, pred: &mut dyn FnMut(&PersonAgent) -> bool) -> Vec<PersonAgent> {
        self.cabin.take_passengers_where(pred)
    }

    fn passenger_capacity(&self) -> u32 {
        self.cabin.passenger_capacity()
    }
}
