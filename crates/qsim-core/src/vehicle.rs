//! Vehicle types and the vehicle registry.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::{CoreError, CoreResult, VehicleId, VehicleTypeId};

// ── VehicleType ───────────────────────────────────────────────────────────────

/// Physical and boarding characteristics shared by all vehicles of a type.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VehicleType {
    pub id: VehicleTypeId,
    /// Passenger-car equivalents occupied on a link (storage and flow).
    pub pce: f64,
    /// Passenger seats.  The driver does not take one.
    pub seats: u32,
    pub standing_room: u32,
    /// Maximum speed in m/s; the link's free speed applies when lower.
    pub max_velocity: f64,
    /// Seconds each boarding passenger adds to the dwell.
    pub access_secs_per_person: f64,
    /// Seconds each alighting passenger adds to the dwell.
    pub egress_secs_per_person: f64,
    /// Fixed dwell added whenever the doors open at a stop.
    pub door_operation_secs: f64,
}

impl VehicleType {
    /// A private car: 1 PCE, 4 seats, no speed limit of its own.
    pub fn car(id: VehicleTypeId) -> Self {
        Self {
            id,
            pce: 1.0,
            seats: 4,
            standing_room: 0,
            max_velocity: f64::INFINITY,
            access_secs_per_person: 0.0,
            egress_secs_per_person: 0.0,
            door_operation_secs: 0.0,
        }
    }

    /// A standard bus: 2.5 PCE, 40 seats plus 30 standing.
    pub fn bus(id: VehicleTypeId) -> Self {
        Self {
            id,
            pce: 2.5,
            seats: 40,
            standing_room: 30,
            max_velocity: f64::INFINITY,
            access_secs_per_person: 2.0,
            egress_secs_per_person: 1.5,
            door_operation_secs: 2.0,
        }
    }

    /// Total passenger capacity (seats plus standing room).
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.seats + self.standing_room
    }
}

// ── Vehicles ──────────────────────────────────────────────────────────────────

/// Registry of vehicle types and of the vehicles that use them.
///
/// Persons without an explicitly registered vehicle get one of
/// [`Vehicles::DEFAULT_TYPE`] when the simulation is built.
#[derive(Clone, Debug)]
pub struct Vehicles {
    types:    BTreeMap<VehicleTypeId, Arc<VehicleType>>,
    vehicles: BTreeMap<VehicleId, VehicleTypeId>,
}

impl Vehicles {
    /// The car type registered by [`Vehicles::new`].
    pub const DEFAULT_TYPE: VehicleTypeId = VehicleTypeId(0);

    /// A registry containing only the default car type.
    pub fn new() -> Self {
        let mut types = BTreeMap::new();
        types.insert(Self::DEFAULT_TYPE, Arc::new(VehicleType::car(Self::DEFAULT_TYPE)));
        Self { types, vehicles: BTreeMap::new() }
    }

    /// Register (or replace) a vehicle type.
    ///
    /// PCE and maximum velocity must be positive; NaN is rejected.
    pub fn add_type(&mut self, vehicle_type: VehicleType) -> CoreResult<()> {
        let id = vehicle_type.id;
        if !(vehicle_type.pce > 0.0) {
            return Err(CoreError::InvalidVehicleType {
                id,
                reason: format!("pce {} is not positive", vehicle_type.pce),
            });
        }
        if !(vehicle_type.max_velocity > 0.0) {
            return Err(CoreError::InvalidVehicleType {
                id,
                reason: format!("max velocity {} is not positive", vehicle_type.max_velocity),
            });
        }
        self.types.insert(id, Arc::new(vehicle_type));
        Ok(())
    }

    /// Register a vehicle of an already registered type.
    pub fn add_vehicle(&mut self, id: VehicleId, type_id: VehicleTypeId) -> CoreResult<()> {
        if !self.types.contains_key(&type_id) {
            return Err(CoreError::UnknownVehicleType(type_id));
        }
        if self.vehicles.insert(id, type_id).is_some() {
            return Err(CoreError::DuplicateVehicle(id));
        }
        Ok(())
    }

    pub fn contains(&self, id: VehicleId) -> bool {
        self.vehicles.contains_key(&id)
    }

    /// Type of a registered vehicle.
    pub fn type_of(&self, id: VehicleId) -> Option<&Arc<VehicleType>> {
        self.vehicles.get(&id).and_then(|t| self.types.get(t))
    }

    pub fn get_type(&self, id: VehicleTypeId) -> Option<&Arc<VehicleType>> {
        self.types.get(&id)
    }

    /// Largest PCE among all registered types.  Every link must be able to
    /// store at least one vehicle of this size.
    pub fn max_pce(&self) -> f64 {
        self.types.values().map(|t| t.pce).fold(0.0, f64::max)
    }

    pub fn vehicle_count(&self) -> usize {
        self.vehicles.len()
    }
}

impl Default for Vehicles {
    fn default() -> Self {
        Self::new()
    }
}
