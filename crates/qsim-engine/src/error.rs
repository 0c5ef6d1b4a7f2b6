use thiserror::Error;

use qsim_core::{LinkId, PersonId, StopId, VehicleId};

/// Fatal engine errors.  Every variant is an invariant violation or a data
/// inconsistency; the run cannot continue after one.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("route mismatch: expected next link {expected:?}, got {got}")]
    RouteMismatch { expected: Option<LinkId>, got: LinkId },

    #[error("vehicle {vehicle} reached stop {got} but its next stop is {expected:?}")]
    UnexpectedStop { vehicle: VehicleId, expected: Option<StopId>, got: StopId },

    #[error("vehicle {vehicle} ended its route with {remaining} stop(s) not served")]
    StopsNotServed { vehicle: VehicleId, remaining: usize },

    #[error("person {person} ended an activity but the next plan element is not a leg")]
    NoNextLeg { person: PersonId },

    #[error("person {person} waits for stop {stop} on link {stop_link} but is on link {link}")]
    AccessStopNotOnLink { person: PersonId, stop: StopId, stop_link: LinkId, link: LinkId },

    #[error("vehicle {vehicle} is not available for person {person} on link {link}")]
    VehicleNotAvailable { person: PersonId, vehicle: VehicleId, link: LinkId },

    #[error("link {link} has no space for vehicle {vehicle}")]
    CapacityExceeded { link: LinkId, vehicle: VehicleId },

    #[error("vehicle {vehicle} finished its route with passengers {passengers:?}")]
    VehicleNotEmpty { vehicle: VehicleId, passengers: Vec<PersonId> },

    #[error("invalid plan for {person}: {reason}")]
    InvalidPlan { person: PersonId, reason: String },

    #[error("vehicle {0} is on the network without a driver")]
    NoDriver(VehicleId),

    #[error("unknown stop facility {0}")]
    UnknownStop(StopId),

    #[error("link {0} is not simulated by this partition")]
    ForeignLink(LinkId),
}

pub type EngineResult<T> = Result<T, EngineError>;
