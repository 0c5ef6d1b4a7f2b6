use thiserror::Error;

use qsim_core::{DepartureId, LineId, LinkId, StopId, TransitRouteId, VehicleId};

#[derive(Debug, Error)]
pub enum TransitError {
    #[error("duplicate stop facility {0}")]
    DuplicateStop(StopId),

    #[error("duplicate transit line {0}")]
    DuplicateLine(LineId),

    #[error("line {line} has two routes with id {route}")]
    DuplicateRoute { line: LineId, route: TransitRouteId },

    #[error("stop facility {stop} is on unknown link {link}")]
    StopOnUnknownLink { stop: StopId, link: LinkId },

    #[error("line {line} route {route} references unknown stop {stop}")]
    UnknownStop { line: LineId, route: TransitRouteId, stop: StopId },

    #[error("line {line} route {route} references unknown link {link}")]
    UnknownLink { line: LineId, route: TransitRouteId, link: LinkId },

    #[error("line {line} route {route}: links {from} and {to} are not connected")]
    Disconnected { line: LineId, route: TransitRouteId, from: LinkId, to: LinkId },

    #[error("line {line} route {route}: stop {stop} is not on the route after the previous stop")]
    StopNotOnRoute { line: LineId, route: TransitRouteId, stop: StopId },

    #[error("line {line} route {route} has no stops")]
    NoStops { line: LineId, route: TransitRouteId },

    #[error("vehicle {vehicle} is used by departures {first} and {second}")]
    VehicleReused { vehicle: VehicleId, first: DepartureId, second: DepartureId },
}

pub type TransitResult<T> = Result<T, TransitError>;
