//! Core error type.
//!
//! Sub-crates define their own error enums and wrap `CoreError` as one
//! variant where they need to surface configuration or parse failures.

use thiserror::Error;

use crate::{VehicleId, VehicleTypeId};

/// Errors produced by `qsim-core`.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("vehicle type {0} is not registered")]
    UnknownVehicleType(VehicleTypeId),

    #[error("vehicle type {id}: {reason}")]
    InvalidVehicleType { id: VehicleTypeId, reason: String },

    #[error("vehicle {0} is registered twice")]
    DuplicateVehicle(VehicleId),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shorthand result type for `qsim-core`.
pub type CoreResult<T> = Result<T, CoreError>;
