use thiserror::Error;

use qsim_core::{CoreError, PersonId};

#[derive(Debug, Error)]
pub enum PopulationError {
    #[error("plan parse error: {0}")]
    Parse(String),

    #[error("invalid plan for {person}: {reason}")]
    InvalidPlan { person: PersonId, reason: String },

    #[error("duplicate person {0}")]
    DuplicatePerson(PersonId),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type PopulationResult<T> = Result<T, PopulationError>;
