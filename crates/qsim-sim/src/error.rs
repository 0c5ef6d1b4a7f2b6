use qsim_core::CoreError;
use qsim_engine::EngineError;
use qsim_network::NetworkError;
use qsim_population::PopulationError;
use qsim_transit::TransitError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("simulation configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Population(#[from] PopulationError),

    #[error(transparent)]
    Transit(#[from] TransitError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// Another partition failed during the same step.
    #[error("step cancelled")]
    Cancelled,
}

pub type SimResult<T> = Result<T, SimError>;
