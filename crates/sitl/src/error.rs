use ardu_configurator_core::parameters::ValidationError;

/// Errors from configuring the simulated flight controller.
#[derive(Debug, thiserror::Error)]
pub enum SimulatorError {
    #[error(transparent)]
    InvalidParameter(#[from] ValidationError),

    #[error("Parameter not found: {0}")]
    ParameterNotFound(String),

    #[error("Invalid file path: {0}")]
    InvalidPath(String),

    #[error("Loss probability must be within 0..=1, got {0}")]
    InvalidLossProbability(f64),
}
