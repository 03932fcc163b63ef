//! Error types for sampler configuration and chain drivers.

use thiserror::Error;

/// Raised by `build()` when a builder is missing a required parameter or holds an invalid one,
/// and by `try_init` when a position does not fit the configured sampler.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("step_size is required")]
    MissingStepSize,
    #[error("num_integration_steps is required")]
    MissingNumIntegrationSteps,
    #[error("inverse_mass_matrix is required")]
    MissingInverseMassMatrix,
    #[error("invalid step_size {0}")]
    InvalidStepSize(f64),
    #[error("num_integration_steps must be positive")]
    InvalidNumIntegrationSteps,
    #[error("invalid inverse_mass_matrix: {0}")]
    InvalidInverseMassMatrix(String),
    #[error("invalid divergence_threshold {0}")]
    InvalidDivergenceThreshold(f64),
    #[error("position has length {found}, inverse_mass_matrix has length {expected}")]
    DimensionMismatch { expected: usize, found: usize },
}

/// Errors surfaced while driving a chain and collecting its draws.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("could not read tensor data: {0}")]
    TensorData(String),
    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),
    #[error(transparent)]
    ProgressTemplate(#[from] indicatif::style::TemplateError),
}
