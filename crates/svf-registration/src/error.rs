//! Error types for registration operations.

use svf_core::GridError;
use thiserror::Error;

/// Main error type for registration operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistrationError {
    /// A required image or field was not supplied.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operands are defined on different grids or have the wrong layout.
    #[error("Grid mismatch: {0}")]
    GridMismatch(#[from] GridError),

    /// The BCH operator was asked for a truncation it does not implement.
    #[error("Unsupported BCH approximation order: {terms} terms")]
    UnsupportedApproximationOrder { terms: usize },

    /// A field became non-finite.
    #[error("Numeric degeneracy: {0}")]
    NumericDegenerate(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Result type for registration operations.
pub type Result<T> = std::result::Result<T, RegistrationError>;

impl RegistrationError {
    /// Create an invalid input error.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a numeric degeneracy error.
    pub fn numeric_degenerate(msg: impl Into<String>) -> Self {
        Self::NumericDegenerate(msg.into())
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }
}
