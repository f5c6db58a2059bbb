//! Error types for grid and field operations.

use thiserror::Error;

/// Errors raised when fields or images cannot be combined.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GridError {
    /// Two operands live on different grids.
    #[error("Grid mismatch: {attribute} differs (expected {expected}, got {actual})")]
    Mismatch {
        attribute: &'static str,
        expected: String,
        actual: String,
    },

    /// A vector field was built with the wrong number of components.
    #[error("Component count mismatch: expected {expected}, got {actual}")]
    ComponentCount { expected: usize, actual: usize },

    /// The direction matrix cannot be inverted.
    #[error("Direction matrix is singular")]
    SingularDirection,

    /// Only 2-D and 3-D grids are supported.
    #[error("Unsupported dimensionality: {0}")]
    UnsupportedDimension(usize),

    /// An N-ary operation received no operands.
    #[error("Operation requires at least one field")]
    EmptyInput,

    /// Tensor contents could not be read back from the backend.
    #[error("Tensor data error: {0}")]
    TensorData(String),
}

impl GridError {
    /// Create a mismatch error for the named grid attribute.
    pub fn mismatch(
        attribute: &'static str,
        expected: impl std::fmt::Debug,
        actual: impl std::fmt::Debug,
    ) -> Self {
        Self::Mismatch {
            attribute,
            expected: format!("{:?}", expected),
            actual: format!("{:?}", actual),
        }
    }
}

/// Result type for grid and field operations.
pub type Result<T> = std::result::Result<T, GridError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mismatch_display() {
        let err = GridError::mismatch("size", [10, 10], [5, 5]);
        let msg = err.to_string();
        assert!(msg.contains("size"));
        assert!(msg.contains("[10, 10]"));
        assert!(msg.contains("[5, 5]"));
    }

    #[test]
    fn test_component_count_display() {
        let err = GridError::ComponentCount { expected: 3, actual: 2 };
        assert_eq!(err.to_string(), "Component count mismatch: expected 3, got 2");
    }
}
