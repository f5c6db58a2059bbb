//! Dense vector fields on a grid.
//!
//! A [`VectorField`] serves both as a stationary velocity field (an element
//! of the Lie algebra) and as a displacement field (its exponential). The two
//! roles differ only in how the field is used.

pub mod vector_field;
pub mod lie_bracket;

pub use vector_field::VectorField;
pub use lie_bracket::lie_bracket;
