//! Core types for stationary velocity field registration.
//!
//! Provides grid geometry, scalar images, dense vector fields with their Lie
//! algebra, interpolators and the filters (gradient, Gaussian smoothing,
//! warping) the registration crate is built on.

pub mod error;
pub mod image;
pub mod spatial;
pub mod field;
pub mod interpolation;
pub mod filter;

pub use error::{GridError, Result};
pub use image::{Grid, Image};
pub use field::{lie_bracket, VectorField};
pub use spatial::{Point, Vector, Spacing, Direction};
