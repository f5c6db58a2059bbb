//! Image and field filters.

pub mod gaussian;
pub mod gradient;
pub mod warp;

pub use gaussian::GaussianFilter;
pub use gradient::{central_difference, GradientFilter};
pub use warp::{compose, FieldWarper, WarpImageFilter};
