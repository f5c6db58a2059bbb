//! Grid geometry and scalar images.

pub mod image;
pub mod grid;

pub use image::Image;
pub use grid::{Grid, unravel_index, GEOMETRY_TOLERANCE};
