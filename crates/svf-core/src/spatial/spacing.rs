//! Spacing type for representing physical distances between voxels.

use super::Vector;

/// Physical distance between adjacent voxels along each axis.
///
/// Alias of [`Vector`] for semantic clarity; component `i` is the spacing
/// along physical axis `i` (x first).
pub type Spacing<const D: usize> = Vector<D>;

impl<const D: usize> Spacing<D> {
    /// Create uniform spacing (same value for all dimensions).
    pub fn uniform(value: f64) -> Self {
        Self::new([value; D])
    }

    /// Get the minimum spacing value.
    pub fn min_spacing(&self) -> f64 {
        (0..D).map(|i| self[i]).fold(f64::INFINITY, f64::min)
    }

    /// Mean of the squared spacings, the demons normaliser's unit.
    pub fn mean_squared(&self) -> f64 {
        (0..D).map(|i| self[i] * self[i]).sum::<f64>() / D as f64
    }
}
