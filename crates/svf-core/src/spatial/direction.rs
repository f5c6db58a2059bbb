//! Direction type for representing grid orientation.

use nalgebra::SMatrix;
use serde::{Deserialize, Serialize};
use super::Vector;

/// Direction matrix representing grid orientation.
///
/// Column `i` is the direction of the i-th grid axis in physical space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Direction<const D: usize>(pub SMatrix<f64, D, D>);

impl<const D: usize> Direction<D> {
    /// Create an identity direction matrix (no rotation).
    pub fn identity() -> Self {
        Self(SMatrix::identity())
    }

    /// Check if direction matrix is orthogonal (rotation or reflection).
    pub fn is_orthogonal(&self) -> bool {
        let product = self.0 * self.0.transpose();
        (0..D).all(|i| {
            (0..D).all(|j| {
                let expected = if i == j { 1.0 } else { 0.0 };
                (product[(i, j)] - expected).abs() < 1e-6
            })
        })
    }

    /// Try to compute the inverse of the direction matrix.
    pub fn try_inverse(&self) -> Option<Self> {
        self.0.try_inverse().map(Self)
    }

    /// Entry-wise comparison within `tolerance`.
    pub fn is_close(&self, other: &Self, tolerance: f64) -> bool {
        (0..D).all(|i| (0..D).all(|j| (self.0[(i, j)] - other.0[(i, j)]).abs() <= tolerance))
    }

    /// Get the inner nalgebra matrix.
    pub fn inner(&self) -> &SMatrix<f64, D, D> {
        &self.0
    }
}

impl<const D: usize> std::ops::Index<(usize, usize)> for Direction<D> {
    type Output = f64;

    fn index(&self, index: (usize, usize)) -> &Self::Output {
        &self.0[index]
    }
}

impl<const D: usize> std::ops::IndexMut<(usize, usize)> for Direction<D> {
    fn index_mut(&mut self, index: (usize, usize)) -> &mut Self::Output {
        &mut self.0[index]
    }
}

impl<const D: usize> std::ops::Mul<Vector<D>> for Direction<D> {
    type Output = Vector<D>;

    fn mul(self, vector: Vector<D>) -> Self::Output {
        Vector(self.0 * vector.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Direction2 = Direction<2>;

    #[test]
    fn test_direction_identity_is_orthogonal() {
        assert!(Direction2::identity().is_orthogonal());
    }

    #[test]
    fn test_direction_flip() {
        let mut flipped = Direction2::identity();
        flipped[(1, 1)] = -1.0;
        assert!(flipped.is_orthogonal());
        assert!(!flipped.is_close(&Direction2::identity(), 1e-6));

        let v = flipped * Vector::new([1.0, 2.0]);
        assert_eq!(v, Vector::new([1.0, -2.0]));
    }

    #[test]
    fn test_direction_inverse() {
        let mut m = Direction2::identity();
        m[(0, 0)] = 2.0;
        let inv = m.try_inverse().unwrap();
        assert!((inv[(0, 0)] - 0.5).abs() < 1e-12);

        let singular = Direction(SMatrix::<f64, 2, 2>::zeros());
        assert!(singular.try_inverse().is_none());
    }
}
