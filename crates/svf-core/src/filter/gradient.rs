//! Finite-difference gradients.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use crate::error::{GridError, Result};
use crate::field::VectorField;
use crate::image::{Grid, Image};
use crate::spatial::Direction;

/// Central difference of `input` along tensor dimension `dim`, in index units.
///
/// Interior voxels use `(f[i+1] - f[i-1]) / 2`; the first and last voxel use
/// one-sided differences. Axes with a single voxel have zero derivative.
pub fn central_difference<B: Backend, const D: usize>(input: Tensor<B, D>, dim: usize) -> Tensor<B, D> {
    let n = input.dims()[dim];
    if n < 2 {
        return input.zeros_like();
    }

    let first = input.clone().narrow(dim, 1, 1) - input.clone().narrow(dim, 0, 1);
    let last = input.clone().narrow(dim, n - 1, 1) - input.clone().narrow(dim, n - 2, 1);
    if n == 2 {
        return Tensor::cat(vec![first, last], dim);
    }

    let interior = (input.clone().narrow(dim, 2, n - 2) - input.narrow(dim, 0, n - 2)).div_scalar(2.0);
    Tensor::cat(vec![first, interior, last], dim)
}

/// Derivative of `input` along grid axis `axis` (x = 0), per unit of length.
///
/// This is the index-frame derivative divided by the spacing; it equals the
/// physical derivative only when the direction matrix is the identity.
pub fn axis_derivative<B: Backend, const D: usize>(input: Tensor<B, D>, axis: usize, spacing: f64) -> Tensor<B, D> {
    central_difference(input, D - 1 - axis).div_scalar(spacing)
}

/// Partial derivatives `∂f/∂p_k` of a sampled function along the physical axes.
///
/// With `idx = S⁻¹·Dir⁻¹·(p − origin)` the chain rule gives
/// `∂f/∂p_k = Σ_j (∂f/∂idx_j / s_j)·(Dir⁻¹)_jk`.
pub fn physical_derivatives<B: Backend, const D: usize>(input: Tensor<B, D>, grid: &Grid<D>) -> Result<Vec<Tensor<B, D>>> {
    let spacing = grid.spacing();
    let along_axes: Vec<Tensor<B, D>> = (0..D)
        .map(|j| axis_derivative(input.clone(), j, spacing[j]))
        .collect();

    if grid.direction().is_close(&Direction::identity(), 1e-12) {
        return Ok(along_axes);
    }

    let inverse = grid.direction().try_inverse().ok_or(GridError::SingularDirection)?;
    Ok((0..D)
        .map(|k| {
            let mut acc = along_axes[0].clone().mul_scalar(inverse[(0, k)]);
            for j in 1..D {
                acc = acc + along_axes[j].clone().mul_scalar(inverse[(j, k)]);
            }
            acc
        })
        .collect())
}

/// Gradient of a scalar image.
///
/// Produces a vector field whose component `i` is `∂I/∂x_i` along physical
/// axis `i`, so it lives in the same frame as displacement vectors.
#[derive(Debug, Clone, Copy, Default)]
pub struct GradientFilter;

impl GradientFilter {
    pub fn new() -> Self {
        Self
    }

    /// Compute the gradient of `image` on its own grid.
    pub fn apply<B: Backend, const D: usize>(&self, image: &Image<B, D>) -> Result<VectorField<B, D>> {
        let components = physical_derivatives(image.data().clone(), image.grid())?;
        VectorField::from_components(image.grid().clone(), components)
    }
}
