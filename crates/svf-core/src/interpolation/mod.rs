//! Interpolation of tensor data at continuous indices.
//!
//! Indices are `[N, D]` tensors in `(x, y[, z])` order; samples outside the
//! data are clamped to the border. Warping code that needs a padding value
//! masks out-of-range samples itself.

pub mod trait_;
pub mod linear;
pub mod nearest;

pub use trait_::Interpolator;
pub use linear::LinearInterpolator;
pub use nearest::NearestNeighborInterpolator;

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};

/// Row-major strides of a tensor shape, indexed by tensor dimension.
pub(crate) fn strides<const D: usize>(dims: &[usize; D]) -> [usize; D] {
    let mut strides = [1usize; D];
    for dim in (0..D.saturating_sub(1)).rev() {
        strides[dim] = strides[dim + 1] * dims[dim + 1];
    }
    strides
}

/// Column `axis` of an `[N, D]` index tensor.
pub(crate) fn index_column<B: Backend>(indices: &Tensor<B, 2>, axis: usize) -> Tensor<B, 1> {
    indices.clone().narrow(1, axis, 1).squeeze::<1>(1)
}

/// Clamp a coordinate column to `[0, len - 1]` and convert it to integers.
pub(crate) fn clamp_to_int<B: Backend>(coord: Tensor<B, 1>, len: usize) -> Tensor<B, 1, Int> {
    coord.clamp(0.0, (len.max(1) - 1) as f64).int()
}
