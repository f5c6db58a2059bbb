//! Linear interpolation (bilinear in 2-D, trilinear in 3-D).

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};
use serde::{Deserialize, Serialize};
use super::trait_::Interpolator;
use super::{clamp_to_int, index_column, strides};

/// Linear Interpolator.
///
/// Visits the `2^D` corners of the cell containing each sample and blends
/// them with the fractional offsets. Samples outside the data clamp to the
/// border.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LinearInterpolator;

impl LinearInterpolator {
    /// Create a new linear interpolator.
    pub fn new() -> Self {
        Self
    }
}

impl<B: Backend> Interpolator<B> for LinearInterpolator {
    fn interpolate<const D: usize>(&self, data: &Tensor<B, D>, indices: Tensor<B, 2>) -> Tensor<B, 1> {
        let dims = data.dims();
        let strides = strides(&dims);
        let batch_size = indices.dims()[0];
        let device = indices.device();

        let flat_data = data.clone().reshape([dims.iter().product::<usize>()]);

        // Per axis (x first): lower/upper integer index and the upper weight.
        let mut lower: Vec<Tensor<B, 1, Int>> = Vec::with_capacity(D);
        let mut upper: Vec<Tensor<B, 1, Int>> = Vec::with_capacity(D);
        let mut weights: Vec<Tensor<B, 1>> = Vec::with_capacity(D);
        for axis in 0..D {
            let len = dims[D - 1 - axis];
            let coord = index_column(&indices, axis);
            let c0 = coord.clone().floor();
            weights.push(coord - c0.clone());
            upper.push(clamp_to_int(c0.clone() + 1.0, len));
            lower.push(clamp_to_int(c0, len));
        }

        let mut result = Tensor::<B, 1>::zeros([batch_size], &device);
        for corner in 0..(1usize << D) {
            let mut flat_index = Tensor::<B, 1, Int>::zeros([batch_size], &device);
            let mut weight = Tensor::<B, 1>::ones([batch_size], &device);
            for axis in 0..D {
                let stride = strides[D - 1 - axis] as i32;
                if (corner >> axis) & 1 == 1 {
                    flat_index = flat_index + upper[axis].clone() * stride;
                    weight = weight * weights[axis].clone();
                } else {
                    flat_index = flat_index + lower[axis].clone() * stride;
                    weight = weight * weights[axis].clone().neg().add_scalar(1.0);
                }
            }
            result = result + flat_data.clone().gather(0, flat_index) * weight;
        }
        result
    }
}
