//! Nearest neighbor interpolation.

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};
use serde::{Deserialize, Serialize};
use super::trait_::Interpolator;
use super::{clamp_to_int, index_column, strides};

/// Nearest Neighbor Interpolator.
///
/// Rounds each coordinate to the nearest voxel, clamped to the border.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct NearestNeighborInterpolator;

impl NearestNeighborInterpolator {
    /// Create a new nearest neighbor interpolator.
    pub fn new() -> Self {
        Self
    }
}

impl<B: Backend> Interpolator<B> for NearestNeighborInterpolator {
    fn interpolate<const D: usize>(&self, data: &Tensor<B, D>, indices: Tensor<B, 2>) -> Tensor<B, 1> {
        let dims = data.dims();
        let strides = strides(&dims);
        let batch_size = indices.dims()[0];
        let device = indices.device();

        let flat_data = data.clone().reshape([dims.iter().product::<usize>()]);

        let mut flat_index = Tensor::<B, 1, Int>::zeros([batch_size], &device);
        for axis in 0..D {
            let tensor_dim = D - 1 - axis;
            let coord = clamp_to_int(index_column(&indices, axis).round(), dims[tensor_dim]);
            flat_index = flat_index + coord * (strides[tensor_dim] as i32);
        }

        flat_data.gather(0, flat_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::{Shape, TensorData};
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_nearest_neighbor_interpolator_2d_axes() {
        let device = Default::default();
        // Shape [Y=2, X=3]
        let data = Tensor::<TestBackend, 2>::from_data(
            TensorData::new(vec![0.0, 1.0, 2.0, 10.0, 11.0, 12.0], Shape::new([2, 3])),
            &device,
        );

        let indices = Tensor::<TestBackend, 2>::from_floats([[2.0, 0.0], [0.0, 1.0], [1.4, 0.6]], &device);
        let result = NearestNeighborInterpolator::new().interpolate(&data, indices).into_data();
        let slice = result.as_slice::<f32>().unwrap();

        assert_eq!(slice[0], 2.0);
        assert_eq!(slice[1], 10.0);
        assert_eq!(slice[2], 11.0);
    }

    #[test]
    fn test_nearest_neighbor_interpolator_3d_clamps() {
        let device = Default::default();
        let data = Tensor::<TestBackend, 3>::from_data(
            TensorData::new(vec![0.0, 1.0, 10.0, 11.0, 100.0, 101.0, 110.0, 111.0], Shape::new([2, 2, 2])),
            &device,
        );

        let indices = Tensor::<TestBackend, 2>::from_floats([[0.9, 0.1, 0.8], [-3.0, 7.0, 0.0]], &device);
        let result = NearestNeighborInterpolator::new().interpolate(&data, indices).into_data();
        let slice = result.as_slice::<f32>().unwrap();

        assert_eq!(slice[0], 101.0);
        assert_eq!(slice[1], 10.0);
    }
}
