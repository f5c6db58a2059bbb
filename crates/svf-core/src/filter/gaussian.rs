use burn::tensor::backend::Backend;
use burn::tensor::ops::ConvOptions;
use burn::tensor::{Shape, Tensor};
use serde::{Deserialize, Serialize};
use crate::field::VectorField;
use crate::image::Image;
use crate::spatial::Spacing;

/// Gaussian smoothing filter.
///
/// Applies separable 1-D convolutions along each axis. Standard deviations are
/// given in physical units and converted to voxels with the grid spacing. The
/// kernel radius is the smallest one whose truncated mass reaches
/// `1 - maximum_error`, limited by `max_kernel_width`. Borders replicate the
/// edge voxel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaussianFilter {
    /// One standard deviation per physical axis (x first), or a single shared one.
    sigmas: Vec<f64>,
    maximum_error: f64,
    max_kernel_width: usize,
}

impl GaussianFilter {
    /// Create a new Gaussian filter with the given standard deviations (in physical units).
    ///
    /// # Arguments
    /// * `sigmas` - Standard deviation for each axis, or one value for all axes.
    pub fn new(sigmas: Vec<f64>) -> Self {
        Self {
            sigmas,
            maximum_error: 0.01,
            max_kernel_width: 32,
        }
    }

    /// Same standard deviation along every axis.
    pub fn uniform(sigma: f64) -> Self {
        Self::new(vec![sigma])
    }

    /// Set the tolerated kernel truncation error, in `(0, 1)`.
    pub fn with_maximum_error(mut self, maximum_error: f64) -> Self {
        self.maximum_error = maximum_error;
        self
    }

    /// Set the maximum kernel width (radius * 2 + 1).
    pub fn with_max_kernel_width(mut self, width: usize) -> Self {
        self.max_kernel_width = width;
        self
    }

    pub fn sigmas(&self) -> &[f64] {
        &self.sigmas
    }

    pub fn maximum_error(&self) -> f64 {
        self.maximum_error
    }

    pub fn max_kernel_width(&self) -> usize {
        self.max_kernel_width
    }

    fn sigma(&self, axis: usize) -> f64 {
        self.sigmas
            .get(axis)
            .or_else(|| self.sigmas.first())
            .copied()
            .unwrap_or(0.0)
    }

    /// Apply the filter to an image.
    pub fn apply<B: Backend, const D: usize>(&self, image: &Image<B, D>) -> Image<B, D> {
        let data = self.apply_tensor(image.data().clone(), image.spacing());
        Image::new(data, *image.origin(), *image.spacing(), *image.direction())
    }

    /// Smooth every component of a vector field.
    pub fn smooth_field<B: Backend, const D: usize>(&self, field: &VectorField<B, D>) -> VectorField<B, D> {
        let spacing = *field.grid().spacing();
        field.map_components(|_, c| self.apply_tensor(c, &spacing))
    }

    /// Apply the filter to a tensor directly.
    ///
    /// # Arguments
    /// * `input` - Input tensor in `[Z, Y, X]` / `[Y, X]` layout
    /// * `spacing` - Physical spacing of the data, x first
    pub fn apply_tensor<B: Backend, const D: usize>(&self, input: Tensor<B, D>, spacing: &Spacing<D>) -> Tensor<B, D> {
        let mut data = input;
        let device = data.device();

        for axis in 0..D {
            let sigma = self.sigma(axis);
            if sigma <= 1e-6 {
                continue;
            }

            let kernel = self.kernel(sigma / spacing[axis]);
            if kernel.len() < 2 {
                continue;
            }
            tracing::trace!(axis, sigma, width = kernel.len(), "gaussian kernel");
            let kernel_tensor = Tensor::<B, 1>::from_floats(kernel.as_slice(), &device);
            data = convolve_1d(data, kernel_tensor, D - 1 - axis);
        }
        data
    }

    /// Normalised discrete Gaussian for a standard deviation in voxels.
    ///
    /// Taps are `exp(-t) I_n(t)` with `t = pixel_sigma^2` and `I_n` the modified
    /// Bessel function of the first kind. The radius is at least one and grows
    /// until the kept taps cover `1 - maximum_error` of the mass.
    pub fn kernel(&self, pixel_sigma: f64) -> Vec<f32> {
        let max_radius = (self.max_kernel_width.max(1) - 1) / 2;
        if max_radius == 0 || pixel_sigma < 1e-3 {
            return vec![1.0];
        }

        let coefficients = discrete_gaussian(pixel_sigma * pixel_sigma, max_radius);
        let mut radius = 1;
        let mut mass = coefficients[0] + 2.0 * coefficients[1];
        while radius < max_radius && mass < 1.0 - self.maximum_error {
            radius += 1;
            mass += 2.0 * coefficients[radius];
        }

        let taps: Vec<f64> = (0..=2 * radius)
            .map(|i| coefficients[i.abs_diff(radius)])
            .collect();
        let sum: f64 = taps.iter().sum();
        taps.into_iter().map(|w| (w / sum) as f32).collect()
    }
}

/// `exp(-t) I_n(t)` for `n = 0..` at least `min_len`, by backward recurrence
/// normalised with `sum_n exp(-t) I_n(t) = 1`.
fn discrete_gaussian(t: f64, min_len: usize) -> Vec<f64> {
    let start = (2 * ((10.0 * t.sqrt()).ceil() as usize + 10)).max(min_len + 2);
    let mut values = vec![0.0f64; start + 2];
    values[start] = 1e-30;
    for n in (1..=start).rev() {
        values[n - 1] = values[n + 1] + (2.0 * n as f64 / t) * values[n];
        if values[n - 1] > 1e200 {
            values.iter_mut().for_each(|v| *v *= 1e-200);
        }
    }

    let total = values[0] + 2.0 * values[1..].iter().sum::<f64>();
    values.into_iter().map(|v| v / total).collect()
}

/// Convolve along tensor dimension `dim` with replicate padding.
fn convolve_1d<B: Backend, const D: usize>(input: Tensor<B, D>, kernel: Tensor<B, 1>, dim: usize) -> Tensor<B, D> {
    let dims: [usize; D] = input.dims();
    let kernel_size = kernel.dims()[0];
    let radius = kernel_size / 2;

    // Move the target dimension last.
    let mut permute_indices = [0isize; D];
    let mut idx = 0;
    for i in 0..D {
        if i != dim {
            permute_indices[idx] = i as isize;
            idx += 1;
        }
    }
    permute_indices[D - 1] = dim as isize;

    let length = dims[dim];
    let batch_size = dims.iter().product::<usize>() / length;
    let rows = input.permute(permute_indices).reshape([batch_size, 1, length]);

    let first = rows.clone().narrow(2, 0, 1);
    let last = rows.clone().narrow(2, length - 1, 1);
    let mut pieces = vec![first; radius];
    pieces.push(rows);
    pieces.extend(vec![last; radius]);
    let padded = Tensor::cat(pieces, 2);

    let options = ConvOptions::new([1], [0], [1], 1);
    let output = burn::tensor::module::conv1d(padded, kernel.reshape([1, 1, kernel_size]), None, options);

    let mut permuted_shape = [0usize; D];
    for (new_pos, &old_pos) in permute_indices.iter().enumerate() {
        permuted_shape[new_pos] = dims[old_pos as usize];
    }
    let mut inv_permute_indices = [0isize; D];
    for (new_pos, &old_pos) in permute_indices.iter().enumerate() {
        inv_permute_indices[old_pos as usize] = new_pos as isize;
    }

    output.reshape(Shape::new(permuted_shape)).permute(inv_permute_indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Grid;
    use crate::spatial::{Direction, Point};
    use burn::tensor::TensorData;
    use burn_ndarray::NdArray;

    type Backend = NdArray<f32>;

    #[test]
    fn test_kernel_is_normalised_and_bounded() {
        let filter = GaussianFilter::uniform(1.0).with_maximum_error(0.1).with_max_kernel_width(30);
        let kernel = filter.kernel(2.0);
        let sum: f32 = kernel.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert_eq!(kernel.len() % 2, 1);

        let narrow = filter.clone().with_max_kernel_width(5).kernel(10.0);
        assert_eq!(narrow.len(), 5);

        // Smaller error tolerance widens the kernel.
        let tight = GaussianFilter::uniform(1.0).with_maximum_error(0.001).with_max_kernel_width(64);
        assert!(tight.kernel(2.0).len() > kernel.len());
    }

    #[test]
    fn test_kernel_uses_bessel_taps() {
        let filter = GaussianFilter::uniform(0.7).with_maximum_error(0.08).with_max_kernel_width(10);
        let kernel = filter.kernel(0.7);
        assert_eq!(kernel.len(), 3);
        assert!((kernel[0] - 0.16121).abs() < 1e-4);
        assert!((kernel[1] - 0.67757).abs() < 1e-4);
        assert_eq!(kernel[0], kernel[2]);

        // Even a tiny sigma keeps one tap on each side.
        assert_eq!(filter.kernel(0.01).len(), 3);
    }

    #[test]
    fn test_constant_image_is_preserved() {
        let device = Default::default();
        let data = Tensor::<Backend, 2>::ones([9, 11], &device).mul_scalar(4.0);
        let image = Image::new(data, Point::origin(), Spacing::uniform(1.0), Direction::identity());

        let smoothed = GaussianFilter::uniform(1.5).apply(&image);
        assert_eq!(smoothed.shape(), [9, 11]);
        let err = (smoothed.data().clone() - 4.0).abs().max().into_scalar();
        assert!(err < 1e-4);
    }

    #[test]
    fn test_impulse_spreads_and_keeps_mass() {
        let device = Default::default();
        let mut values = vec![0.0f32; 15 * 15];
        values[7 * 15 + 7] = 1.0;
        let data = Tensor::<Backend, 2>::from_data(TensorData::new(values, Shape::new([15, 15])), &device);

        let smoothed = GaussianFilter::uniform(1.0).apply_tensor(data, &Spacing::uniform(1.0));
        let total = smoothed.clone().sum().into_scalar();
        let peak = smoothed.max().into_scalar();
        assert!((total - 1.0).abs() < 1e-4);
        assert!(peak < 0.5);
    }

    #[test]
    fn test_smooth_field_keeps_grid() {
        let device = Default::default();
        let grid = Grid::<3>::with_size([4, 5, 6]);
        let field = VectorField::<Backend, 3>::zeros(&grid, &device).map_components(|axis, c| c.add_scalar(axis as f64));
        let smoothed = GaussianFilter::uniform(1.0).smooth_field(&field);

        assert!(smoothed.grid().matches(&grid));
        assert!(smoothed.rms_difference(&field).unwrap() < 1e-4);
    }
}
