//! Scalar image type with physical metadata.
//!
//! An [`Image`] couples tensor data with the [`Grid`] describing how voxel
//! indices map to physical coordinates.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use crate::error::{GridError, Result};
use crate::image::grid::Grid;
use crate::spatial::{Direction, Point, Spacing};

/// Scalar image with physical metadata.
///
/// # Type Parameters
/// * `B` - The backend (CPU or GPU) for tensor operations
/// * `D` - The dimensionality of the image (2 or 3)
///
/// # Examples
/// ```rust
/// use svf_core::Image;
/// use svf_core::spatial::{Point2, Spacing2, Direction2};
/// use burn::tensor::Tensor;
/// use burn_ndarray::NdArray;
///
/// type Backend = NdArray<f32>;
///
/// let device = Default::default();
/// let data = Tensor::<Backend, 2>::zeros([16, 32], &device);
/// let image = Image::new(data, Point2::origin(), Spacing2::uniform(1.0), Direction2::identity());
/// assert_eq!(image.grid().size(), [16, 32]);
/// ```
#[derive(Debug, Clone)]
pub struct Image<B: Backend, const D: usize> {
    /// The pixel data, potentially on GPU.
    data: Tensor<B, D>,
    /// Geometry of the pixel data.
    grid: Grid<D>,
}

impl<B: Backend, const D: usize> Image<B, D> {
    /// Create a new image; the grid size is taken from the tensor shape.
    ///
    /// # Arguments
    /// * `data` - The image data as a tensor
    /// * `origin` - Physical coordinate of the first pixel
    /// * `spacing` - Physical distance between pixels along each axis
    /// * `direction` - Orientation matrix of the image axes
    pub fn new(data: Tensor<B, D>, origin: Point<D>, spacing: Spacing<D>, direction: Direction<D>) -> Self {
        let grid = Grid::new(data.dims(), origin, spacing, direction);
        Self { data, grid }
    }

    /// Create an image on an existing grid.
    ///
    /// Fails if the tensor shape disagrees with the grid size.
    pub fn from_grid(data: Tensor<B, D>, grid: Grid<D>) -> Result<Self> {
        let dims = data.dims();
        if dims != grid.size() {
            return Err(GridError::mismatch("size", grid.size(), dims));
        }
        Ok(Self { data, grid })
    }

    /// Get the image data tensor.
    pub fn data(&self) -> &Tensor<B, D> {
        &self.data
    }

    /// Consume the image and return its tensor.
    pub fn into_data(self) -> Tensor<B, D> {
        self.data
    }

    pub fn grid(&self) -> &Grid<D> {
        &self.grid
    }

    pub fn origin(&self) -> &Point<D> {
        self.grid.origin()
    }

    pub fn spacing(&self) -> &Spacing<D> {
        self.grid.spacing()
    }

    pub fn direction(&self) -> &Direction<D> {
        self.grid.direction()
    }

    /// Get the image shape as an array.
    pub fn shape(&self) -> [usize; D] {
        self.grid.size()
    }

    pub fn device(&self) -> B::Device {
        self.data.device()
    }

    /// Replace the data, keeping the grid.
    pub fn with_data(&self, data: Tensor<B, D>) -> Result<Self> {
        Self::from_grid(data, self.grid.clone())
    }
}
