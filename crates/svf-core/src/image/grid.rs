//! Grid geometry shared by images and vector fields.
//!
//! A [`Grid`] describes how tensor indices map to physical coordinates.
//! Tensors are laid out `[Z, Y, X]` (3-D) or `[Y, X]` (2-D) while continuous
//! indices, points and vector components are ordered `(x, y, z)`.

use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};
use crate::error::{GridError, Result};
use crate::spatial::{Direction, Point, Spacing, Vector};

/// Tolerance used when comparing origins, spacings and directions.
pub const GEOMETRY_TOLERANCE: f64 = 1e-6;

/// Discretisation of physical space: size, origin, spacing and orientation.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid<const D: usize> {
    /// Voxel counts in tensor order (`[Z, Y, X]` / `[Y, X]`).
    size: [usize; D],
    /// Physical coordinate of the first voxel.
    origin: Point<D>,
    /// Physical distance between voxels along each axis (x first).
    spacing: Spacing<D>,
    /// Orientation of the grid axes.
    direction: Direction<D>,
}

impl<const D: usize> Grid<D> {
    /// Create a grid.
    ///
    /// # Arguments
    /// * `size` - Voxel counts in tensor order
    /// * `origin` - Physical coordinate of the first voxel
    /// * `spacing` - Physical distance between voxels along each axis
    /// * `direction` - Orientation matrix of the grid axes
    pub fn new(size: [usize; D], origin: Point<D>, spacing: Spacing<D>, direction: Direction<D>) -> Self {
        Self {
            size,
            origin,
            spacing,
            direction,
        }
    }

    /// Grid with unit spacing, zero origin and identity direction.
    pub fn with_size(size: [usize; D]) -> Self {
        Self::new(size, Point::origin(), Spacing::uniform(1.0), Direction::identity())
    }

    pub fn size(&self) -> [usize; D] {
        self.size
    }

    pub fn origin(&self) -> &Point<D> {
        &self.origin
    }

    pub fn spacing(&self) -> &Spacing<D> {
        &self.spacing
    }

    pub fn direction(&self) -> &Direction<D> {
        &self.direction
    }

    /// Total number of voxels.
    pub fn num_voxels(&self) -> usize {
        self.size.iter().product()
    }

    /// Number of voxels along physical axis `axis` (x = 0).
    pub fn axis_len(&self, axis: usize) -> usize {
        self.size[D - 1 - axis]
    }

    /// Tensor dimension holding physical axis `axis`.
    pub fn tensor_dim(axis: usize) -> usize {
        D - 1 - axis
    }

    /// Whether two grids describe the same discretisation.
    pub fn matches(&self, other: &Self) -> bool {
        self.ensure_matches(other).is_ok()
    }

    /// Fail with [`GridError::Mismatch`] naming the first differing attribute.
    pub fn ensure_matches(&self, other: &Self) -> Result<()> {
        if self.size != other.size {
            return Err(GridError::mismatch("size", self.size, other.size));
        }
        if !self.origin.is_close(&other.origin, GEOMETRY_TOLERANCE) {
            return Err(GridError::mismatch("origin", self.origin.to_vec(), other.origin.to_vec()));
        }
        if !self.spacing.is_close(&other.spacing, GEOMETRY_TOLERANCE) {
            return Err(GridError::mismatch("spacing", self.spacing.to_vec(), other.spacing.to_vec()));
        }
        if !self.direction.is_close(&other.direction, GEOMETRY_TOLERANCE) {
            return Err(GridError::mismatch("direction", self.direction.0, other.direction.0));
        }
        Ok(())
    }

    /// Convert a continuous physical point to a continuous index.
    ///
    /// `index = (Direction^-1 * (point - origin)) / spacing`
    pub fn physical_point_to_continuous_index(&self, point: &Point<D>) -> Result<Point<D>> {
        let inv_dir = self.direction.try_inverse().ok_or(GridError::SingularDirection)?;
        let rotated = inv_dir * (*point - self.origin);

        let mut index = Point::<D>::origin();
        for i in 0..D {
            index[i] = rotated[i] / self.spacing[i];
        }
        Ok(index)
    }

    /// Convert a continuous index to a physical point.
    ///
    /// `point = origin + Direction * (index * spacing)`
    pub fn continuous_index_to_physical_point(&self, index: &Point<D>) -> Point<D> {
        let mut scaled = Vector::<D>::zeros();
        for i in 0..D {
            scaled[i] = index[i] * self.spacing[i];
        }
        self.origin + self.direction * scaled
    }

    /// Continuous indices of every voxel, shape `[N, D]`, in tensor order of voxels.
    pub fn index_points<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2> {
        let total = self.num_voxels();
        let mut grid = Vec::with_capacity(total * D);
        for linear in 0..total {
            let index = unravel_index(linear, &self.size);
            for axis in (0..D).rev() {
                grid.push(index[axis] as f32);
            }
        }

        Tensor::<B, 1>::from_data(TensorData::new(grid, Shape::new([total * D])), device)
            .reshape([total, D])
    }

    /// Physical coordinates of every voxel, shape `[N, D]`.
    pub fn physical_points<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2> {
        self.index_to_physical(self.index_points(device))
    }

    /// Batch transform continuous indices `[N, D]` to physical points.
    pub fn index_to_physical<B: Backend>(&self, indices: Tensor<B, 2>) -> Tensor<B, 2> {
        let device = indices.device();

        // P = O + I @ M with M_rc = S_r * D_cr
        let mut m_data = Vec::with_capacity(D * D);
        for r in 0..D {
            for c in 0..D {
                m_data.push((self.spacing[r] * self.direction[(c, r)]) as f32);
            }
        }
        let m_tensor = Tensor::<B, 2>::from_data(TensorData::new(m_data, Shape::new([D, D])), &device);

        indices.matmul(m_tensor) + self.origin_tensor(&device)
    }

    /// Batch transform physical points `[N, D]` to continuous indices.
    pub fn physical_to_index<B: Backend>(&self, points: Tensor<B, 2>) -> Result<Tensor<B, 2>> {
        let origin = self.origin_tensor(&points.device());
        self.offset_to_index(points - origin)
    }

    /// Map physical offsets `[N, D]` (e.g. displacement vectors) to index offsets.
    pub fn offset_to_index<B: Backend>(&self, offsets: Tensor<B, 2>) -> Result<Tensor<B, 2>> {
        let device = offsets.device();
        let inv_dir = self.direction.try_inverse().ok_or(GridError::SingularDirection)?;

        // I = (P - O) @ T with T_rc = (D^-1)_cr / S_c
        let mut t_data = Vec::with_capacity(D * D);
        for r in 0..D {
            for c in 0..D {
                t_data.push((inv_dir[(c, r)] / self.spacing[c]) as f32);
            }
        }
        let t_tensor = Tensor::<B, 2>::from_data(TensorData::new(t_data, Shape::new([D, D])), &device);

        Ok(offsets.matmul(t_tensor))
    }

    fn origin_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2> {
        let origin: Vec<f32> = (0..D).map(|i| self.origin[i] as f32).collect();
        Tensor::<B, 1>::from_data(TensorData::new(origin, Shape::new([D])), device).reshape([1, D])
    }
}

/// Multi-index (tensor order) of the voxel at `linear` in a row-major grid.
pub fn unravel_index<const D: usize>(linear: usize, size: &[usize; D]) -> [usize; D] {
    let mut rem = linear;
    let mut index = [0usize; D];
    for dim in (0..D).rev() {
        index[dim] = rem % size[dim];
        rem /= size[dim];
    }
    index
}
