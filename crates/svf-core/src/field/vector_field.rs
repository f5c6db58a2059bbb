//! Vector field storage and pointwise algebra.

use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Tensor};
use crate::error::{GridError, Result};
use crate::image::{Grid, Image};

/// A field of `D`-dimensional vectors, one per voxel of a [`Grid`].
///
/// `components[i]` holds the component along physical axis `i` (x first) as
/// a tensor with the grid's tensor layout. Vectors are in physical units.
#[derive(Debug, Clone)]
pub struct VectorField<B: Backend, const D: usize> {
    components: Vec<Tensor<B, D>>,
    grid: Grid<D>,
}

impl<B: Backend, const D: usize> VectorField<B, D> {
    /// Zero field on `grid`.
    pub fn zeros(grid: &Grid<D>, device: &B::Device) -> Self {
        let components = (0..D).map(|_| Tensor::zeros(grid.size(), device)).collect();
        Self {
            components,
            grid: grid.clone(),
        }
    }

    /// Build a field from per-axis component tensors.
    ///
    /// Fails unless there are exactly `D` components, each shaped like the grid.
    pub fn from_components(grid: Grid<D>, components: Vec<Tensor<B, D>>) -> Result<Self> {
        if components.len() != D {
            return Err(GridError::ComponentCount {
                expected: D,
                actual: components.len(),
            });
        }
        for component in &components {
            let dims = component.dims();
            if dims != grid.size() {
                return Err(GridError::mismatch("size", grid.size(), dims));
            }
        }
        Ok(Self { components, grid })
    }

    /// Build a field from an `[N, D]` tensor of vectors in voxel order.
    pub fn from_columns(grid: &Grid<D>, columns: Tensor<B, 2>) -> Result<Self> {
        let [n, d] = columns.dims();
        if d != D {
            return Err(GridError::ComponentCount { expected: D, actual: d });
        }
        if n != grid.num_voxels() {
            return Err(GridError::mismatch("voxel count", grid.num_voxels(), n));
        }
        let components = (0..D)
            .map(|axis| {
                columns
                    .clone()
                    .narrow(1, axis, 1)
                    .reshape(grid.size())
            })
            .collect();
        Ok(Self {
            components,
            grid: grid.clone(),
        })
    }

    /// Vectors as an `[N, D]` tensor in voxel order.
    pub fn to_columns(&self) -> Tensor<B, 2> {
        let n = self.grid.num_voxels();
        let columns = self
            .components
            .iter()
            .map(|c| c.clone().reshape([n, 1]))
            .collect();
        Tensor::cat(columns, 1)
    }

    pub fn grid(&self) -> &Grid<D> {
        &self.grid
    }

    pub fn components(&self) -> &[Tensor<B, D>] {
        &self.components
    }

    pub fn component(&self, axis: usize) -> &Tensor<B, D> {
        &self.components[axis]
    }

    pub fn into_components(self) -> Vec<Tensor<B, D>> {
        self.components
    }

    pub fn device(&self) -> B::Device {
        self.components[0].device()
    }

    /// Component `axis` as a scalar image on the field's grid.
    pub fn component_image(&self, axis: usize) -> Image<B, D> {
        Image::new(
            self.components[axis].clone(),
            *self.grid.origin(),
            *self.grid.spacing(),
            *self.grid.direction(),
        )
    }

    /// Fail with [`GridError::Mismatch`] unless `other` shares this grid.
    pub fn ensure_same_grid(&self, other: &Self) -> Result<()> {
        self.grid.ensure_matches(&other.grid)
    }

    /// Apply `op` to every component, keeping the grid.
    pub fn map_components<F>(&self, mut op: F) -> Self
    where
        F: FnMut(usize, Tensor<B, D>) -> Tensor<B, D>,
    {
        let components = self
            .components
            .iter()
            .enumerate()
            .map(|(axis, c)| op(axis, c.clone()))
            .collect();
        Self {
            components,
            grid: self.grid.clone(),
        }
    }

    fn zip_with<F>(&self, other: &Self, op: F) -> Result<Self>
    where
        F: Fn(Tensor<B, D>, Tensor<B, D>) -> Tensor<B, D>,
    {
        self.ensure_same_grid(other)?;
        let components = self
            .components
            .iter()
            .zip(other.components.iter())
            .map(|(a, b)| op(a.clone(), b.clone()))
            .collect();
        Ok(Self {
            components,
            grid: self.grid.clone(),
        })
    }

    /// `self + other`.
    pub fn add(&self, other: &Self) -> Result<Self> {
        self.zip_with(other, |a, b| a + b)
    }

    /// `self - other`.
    pub fn sub(&self, other: &Self) -> Result<Self> {
        self.zip_with(other, |a, b| a - b)
    }

    /// N-ary sum of fields sharing one grid.
    pub fn sum(fields: &[Self]) -> Result<Self> {
        let (first, rest) = fields.split_first().ok_or(GridError::EmptyInput)?;
        rest.iter().try_fold(first.clone(), |acc, field| acc.add(field))
    }

    /// Multiply every vector by `factor`.
    pub fn scale(&self, factor: f64) -> Self {
        self.map_components(|_, c| c.mul_scalar(factor))
    }

    pub fn neg(&self) -> Self {
        self.map_components(|_, c| c.neg())
    }

    /// Per-voxel squared vector norm.
    pub fn squared_norm(&self) -> Tensor<B, D> {
        let mut acc = self.components[0].clone().powf_scalar(2.0);
        for c in &self.components[1..] {
            acc = acc + c.clone().powf_scalar(2.0);
        }
        acc
    }

    /// Largest vector norm over the grid.
    pub fn max_norm(&self) -> f64 {
        let max_sq = self.squared_norm().max().into_scalar().elem::<f64>();
        max_sq.max(0.0).sqrt()
    }

    /// Root of the mean squared vector norm.
    pub fn rms(&self) -> f64 {
        let mean_sq = self.squared_norm().mean().into_scalar().elem::<f64>();
        mean_sq.max(0.0).sqrt()
    }

    /// RMS norm of `self - other`.
    pub fn rms_difference(&self, other: &Self) -> Result<f64> {
        Ok(self.sub(other)?.rms())
    }

    /// Whether every component value is finite.
    pub fn is_finite(&self) -> bool {
        self.components.iter().all(|c| {
            let nan = c.clone().not_equal(c.clone());
            let inf = c.clone().abs().equal_elem(f64::INFINITY);
            let bad = nan.int().sum() + inf.int().sum();
            bad.into_scalar().elem::<i64>() == 0
        })
    }

    /// Arithmetic mean of fields on one grid.
    ///
    /// For velocity fields this is the log-Euclidean mean of the
    /// corresponding transformations.
    pub fn mean(fields: &[Self]) -> Result<Self> {
        let total = Self::sum(fields)?;
        Ok(total.scale(1.0 / fields.len() as f64))
    }
}
