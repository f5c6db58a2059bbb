//! Vector fields in the NIfTI vector layout `[X, Y, Z, 1, C]`.
//!
//! 2-D fields use `[X, Y, 1, 1, 2]`. Components are physical-axis ordered,
//! x first, matching [`VectorField`].

use anyhow::{anyhow, bail, Context, Result};
use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};
use ndarray::{ArrayD, IxDyn};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiObject, ReaderOptions};
use rayon::prelude::*;
use std::path::Path;
use svf_core::{Grid, VectorField};

use crate::header::{
    ensure_supported_dimension, grid_from_header, header_from_grid, spatial_size, INTENT_VECTOR,
};

const VECTOR_RANK: usize = 5;
const COMPONENT_AXIS: usize = 4;

struct RawField<const D: usize> {
    /// Component-major values, each component in tensor order.
    values: Vec<f32>,
    grid: Grid<D>,
}

impl<const D: usize> RawField<D> {
    fn into_field<B: Backend>(self, device: &B::Device) -> Result<VectorField<B, D>> {
        let shape = self.grid.size();
        let count = self.grid.num_voxels();
        let components = self
            .values
            .chunks_exact(count)
            .map(|chunk| {
                Tensor::<B, D>::from_data(TensorData::new(chunk.to_vec(), Shape::new(shape)), device)
            })
            .collect();
        VectorField::from_components(self.grid, components).map_err(|e| anyhow!("Invalid vector field: {}", e))
    }
}

fn read_raw_field<const D: usize>(path: &Path) -> Result<RawField<D>> {
    ensure_supported_dimension::<D>()?;
    let obj = ReaderOptions::new()
        .read_file(path)
        .with_context(|| format!("Failed to read NIfTI file {}", path.display()))?;
    let header = obj.header().clone();
    if header.intent_code != INTENT_VECTOR {
        tracing::warn!(path = %path.display(), intent = header.intent_code, "vector field without vector intent");
    }

    let array = obj
        .into_volume()
        .into_ndarray::<f32>()
        .context("Failed to convert volume to ndarray")?;
    let shape = array.shape().to_vec();
    if shape.len() != VECTOR_RANK || shape[COMPONENT_AXIS] != D {
        bail!(
            "{}: expected a {}-component field in [X, Y, Z, 1, C] layout, found shape {:?}",
            path.display(),
            D,
            shape
        );
    }
    let extents = spatial_size::<D>(&shape, COMPONENT_AXIS)?;
    let grid = grid_from_header(&header, extents)?;

    let values: Vec<f32> = array.reversed_axes().iter().copied().collect();
    tracing::debug!(path = %path.display(), ?extents, "read NIfTI vector field");

    Ok(RawField { values, grid })
}

/// Read a displacement or velocity field.
pub fn read_vector_field<B: Backend, const D: usize, P: AsRef<Path>>(
    path: P,
    device: &B::Device,
) -> Result<VectorField<B, D>> {
    read_raw_field::<D>(path.as_ref())?.into_field(device)
}

/// Read several fields, decoding the files in parallel.
pub fn read_vector_fields<B: Backend, const D: usize, P: AsRef<Path> + Sync>(
    paths: &[P],
    device: &B::Device,
) -> Result<Vec<VectorField<B, D>>> {
    let raw: Vec<RawField<D>> = paths
        .par_iter()
        .map(|path| read_raw_field::<D>(path.as_ref()))
        .collect::<Result<_>>()?;

    raw.into_iter().map(|field| field.into_field(device)).collect()
}

/// Write a field with `NIFTI_INTENT_VECTOR`.
pub fn write_vector_field<B: Backend, const D: usize, P: AsRef<Path>>(
    path: P,
    field: &VectorField<B, D>,
) -> Result<()> {
    ensure_supported_dimension::<D>()?;
    let path = path.as_ref();
    let grid = field.grid();

    let flat: Vec<Tensor<B, 1>> = field
        .components()
        .iter()
        .map(|c| c.clone().reshape([grid.num_voxels()]))
        .collect();
    let values = Tensor::cat(flat, 0)
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| anyhow!("Failed to get tensor data: {:?}", e))?;

    // Tensor order is the reverse of [X, Y, (Z), 1.., C].
    let mut logical: Vec<usize> = grid.size().iter().rev().copied().collect();
    logical.resize(COMPONENT_AXIS, 1);
    logical.push(D);
    let reversed: Vec<usize> = logical.iter().rev().copied().collect();

    let array = ArrayD::from_shape_vec(IxDyn(&reversed), values)
        .context("Failed to create ndarray")?
        .reversed_axes();

    let mut header = header_from_grid(grid);
    header.intent_code = INTENT_VECTOR;

    WriterOptions::new(path)
        .reference_header(&header)
        .write_nifti(&array)
        .with_context(|| format!("Failed to write NIfTI file {}", path.display()))?;

    tracing::debug!(path = %path.display(), size = ?grid.size(), "wrote NIfTI vector field");
    Ok(())
}
