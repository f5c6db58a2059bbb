use anyhow::{anyhow, Context, Result};
use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};
use ndarray::{ArrayD, IxDyn};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiObject, ReaderOptions};
use std::path::Path;
use svf_core::{Grid, Image};

use crate::header::{ensure_supported_dimension, grid_from_header, header_from_grid, spatial_size};

/// Voxel values in tensor order with the grid they live on.
pub(crate) struct RawImage<const D: usize> {
    pub values: Vec<f32>,
    pub grid: Grid<D>,
}

impl<const D: usize> RawImage<D> {
    pub fn into_image<B: Backend>(self, device: &B::Device) -> Result<Image<B, D>> {
        let shape = Shape::new(self.grid.size());
        let tensor = Tensor::<B, D>::from_data(TensorData::new(self.values, shape), device);
        Image::from_grid(tensor, self.grid).map_err(|e| anyhow!("Invalid image geometry: {}", e))
    }
}

pub(crate) fn read_raw_image<const D: usize>(path: &Path) -> Result<RawImage<D>> {
    ensure_supported_dimension::<D>()?;
    let obj = ReaderOptions::new()
        .read_file(path)
        .with_context(|| format!("Failed to read NIfTI file {}", path.display()))?;
    let header = obj.header().clone();

    let array = obj
        .into_volume()
        .into_ndarray::<f32>()
        .context("Failed to convert volume to ndarray")?;
    let extents = spatial_size::<D>(array.shape(), array.ndim())
        .with_context(|| format!("Unexpected image shape in {}", path.display()))?;
    let grid = grid_from_header(&header, extents)?;

    // Reversed axes iterate x fastest, matching the [.., Y, X] tensor layout.
    let values: Vec<f32> = array.reversed_axes().iter().copied().collect();
    tracing::debug!(path = %path.display(), ?extents, "read NIfTI image");

    Ok(RawImage { values, grid })
}

/// Read a 2-D or 3-D scalar image.
///
/// Trailing singleton axes in the file are dropped, so a `[X, Y, 1]` volume
/// reads as a 2-D image.
pub fn read_image<B: Backend, const D: usize, P: AsRef<Path>>(path: P, device: &B::Device) -> Result<Image<B, D>> {
    read_raw_image::<D>(path.as_ref())?.into_image(device)
}

/// Write a 2-D or 3-D scalar image as `f32` with an sform affine.
pub fn write_image<B: Backend, const D: usize, P: AsRef<Path>>(path: P, image: &Image<B, D>) -> Result<()> {
    ensure_supported_dimension::<D>()?;
    let path = path.as_ref();

    let data = image.data().clone().into_data();
    let values = data
        .to_vec::<f32>()
        .map_err(|e| anyhow!("Failed to get tensor data: {:?}", e))?;

    let array = ArrayD::from_shape_vec(IxDyn(&image.shape()), values)
        .context("Failed to create ndarray")?
        .reversed_axes();

    WriterOptions::new(path)
        .reference_header(&header_from_grid(image.grid()))
        .write_nifti(&array)
        .with_context(|| format!("Failed to write NIfTI file {}", path.display()))?;

    tracing::debug!(path = %path.display(), size = ?image.grid().size(), "wrote NIfTI image");
    Ok(())
}
