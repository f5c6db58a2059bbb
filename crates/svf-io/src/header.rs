//! Conversion between NIfTI header geometry and [`Grid`].

use anyhow::{bail, Result};
use nalgebra::{SMatrix, Vector3};
use nifti::NiftiHeader;
use svf_core::spatial::{Direction, Point, Spacing};
use svf_core::Grid;

/// `NIFTI_INTENT_VECTOR`, used for displacement and velocity fields.
pub const INTENT_VECTOR: i16 = 1007;

/// Rows of the 3×4 voxel-to-world affine stored in `header`.
///
/// Prefers the sform, falls back to the qform and finally to `pixdim` alone.
pub(crate) fn header_affine(header: &NiftiHeader) -> [[f64; 4]; 3] {
    let rows = if header.sform_code > 0 {
        [header.srow_x, header.srow_y, header.srow_z]
    } else if header.qform_code > 0 {
        let b = header.quatern_b;
        let c = header.quatern_c;
        let d = header.quatern_d;
        let a = (1.0 - (b * b + c * c + d * d).min(1.0)).sqrt();
        let qfac = if header.pixdim[0] == 0.0 { 1.0 } else { header.pixdim[0] };

        let dx = header.pixdim[1];
        let dy = header.pixdim[2];
        let dz = header.pixdim[3] * qfac;

        [
            [
                (a * a + b * b - c * c - d * d) * dx,
                (2.0 * b * c - 2.0 * a * d) * dy,
                (2.0 * b * d + 2.0 * a * c) * dz,
                header.quatern_x,
            ],
            [
                (2.0 * b * c + 2.0 * a * d) * dx,
                (a * a + c * c - b * b - d * d) * dy,
                (2.0 * c * d - 2.0 * a * b) * dz,
                header.quatern_y,
            ],
            [
                (2.0 * b * d - 2.0 * a * c) * dx,
                (2.0 * c * d + 2.0 * a * b) * dy,
                (a * a + d * d - c * c - b * b) * dz,
                header.quatern_z,
            ],
        ]
    } else {
        [
            [header.pixdim[1], 0.0, 0.0, 0.0],
            [0.0, header.pixdim[2], 0.0, 0.0],
            [0.0, 0.0, header.pixdim[3], 0.0],
        ]
    };

    rows.map(|row| row.map(f64::from))
}

/// Grid of the leading `D` spatial axes described by `header`.
///
/// `extents` are the file's voxel counts, x first.
pub(crate) fn grid_from_header<const D: usize>(header: &NiftiHeader, extents: [usize; D]) -> Result<Grid<D>> {
    ensure_supported_dimension::<D>()?;
    let affine = header_affine(header);

    let mut origin = [0.0; D];
    let mut spacing = [1.0; D];
    let mut columns = [[0.0; D]; D];

    for axis in 0..D {
        origin[axis] = affine[axis][3];

        let column = Vector3::new(affine[0][axis], affine[1][axis], affine[2][axis]);
        let norm = column.norm();
        if norm > 1e-9 {
            spacing[axis] = norm;
            for row in 0..D {
                columns[axis][row] = column[row] / norm;
            }
        } else {
            columns[axis][axis] = 1.0;
        }
    }

    let direction = SMatrix::<f64, D, D>::from_fn(|row, col| columns[col][row]);
    let grid = Grid::new(tensor_shape(extents), Point::new(origin), Spacing::new(spacing), Direction(direction));

    if !grid.direction().is_orthogonal() {
        tracing::warn!("NIfTI affine has a non-orthogonal direction matrix");
    }
    Ok(grid)
}

/// Header carrying the geometry of `grid` as an sform.
///
/// Dimensions and datatype are filled in by the writer from the array.
pub(crate) fn header_from_grid<const D: usize>(grid: &Grid<D>) -> NiftiHeader {
    let mut header = NiftiHeader::default();
    let mut rows = [[0.0f32; 4]; 3];

    for row in 0..3 {
        for col in 0..3 {
            rows[row][col] = if row < D && col < D {
                (grid.direction().0[(row, col)] * grid.spacing()[col]) as f32
            } else if row == col {
                1.0
            } else {
                0.0
            };
        }
        if row < D {
            rows[row][3] = grid.origin()[row] as f32;
        }
    }

    header.pixdim = [1.0; 8];
    for axis in 0..D {
        header.pixdim[axis + 1] = grid.spacing()[axis] as f32;
    }
    header.sform_code = 1;
    header.qform_code = 0;
    header.srow_x = rows[0];
    header.srow_y = rows[1];
    header.srow_z = rows[2];
    header
}

pub(crate) fn ensure_supported_dimension<const D: usize>() -> Result<()> {
    if D != 2 && D != 3 {
        bail!("NIfTI I/O supports 2-D and 3-D grids, got {}-D", D);
    }
    Ok(())
}

/// Split a NIfTI array shape into `D` spatial extents, x first.
///
/// Axes after the spatial ones up to `trailing_from` must be singleton.
pub(crate) fn spatial_size<const D: usize>(shape: &[usize], trailing_from: usize) -> Result<[usize; D]> {
    if shape.len() < D {
        bail!("expected at least {} dimensions, found shape {:?}", D, shape);
    }
    if shape[D..trailing_from.min(shape.len())].iter().any(|&n| n != 1) {
        bail!("shape {:?} has non-singleton axes beyond the {} spatial ones", shape, D);
    }

    let mut size = [0; D];
    size.copy_from_slice(&shape[..D]);
    if size.contains(&0) {
        bail!("shape {:?} has an empty axis", shape);
    }
    Ok(size)
}

/// Tensor shape `[.., Y, X]` for extents `(x, y, ..)`.
pub(crate) fn tensor_shape<const D: usize>(extents: [usize; D]) -> [usize; D] {
    let mut shape = extents;
    shape.reverse();
    shape
}
