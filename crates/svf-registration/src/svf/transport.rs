//! Schild's-ladder parallel transport of velocity fields.
//!
//! Given `svf_a` (time 0 → time 1) and `svf_b` (time 1 → template), the
//! transported field carries the deformation `svf_a` into the template frame
//! to second order.

use burn::tensor::backend::Backend;
use svf_core::VectorField;
use crate::error::Result;
use crate::svf::bch::{ApproximationOrder, BchMode, SchildsLadderBch};
use crate::svf::exponential::{exponential, ExponentialConfig};

/// Transport operator for a fixed approximation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchildsLadderTransport {
    bch: SchildsLadderBch,
}

impl Default for SchildsLadderTransport {
    fn default() -> Self {
        Self {
            bch: SchildsLadderBch::new(ApproximationOrder::SecondOrder, BchMode::Transport),
        }
    }
}

impl SchildsLadderTransport {
    /// Build from a BCH term count; only 5 is supported.
    pub fn new(terms: usize) -> Result<Self> {
        Ok(Self {
            bch: SchildsLadderBch::from_terms(terms, BchMode::Transport)?,
        })
    }

    pub fn order(&self) -> ApproximationOrder {
        self.bch.order()
    }

    /// Transport `svf_a` along `svf_b`.
    pub fn transport<B: Backend, const D: usize>(
        &self,
        svf_a: &VectorField<B, D>,
        svf_b: &VectorField<B, D>,
    ) -> Result<VectorField<B, D>> {
        tracing::debug!(terms = self.order().terms(), "transporting velocity field");
        self.bch.compose(svf_a.clone(), svf_b)
    }

    /// Transport `svf_a` along `svf_b` and exponentiate the result.
    ///
    /// Returns the transported velocity field and its displacement field.
    pub fn transport_and_exponentiate<B: Backend, const D: usize>(
        &self,
        svf_a: &VectorField<B, D>,
        svf_b: &VectorField<B, D>,
        exponential_config: &ExponentialConfig,
    ) -> Result<(VectorField<B, D>, VectorField<B, D>)> {
        let transported = self.transport(svf_a, svf_b)?;
        let displacement = exponential(&transported, exponential_config)?;
        Ok((transported, displacement))
    }
}

/// Transport `svf_a` along `svf_b` with the given BCH term count.
pub fn transport_velocity_field<B: Backend, const D: usize>(
    svf_a: &VectorField<B, D>,
    svf_b: &VectorField<B, D>,
    terms: usize,
) -> Result<VectorField<B, D>> {
    SchildsLadderTransport::new(terms)?.transport(svf_a, svf_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RegistrationError;
    use burn::tensor::Tensor;
    use burn_ndarray::NdArray;
    use svf_core::{Grid, GridError};

    type Backend = NdArray<f32>;

    fn ramp_field(grid: &Grid<2>) -> VectorField<Backend, 2> {
        let device = Default::default();
        let [ny, nx] = grid.size();
        let x = Tensor::<Backend, 1, burn::tensor::Int>::arange(0..(ny * nx) as i64, &device)
            .float()
            .reshape([ny, nx])
            .mul_scalar(0.01);
        VectorField::from_components(grid.clone(), vec![x.clone(), x.neg()]).unwrap()
    }

    #[test]
    fn test_transport_along_zero_is_noop() {
        let device = Default::default();
        let grid = Grid::<2>::with_size([6, 7]);
        let a = ramp_field(&grid);
        let zero = VectorField::zeros(&grid, &device);

        let transported = transport_velocity_field(&a, &zero, 5).unwrap();
        assert!(transported.rms_difference(&a).unwrap() < 1e-7);
    }

    #[test]
    fn test_transport_guards() {
        let device = Default::default();
        let grid = Grid::<2>::with_size([6, 7]);
        let a = ramp_field(&grid);

        assert!(matches!(
            transport_velocity_field(&a, &a, 3),
            Err(RegistrationError::UnsupportedApproximationOrder { terms: 3 })
        ));

        let other = VectorField::<Backend, 2>::zeros(&Grid::with_size([7, 6]), &device);
        assert!(matches!(
            transport_velocity_field(&a, &other, 5),
            Err(RegistrationError::GridMismatch(GridError::Mismatch { .. }))
        ));
    }

    #[test]
    fn test_transport_and_exponentiate() {
        let device = Default::default();
        let grid = Grid::<2>::with_size([6, 6]);
        let a = ramp_field(&grid);
        let zero = VectorField::zeros(&grid, &device);

        let (velocity, displacement) = SchildsLadderTransport::default()
            .transport_and_exponentiate(&a, &zero, &ExponentialConfig::default())
            .unwrap();
        assert!(velocity.rms_difference(&a).unwrap() < 1e-7);
        assert_eq!(displacement.grid().size(), [6, 6]);
        assert!(displacement.is_finite());
    }
}
