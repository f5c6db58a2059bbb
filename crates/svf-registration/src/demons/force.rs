//! Diffeomorphic demons force.
//!
//! With `speed = F − M∘φ` and `g2` a doubled gradient, the per-voxel update is
//! `2·speed·g2 / (‖g2‖² + speed²/K)` where `K = max_step² · mean(spacing²)`.
//! The normaliser bounds each update by the maximum step length.

use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Tensor};
use serde::{Deserialize, Serialize};
use svf_core::filter::{FieldWarper, GradientFilter};
use svf_core::interpolation::LinearInterpolator;
use svf_core::{Image, VectorField};
use crate::error::Result;
use crate::validation::validate_non_negative;

/// Which image gradient drives the force.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GradientType {
    /// `2∇F`
    Fixed,
    /// `2∇(M∘φ)`
    WarpedMoving,
    /// `∇F + ∇(M∘φ)`, the efficient second-order form.
    #[default]
    Symmetric,
}

/// Configuration of the demons force.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemonsForceConfig {
    pub gradient_type: GradientType,
    /// Largest update length in physical units; `0` disables the bound.
    pub maximum_update_step_length: f64,
    /// Voxels whose intensity difference is below this get no update.
    pub intensity_difference_threshold: f64,
    /// Voxels whose denominator is below this get no update.
    pub denominator_threshold: f64,
}

impl Default for DemonsForceConfig {
    fn default() -> Self {
        Self {
            gradient_type: GradientType::Symmetric,
            maximum_update_step_length: 0.5,
            intensity_difference_threshold: 0.001,
            denominator_threshold: 1e-9,
        }
    }
}

impl DemonsForceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_gradient_type(mut self, gradient_type: GradientType) -> Self {
        self.gradient_type = gradient_type;
        self
    }

    pub fn with_maximum_update_step_length(mut self, length: f64) -> Self {
        self.maximum_update_step_length = length;
        self
    }

    pub fn with_intensity_difference_threshold(mut self, threshold: f64) -> Self {
        self.intensity_difference_threshold = threshold;
        self
    }

    pub fn with_denominator_threshold(mut self, threshold: f64) -> Self {
        self.denominator_threshold = threshold;
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_non_negative("Maximum update step length", self.maximum_update_step_length)?;
        validate_non_negative("Intensity difference threshold", self.intensity_difference_threshold)?;
        validate_non_negative("Denominator threshold", self.denominator_threshold)?;
        Ok(())
    }
}

/// Result of one force evaluation.
#[derive(Debug, Clone)]
pub struct DemonsForceOutput<B: Backend, const D: usize> {
    pub update: VectorField<B, D>,
    /// Mean squared intensity difference over voxels that sample inside the moving image.
    pub metric: f64,
    /// RMS norm of `update` over the same voxels.
    pub rms_change: f64,
}

/// Demons force against one fixed image.
///
/// Caches the fixed image gradient and the sampling grid so repeated
/// evaluations only warp the moving image.
#[derive(Debug, Clone)]
pub struct DemonsForce<B: Backend, const D: usize> {
    config: DemonsForceConfig,
    fixed: Image<B, D>,
    fixed_gradient: VectorField<B, D>,
    warper: FieldWarper<B, D>,
    normalizer: f64,
}

impl<B: Backend, const D: usize> DemonsForce<B, D> {
    pub fn new(config: DemonsForceConfig, fixed: &Image<B, D>) -> Result<Self> {
        let step = config.maximum_update_step_length;
        let normalizer = step * step * fixed.spacing().mean_squared();
        Ok(Self {
            fixed_gradient: GradientFilter::new().apply(fixed)?,
            warper: FieldWarper::new(fixed.grid(), &fixed.device()),
            fixed: fixed.clone(),
            config,
            normalizer,
        })
    }

    pub fn config(&self) -> &DemonsForceConfig {
        &self.config
    }

    pub fn fixed(&self) -> &Image<B, D> {
        &self.fixed
    }

    /// Update field for `moving` resampled through `displacement`.
    pub fn compute(&self, moving: &Image<B, D>, displacement: &VectorField<B, D>) -> Result<DemonsForceOutput<B, D>> {
        self.fixed.grid().ensure_matches(moving.grid())?;

        let (warped, inside) =
            self.warper
                .warp_image_with_mask(moving, displacement, &LinearInterpolator::new(), 0.0)?;
        let speed = self.fixed.data().clone() - warped.data().clone();

        let g2 = match self.config.gradient_type {
            GradientType::Fixed => self.fixed_gradient.scale(2.0),
            GradientType::WarpedMoving => GradientFilter::new().apply(&warped)?.scale(2.0),
            GradientType::Symmetric => self.fixed_gradient.add(&GradientFilter::new().apply(&warped)?)?,
        };

        let speed_sq = speed.clone().powf_scalar(2.0);
        let mut denominator = g2.squared_norm();
        if self.normalizer > 0.0 {
            denominator = denominator + speed_sq.clone().div_scalar(self.normalizer);
        }

        let threshold = self.config.denominator_threshold;
        let active = speed
            .clone()
            .abs()
            .greater_equal_elem(self.config.intensity_difference_threshold)
            .float()
            * denominator.clone().greater_equal_elem(threshold).float()
            * inside.clone();
        let safe_denominator = denominator.clone().mask_fill(denominator.lower_elem(threshold), 1.0);
        let factor = speed.mul_scalar(2.0) / safe_denominator * active;

        let update = g2.map_components(|_, c| c * factor.clone());

        let count = scalar(inside.clone().sum());
        let (metric, rms_change) = if count > 0.0 {
            let sum_sq = scalar((speed_sq * inside).sum());
            let sum_change = scalar(update.squared_norm().sum());
            (sum_sq / count, (sum_change / count).sqrt())
        } else {
            tracing::warn!("no voxel samples inside the moving image");
            (0.0, 0.0)
        };

        Ok(DemonsForceOutput {
            update,
            metric,
            rms_change,
        })
    }
}

fn scalar<B: Backend>(tensor: Tensor<B, 1>) -> f64 {
    tensor.into_scalar().elem::<f64>()
}

/// One-shot demons force evaluation.
pub fn demons_force<B: Backend, const D: usize>(
    fixed: &Image<B, D>,
    moving: &Image<B, D>,
    displacement: &VectorField<B, D>,
    config: &DemonsForceConfig,
) -> Result<DemonsForceOutput<B, D>> {
    config.validate()?;
    DemonsForce::new(config.clone(), fixed)?.compute(moving, displacement)
}
