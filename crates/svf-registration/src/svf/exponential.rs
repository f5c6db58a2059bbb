//! Exponential map by scaling and squaring.
//!
//! `exp(v)` is approximated by `φ₀ = v / 2^N` followed by `N` squarings
//! `φ ← φ + φ ∘ (Id + φ)`.

use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};
use svf_core::filter::FieldWarper;
use svf_core::{Grid, VectorField};
use crate::error::{RegistrationError, Result};

/// Largest per-step displacement, in units of the smallest spacing.
const MAX_STEP_DISPLACEMENT: f64 = 0.5;

/// Configuration of the exponential map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExponentialConfig {
    /// Upper bound on the automatically chosen number of squarings.
    pub maximum_iterations: usize,
    /// Use exactly this many squarings instead of the automatic choice.
    pub fixed_iterations: Option<usize>,
    /// Exponentiate `-v`, yielding the inverse displacement.
    pub compute_inverse: bool,
}

impl Default for ExponentialConfig {
    fn default() -> Self {
        Self {
            maximum_iterations: 20,
            fixed_iterations: None,
            compute_inverse: false,
        }
    }
}

impl ExponentialConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_maximum_iterations(mut self, iterations: usize) -> Self {
        self.maximum_iterations = iterations;
        self
    }

    pub fn with_fixed_iterations(mut self, iterations: usize) -> Self {
        self.fixed_iterations = Some(iterations);
        self
    }

    pub fn with_compute_inverse(mut self, inverse: bool) -> Self {
        self.compute_inverse = inverse;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let steps = self.fixed_iterations.unwrap_or(self.maximum_iterations);
        if steps > 64 {
            return Err(RegistrationError::invalid_configuration(format!(
                "Too many squaring steps: {}",
                steps
            )));
        }
        Ok(())
    }
}

/// Smallest `N` with `max_norm / 2^N <= 0.5` voxel, capped at `maximum`.
///
/// `max_norm` is in physical units; one voxel is the smallest spacing.
pub fn squaring_steps(max_norm: f64, min_spacing: f64, maximum: usize) -> usize {
    let mut norm = max_norm / min_spacing;
    let mut steps = 0;
    while norm > MAX_STEP_DISPLACEMENT && steps < maximum {
        norm /= 2.0;
        steps += 1;
    }
    steps
}

/// Reusable exponential operator for one grid.
#[derive(Debug, Clone)]
pub struct FieldExponentiator<B: Backend, const D: usize> {
    config: ExponentialConfig,
    warper: FieldWarper<B, D>,
}

impl<B: Backend, const D: usize> FieldExponentiator<B, D> {
    pub fn new(grid: &Grid<D>, config: ExponentialConfig, device: &B::Device) -> Self {
        Self {
            config,
            warper: FieldWarper::new(grid, device),
        }
    }

    pub fn config(&self) -> &ExponentialConfig {
        &self.config
    }

    /// Number of squarings used for `velocity`.
    pub fn steps_for(&self, velocity: &VectorField<B, D>) -> usize {
        match self.config.fixed_iterations {
            Some(steps) => steps,
            None => squaring_steps(
                velocity.max_norm(),
                velocity.grid().spacing().min_spacing(),
                self.config.maximum_iterations,
            ),
        }
    }

    /// `exp(v)`, or `exp(-v)` when the config asks for the inverse.
    pub fn exp(&self, velocity: &VectorField<B, D>) -> Result<VectorField<B, D>> {
        let steps = self.steps_for(velocity);
        self.exp_with_steps(velocity, steps)
    }

    /// `exp(v)` with an explicit number of squarings.
    pub fn exp_with_steps(&self, velocity: &VectorField<B, D>, steps: usize) -> Result<VectorField<B, D>> {
        self.warper.grid().ensure_matches(velocity.grid())?;

        let sign = if self.config.compute_inverse { -1.0 } else { 1.0 };
        let mut phi = velocity.scale(sign / 2f64.powi(steps as i32));

        for step in 0..steps {
            phi = self.warper.compose(&phi, &phi)?;
            tracing::trace!(step, "squaring step");
        }
        Ok(phi)
    }
}

/// `exp(v)` with the given configuration.
pub fn exponential<B: Backend, const D: usize>(
    velocity: &VectorField<B, D>,
    config: &ExponentialConfig,
) -> Result<VectorField<B, D>> {
    config.validate()?;
    FieldExponentiator::new(velocity.grid(), config.clone(), &velocity.device()).exp(velocity)
}
