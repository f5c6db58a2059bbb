//! Logarithm map: recover a velocity field from a displacement field.
//!
//! Fixed-point iteration `v ← BCH(v, φ − exp(v))` starting from zero or a
//! caller-supplied seed.

use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};
use svf_core::filter::GaussianFilter;
use svf_core::VectorField;
use crate::error::Result;
use crate::svf::bch::BchComposer;
use crate::svf::exponential::{ExponentialConfig, FieldExponentiator};
use crate::validation::{validate_iterations, validate_tolerance};

/// Configuration of the logarithm map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogarithmConfig {
    /// Iteration budget.
    pub iterations: usize,
    /// Squarings per internal exponential; `None` chooses automatically.
    pub exponential_steps: Option<usize>,
    /// Terms of the BCH series used for the update.
    pub bch_terms: usize,
    /// Smooth the velocity estimate after each iteration.
    pub smoothing: Option<GaussianFilter>,
    /// Stop once the RMS residual falls below this value.
    pub tolerance: Option<f64>,
}

impl Default for LogarithmConfig {
    fn default() -> Self {
        Self {
            iterations: 5,
            exponential_steps: None,
            bch_terms: 2,
            smoothing: None,
            tolerance: None,
        }
    }
}

impl LogarithmConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_exponential_steps(mut self, steps: usize) -> Self {
        self.exponential_steps = Some(steps);
        self
    }

    pub fn with_bch_terms(mut self, terms: usize) -> Self {
        self.bch_terms = terms;
        self
    }

    pub fn with_smoothing(mut self, filter: GaussianFilter) -> Self {
        self.smoothing = Some(filter);
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = Some(tolerance);
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_iterations(self.iterations)?;
        validate_tolerance(self.tolerance)?;
        BchComposer::new(self.bch_terms)?;
        Ok(())
    }

    fn exponential_config(&self) -> ExponentialConfig {
        match self.exponential_steps {
            Some(steps) => ExponentialConfig::default().with_fixed_iterations(steps),
            None => ExponentialConfig::default(),
        }
    }
}

/// Result of [`logarithm`].
#[derive(Debug, Clone)]
pub struct LogarithmOutput<B: Backend, const D: usize> {
    pub velocity: VectorField<B, D>,
    /// Iterations actually performed.
    pub iterations: usize,
    /// RMS of `φ − exp(v)` at the last evaluation.
    pub residual_rms: f64,
    /// Completed fraction of the iteration budget.
    pub progress: f64,
}

/// Velocity field `v` with `exp(v) ≈ displacement`.
pub fn logarithm<B: Backend, const D: usize>(
    displacement: &VectorField<B, D>,
    config: &LogarithmConfig,
) -> Result<LogarithmOutput<B, D>> {
    logarithm_with_seed(displacement, None, config)
}

/// [`logarithm`] starting from `seed` instead of the zero field.
pub fn logarithm_with_seed<B: Backend, const D: usize>(
    displacement: &VectorField<B, D>,
    seed: Option<&VectorField<B, D>>,
    config: &LogarithmConfig,
) -> Result<LogarithmOutput<B, D>> {
    config.validate()?;
    let composer = BchComposer::new(config.bch_terms)?;
    let device = displacement.device();
    let exponentiator = FieldExponentiator::new(displacement.grid(), config.exponential_config(), &device);

    let mut velocity = match seed {
        Some(seed) => {
            displacement.ensure_same_grid(seed)?;
            seed.clone()
        }
        None => VectorField::zeros(displacement.grid(), &device),
    };

    let mut residual_rms = f64::INFINITY;
    let mut iterations = 0;
    while iterations < config.iterations {
        let current = exponentiator.exp(&velocity)?;
        let residual = displacement.sub(&current)?;
        residual_rms = residual.rms();

        if config.tolerance.is_some_and(|tol| residual_rms < tol) {
            tracing::debug!(iterations, residual_rms, "logarithm converged");
            break;
        }

        velocity = composer.compose(&velocity, &residual)?;
        if let Some(filter) = &config.smoothing {
            velocity = filter.smooth_field(&velocity);
        }

        iterations += 1;
        tracing::debug!(
            iteration = iterations,
            progress = iterations as f64 / config.iterations as f64,
            residual_rms,
            "logarithm iteration"
        );
    }

    Ok(LogarithmOutput {
        velocity,
        iterations,
        residual_rms,
        progress: iterations as f64 / config.iterations as f64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Tensor;
    use burn_ndarray::NdArray;
    use svf_core::Grid;

    type Backend = NdArray<f32>;

    #[test]
    fn test_logarithm_of_translation() {
        let device = Default::default();
        let grid = Grid::<2>::with_size([8, 8]);
        let phi = VectorField::<Backend, 2>::from_components(
            grid.clone(),
            vec![
                Tensor::ones([8, 8], &device).mul_scalar(0.75),
                Tensor::zeros([8, 8], &device),
            ],
        )
        .unwrap();

        let output = logarithm(&phi, &LogarithmConfig::default().with_iterations(3)).unwrap();
        assert_eq!(output.iterations, 3);
        assert!((output.progress - 1.0).abs() < 1e-12);
        assert!(output.velocity.rms_difference(&phi).unwrap() < 1e-5);
    }

    #[test]
    fn test_tolerance_stops_early() {
        let device = Default::default();
        let grid = Grid::<2>::with_size([8, 8]);
        let zero = VectorField::<Backend, 2>::zeros(&grid, &device);

        let config = LogarithmConfig::default().with_iterations(10).with_tolerance(1e-6);
        let output = logarithm(&zero, &config).unwrap();
        assert_eq!(output.iterations, 0);
        assert_eq!(output.residual_rms, 0.0);
        assert_eq!(output.progress, 0.0);
    }

    #[test]
    fn test_rejects_unsupported_terms() {
        let device = Default::default();
        let grid = Grid::<2>::with_size([4, 4]);
        let zero = VectorField::<Backend, 2>::zeros(&grid, &device);
        assert!(logarithm(&zero, &LogarithmConfig::default().with_bch_terms(7)).is_err());
    }
}
