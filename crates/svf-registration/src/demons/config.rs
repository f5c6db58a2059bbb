use serde::{Deserialize, Serialize};
use svf_core::filter::GaussianFilter;
use crate::demons::force::{DemonsForceConfig, GradientType};
use crate::error::Result;
use crate::svf::bch::BchComposer;
use crate::svf::exponential::ExponentialConfig;
use crate::validation::{
    validate_iterations, validate_kernel_width, validate_maximum_error, validate_standard_deviation,
    validate_tolerance,
};

/// Configuration of the log-domain demons loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogDomainDemonsConfig {
    /// Iteration cap.
    pub iterations: usize,
    /// Smooth the velocity field after each composition.
    pub smooth_velocity_field: bool,
    /// Standard deviation of the velocity smoothing, physical units.
    pub velocity_standard_deviation: f64,
    /// Smooth the update field before composition.
    pub smooth_update_field: bool,
    /// Standard deviation of the update smoothing, physical units.
    pub update_standard_deviation: f64,
    /// Gaussian kernel truncation error shared by both smoothers.
    pub maximum_error: f64,
    /// Gaussian kernel width limit shared by both smoothers.
    pub maximum_kernel_width: usize,
    pub force: DemonsForceConfig,
    /// Terms of the BCH series used to fold updates into the velocity (2, 3 or 4).
    pub bch_terms: usize,
    pub exponential: ExponentialConfig,
    /// Stop as `Converged` once the RMS change falls below this value.
    pub convergence_tolerance: Option<f64>,
}

impl Default for LogDomainDemonsConfig {
    fn default() -> Self {
        Self {
            iterations: 10,
            smooth_velocity_field: true,
            velocity_standard_deviation: 1.0,
            smooth_update_field: false,
            update_standard_deviation: 1.0,
            maximum_error: 0.1,
            maximum_kernel_width: 30,
            force: DemonsForceConfig::default(),
            bch_terms: 2,
            exponential: ExponentialConfig::default(),
            convergence_tolerance: None,
        }
    }
}

impl LogDomainDemonsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Enable velocity smoothing with the given standard deviation.
    pub fn with_velocity_smoothing(mut self, sigma: f64) -> Self {
        self.smooth_velocity_field = true;
        self.velocity_standard_deviation = sigma;
        self
    }

    pub fn without_velocity_smoothing(mut self) -> Self {
        self.smooth_velocity_field = false;
        self
    }

    /// Enable update smoothing with the given standard deviation.
    pub fn with_update_smoothing(mut self, sigma: f64) -> Self {
        self.smooth_update_field = true;
        self.update_standard_deviation = sigma;
        self
    }

    pub fn without_update_smoothing(mut self) -> Self {
        self.smooth_update_field = false;
        self
    }

    pub fn with_maximum_error(mut self, maximum_error: f64) -> Self {
        self.maximum_error = maximum_error;
        self
    }

    pub fn with_maximum_kernel_width(mut self, width: usize) -> Self {
        self.maximum_kernel_width = width;
        self
    }

    pub fn with_force(mut self, force: DemonsForceConfig) -> Self {
        self.force = force;
        self
    }

    pub fn with_gradient_type(mut self, gradient_type: GradientType) -> Self {
        self.force.gradient_type = gradient_type;
        self
    }

    pub fn with_maximum_update_step_length(mut self, length: f64) -> Self {
        self.force.maximum_update_step_length = length;
        self
    }

    pub fn with_intensity_difference_threshold(mut self, threshold: f64) -> Self {
        self.force.intensity_difference_threshold = threshold;
        self
    }

    pub fn with_bch_terms(mut self, terms: usize) -> Self {
        self.bch_terms = terms;
        self
    }

    pub fn with_exponential(mut self, exponential: ExponentialConfig) -> Self {
        self.exponential = exponential;
        self
    }

    pub fn with_convergence_tolerance(mut self, tolerance: f64) -> Self {
        self.convergence_tolerance = Some(tolerance);
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_iterations(self.iterations)?;
        if self.smooth_velocity_field {
            validate_standard_deviation(self.velocity_standard_deviation)?;
        }
        if self.smooth_update_field {
            validate_standard_deviation(self.update_standard_deviation)?;
        }
        validate_maximum_error(self.maximum_error)?;
        validate_kernel_width(self.maximum_kernel_width)?;
        validate_tolerance(self.convergence_tolerance)?;
        self.force.validate()?;
        self.exponential.validate()?;
        BchComposer::new(self.bch_terms)?;
        Ok(())
    }

    fn smoother(&self, sigma: f64) -> GaussianFilter {
        GaussianFilter::uniform(sigma)
            .with_maximum_error(self.maximum_error)
            .with_max_kernel_width(self.maximum_kernel_width)
    }

    /// Filter applied to the velocity field, if enabled.
    pub fn velocity_smoother(&self) -> Option<GaussianFilter> {
        self.smooth_velocity_field
            .then(|| self.smoother(self.velocity_standard_deviation))
    }

    /// Filter applied to the update field, if enabled.
    pub fn update_smoother(&self) -> Option<GaussianFilter> {
        self.smooth_update_field
            .then(|| self.smoother(self.update_standard_deviation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RegistrationError;

    #[test]
    fn test_defaults() {
        let config = LogDomainDemonsConfig::default();
        assert_eq!(config.iterations, 10);
        assert!(config.smooth_velocity_field);
        assert!(!config.smooth_update_field);
        assert_eq!(config.bch_terms, 2);
        assert!(config.validate().is_ok());
        assert!(config.velocity_smoother().is_some());
        assert!(config.update_smoother().is_none());
    }

    #[test]
    fn test_builders() {
        let config = LogDomainDemonsConfig::new()
            .with_iterations(200)
            .with_velocity_smoothing(0.7)
            .with_update_smoothing(0.5)
            .with_maximum_error(0.08)
            .with_maximum_kernel_width(10)
            .with_maximum_update_step_length(2.0)
            .with_bch_terms(3);

        let smoother = config.velocity_smoother().unwrap();
        assert_eq!(smoother.sigmas(), &[0.7]);
        assert_eq!(smoother.maximum_error(), 0.08);
        assert_eq!(smoother.max_kernel_width(), 10);
        assert_eq!(config.update_smoother().unwrap().sigmas(), &[0.5]);
        assert_eq!(config.force.maximum_update_step_length, 2.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_failures() {
        assert!(matches!(
            LogDomainDemonsConfig::new().with_bch_terms(5).validate(),
            Err(RegistrationError::UnsupportedApproximationOrder { terms: 5 })
        ));
        assert!(LogDomainDemonsConfig::new().with_iterations(0).validate().is_err());
        assert!(LogDomainDemonsConfig::new().with_velocity_smoothing(0.0).validate().is_err());
        assert!(LogDomainDemonsConfig::new().with_maximum_error(1.5).validate().is_err());
        assert!(LogDomainDemonsConfig::new().with_maximum_update_step_length(-1.0).validate().is_err());
    }
}
