//! The log-domain demons loop.

use std::sync::Arc;
use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};
use svf_core::filter::GaussianFilter;
use svf_core::{Image, VectorField};
use crate::demons::config::LogDomainDemonsConfig;
use crate::demons::force::DemonsForce;
use crate::demons::state::{RegistrationState, RegistrationStatus};
use crate::error::{RegistrationError, Result};
use crate::progress::{ProgressCallback, ProgressTracker, StopHandle};
use crate::svf::bch::BchComposer;
use crate::svf::exponential::{exponential, FieldExponentiator};
use crate::validation::{validate_field_grid, validate_image_pair};

/// Which update rule the loop applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DemonsVariant {
    /// `v ← BCH(v, u)` with `u` the forward force.
    #[default]
    Plain,
    /// `v ← ½(BCH(v, u_fwd) − BCH(−v, u_bwd))` with forward and backward forces.
    Symmetric,
}

/// Scratch state built once per [`LogDomainDemons::update`] call.
pub(crate) struct IterationContext<B: Backend, const D: usize> {
    pub(crate) moving: Image<B, D>,
    pub(crate) fixed: Image<B, D>,
    pub(crate) exponentiator: FieldExponentiator<B, D>,
    pub(crate) forward: DemonsForce<B, D>,
    pub(crate) backward: Option<DemonsForce<B, D>>,
    pub(crate) composer: BchComposer,
    pub(crate) update_smoother: Option<GaussianFilter>,
    pub(crate) velocity_smoother: Option<GaussianFilter>,
}

/// Outcome of one iteration.
pub(crate) struct IterationResult<B: Backend, const D: usize> {
    pub(crate) velocity: VectorField<B, D>,
    pub(crate) metric: f64,
    pub(crate) rms_change: f64,
}

impl<B: Backend, const D: usize> IterationContext<B, D> {
    fn new(config: &LogDomainDemonsConfig, variant: DemonsVariant, fixed: Image<B, D>, moving: Image<B, D>) -> Result<Self> {
        let device = fixed.device();
        let backward = match variant {
            DemonsVariant::Plain => None,
            DemonsVariant::Symmetric => Some(DemonsForce::new(config.force.clone(), &moving)?),
        };
        Ok(Self {
            exponentiator: FieldExponentiator::new(fixed.grid(), config.exponential.clone(), &device),
            forward: DemonsForce::new(config.force.clone(), &fixed)?,
            backward,
            composer: BchComposer::new(config.bch_terms)?,
            update_smoother: config.update_smoother(),
            velocity_smoother: config.velocity_smoother(),
            fixed,
            moving,
        })
    }

    pub(crate) fn smooth_update(&self, update: VectorField<B, D>) -> VectorField<B, D> {
        match &self.update_smoother {
            Some(filter) => filter.smooth_field(&update),
            None => update,
        }
    }

    pub(crate) fn smooth_velocity(&self, velocity: VectorField<B, D>) -> VectorField<B, D> {
        match &self.velocity_smoother {
            Some(filter) => filter.smooth_field(&velocity),
            None => velocity,
        }
    }

    /// exp(v) → force → smoothing → BCH → smoothing.
    fn plain_step(&self, velocity: &VectorField<B, D>) -> Result<IterationResult<B, D>> {
        let displacement = self.exponentiator.exp(velocity)?;
        let force = self.forward.compute(&self.moving, &displacement)?;
        let update = self.smooth_update(force.update);

        let composed = self.composer.compose(velocity, &update)?;
        let velocity = self.smooth_velocity(composed);
        ensure_finite(&velocity)?;

        Ok(IterationResult {
            velocity,
            metric: force.metric,
            rms_change: force.rms_change,
        })
    }
}

pub(crate) fn ensure_finite<B: Backend, const D: usize>(velocity: &VectorField<B, D>) -> Result<()> {
    if velocity.is_finite() {
        Ok(())
    } else {
        Err(RegistrationError::numeric_degenerate("velocity field is not finite"))
    }
}

/// Log-domain diffeomorphic demons registration.
///
/// Set the images, then call [`update`](Self::update). Once a run has ended
/// further calls are no-ops until an input or the iteration cap changes, in
/// which case iteration resumes from the current velocity. [`reset`](Self::reset)
/// discards the velocity and starts over.
///
/// # Examples
/// ```rust,no_run
/// use svf_registration::demons::{LogDomainDemons, LogDomainDemonsConfig};
/// # use svf_core::Image;
/// # use burn_ndarray::NdArray;
/// # fn images() -> (Image<NdArray<f32>, 2>, Image<NdArray<f32>, 2>) { unimplemented!() }
///
/// let (fixed, moving) = images();
/// let mut demons = LogDomainDemons::new(LogDomainDemonsConfig::default().with_iterations(50));
/// demons.set_fixed_image(fixed);
/// demons.set_moving_image(moving);
/// demons.update()?;
/// let displacement = demons.displacement_field()?;
/// # Ok::<(), svf_registration::RegistrationError>(())
/// ```
#[derive(Debug)]
pub struct LogDomainDemons<B: Backend, const D: usize> {
    config: LogDomainDemonsConfig,
    variant: DemonsVariant,
    fixed: Option<Image<B, D>>,
    moving: Option<Image<B, D>>,
    initial_velocity: Option<VectorField<B, D>>,
    velocity: Option<VectorField<B, D>>,
    state: RegistrationState,
    iteration: usize,
    metric: f64,
    rms_change: f64,
    modified: bool,
    failure: Option<RegistrationError>,
    stop: StopHandle,
    tracker: ProgressTracker,
}

impl<B: Backend, const D: usize> LogDomainDemons<B, D> {
    pub fn new(config: LogDomainDemonsConfig) -> Self {
        Self::with_variant(config, DemonsVariant::Plain)
    }

    /// Symmetric forward/backward variant.
    pub fn symmetric(config: LogDomainDemonsConfig) -> Self {
        Self::with_variant(config, DemonsVariant::Symmetric)
    }

    pub fn with_variant(config: LogDomainDemonsConfig, variant: DemonsVariant) -> Self {
        Self {
            config,
            variant,
            fixed: None,
            moving: None,
            initial_velocity: None,
            velocity: None,
            state: RegistrationState::Initialized,
            iteration: 0,
            metric: 0.0,
            rms_change: 0.0,
            modified: true,
            failure: None,
            stop: StopHandle::new(),
            tracker: ProgressTracker::new(),
        }
    }

    pub fn config(&self) -> &LogDomainDemonsConfig {
        &self.config
    }

    pub fn variant(&self) -> DemonsVariant {
        self.variant
    }

    pub fn set_config(&mut self, config: LogDomainDemonsConfig) {
        self.config = config;
        self.modified = true;
    }

    /// Change the iteration cap; a finished run resumes on the next update.
    pub fn set_number_of_iterations(&mut self, iterations: usize) {
        self.config.iterations = iterations;
        self.modified = true;
    }

    pub fn set_fixed_image(&mut self, image: Image<B, D>) {
        self.fixed = Some(image);
        self.modified = true;
    }

    pub fn set_moving_image(&mut self, image: Image<B, D>) {
        self.moving = Some(image);
        self.modified = true;
    }

    /// Starting velocity used when no estimate exists yet.
    pub fn set_initial_velocity_field(&mut self, velocity: VectorField<B, D>) {
        self.initial_velocity = Some(velocity);
        self.modified = true;
    }

    /// Handle that stops the loop at the next iteration boundary.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn stop_registration(&self) {
        self.stop.request_stop();
    }

    pub fn add_progress_callback(&mut self, callback: Arc<dyn ProgressCallback>) {
        self.tracker.add_callback(callback);
    }

    /// Discard the velocity estimate and counters.
    pub fn reset(&mut self) {
        self.velocity = None;
        self.iteration = 0;
        self.metric = 0.0;
        self.rms_change = 0.0;
        self.state = RegistrationState::Initialized;
        self.modified = true;
        self.failure = None;
        self.stop.clear();
    }

    pub fn state(&self) -> RegistrationState {
        self.state
    }

    pub fn elapsed_iterations(&self) -> usize {
        self.iteration
    }

    pub fn metric(&self) -> f64 {
        self.metric
    }

    pub fn rms_change(&self) -> f64 {
        self.rms_change
    }

    pub fn status(&self) -> RegistrationStatus {
        let progress = if self.config.iterations == 0 {
            1.0
        } else {
            (self.iteration as f64 / self.config.iterations as f64).min(1.0)
        };
        RegistrationStatus {
            state: self.state,
            elapsed_iterations: self.iteration,
            metric: self.metric,
            rms_change: self.rms_change,
            progress,
        }
    }

    /// Current velocity estimate, if any iteration or initial field exists.
    pub fn velocity_field(&self) -> Option<&VectorField<B, D>> {
        self.velocity.as_ref()
    }

    /// `exp(v)` of the current velocity.
    pub fn displacement_field(&self) -> Result<VectorField<B, D>> {
        exponential(self.current_velocity()?, &self.config.exponential.clone().with_compute_inverse(false))
    }

    /// `exp(-v)` of the current velocity.
    pub fn inverse_displacement_field(&self) -> Result<VectorField<B, D>> {
        exponential(self.current_velocity()?, &self.config.exponential.clone().with_compute_inverse(true))
    }

    fn current_velocity(&self) -> Result<&VectorField<B, D>> {
        self.velocity
            .as_ref()
            .ok_or_else(|| RegistrationError::invalid_input("no velocity field has been computed"))
    }

    /// Run the loop until a terminal state.
    ///
    /// After a failed run, calling this again without changing anything
    /// returns the same error.
    pub fn update(&mut self) -> Result<()> {
        if self.state.is_terminal() && !self.modified {
            if let Some(err) = &self.failure {
                return Err(err.clone());
            }
            tracing::debug!(state = %self.state, "registration is up to date");
            return Ok(());
        }

        self.config.validate()?;
        let (fixed, moving) = validate_image_pair(self.fixed.as_ref(), self.moving.as_ref())?;
        let (fixed, moving) = (fixed.clone(), moving.clone());
        if let Some(initial) = &self.initial_velocity {
            validate_field_grid(&fixed, initial)?;
        }
        if let Some(current) = &self.velocity {
            validate_field_grid(&fixed, current)?;
        }

        let mut velocity = match (&self.velocity, &self.initial_velocity) {
            (Some(current), _) => current.clone(),
            (None, Some(initial)) => initial.clone(),
            (None, None) => VectorField::zeros(fixed.grid(), &fixed.device()),
        };
        self.velocity = Some(velocity.clone());

        let context = IterationContext::new(&self.config, self.variant, fixed, moving)?;

        if self.state.is_terminal() {
            self.stop.clear();
        }
        self.modified = false;
        self.failure = None;
        self.state = RegistrationState::Iterating;
        self.tracker.start();
        tracing::info!(
            variant = ?self.variant,
            start = self.iteration,
            iterations = self.config.iterations,
            "log-domain demons started"
        );

        loop {
            if self.stop.is_stop_requested() {
                self.state = RegistrationState::Cancelled;
                break;
            }
            if self.iteration >= self.config.iterations {
                self.state = RegistrationState::MaxIterationsReached;
                break;
            }

            let step = match self.variant {
                DemonsVariant::Plain => context.plain_step(&velocity),
                DemonsVariant::Symmetric => context.symmetric_step(&velocity),
            };

            match step {
                Ok(result) => {
                    velocity = result.velocity;
                    self.velocity = Some(velocity.clone());
                    self.iteration += 1;
                    self.metric = result.metric;
                    self.rms_change = result.rms_change;

                    tracing::debug!(
                        iteration = self.iteration,
                        metric = self.metric,
                        rms_change = self.rms_change,
                        "demons iteration"
                    );
                    self.tracker.update(self.iteration, Some(self.config.iterations), self.metric, self.rms_change);

                    if self
                        .config
                        .convergence_tolerance
                        .is_some_and(|tol| self.rms_change < tol)
                    {
                        self.state = RegistrationState::Converged;
                        break;
                    }
                }
                Err(err) => {
                    self.state = RegistrationState::Failed;
                    tracing::error!(iteration = self.iteration + 1, error = %err, "demons iteration failed");
                    self.tracker.error(&err.to_string());
                    self.failure = Some(err.clone());
                    return Err(err);
                }
            }
        }

        tracing::info!(
            state = %self.state,
            iterations = self.iteration,
            metric = self.metric,
            "log-domain demons finished"
        );
        self.tracker.complete(self.iteration, Some(self.config.iterations), self.metric, self.rms_change);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{HistoryCallback, ProgressInfo};
    use burn::tensor::{Shape, Tensor, TensorData};
    use std::sync::Mutex;
    use burn_ndarray::NdArray;
    use svf_core::spatial::{Direction, Point, Spacing};
    use svf_core::Grid;

    type Backend = NdArray<f32>;

    fn square(offset: usize) -> Image<Backend, 2> {
        let device = Default::default();
        let n = 24;
        let values: Vec<f32> = (0..n * n)
            .map(|i| {
                let (y, x) = (i / n, i % n);
                if (8 + offset..16 + offset).contains(&x) && (8..16).contains(&y) { 100.0 } else { 0.0 }
            })
            .collect();
        let data = Tensor::from_data(TensorData::new(values, Shape::new([n, n])), &device);
        Image::new(data, Point::origin(), Spacing::uniform(1.0), Direction::identity())
    }

    fn demons(iterations: usize) -> LogDomainDemons<Backend, 2> {
        let config = LogDomainDemonsConfig::default()
            .with_iterations(iterations)
            .with_maximum_update_step_length(2.0);
        let mut demons = LogDomainDemons::new(config);
        demons.set_fixed_image(square(0));
        demons.set_moving_image(square(1));
        demons
    }

    #[test]
    fn test_missing_inputs() {
        let mut demons = LogDomainDemons::<Backend, 2>::new(LogDomainDemonsConfig::default());
        demons.set_fixed_image(square(0));
        assert!(matches!(demons.update(), Err(RegistrationError::InvalidInput(_))));
        assert!(demons.velocity_field().is_none());
        assert_eq!(demons.state(), RegistrationState::Initialized);
        assert!(demons.displacement_field().is_err());
    }

    #[test]
    fn test_runs_to_iteration_cap_and_is_idempotent() {
        let history = Arc::new(HistoryCallback::new());
        let mut demons = demons(3);
        demons.add_progress_callback(history.clone());

        demons.update().unwrap();
        assert_eq!(demons.state(), RegistrationState::MaxIterationsReached);
        assert_eq!(demons.elapsed_iterations(), 3);
        assert_eq!(history.get_history().len(), 3);
        let first = demons.velocity_field().unwrap().clone();

        demons.update().unwrap();
        assert_eq!(demons.elapsed_iterations(), 3);
        assert_eq!(history.get_history().len(), 3);
        assert!(demons.velocity_field().unwrap().rms_difference(&first).unwrap() < 1e-12);

        demons.set_number_of_iterations(5);
        demons.update().unwrap();
        assert_eq!(demons.elapsed_iterations(), 5);
        assert_eq!(history.get_history().len(), 5);
        assert_eq!(demons.status().progress, 1.0);

        demons.reset();
        assert!(demons.velocity_field().is_none());
        assert_eq!(demons.elapsed_iterations(), 0);
    }

    #[test]
    fn test_stop_before_update_cancels() {
        let mut demons = demons(10);
        demons.stop_registration();
        demons.update().unwrap();
        assert_eq!(demons.state(), RegistrationState::Cancelled);
        assert_eq!(demons.elapsed_iterations(), 0);
        assert!(demons.velocity_field().unwrap().max_norm() < 1e-12);
    }

    #[test]
    fn test_convergence_tolerance() {
        let config = LogDomainDemonsConfig::default()
            .with_iterations(50)
            .with_convergence_tolerance(1e3);
        let mut demons = LogDomainDemons::<Backend, 2>::new(config);
        demons.set_fixed_image(square(0));
        demons.set_moving_image(square(1));
        demons.update().unwrap();
        assert_eq!(demons.state(), RegistrationState::Converged);
        assert_eq!(demons.elapsed_iterations(), 1);
    }

    #[test]
    fn test_initial_velocity_grid_checked() {
        let device = Default::default();
        let mut demons = demons(2);
        demons.set_initial_velocity_field(VectorField::zeros(&Grid::with_size([5, 5]), &device));
        assert!(matches!(demons.update(), Err(RegistrationError::GridMismatch(_))));
        assert!(demons.velocity_field().is_none());
    }

    #[derive(Default)]
    struct ErrorLog {
        errors: Mutex<Vec<String>>,
    }

    impl ProgressCallback for ErrorLog {
        fn on_progress(&self, _info: &ProgressInfo) {}

        fn on_error(&self, error: &str) {
            self.errors.lock().unwrap().push(error.to_string());
        }
    }

    #[test]
    fn test_failed_iteration_keeps_last_velocity() {
        let log = Arc::new(ErrorLog::default());
        let mut demons = demons(2);
        demons.add_progress_callback(log.clone());
        demons.update().unwrap();
        let good = demons.velocity_field().unwrap().clone();
        assert!(good.max_norm() > 0.0);

        // A non-finite voxel poisons the next force evaluation.
        let device = Default::default();
        let n = 24;
        let mut values = vec![0.0f32; n * n];
        values[12 * n + 12] = f32::NAN;
        let data = Tensor::from_data(TensorData::new(values, Shape::new([n, n])), &device);
        demons.set_moving_image(Image::new(data, Point::origin(), Spacing::uniform(1.0), Direction::identity()));
        demons.set_number_of_iterations(4);

        let err = demons.update().unwrap_err();
        assert!(matches!(err, RegistrationError::NumericDegenerate(_)));
        assert_eq!(demons.state(), RegistrationState::Failed);
        assert_eq!(demons.elapsed_iterations(), 2);
        assert!(demons.velocity_field().unwrap().rms_difference(&good).unwrap() < 1e-12);
        assert_eq!(log.errors.lock().unwrap().len(), 1);

        // Retrying unchanged inputs reports the same failure instead of success.
        assert_eq!(demons.update().unwrap_err(), err);
        assert_eq!(demons.state(), RegistrationState::Failed);
        assert_eq!(log.errors.lock().unwrap().len(), 1);

        // A fixed input resumes from the kept velocity.
        demons.set_moving_image(square(1));
        demons.update().unwrap();
        assert_eq!(demons.state(), RegistrationState::MaxIterationsReached);
        assert_eq!(demons.elapsed_iterations(), 4);
    }
}
