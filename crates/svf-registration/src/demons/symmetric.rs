//! Symmetric update rule.
//!
//! The forward force registers `M∘exp(v)` to `F`, the backward force registers
//! `F∘exp(−v)` to `M`. Both are folded in with BCH and averaged:
//! `v ← ½(BCH(v, u_fwd) − BCH(−v, u_bwd))`.

use burn::tensor::backend::Backend;
use svf_core::VectorField;
use crate::demons::log_domain::{ensure_finite, IterationContext, IterationResult};
use crate::error::{RegistrationError, Result};

impl<B: Backend, const D: usize> IterationContext<B, D> {
    pub(crate) fn symmetric_step(&self, velocity: &VectorField<B, D>) -> Result<IterationResult<B, D>> {
        let backward_force = self
            .backward
            .as_ref()
            .ok_or_else(|| RegistrationError::invalid_configuration("backward force not prepared"))?;

        let negated = velocity.neg();
        let forward_displacement = self.exponentiator.exp(velocity)?;
        let backward_displacement = self.exponentiator.exp(&negated)?;

        let forward = self.forward.compute(&self.moving, &forward_displacement)?;
        let backward = backward_force.compute(&self.fixed, &backward_displacement)?;

        let forward_update = self.smooth_update(forward.update);
        let backward_update = self.smooth_update(backward.update);

        let forward_velocity = self.composer.compose(velocity, &forward_update)?;
        let backward_velocity = self.composer.compose(&negated, &backward_update)?;
        let combined = forward_velocity.sub(&backward_velocity)?.scale(0.5);

        let velocity = self.smooth_velocity(combined);
        ensure_finite(&velocity)?;

        Ok(IterationResult {
            velocity,
            metric: 0.5 * (forward.metric + backward.metric),
            rms_change: 0.5 * (forward.rms_change + backward.rms_change),
        })
    }
}
