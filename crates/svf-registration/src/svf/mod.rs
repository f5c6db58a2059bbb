//! Lie-group maps on stationary velocity fields.
//!
//! - [`exponential`]: scaling and squaring, velocity to displacement.
//! - [`logarithm`]: fixed-point inverse of the exponential.
//! - [`bch`]: Baker–Campbell–Hausdorff composition of velocity fields.
//! - [`transport`]: Schild's-ladder transport of a velocity field.

pub mod exponential;
pub mod logarithm;
pub mod bch;
pub mod transport;

pub use exponential::{exponential, squaring_steps, ExponentialConfig, FieldExponentiator};
pub use logarithm::{logarithm, LogarithmConfig, LogarithmOutput};
pub use bch::{ApproximationOrder, BchComposer, BchMode, SchildsLadderBch};
pub use transport::{transport_velocity_field, SchildsLadderTransport};
