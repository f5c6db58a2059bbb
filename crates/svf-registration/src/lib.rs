//! Stationary velocity field registration.
//!
//! Exponential and logarithm maps between velocity and displacement fields,
//! Baker–Campbell–Hausdorff composition, Schild's-ladder transport and the
//! log-domain diffeomorphic demons loop.

pub mod error;
pub mod validation;
pub mod progress;
pub mod svf;
pub mod demons;

pub use error::{RegistrationError, Result};
pub use progress::{
    ConsoleProgressCallback, HistoryCallback, ProgressCallback, ProgressInfo, ProgressTracker,
    StopAtIterationCallback, StopHandle,
};
pub use svf::{
    exponential, logarithm, transport_velocity_field, ApproximationOrder, BchComposer, BchMode,
    ExponentialConfig, LogarithmConfig, LogarithmOutput, SchildsLadderBch, SchildsLadderTransport,
};
pub use demons::{
    DemonsForceConfig, DemonsVariant, GradientType, LogDomainDemons, LogDomainDemonsConfig,
    RegistrationState, RegistrationStatus,
};
