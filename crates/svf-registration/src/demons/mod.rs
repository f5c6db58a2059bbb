//! Log-domain diffeomorphic demons registration.
//!
//! The loop keeps a stationary velocity field `v`, derives the current
//! displacement `exp(v)`, computes a demons update from the intensity mismatch
//! and folds it back into `v` with a truncated BCH series.

pub mod config;
pub mod force;
pub mod log_domain;
pub mod state;
mod symmetric;

pub use config::LogDomainDemonsConfig;
pub use force::{demons_force, DemonsForce, DemonsForceConfig, DemonsForceOutput, GradientType};
pub use log_domain::{DemonsVariant, LogDomainDemons};
pub use state::{RegistrationState, RegistrationStatus};
