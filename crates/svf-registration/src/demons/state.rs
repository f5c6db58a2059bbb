//! Registration loop states and status snapshots.

use serde::{Deserialize, Serialize};

/// Lifecycle of a registration loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RegistrationState {
    /// Inputs may be set; no iteration has run.
    #[default]
    Initialized,
    Iterating,
    /// The RMS change fell below the convergence tolerance.
    Converged,
    MaxIterationsReached,
    /// A stop was requested.
    Cancelled,
    /// An iteration raised an error; the last good velocity is kept.
    Failed,
}

impl RegistrationState {
    /// Whether the loop has stopped.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Converged | Self::MaxIterationsReached | Self::Cancelled | Self::Failed
        )
    }
}

impl std::fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Initialized => "initialized",
            Self::Iterating => "iterating",
            Self::Converged => "converged",
            Self::MaxIterationsReached => "maximum iterations reached",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Polled snapshot of a registration loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegistrationStatus {
    pub state: RegistrationState,
    pub elapsed_iterations: usize,
    /// Mean squared intensity difference of the last iteration.
    pub metric: f64,
    /// RMS norm of the last update field.
    pub rms_change: f64,
    /// `elapsed_iterations / iterations`, at most 1.
    pub progress: f64,
}
