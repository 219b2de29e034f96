//! Orchestrator error types.

use thiserror::Error;

use saferoll_state::StoreError;

/// Errors returned by orchestrator operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RolloutError {
    /// Promotion refused because gates are failing, the cooldown is
    /// running, or the rollout is not active. An expected outcome.
    #[error("promotion denied for {rollout_id}: {reason}")]
    Denied { rollout_id: String, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RolloutError {
    /// Whether the error refers to a missing rollout (or no active one).
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RolloutError::Store(StoreError::NotFound(_) | StoreError::NoActiveRollout)
        )
    }
}

pub type RolloutResult<T> = Result<T, RolloutError>;
