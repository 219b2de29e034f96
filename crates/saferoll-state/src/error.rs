//! Error types for the rollout store.

use thiserror::Error;

use saferoll_core::CoreError;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("rollout not found: {0}")]
    NotFound(String),

    #[error("no active rollout")]
    NoActiveRollout,

    #[error(transparent)]
    Ring(#[from] CoreError),
}
