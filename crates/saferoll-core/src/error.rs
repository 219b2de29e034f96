//! Error types for the core crate.

use thiserror::Error;

/// Result type alias for catalog lookups.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by the ring catalog.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A ring index outside `0..len`. Indicates a broken invariant upstream.
    #[error("ring index {index} out of range (catalog has {len} rings)")]
    OutOfRange { index: usize, len: usize },
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
