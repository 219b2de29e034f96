//! saferoll-core: shared building blocks for SafeRoll.
//!
//! Holds the fixed ring catalog, the domain records that flow between the
//! health window, the policy engine and the rollout store, the injectable
//! clock, and the TOML configuration with its reference defaults.

pub mod clock;
pub mod config;
pub mod error;
pub mod ring;
pub mod types;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::SaferollConfig;
pub use error::{ConfigError, CoreError, CoreResult};
pub use ring::Ring;
pub use types::*;
