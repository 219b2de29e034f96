//! SafeRoll ring rollouts: policy engine and transition orchestrator.
//!
//! This crate turns health-window statistics into gating decisions and
//! applies them to the rollout store. The same transition rules serve the
//! automatic check-in path and the operator actions.
//!
//! # Components
//!
//! - **`policy`**, pure evaluation of warn-tier breaches, critical-tier
//!   auto-rollback, promote cooldown, and decision construction
//! - **`controller`**, the orchestrator for check-in handling, promote,
//!   pause, rollback, and the advisory dry run

pub mod controller;
pub mod error;
pub mod policy;

pub use controller::{
    ActiveMetrics, AutoAction, Checkin, CheckinAdvice, Orchestrator, PromoteAdvice, RetryPolicy,
    UpdateInstruction,
};
pub use error::{RolloutError, RolloutResult};
pub use policy::{Outcome, PolicyEngine};
