//! saferoll-state: the rollout store for SafeRoll.
//!
//! The [`RolloutStore`] is the single owner of mutable state: rollout
//! records, each rollout's bounded decision history, the global decision
//! log, and the per-ring health windows. Nothing outside this crate writes
//! rollout fields directly.
//!
//! # Concurrency
//!
//! The store is `Clone` + `Send` + `Sync` (backed by `Arc`) and is built
//! once at process start. Every rollout record sits behind its own mutex;
//! multi-step read-evaluate-write sequences run inside
//! [`RolloutStore::with_rollout`], which holds that mutex for the whole
//! closure. Locks are always taken in the order rollout → health window →
//! event log.
//!
//! Nothing is persisted; state lives for the lifetime of the process.

pub mod error;
pub mod store;
pub mod timestamp;

pub use error::{StoreError, StoreResult};
pub use store::{DecisionCounts, RolloutStore, RolloutTxn, StoreSnapshot};
pub use timestamp::parse_timestamp;
