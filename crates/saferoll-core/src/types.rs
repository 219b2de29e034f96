//! Domain records shared across SafeRoll crates.
//!
//! Closed label sets (rollout state, decision kind) are exhaustive enums so
//! every transition point is checked by the compiler.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ring::Ring;

/// Opaque rollout identifier (`r-` followed by eight hex digits).
pub type RolloutId = String;

// ── Health ─────────────────────────────────────────────────────────

/// Device health payload reported on every check-in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthSample {
    pub boot_ok: bool,
    /// Crash-free fraction in `[0, 1]`.
    pub crash_free: f64,
    pub checkin_ms: u64,
}

/// The three window statistics embedded in every decision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub boot_success: f64,
    pub crash_free_median: f64,
    pub checkin_ms_median: f64,
}

// ── Rollout ────────────────────────────────────────────────────────

/// Lifecycle state of a rollout. `Completed` is terminal for promotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RolloutState {
    Active,
    Paused,
    Completed,
}

impl RolloutState {
    pub const ALL: [RolloutState; 3] = [
        RolloutState::Active,
        RolloutState::Paused,
        RolloutState::Completed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RolloutState::Active => "active",
            RolloutState::Paused => "paused",
            RolloutState::Completed => "completed",
        }
    }
}

impl fmt::Display for RolloutState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a rollout, as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rollout {
    pub rollout_id: RolloutId,
    pub target_version: String,
    /// Version restored on rollback.
    pub last_known_good: String,
    pub state: RolloutState,
    pub ring_index: usize,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_promote_ts: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_pause_ts: Option<DateTime<Utc>>,
}

/// A rollout together with its bounded decision history, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolloutDetail {
    pub rollout: Rollout,
    pub decisions: Vec<Decision>,
}

// ── Decisions ──────────────────────────────────────────────────────

/// Outcome class of a gating evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionKind {
    Promote,
    Pause,
    Rollback,
    AdviseNo,
}

impl DecisionKind {
    pub const ALL: [DecisionKind; 4] = [
        DecisionKind::Promote,
        DecisionKind::Pause,
        DecisionKind::Rollback,
        DecisionKind::AdviseNo,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DecisionKind::Promote => "PROMOTE",
            DecisionKind::Pause => "PAUSE",
            DecisionKind::Rollback => "ROLLBACK",
            DecisionKind::AdviseNo => "ADVISE_NO",
        }
    }
}

impl fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable audit record of a gating outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub ts: DateTime<Utc>,
    pub kind: DecisionKind,
    pub reason: String,
    /// Ring label the decision refers to.
    pub ring: Ring,
    pub snapshot: MetricsSnapshot,
}
