//! Rollout orchestrator: applies policy outcomes to the store.
//!
//! Every operation that evaluates and then mutates a rollout runs inside
//! [`RolloutStore::with_rollout`], so the check-in path and operator actions
//! on the same rollout are serialized.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use saferoll_core::config::CheckinConfig;
use saferoll_core::{
    DecisionKind, HealthSample, MetricsSnapshot, Ring, Rollout, RolloutId, RolloutState,
    SaferollConfig,
};
use saferoll_health::Breach;
use saferoll_state::{RolloutStore, RolloutTxn, StoreError};

use crate::error::{RolloutError, RolloutResult};
use crate::policy::{Outcome, PolicyEngine};

const REASON_AUTO_ROLLBACK: &str = "Auto-rollback: critical SLO breach";
const REASON_AUTO_PAUSE: &str = "Auto-pause: SLO breach";
const REASON_GATES_PASSING: &str = "SLO gates passing";
const REASON_COMPLETED: &str = "Rollout completed";
const REASON_MANUAL_PAUSE: &str = "Manual pause";
const REASON_MANUAL_ROLLBACK: &str = "Manual rollback";
const REASON_DENIED: &str = "SLO gates failing or cooldown active";

/// A device health report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkin {
    pub device_id: String,
    pub ring: Ring,
    pub sw_version: String,
    #[serde(default)]
    pub last_config: Option<String>,
    pub health: HealthSample,
    /// Raw client timestamp. Unparseable values fall back to the server clock.
    pub ts: String,
}

/// What the device should install, if anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateInstruction {
    pub target_version: Option<String>,
    pub config_delta: Option<String>,
}

/// Retry hints for the device's next check-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub backoff: String,
    pub max_retries: u32,
}

/// Transition applied automatically while handling a check-in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AutoAction {
    #[default]
    None,
    Paused,
    RolledBack,
}

/// Response to a check-in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckinAdvice {
    /// Active rollout at the time of the check-in, if any.
    pub rollout_id: Option<RolloutId>,
    pub apply: UpdateInstruction,
    pub next_check_seconds: u64,
    pub policy: RetryPolicy,
    #[serde(skip)]
    pub action: AutoAction,
}

/// Result of the advisory "should we promote?" query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromoteAdvice {
    pub decision: DecisionKind,
    pub reason: String,
    pub metrics: MetricsSnapshot,
    pub breaches: Vec<Breach>,
}

/// Window metrics for the ring the active rollout occupies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveMetrics {
    pub active_rollout_id: RolloutId,
    pub active_ring: Ring,
    pub window_seconds: u64,
    pub total: usize,
    pub boot_success: f64,
    pub crash_free_median: f64,
    pub checkin_ms_median: f64,
    pub breaches: Vec<Breach>,
}

/// Drives rollouts through the ring sequence.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    store: RolloutStore,
    policy: PolicyEngine,
    checkin: CheckinConfig,
}

impl Orchestrator {
    pub fn new(store: RolloutStore, config: &SaferollConfig) -> Self {
        Self {
            store,
            policy: PolicyEngine::new(config),
            checkin: config.checkin.clone(),
        }
    }

    pub fn store(&self) -> &RolloutStore {
        &self.store
    }

    pub fn policy(&self) -> &PolicyEngine {
        &self.policy
    }

    // ── Check-ins ──────────────────────────────────────────────────

    /// Ingest a check-in and, if it belongs to the active rollout's ring,
    /// run the automatic transition rule.
    pub fn handle_checkin(&self, checkin: &Checkin) -> RolloutResult<CheckinAdvice> {
        self.store
            .record_checkin(checkin.ring, checkin.health, &checkin.ts);
        debug!(
            device_id = %checkin.device_id,
            ring = %checkin.ring,
            sw_version = %checkin.sw_version,
            "check-in recorded"
        );

        let active_id = self.store.active_rollout_id();
        let (action, target_version) = match &active_id {
            Some(id) => self.store.with_rollout(id, |txn| {
                let action = if txn.ring()? == checkin.ring {
                    self.apply_automatic(txn)?
                } else {
                    AutoAction::None
                };
                Ok::<_, RolloutError>((action, txn.target_version().to_string()))
            })?,
            None => (AutoAction::None, checkin.sw_version.clone()),
        };

        let apply = UpdateInstruction {
            target_version: (target_version != checkin.sw_version).then_some(target_version),
            config_delta: None,
        };
        Ok(CheckinAdvice {
            rollout_id: active_id,
            apply,
            next_check_seconds: self.checkin.next_check_seconds,
            policy: RetryPolicy {
                backoff: self.checkin.backoff.clone(),
                max_retries: self.checkin.max_retries,
            },
            action,
        })
    }

    /// Automatic path: rollback dominates pause, clean windows do nothing.
    ///
    /// A completed rollout is terminal. A breach on a paused rollout is
    /// recorded again and refreshes its pause time.
    fn apply_automatic(&self, txn: &mut RolloutTxn<'_>) -> RolloutResult<AutoAction> {
        if txn.state() == RolloutState::Completed {
            return Ok(AutoAction::None);
        }
        let now = txn.now();
        let ring = txn.ring()?;
        let outcome = self.policy.evaluate(txn, now)?;

        if outcome.auto_rollback {
            warn!(
                rollout_id = %txn.id(),
                %ring,
                crash_free_median = outcome.metrics.crash_free_median,
                boot_success = outcome.metrics.boot_success,
                "critical SLO breach, rolling back"
            );
            self.roll_back(txn, ring, &outcome, REASON_AUTO_ROLLBACK);
            return Ok(AutoAction::RolledBack);
        }

        if !outcome.breaches.is_empty() {
            warn!(
                rollout_id = %txn.id(),
                %ring,
                breaches = ?outcome.breaches,
                "SLO breach, pausing rollout"
            );
            txn.update_state(RolloutState::Paused);
            let decision = self.policy.build_decision(
                DecisionKind::Pause,
                REASON_AUTO_PAUSE,
                ring,
                &outcome.metrics,
                now,
            );
            txn.append_event(decision, true);
            return Ok(AutoAction::Paused);
        }

        Ok(AutoAction::None)
    }

    // ── Operator actions ───────────────────────────────────────────

    /// Advance to the next ring, or complete the rollout at the last one.
    ///
    /// Denied unless gates pass, the cooldown has elapsed and the rollout
    /// is active.
    pub fn promote(&self, id: &str) -> RolloutResult<Rollout> {
        self.store.with_rollout(id, |txn| {
            let now = txn.now();
            let outcome = self.policy.evaluate(txn, now)?;
            if !outcome.can_promote {
                info!(
                    rollout_id = %id,
                    breaches = ?outcome.breaches,
                    cooldown_ready = outcome.cooldown_ready,
                    state = %txn.state(),
                    "promotion denied"
                );
                return Err(RolloutError::Denied {
                    rollout_id: id.to_string(),
                    reason: REASON_DENIED.to_string(),
                });
            }

            let current = txn.ring_index();
            let decision = match Ring::next_index(current) {
                Some(next) => {
                    txn.update_ring_index(next);
                    let ring = Ring::at(next).map_err(StoreError::from)?;
                    info!(rollout_id = %id, %ring, "rollout promoted");
                    self.policy.build_decision(
                        DecisionKind::Promote,
                        REASON_GATES_PASSING,
                        ring,
                        &outcome.metrics,
                        now,
                    )
                }
                None => {
                    txn.update_state(RolloutState::Completed);
                    let ring = txn.ring()?;
                    info!(rollout_id = %id, %ring, "rollout completed");
                    self.policy.build_decision(
                        DecisionKind::Promote,
                        REASON_COMPLETED,
                        ring,
                        &outcome.metrics,
                        now,
                    )
                }
            };
            txn.append_event(decision, true);
            Ok(txn.rollout())
        })
    }

    /// Pause unconditionally.
    pub fn pause(&self, id: &str, reason: Option<&str>) -> RolloutResult<Rollout> {
        self.store.with_rollout(id, |txn| {
            let now = txn.now();
            let ring = txn.ring()?;
            let metrics = txn.ring_metrics(ring, now);
            let reason = non_empty(reason).unwrap_or(REASON_MANUAL_PAUSE);

            txn.update_state(RolloutState::Paused);
            info!(rollout_id = %id, %ring, reason, "rollout paused");
            let decision =
                self.policy
                    .build_decision(DecisionKind::Pause, reason, ring, &metrics, now);
            txn.append_event(decision, true);
            Ok(txn.rollout())
        })
    }

    /// Roll back unconditionally: one ring back, target reset to the
    /// last known good version, state active.
    pub fn rollback(&self, id: &str, reason: Option<&str>) -> RolloutResult<Rollout> {
        self.store.with_rollout(id, |txn| {
            let now = txn.now();
            let ring = txn.ring()?;
            let outcome = self.policy.evaluate(txn, now)?;
            let reason = non_empty(reason).unwrap_or(REASON_MANUAL_ROLLBACK);
            info!(rollout_id = %id, %ring, reason, "rollout rolled back");
            self.roll_back(txn, ring, &outcome, reason);
            Ok(txn.rollout())
        })
    }

    /// Shared by the automatic and the manual path. The decision is stamped
    /// with the ring the rollout was in before stepping back.
    fn roll_back(&self, txn: &mut RolloutTxn<'_>, ring: Ring, outcome: &Outcome, reason: &str) {
        let now = txn.now();
        let last_known_good = txn.last_known_good().to_string();
        txn.update_target_version(&last_known_good);
        txn.update_ring_index(Ring::previous_index(txn.ring_index()));
        txn.update_state(RolloutState::Active);
        let decision =
            self.policy
                .build_decision(DecisionKind::Rollback, reason, ring, &outcome.metrics, now);
        txn.append_event(decision, true);
    }

    /// Dry run of the gate evaluation. Logged globally, never mutates the
    /// rollout or its history.
    pub fn should_promote(&self, id: &str) -> RolloutResult<PromoteAdvice> {
        self.store.with_rollout(id, |txn| {
            let now = txn.now();
            let ring = txn.ring()?;
            let outcome = self.policy.evaluate(txn, now)?;
            let (kind, reason) = advise(txn.state(), &outcome);
            debug!(rollout_id = %id, %ring, decision = %kind, %reason, "promotion advice");

            let decision =
                self.policy
                    .build_decision(kind, reason.clone(), ring, &outcome.metrics, now);
            txn.append_event(decision, false);
            Ok(PromoteAdvice {
                decision: kind,
                reason,
                metrics: outcome.metrics.snapshot(),
                breaches: outcome.breaches,
            })
        })
    }

    // ── Queries ────────────────────────────────────────────────────

    /// Metrics for the ring the active rollout currently occupies.
    pub fn current_metrics(&self) -> RolloutResult<ActiveMetrics> {
        let rollout = self
            .store
            .active_rollout()
            .ok_or(StoreError::NoActiveRollout)?;
        let ring = Ring::at(rollout.ring_index).map_err(StoreError::from)?;
        let metrics = self.store.metrics_for_ring(ring);
        Ok(ActiveMetrics {
            active_rollout_id: rollout.rollout_id,
            active_ring: ring,
            window_seconds: self.store.window_seconds(),
            total: metrics.total,
            boot_success: metrics.boot_success,
            crash_free_median: metrics.crash_free_median,
            checkin_ms_median: metrics.checkin_ms_median,
            breaches: metrics.breaches,
        })
    }
}

/// Priority: promote, then rollback, then pause, else advise no.
fn advise(state: RolloutState, outcome: &Outcome) -> (DecisionKind, String) {
    if outcome.can_promote {
        return (
            DecisionKind::Promote,
            "All SLO gates passing and cooldown satisfied".to_string(),
        );
    }
    if outcome.auto_rollback {
        return (
            DecisionKind::Rollback,
            "Critical thresholds breached".to_string(),
        );
    }
    if !outcome.breaches.is_empty() {
        let names: Vec<&str> = outcome.breaches.iter().map(|b| b.as_str()).collect();
        return (
            DecisionKind::Pause,
            format!("SLO breaches detected: {}", names.join(", ")),
        );
    }
    let reason = if outcome.cooldown_ready {
        format!("Rollout is {state}")
    } else {
        "Cooldown active".to_string()
    };
    (DecisionKind::AdviseNo, reason)
}

fn non_empty(reason: Option<&str>) -> Option<&str> {
    reason.map(str::trim).filter(|r| !r.is_empty())
}
