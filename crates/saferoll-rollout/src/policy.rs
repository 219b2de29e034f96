//! Policy engine: turns window metrics into a gating outcome.
//!
//! Two independent tiers of thresholds apply. Warn-tier breaches come from
//! the health window and pause a rollout; the stricter critical tier forces
//! a rollback. Neither is derived from the other.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use saferoll_core::config::RollbackThresholds;
use saferoll_core::{Decision, DecisionKind, Ring, RolloutState, SaferollConfig};
use saferoll_health::{Breach, WindowMetrics};
use saferoll_state::{RolloutTxn, StoreResult};

/// Result of evaluating one rollout against its ring's window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub metrics: WindowMetrics,
    pub can_promote: bool,
    pub breaches: Vec<Breach>,
    pub auto_rollback: bool,
    pub cooldown_ready: bool,
}

/// Stateless gate evaluation. Holds only thresholds.
#[derive(Debug, Clone)]
pub struct PolicyEngine {
    promote_cooldown_secs: u64,
    critical: RollbackThresholds,
}

impl PolicyEngine {
    pub fn new(config: &SaferollConfig) -> Self {
        Self {
            promote_cooldown_secs: config.policy.promote_cooldown_secs,
            critical: config.rollback.clone(),
        }
    }

    pub fn promote_cooldown_secs(&self) -> u64 {
        self.promote_cooldown_secs
    }

    /// Evaluate the rollout held by `txn` as of `now`.
    ///
    /// Resolves the rollout's ring, aggregates that ring's window and
    /// checks the promote cooldown. Mutates nothing.
    pub fn evaluate(&self, txn: &RolloutTxn<'_>, now: DateTime<Utc>) -> StoreResult<Outcome> {
        let ring = txn.ring()?;
        let metrics = txn.ring_metrics(ring, now);
        let cooldown_ready = txn.promote_cooldown_ready(self.promote_cooldown_secs, now);
        Ok(self.assess(txn.state(), cooldown_ready, metrics))
    }

    /// Combine precomputed inputs into an outcome.
    pub fn assess(
        &self,
        state: RolloutState,
        cooldown_ready: bool,
        metrics: WindowMetrics,
    ) -> Outcome {
        let breaches = metrics.breaches.clone();
        let auto_rollback = self.needs_auto_rollback(&metrics);
        let can_promote = cooldown_ready && breaches.is_empty() && state == RolloutState::Active;
        Outcome {
            metrics,
            can_promote,
            breaches,
            auto_rollback,
            cooldown_ready,
        }
    }

    /// Critical tier: crash-free median or boot success below the rollback cutoffs.
    pub fn needs_auto_rollback(&self, metrics: &WindowMetrics) -> bool {
        metrics.crash_free_median < self.critical.crash_free_critical
            || metrics.boot_success < self.critical.boot_success_critical
    }

    /// Build a decision record stamped `ts` with the metrics snapshot.
    ///
    /// All decisions go through here so every audit record carries the
    /// same snapshot shape.
    pub fn build_decision(
        &self,
        kind: DecisionKind,
        reason: impl Into<String>,
        ring: Ring,
        metrics: &WindowMetrics,
        ts: DateTime<Utc>,
    ) -> Decision {
        Decision {
            ts,
            kind,
            reason: reason.into(),
            ring,
            snapshot: metrics.snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Duration;
    use saferoll_core::{HealthSample, ManualClock};
    use saferoll_state::RolloutStore;

    fn t0() -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + Duration::days(20_000)
    }

    fn setup() -> (RolloutStore, PolicyEngine, String) {
        let config = SaferollConfig::default();
        let store = RolloutStore::new(&config, Arc::new(ManualClock::new(t0())));
        let id = store.create_rollout("1.2.0", "1.1.0").rollout_id;
        (store, PolicyEngine::new(&config), id)
    }

    fn record_samples(store: &RolloutStore, ring: Ring, crash_free: f64, boot_ok: bool) {
        for _ in 0..10 {
            store.record_checkin(
                ring,
                HealthSample {
                    boot_ok,
                    crash_free,
                    checkin_ms: 100,
                },
                &t0().to_rfc3339(),
            );
        }
    }

    fn evaluate(store: &RolloutStore, policy: &PolicyEngine, id: &str) -> Outcome {
        store
            .with_rollout(id, |txn| policy.evaluate(txn, t0()))
            .unwrap()
    }

    #[test]
    fn green_window_can_promote() {
        let (store, policy, id) = setup();
        record_samples(&store, Ring::Pilot, 0.999, true);

        let outcome = evaluate(&store, &policy, &id);
        assert!(outcome.can_promote);
        assert!(outcome.breaches.is_empty());
        assert!(!outcome.auto_rollback);
        assert_eq!(outcome.metrics.total, 10);
    }

    #[test]
    fn crash_free_below_gate_blocks_promotion() {
        let (store, policy, id) = setup();
        record_samples(&store, Ring::Pilot, 0.985, true);

        let outcome = evaluate(&store, &policy, &id);
        assert!(!outcome.can_promote);
        assert_eq!(outcome.breaches, vec![Breach::CrashFreeMedian]);
        assert!(!outcome.auto_rollback);
    }

    #[test]
    fn critical_crash_rate_forces_rollback() {
        let (store, policy, id) = setup();
        record_samples(&store, Ring::Pilot, 0.94, true);

        let outcome = evaluate(&store, &policy, &id);
        assert!(outcome.auto_rollback);
        assert!(outcome.breaches.contains(&Breach::CrashFreeMedian));
    }

    #[test]
    fn critical_boot_rate_forces_rollback() {
        let (store, policy, id) = setup();
        record_samples(&store, Ring::Pilot, 0.999, false);

        let outcome = evaluate(&store, &policy, &id);
        assert!(outcome.auto_rollback);
        assert_eq!(outcome.breaches, vec![Breach::BootSuccessRate]);
    }

    #[test]
    fn cooldown_blocks_double_promote() {
        let (store, policy, id) = setup();
        record_samples(&store, Ring::Pilot, 0.999, true);
        let earlier = policy.build_decision(
            DecisionKind::Promote,
            "SLO gates passing",
            Ring::Pilot,
            &WindowMetrics::permissive(),
            t0() - Duration::seconds(30),
        );
        store.append_event(&id, earlier, true).unwrap();

        let outcome = evaluate(&store, &policy, &id);
        assert!(!outcome.can_promote);
        assert!(!outcome.cooldown_ready);
        assert!(outcome.breaches.is_empty());
        assert!(!outcome.auto_rollback);
    }

    #[test]
    fn window_of_other_ring_is_ignored() {
        let (store, policy, id) = setup();
        record_samples(&store, Ring::Five, 0.5, false);

        let outcome = evaluate(&store, &policy, &id);
        assert!(outcome.can_promote);
        assert_eq!(outcome.metrics.total, 0);
    }

    #[test]
    fn paused_rollout_cannot_promote() {
        let policy = PolicyEngine::new(&SaferollConfig::default());
        let outcome = policy.assess(RolloutState::Paused, true, WindowMetrics::permissive());
        assert!(!outcome.can_promote);
        assert!(!outcome.auto_rollback);
    }

    #[test]
    fn build_decision_embeds_snapshot() {
        let policy = PolicyEngine::new(&SaferollConfig::default());
        let metrics = WindowMetrics {
            total: 4,
            boot_success: 0.75,
            crash_free_median: 0.98,
            checkin_ms_median: 620.0,
            breaches: vec![Breach::BootSuccessRate],
        };
        let decision = policy.build_decision(DecisionKind::Pause, "hold", Ring::Five, &metrics, t0());
        assert_eq!(decision.ts, t0());
        assert_eq!(decision.ring, Ring::Five);
        assert_eq!(decision.snapshot, metrics.snapshot());
        assert_eq!(decision.reason, "hold");
    }
}
