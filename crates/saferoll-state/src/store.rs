//! RolloutStore: in-memory state for SafeRoll.
//!
//! Provides the named mutation operations over rollouts, the bounded
//! per-rollout decision history, the global decision log, and the per-ring
//! health windows. All timestamps come from the injected clock.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use saferoll_core::config::StoreConfig;
use saferoll_core::{
    Decision, DecisionKind, HealthSample, Ring, Rollout, RolloutDetail, RolloutId, RolloutState,
    SaferollConfig, SharedClock, SystemClock,
};
use saferoll_health::{RingWindows, WindowMetrics};

use crate::error::{StoreError, StoreResult};
use crate::timestamp::parse_timestamp;

// Every critical section below leaves its data consistent, so a poisoned
// lock still guards valid state.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(l: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    l.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(l: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    l.write().unwrap_or_else(PoisonError::into_inner)
}

/// Authoritative mutable record for one rollout.
#[derive(Debug)]
struct RolloutRecord {
    id: RolloutId,
    target_version: String,
    last_known_good: String,
    state: RolloutState,
    ring_index: usize,
    created_at: DateTime<Utc>,
    last_promote_ts: Option<DateTime<Utc>>,
    last_pause_ts: Option<DateTime<Utc>>,
    decisions: VecDeque<Decision>,
}

impl RolloutRecord {
    fn to_rollout(&self) -> Rollout {
        Rollout {
            rollout_id: self.id.clone(),
            target_version: self.target_version.clone(),
            last_known_good: self.last_known_good.clone(),
            state: self.state,
            ring_index: self.ring_index,
            created_at: self.created_at,
            last_promote_ts: self.last_promote_ts,
            last_pause_ts: self.last_pause_ts,
        }
    }
}

/// Rollouts in creation order.
#[derive(Debug, Default)]
struct RolloutTable {
    by_id: HashMap<RolloutId, Arc<Mutex<RolloutRecord>>>,
    order: Vec<RolloutId>,
}

/// Process-wide decision log, oldest evicted past capacity.
#[derive(Debug)]
struct EventLog {
    entries: VecDeque<Decision>,
    capacity: usize,
    evicted: u64,
}

impl EventLog {
    fn push(&mut self, decision: Decision) {
        self.entries.push_back(decision);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
            self.evicted += 1;
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    checkins: AtomicU64,
    timestamp_fallbacks: AtomicU64,
    decisions: [AtomicU64; DecisionKind::ALL.len()],
}

fn kind_slot(kind: DecisionKind) -> usize {
    match kind {
        DecisionKind::Promote => 0,
        DecisionKind::Pause => 1,
        DecisionKind::Rollback => 2,
        DecisionKind::AdviseNo => 3,
    }
}

#[derive(Debug)]
struct StoreInner {
    rollouts: RwLock<RolloutTable>,
    active: RwLock<Option<RolloutId>>,
    windows: RingWindows,
    events: Mutex<EventLog>,
    counters: Counters,
    config: StoreConfig,
    clock: SharedClock,
}

/// Decisions logged since process start, by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionCounts {
    pub promote: u64,
    pub pause: u64,
    pub rollback: u64,
    pub advise_no: u64,
}

impl DecisionCounts {
    pub fn get(&self, kind: DecisionKind) -> u64 {
        match kind {
            DecisionKind::Promote => self.promote,
            DecisionKind::Pause => self.pause,
            DecisionKind::Rollback => self.rollback,
            DecisionKind::AdviseNo => self.advise_no,
        }
    }
}

/// Lightweight debug view of the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub active_rollout_id: Option<RolloutId>,
    pub active_ring: Option<Ring>,
    pub rollouts: usize,
    pub events: usize,
    pub events_evicted: u64,
    pub checkins_total: u64,
    pub timestamp_fallbacks: u64,
    pub decisions: DecisionCounts,
}

/// Thread-safe rollout store.
#[derive(Clone, Debug)]
pub struct RolloutStore {
    inner: Arc<StoreInner>,
}

impl RolloutStore {
    /// Build a store from configuration, reading time from `clock`.
    pub fn new(config: &SaferollConfig, clock: SharedClock) -> Self {
        let inner = StoreInner {
            rollouts: RwLock::new(RolloutTable::default()),
            active: RwLock::new(None),
            windows: RingWindows::new(&config.window, config.gates.clone()),
            events: Mutex::new(EventLog {
                entries: VecDeque::new(),
                capacity: config.store.event_log_capacity.max(1),
                evicted: 0,
            }),
            counters: Counters::default(),
            config: config.store.clone(),
            clock,
        };
        debug!(
            window_secs = config.window.seconds,
            window_capacity = config.window.capacity,
            decision_history = config.store.decision_history,
            "rollout store created"
        );
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Store with reference defaults and the system clock.
    pub fn with_defaults() -> Self {
        Self::new(&SaferollConfig::default(), Arc::new(SystemClock))
    }

    /// Current time according to the store's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    /// Length of the health window in seconds.
    pub fn window_seconds(&self) -> u64 {
        self.inner.windows.window_seconds()
    }

    // ── Rollouts ───────────────────────────────────────────────────

    /// Create a rollout at the first ring and make it the active rollout.
    pub fn create_rollout(&self, target_version: &str, last_known_good: &str) -> Rollout {
        let now = self.now();
        let mut table = write(&self.inner.rollouts);
        let id = loop {
            let candidate = new_rollout_id();
            if !table.by_id.contains_key(&candidate) {
                break candidate;
            }
        };

        let record = RolloutRecord {
            id: id.clone(),
            target_version: target_version.to_string(),
            last_known_good: last_known_good.to_string(),
            state: RolloutState::Active,
            ring_index: 0,
            created_at: now,
            last_promote_ts: None,
            last_pause_ts: None,
            decisions: VecDeque::with_capacity(self.inner.config.decision_history),
        };
        let rollout = record.to_rollout();
        table
            .by_id
            .insert(id.clone(), Arc::new(Mutex::new(record)));
        table.order.push(id.clone());
        drop(table);

        *write(&self.inner.active) = Some(id.clone());
        info!(rollout_id = %id, %target_version, %last_known_good, "rollout created");
        rollout
    }

    /// All rollouts, in creation order.
    pub fn list_rollouts(&self) -> Vec<Rollout> {
        let slots: Vec<_> = {
            let table = read(&self.inner.rollouts);
            table
                .order
                .iter()
                .filter_map(|id| table.by_id.get(id).cloned())
                .collect()
        };
        slots.iter().map(|slot| lock(slot).to_rollout()).collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        read(&self.inner.rollouts).by_id.contains_key(id)
    }

    pub fn get_rollout(&self, id: &str) -> StoreResult<Rollout> {
        let slot = self.slot(id)?;
        let record = lock(&slot);
        Ok(record.to_rollout())
    }

    /// A rollout together with its decision history, read under one lock.
    pub fn rollout_detail(&self, id: &str) -> StoreResult<RolloutDetail> {
        let slot = self.slot(id)?;
        let record = lock(&slot);
        Ok(RolloutDetail {
            rollout: record.to_rollout(),
            decisions: record.decisions.iter().cloned().collect(),
        })
    }

    /// The rollout's own bounded decision history, oldest first.
    pub fn rollout_decisions(&self, id: &str) -> StoreResult<Vec<Decision>> {
        let slot = self.slot(id)?;
        let record = lock(&slot);
        Ok(record.decisions.iter().cloned().collect())
    }

    pub fn active_rollout_id(&self) -> Option<RolloutId> {
        read(&self.inner.active).clone()
    }

    /// The rollout check-ins are evaluated against, if any.
    pub fn active_rollout(&self) -> Option<Rollout> {
        let id = self.active_rollout_id()?;
        self.get_rollout(&id).ok()
    }

    /// Repoint the active-rollout pointer.
    pub fn set_active_rollout(&self, id: &str) -> StoreResult<()> {
        if !self.contains(id) {
            return Err(StoreError::NotFound(id.to_string()));
        }
        *write(&self.inner.active) = Some(id.to_string());
        info!(rollout_id = %id, "active rollout changed");
        Ok(())
    }

    /// Run `f` with exclusive access to one rollout.
    ///
    /// The rollout's mutex is held for the whole closure, so an
    /// evaluate-then-mutate sequence cannot interleave with another one
    /// for the same rollout.
    pub fn with_rollout<T, E, F>(&self, id: &str, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut RolloutTxn<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        let slot = self.slot(id)?;
        let mut record = lock(&slot);
        let mut txn = RolloutTxn {
            record: &mut *record,
            inner: &self.inner,
        };
        f(&mut txn)
    }

    pub fn update_ring_index(&self, id: &str, index: usize) -> StoreResult<()> {
        self.with_rollout(id, |txn| {
            txn.update_ring_index(index);
            Ok(())
        })
    }

    pub fn update_state(&self, id: &str, state: RolloutState) -> StoreResult<()> {
        self.with_rollout(id, |txn| {
            txn.update_state(state);
            Ok(())
        })
    }

    pub fn update_target_version(&self, id: &str, target_version: &str) -> StoreResult<()> {
        self.with_rollout(id, |txn| {
            txn.update_target_version(target_version);
            Ok(())
        })
    }

    /// Whether at least `cooldown_secs` have elapsed since the last promotion.
    pub fn promote_cooldown_ready(
        &self,
        id: &str,
        cooldown_secs: u64,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        self.with_rollout(id, |txn| Ok(txn.promote_cooldown_ready(cooldown_secs, now)))
    }

    /// Log a decision. See [`RolloutTxn::append_event`].
    pub fn append_event(
        &self,
        id: &str,
        decision: Decision,
        include_in_history: bool,
    ) -> StoreResult<()> {
        self.with_rollout(id, |txn| {
            txn.append_event(decision, include_in_history);
            Ok(())
        })
    }

    // ── Health windows ─────────────────────────────────────────────

    /// Append a check-in sample to its ring's window.
    ///
    /// An unparseable `raw_ts` is not an error: the sample is stamped with
    /// the current time and the soft-fail is counted. Returns the stamp used.
    pub fn record_checkin(&self, ring: Ring, sample: HealthSample, raw_ts: &str) -> DateTime<Utc> {
        let now = self.now();
        let ts = match parse_timestamp(raw_ts) {
            Some(ts) => ts,
            None => {
                self.inner
                    .counters
                    .timestamp_fallbacks
                    .fetch_add(1, Ordering::Relaxed);
                warn!(%ring, raw_ts, "unparseable check-in timestamp, using current time");
                now
            }
        };
        self.inner.counters.checkins.fetch_add(1, Ordering::Relaxed);
        self.inner.windows.record(ring, sample, ts, now);
        ts
    }

    /// Window metrics for `ring` as of now.
    pub fn metrics_for_ring(&self, ring: Ring) -> WindowMetrics {
        self.metrics_for_ring_at(ring, self.now())
    }

    pub fn metrics_for_ring_at(&self, ring: Ring, now: DateTime<Utc>) -> WindowMetrics {
        self.inner.windows.aggregate(ring, now)
    }

    // ── Decision log ───────────────────────────────────────────────

    /// Copy of the global decision log, oldest first.
    pub fn events(&self) -> Vec<Decision> {
        lock(&self.inner.events).entries.iter().cloned().collect()
    }

    pub fn decision_counts(&self) -> DecisionCounts {
        let load = |kind| self.inner.counters.decisions[kind_slot(kind)].load(Ordering::Relaxed);
        DecisionCounts {
            promote: load(DecisionKind::Promote),
            pause: load(DecisionKind::Pause),
            rollback: load(DecisionKind::Rollback),
            advise_no: load(DecisionKind::AdviseNo),
        }
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        let active = self.active_rollout();
        let active_ring = active
            .as_ref()
            .and_then(|rollout| Ring::at(rollout.ring_index).ok());
        let (events, events_evicted) = {
            let log = lock(&self.inner.events);
            (log.entries.len(), log.evicted)
        };
        StoreSnapshot {
            active_rollout_id: active.map(|rollout| rollout.rollout_id),
            active_ring,
            rollouts: read(&self.inner.rollouts).order.len(),
            events,
            events_evicted,
            checkins_total: self.inner.counters.checkins.load(Ordering::Relaxed),
            timestamp_fallbacks: self
                .inner
                .counters
                .timestamp_fallbacks
                .load(Ordering::Relaxed),
            decisions: self.decision_counts(),
        }
    }

    fn slot(&self, id: &str) -> StoreResult<Arc<Mutex<RolloutRecord>>> {
        read(&self.inner.rollouts)
            .by_id
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}

/// Exclusive handle on one rollout, valid for the duration of
/// [`RolloutStore::with_rollout`].
pub struct RolloutTxn<'a> {
    record: &'a mut RolloutRecord,
    inner: &'a StoreInner,
}

impl RolloutTxn<'_> {
    pub fn id(&self) -> &str {
        &self.record.id
    }

    pub fn rollout(&self) -> Rollout {
        self.record.to_rollout()
    }

    pub fn state(&self) -> RolloutState {
        self.record.state
    }

    pub fn ring_index(&self) -> usize {
        self.record.ring_index
    }

    pub fn target_version(&self) -> &str {
        &self.record.target_version
    }

    pub fn last_known_good(&self) -> &str {
        &self.record.last_known_good
    }

    pub fn last_promote_ts(&self) -> Option<DateTime<Utc>> {
        self.record.last_promote_ts
    }

    /// The ring the rollout currently occupies.
    pub fn ring(&self) -> StoreResult<Ring> {
        Ok(Ring::at(self.record.ring_index)?)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    /// Window metrics for `ring` as of `now`.
    pub fn ring_metrics(&self, ring: Ring, now: DateTime<Utc>) -> WindowMetrics {
        self.inner.windows.aggregate(ring, now)
    }

    pub fn update_ring_index(&mut self, index: usize) {
        debug_assert!(index < Ring::COUNT, "ring index {index} out of range");
        self.record.ring_index = index;
    }

    pub fn update_state(&mut self, state: RolloutState) {
        self.record.state = state;
    }

    pub fn update_target_version(&mut self, target_version: &str) {
        self.record.target_version = target_version.to_string();
    }

    /// `true` if the rollout was never promoted or the last promotion is at
    /// least `cooldown_secs` old.
    pub fn promote_cooldown_ready(&self, cooldown_secs: u64, now: DateTime<Utc>) -> bool {
        match self.record.last_promote_ts {
            None => true,
            Some(last) => {
                let elapsed = (now - last).num_seconds();
                elapsed >= 0 && elapsed as u64 >= cooldown_secs
            }
        }
    }

    /// Log a decision.
    ///
    /// The global log always receives it. With `include_in_history` the
    /// rollout's bounded history receives it too, and a PROMOTE or PAUSE
    /// decision restarts the matching timestamp. Advisory evaluations pass
    /// `false` so they never influence later gate evaluations.
    pub fn append_event(&mut self, decision: Decision, include_in_history: bool) {
        if include_in_history {
            match decision.kind {
                DecisionKind::Promote => self.record.last_promote_ts = Some(decision.ts),
                DecisionKind::Pause => self.record.last_pause_ts = Some(decision.ts),
                DecisionKind::Rollback | DecisionKind::AdviseNo => {}
            }
            self.record.decisions.push_back(decision.clone());
            while self.record.decisions.len() > self.inner.config.decision_history {
                self.record.decisions.pop_front();
            }
        }

        self.inner.counters.decisions[kind_slot(decision.kind)].fetch_add(1, Ordering::Relaxed);
        debug!(
            rollout_id = %self.record.id,
            kind = %decision.kind,
            ring = %decision.ring,
            include_in_history,
            "decision logged"
        );
        lock(&self.inner.events).push(decision);
    }
}

fn new_rollout_id() -> RolloutId {
    let hex = Uuid::new_v4().simple().to_string();
    format!("r-{}", &hex[..8])
}
