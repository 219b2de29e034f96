//! Time- and count-bounded health window.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use saferoll_core::config::{GateThresholds, WindowConfig};
use saferoll_core::{HealthSample, MetricsSnapshot, Ring};

/// A warn-tier SLO gate violated by the current window.
///
/// Declaration order is the order breaches are reported in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Breach {
    BootSuccessRate,
    CrashFreeMedian,
    CheckinMsMedian,
}

impl Breach {
    pub fn as_str(self) -> &'static str {
        match self {
            Breach::BootSuccessRate => "boot_success_rate",
            Breach::CrashFreeMedian => "crash_free_median",
            Breach::CheckinMsMedian => "checkin_ms_median",
        }
    }
}

impl fmt::Display for Breach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate statistics over one window. Computed on demand, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowMetrics {
    pub total: usize,
    pub boot_success: f64,
    pub crash_free_median: f64,
    pub checkin_ms_median: f64,
    pub breaches: Vec<Breach>,
}

impl WindowMetrics {
    /// Metrics reported for a window with no samples.
    ///
    /// Passes every gate, so a rollout with no traffic yet can promote.
    pub fn permissive() -> Self {
        Self {
            total: 0,
            boot_success: 1.0,
            crash_free_median: 1.0,
            checkin_ms_median: 0.0,
            breaches: Vec::new(),
        }
    }

    /// The projection embedded into decisions.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            boot_success: self.boot_success,
            crash_free_median: self.crash_free_median,
            checkin_ms_median: self.checkin_ms_median,
        }
    }

    /// Compute metrics for a set of samples against the warn-tier gates.
    pub fn compute<'a, I>(samples: I, gates: &GateThresholds) -> Self
    where
        I: IntoIterator<Item = &'a HealthSample>,
    {
        let mut total = 0usize;
        let mut booted = 0usize;
        let mut crash_free = Vec::new();
        let mut checkin_ms = Vec::new();

        for sample in samples {
            total += 1;
            if sample.boot_ok {
                booted += 1;
            }
            crash_free.push(sample.crash_free);
            checkin_ms.push(sample.checkin_ms as f64);
        }

        if total == 0 {
            return Self::permissive();
        }

        let boot_success = booted as f64 / total as f64;
        let crash_free_median = median(&mut crash_free);
        let checkin_ms_median = median(&mut checkin_ms);

        let mut breaches = Vec::new();
        if boot_success < gates.boot_success_min {
            breaches.push(Breach::BootSuccessRate);
        }
        if crash_free_median < gates.crash_free_min {
            breaches.push(Breach::CrashFreeMedian);
        }
        if checkin_ms_median > gates.checkin_ms_max {
            breaches.push(Breach::CheckinMsMedian);
        }

        Self {
            total,
            boot_success,
            crash_free_median,
            checkin_ms_median,
            breaches,
        }
    }
}

/// Median of `values`; mean of the two middle values for even counts.
///
/// Returns 0.0 for an empty slice. Reorders the slice.
pub fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_unstable_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Samples for a single ring, in arrival order.
#[derive(Debug)]
pub struct HealthWindow {
    samples: VecDeque<(DateTime<Utc>, HealthSample)>,
    capacity: usize,
    max_age: Duration,
}

impl HealthWindow {
    pub fn new(config: &WindowConfig) -> Self {
        Self {
            samples: VecDeque::with_capacity(config.capacity.min(1024)),
            capacity: config.capacity.max(1),
            max_age: i64::try_from(config.seconds)
                .ok()
                .and_then(Duration::try_seconds)
                .unwrap_or(Duration::MAX),
        }
    }

    /// Append a sample stamped `ts`, then enforce both bounds relative to `now`.
    pub fn record(&mut self, sample: HealthSample, ts: DateTime<Utc>, now: DateTime<Utc>) {
        self.samples.push_back((ts, sample));
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
        self.prune(now);
    }

    /// Drop entries from the front while the oldest is older than `now - max_age`.
    ///
    /// The window is ordered by arrival, not by timestamp; an old sample
    /// behind a newer one survives until it reaches the front.
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let Some(cutoff) = now.checked_sub_signed(self.max_age) else {
            return 0;
        };
        let mut dropped = 0;
        while let Some((ts, _)) = self.samples.front() {
            if *ts >= cutoff {
                break;
            }
            self.samples.pop_front();
            dropped += 1;
        }
        dropped
    }

    /// Prune, then compute metrics over what remains.
    pub fn aggregate(&mut self, now: DateTime<Utc>, gates: &GateThresholds) -> WindowMetrics {
        self.prune(now);
        WindowMetrics::compute(self.samples.iter().map(|(_, s)| s), gates)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// One health window per ring, each behind its own lock.
#[derive(Debug)]
pub struct RingWindows {
    windows: [Mutex<HealthWindow>; Ring::COUNT],
    gates: GateThresholds,
    window_seconds: u64,
}

impl RingWindows {
    pub fn new(window: &WindowConfig, gates: GateThresholds) -> Self {
        Self {
            windows: std::array::from_fn(|_| Mutex::new(HealthWindow::new(window))),
            gates,
            window_seconds: window.seconds,
        }
    }

    /// Length of the logical window in seconds.
    pub fn window_seconds(&self) -> u64 {
        self.window_seconds
    }

    pub fn gates(&self) -> &GateThresholds {
        &self.gates
    }

    /// Record a sample for `ring`.
    pub fn record(&self, ring: Ring, sample: HealthSample, ts: DateTime<Utc>, now: DateTime<Utc>) {
        let mut window = self.lock(ring);
        window.record(sample, ts, now);
        debug!(%ring, samples = window.len(), "health sample recorded");
    }

    /// Aggregate the window for `ring` as of `now`.
    pub fn aggregate(&self, ring: Ring, now: DateTime<Utc>) -> WindowMetrics {
        self.lock(ring).aggregate(now, &self.gates)
    }

    fn lock(&self, ring: Ring) -> std::sync::MutexGuard<'_, HealthWindow> {
        // Every critical section leaves the window consistent, so a
        // poisoned lock still guards valid data.
        self.windows[ring.index()]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(boot_ok: bool, crash_free: f64, checkin_ms: u64) -> HealthSample {
        HealthSample {
            boot_ok,
            crash_free,
            checkin_ms,
        }
    }

    fn t0() -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + Duration::days(20_000)
    }

    fn gates() -> GateThresholds {
        GateThresholds::default()
    }

    #[test]
    fn empty_window_is_permissive() {
        let mut window = HealthWindow::new(&WindowConfig::default());
        let metrics = window.aggregate(t0(), &gates());
        assert_eq!(metrics.total, 0);
        assert_eq!(metrics.boot_success, 1.0);
        assert_eq!(metrics.crash_free_median, 1.0);
        assert_eq!(metrics.checkin_ms_median, 0.0);
        assert!(metrics.breaches.is_empty());
    }

    #[test]
    fn clean_samples_have_no_breaches() {
        let mut window = HealthWindow::new(&WindowConfig::default());
        for _ in 0..10 {
            window.record(sample(true, 0.999, 100), t0(), t0());
        }
        let metrics = window.aggregate(t0(), &gates());
        assert_eq!(metrics.total, 10);
        assert_eq!(metrics.boot_success, 1.0);
        assert_eq!(metrics.crash_free_median, 0.999);
        assert_eq!(metrics.checkin_ms_median, 100.0);
        assert!(metrics.breaches.is_empty());
    }

    #[test]
    fn crash_free_breach_only() {
        let samples = vec![sample(true, 0.985, 100); 10];
        let metrics = WindowMetrics::compute(&samples, &gates());
        assert_eq!(metrics.breaches, vec![Breach::CrashFreeMedian]);
    }

    #[test]
    fn all_breaches_fire_in_declaration_order() {
        let samples = vec![sample(false, 0.5, 900); 4];
        let metrics = WindowMetrics::compute(&samples, &gates());
        assert_eq!(
            metrics.breaches,
            vec![
                Breach::BootSuccessRate,
                Breach::CrashFreeMedian,
                Breach::CheckinMsMedian
            ]
        );
    }

    #[test]
    fn boot_success_is_a_fraction() {
        let mut samples = vec![sample(true, 1.0, 10); 3];
        samples.push(sample(false, 1.0, 10));
        let metrics = WindowMetrics::compute(&samples, &gates());
        assert_eq!(metrics.boot_success, 0.75);
        assert_eq!(metrics.breaches, vec![Breach::BootSuccessRate]);
    }

    #[test]
    fn median_even_and_odd() {
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&mut [4.0, 1.0, 3.0, 2.0]), 2.5);
        assert_eq!(median(&mut []), 0.0);
    }

    #[test]
    fn latency_gate_is_strictly_greater_than() {
        let at_limit = vec![sample(true, 1.0, 500); 3];
        assert!(WindowMetrics::compute(&at_limit, &gates()).breaches.is_empty());
        let over = vec![sample(true, 1.0, 501); 3];
        assert_eq!(
            WindowMetrics::compute(&over, &gates()).breaches,
            vec![Breach::CheckinMsMedian]
        );
    }

    #[test]
    fn samples_older_than_window_are_excluded() {
        let mut window = HealthWindow::new(&WindowConfig::default());
        let old = t0() - Duration::seconds(301);
        window.record(sample(true, 0.5, 100), old, old);
        window.record(sample(true, 0.999, 100), t0(), t0());

        let metrics = window.aggregate(t0(), &gates());
        assert_eq!(metrics.total, 1);
        assert_eq!(metrics.crash_free_median, 0.999);
    }

    #[test]
    fn sample_ages_out_on_read() {
        let mut window = HealthWindow::new(&WindowConfig::default());
        window.record(sample(true, 0.999, 100), t0(), t0());
        assert_eq!(window.aggregate(t0() + Duration::seconds(300), &gates()).total, 1);
        assert_eq!(window.aggregate(t0() + Duration::seconds(301), &gates()).total, 0);
        assert!(window.is_empty());
    }

    #[test]
    fn capacity_evicts_oldest() {
        let config = WindowConfig {
            seconds: 300,
            capacity: 3,
        };
        let mut window = HealthWindow::new(&config);
        window.record(sample(false, 0.1, 100), t0(), t0());
        for _ in 0..3 {
            window.record(sample(true, 0.999, 100), t0(), t0());
        }
        assert_eq!(window.len(), 3);
        let metrics = window.aggregate(t0(), &gates());
        assert_eq!(metrics.boot_success, 1.0);
    }

    #[test]
    fn ring_windows_are_independent() {
        let windows = RingWindows::new(&WindowConfig::default(), gates());
        windows.record(Ring::Pilot, sample(true, 0.5, 100), t0(), t0());
        assert_eq!(windows.aggregate(Ring::Pilot, t0()).total, 1);
        assert_eq!(windows.aggregate(Ring::Five, t0()).total, 0);
        assert_eq!(windows.window_seconds(), 300);
    }

    #[test]
    fn breach_serializes_as_gate_name() {
        let json = serde_json::to_string(&Breach::CheckinMsMedian).unwrap();
        assert_eq!(json, "\"checkin_ms_median\"");
    }
}
