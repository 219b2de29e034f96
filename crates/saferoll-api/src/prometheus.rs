//! Prometheus text exposition format.
//!
//! Renders store counters and the active ring's window into the Prometheus
//! text exposition format for scraping.

use std::fmt::Write;

use saferoll_core::{DecisionKind, Rollout, RolloutState};
use saferoll_rollout::ActiveMetrics;
use saferoll_state::StoreSnapshot;

fn header(out: &mut String, name: &str, help: &str, kind: &str) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} {kind}");
}

/// Render store counters, rollout states and active window gauges.
///
/// The window gauges carry `rollout` and `ring` labels and are omitted
/// when no rollout is active.
pub fn render_prometheus(
    snapshot: &StoreSnapshot,
    rollouts: &[Rollout],
    active: Option<&ActiveMetrics>,
) -> String {
    let mut out = String::new();

    header(
        &mut out,
        "saferoll_checkins_total",
        "Device check-ins received.",
        "counter",
    );
    let _ = writeln!(out, "saferoll_checkins_total {}", snapshot.checkins_total);

    header(
        &mut out,
        "saferoll_timestamp_fallbacks_total",
        "Check-ins whose timestamp could not be parsed.",
        "counter",
    );
    let _ = writeln!(
        out,
        "saferoll_timestamp_fallbacks_total {}",
        snapshot.timestamp_fallbacks
    );

    header(
        &mut out,
        "saferoll_decisions_total",
        "Decisions logged, by kind.",
        "counter",
    );
    for kind in DecisionKind::ALL {
        let _ = writeln!(
            out,
            "saferoll_decisions_total{{kind=\"{}\"}} {}",
            kind.as_str(),
            snapshot.decisions.get(kind)
        );
    }

    header(
        &mut out,
        "saferoll_events_evicted_total",
        "Decisions dropped from the global log past capacity.",
        "counter",
    );
    let _ = writeln!(out, "saferoll_events_evicted_total {}", snapshot.events_evicted);

    header(&mut out, "saferoll_rollouts", "Rollouts by state.", "gauge");
    for state in RolloutState::ALL {
        let count = rollouts.iter().filter(|r| r.state == state).count();
        let _ = writeln!(out, "saferoll_rollouts{{state=\"{state}\"}} {count}");
    }

    header(
        &mut out,
        "saferoll_window_samples",
        "Samples in the active ring's window.",
        "gauge",
    );
    if let Some(m) = active {
        let _ = writeln!(out, "saferoll_window_samples{} {}", labels(m), m.total);
    }

    header(
        &mut out,
        "saferoll_window_boot_success",
        "Boot success fraction in the active ring's window.",
        "gauge",
    );
    if let Some(m) = active {
        let _ = writeln!(
            out,
            "saferoll_window_boot_success{} {:.4}",
            labels(m),
            m.boot_success
        );
    }

    header(
        &mut out,
        "saferoll_window_crash_free_median",
        "Median crash-free fraction in the active ring's window.",
        "gauge",
    );
    if let Some(m) = active {
        let _ = writeln!(
            out,
            "saferoll_window_crash_free_median{} {:.4}",
            labels(m),
            m.crash_free_median
        );
    }

    header(
        &mut out,
        "saferoll_window_checkin_ms_median",
        "Median check-in latency in milliseconds in the active ring's window.",
        "gauge",
    );
    if let Some(m) = active {
        let _ = writeln!(
            out,
            "saferoll_window_checkin_ms_median{} {:.2}",
            labels(m),
            m.checkin_ms_median
        );
    }

    out
}

fn labels(m: &ActiveMetrics) -> String {
    format!(
        "{{rollout=\"{}\",ring=\"{}\"}}",
        m.active_rollout_id, m.active_ring
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use saferoll_core::Ring;
    use saferoll_health::Breach;
    use saferoll_state::DecisionCounts;

    fn test_snapshot() -> StoreSnapshot {
        StoreSnapshot {
            active_rollout_id: Some("r-0badf00d".to_string()),
            active_ring: Some(Ring::Five),
            rollouts: 2,
            events: 4,
            events_evicted: 0,
            checkins_total: 42,
            timestamp_fallbacks: 3,
            decisions: DecisionCounts {
                promote: 1,
                pause: 2,
                rollback: 0,
                advise_no: 1,
            },
        }
    }

    fn test_rollout(id: &str, state: RolloutState) -> Rollout {
        Rollout {
            rollout_id: id.to_string(),
            target_version: "1.2.0".to_string(),
            last_known_good: "1.1.0".to_string(),
            state,
            ring_index: 1,
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            last_promote_ts: None,
            last_pause_ts: None,
        }
    }

    fn test_active() -> ActiveMetrics {
        ActiveMetrics {
            active_rollout_id: "r-0badf00d".to_string(),
            active_ring: Ring::Five,
            window_seconds: 300,
            total: 12,
            boot_success: 0.9917,
            crash_free_median: 0.985,
            checkin_ms_median: 612.5,
            breaches: vec![Breach::BootSuccessRate, Breach::CrashFreeMedian],
        }
    }

    #[test]
    fn render_without_active_rollout() {
        let output = render_prometheus(&test_snapshot(), &[], None);
        assert!(output.contains("# TYPE saferoll_checkins_total counter"));
        assert!(output.contains("saferoll_checkins_total 42"));
        assert!(output.contains("saferoll_timestamp_fallbacks_total 3"));
        assert!(output.contains("# HELP saferoll_window_boot_success"));
        assert!(!output.contains("saferoll_window_boot_success{"));
    }

    #[test]
    fn render_decisions_and_states() {
        let rollouts = vec![
            test_rollout("r-1", RolloutState::Paused),
            test_rollout("r-2", RolloutState::Active),
            test_rollout("r-3", RolloutState::Paused),
        ];
        let output = render_prometheus(&test_snapshot(), &rollouts, None);

        assert!(output.contains("saferoll_decisions_total{kind=\"PROMOTE\"} 1"));
        assert!(output.contains("saferoll_decisions_total{kind=\"PAUSE\"} 2"));
        assert!(output.contains("saferoll_decisions_total{kind=\"ADVISE_NO\"} 1"));
        assert!(output.contains("saferoll_rollouts{state=\"paused\"} 2"));
        assert!(output.contains("saferoll_rollouts{state=\"completed\"} 0"));
    }

    #[test]
    fn render_active_window() {
        let active = test_active();
        let output = render_prometheus(&test_snapshot(), &[], Some(&active));

        let labels = "{rollout=\"r-0badf00d\",ring=\"five\"}";
        assert!(output.contains(&format!("saferoll_window_samples{labels} 12")));
        assert!(output.contains(&format!("saferoll_window_boot_success{labels} 0.9917")));
        assert!(output.contains(&format!("saferoll_window_crash_free_median{labels} 0.9850")));
        assert!(output.contains(&format!("saferoll_window_checkin_ms_median{labels} 612.50")));
    }
}
