//! REST API handlers for check-ins, metrics and service health.
//!
//! Also holds the response envelope shared by every JSON endpoint.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

use saferoll_rollout::{Checkin, RolloutError};
use saferoll_state::StoreError;

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
pub(crate) struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    pub(crate) fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

pub(crate) fn error_response(msg: &str, status: StatusCode) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
        .into_response()
}

/// Map an orchestrator error onto a status code.
pub(crate) fn rollout_error_response(err: RolloutError) -> Response {
    let status = match &err {
        RolloutError::Denied { .. } => StatusCode::BAD_REQUEST,
        RolloutError::Store(StoreError::NotFound(_) | StoreError::NoActiveRollout) => {
            StatusCode::NOT_FOUND
        }
        RolloutError::Store(StoreError::Ring(_)) => {
            error!(error = %err, "ring index invariant violated");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    error_response(&err.to_string(), status)
}

// ── Health ─────────────────────────────────────────────────────

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ── Check-ins ──────────────────────────────────────────────────

/// POST /v1/checkin
pub async fn checkin(
    State(state): State<ApiState>,
    Json(req): Json<Checkin>,
) -> impl IntoResponse {
    match state.orchestrator.handle_checkin(&req) {
        Ok(advice) => ApiResponse::ok(advice).into_response(),
        Err(e) => rollout_error_response(e),
    }
}

// ── Metrics ────────────────────────────────────────────────────

/// GET /v1/metrics
pub async fn current_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    match state.orchestrator.current_metrics() {
        Ok(metrics) => ApiResponse::ok(metrics).into_response(),
        Err(e) => rollout_error_response(e),
    }
}

/// GET /v1/snapshot
pub async fn snapshot(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.orchestrator.store().snapshot())
}

// ── Prometheus ─────────────────────────────────────────────────

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let store = state.orchestrator.store();
    let snapshot = store.snapshot();
    let rollouts = store.list_rollouts();
    // No active rollout simply omits the window gauges.
    let active = state.orchestrator.current_metrics().ok();

    let body = crate::prometheus::render_prometheus(&snapshot, &rollouts, active.as_ref());
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::{DateTime, Duration, Utc};
    use saferoll_core::{HealthSample, ManualClock, Ring, SaferollConfig};
    use saferoll_rollout::Orchestrator;
    use saferoll_state::RolloutStore;

    fn test_state() -> ApiState {
        let now = DateTime::<Utc>::UNIX_EPOCH + Duration::days(20_000);
        let config = SaferollConfig::default();
        let store = RolloutStore::new(&config, Arc::new(ManualClock::new(now)));
        ApiState {
            orchestrator: Orchestrator::new(store, &config),
        }
    }

    fn test_checkin(crash_free: f64, checkin_ms: u64) -> Checkin {
        Checkin {
            device_id: "dev-7".to_string(),
            ring: Ring::Pilot,
            sw_version: "1.1.0".to_string(),
            last_config: None,
            health: HealthSample {
                boot_ok: true,
                crash_free,
                checkin_ms,
            },
            ts: "garbage".to_string(),
        }
    }

    #[tokio::test]
    async fn health_is_ok() {
        let resp = health().await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn checkin_without_rollout_succeeds() {
        let state = test_state();
        let resp = checkin(State(state.clone()), Json(test_checkin(0.999, 40)))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(state.orchestrator.store().snapshot().timestamp_fallbacks, 1);
    }

    #[tokio::test]
    async fn metrics_without_active_rollout_is_not_found() {
        let state = test_state();
        let resp = current_metrics(State(state)).await.into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn metrics_with_active_rollout() {
        let state = test_state();
        state.orchestrator.store().create_rollout("1.2.0", "1.1.0");
        let resp = current_metrics(State(state)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn snapshot_is_ok() {
        let state = test_state();
        let resp = snapshot(State(state)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[test]
    fn denied_maps_to_bad_request() {
        let resp = rollout_error_response(RolloutError::Denied {
            rollout_id: "r-1".to_string(),
            reason: "cooldown".to_string(),
        });
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = rollout_error_response(RolloutError::Store(StoreError::NotFound(
            "r-1".to_string(),
        )));
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn prometheus_endpoint_returns_text() {
        let state = test_state();
        state.orchestrator.store().create_rollout("1.2.0", "1.1.0");
        state
            .orchestrator
            .handle_checkin(&test_checkin(0.98, 600))
            .unwrap();

        let resp = prometheus_metrics(State(state)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let content_type = resp.headers().get("content-type").unwrap().to_str().unwrap();
        assert!(content_type.contains("text/plain"));
    }
}
