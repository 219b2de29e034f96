//! REST API handlers for rollout management.
//!
//! Create, list and inspect rollouts, and drive them with promote, pause,
//! rollback and the advisory should-promote query.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tracing::info;

use crate::ApiState;
use crate::handlers::{ApiResponse, rollout_error_response};

/// Request body to create a rollout.
#[derive(Debug, serde::Deserialize, serde::Serialize)]
pub struct CreateRolloutRequest {
    pub target_version: String,
    pub last_known_good: String,
}

/// Optional body for pause and rollback.
#[derive(Debug, Default, serde::Deserialize, serde::Serialize)]
pub struct ReasonRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

fn reason_of(body: &Option<Json<ReasonRequest>>) -> Option<&str> {
    body.as_ref().and_then(|Json(req)| req.reason.as_deref())
}

/// POST /v1/rollouts
pub async fn create_rollout(
    State(state): State<ApiState>,
    Json(req): Json<CreateRolloutRequest>,
) -> impl IntoResponse {
    let rollout = state
        .orchestrator
        .store()
        .create_rollout(&req.target_version, &req.last_known_good);
    (StatusCode::CREATED, ApiResponse::ok(rollout))
}

/// GET /v1/rollouts
pub async fn list_rollouts(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.orchestrator.store().list_rollouts())
}

/// GET /v1/rollouts/{id}
pub async fn get_rollout(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.orchestrator.store().rollout_detail(&id) {
        Ok(detail) => ApiResponse::ok(detail).into_response(),
        Err(e) => rollout_error_response(e.into()),
    }
}

/// POST /v1/rollouts/{id}/promote
pub async fn promote_rollout(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.orchestrator.promote(&id) {
        Ok(rollout) => ApiResponse::ok(rollout).into_response(),
        Err(e) => rollout_error_response(e),
    }
}

/// POST /v1/rollouts/{id}/pause
pub async fn pause_rollout(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    body: Option<Json<ReasonRequest>>,
) -> impl IntoResponse {
    match state.orchestrator.pause(&id, reason_of(&body)) {
        Ok(rollout) => ApiResponse::ok(rollout).into_response(),
        Err(e) => rollout_error_response(e),
    }
}

/// POST /v1/rollouts/{id}/rollback
pub async fn rollback_rollout(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    body: Option<Json<ReasonRequest>>,
) -> impl IntoResponse {
    match state.orchestrator.rollback(&id, reason_of(&body)) {
        Ok(rollout) => {
            info!(rollout_id = %id, target_version = %rollout.target_version, "rollback requested via API");
            ApiResponse::ok(rollout).into_response()
        }
        Err(e) => rollout_error_response(e),
    }
}

/// GET /v1/rollouts/{id}/should_promote
pub async fn should_promote(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.orchestrator.should_promote(&id) {
        Ok(advice) => ApiResponse::ok(advice).into_response(),
        Err(e) => rollout_error_response(e),
    }
}
