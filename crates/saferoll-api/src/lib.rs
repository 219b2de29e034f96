//! saferoll-api: REST API for SafeRoll.
//!
//! Provides axum route handlers for rollouts, device check-ins and
//! window metrics, plus a Prometheus scrape endpoint.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/health` | Liveness |
//! | GET | `/v1/rollouts` | List rollouts |
//! | POST | `/v1/rollouts` | Create a rollout |
//! | GET | `/v1/rollouts/{id}` | Rollout with its decision history |
//! | POST | `/v1/rollouts/{id}/promote` | Promote to the next ring |
//! | POST | `/v1/rollouts/{id}/pause` | Pause |
//! | POST | `/v1/rollouts/{id}/rollback` | Roll back one ring |
//! | GET | `/v1/rollouts/{id}/should_promote` | Advisory dry run |
//! | POST | `/v1/checkin` | Device check-in |
//! | GET | `/v1/metrics` | Active ring window metrics |
//! | GET | `/v1/snapshot` | Store debug view |
//! | GET | `/metrics` | Prometheus exposition |

pub mod handlers;
pub mod prometheus;
pub mod rollout_handlers;

use axum::Router;
use axum::routing::{get, post};
use saferoll_rollout::Orchestrator;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Orchestrator,
}

/// Build the complete API router.
pub fn build_router(orchestrator: Orchestrator) -> Router {
    let api_state = ApiState { orchestrator };

    let v1_routes = Router::new()
        .route(
            "/rollouts",
            get(rollout_handlers::list_rollouts).post(rollout_handlers::create_rollout),
        )
        .route("/rollouts/{id}", get(rollout_handlers::get_rollout))
        .route("/rollouts/{id}/promote", post(rollout_handlers::promote_rollout))
        .route("/rollouts/{id}/pause", post(rollout_handlers::pause_rollout))
        .route("/rollouts/{id}/rollback", post(rollout_handlers::rollback_rollout))
        .route("/rollouts/{id}/should_promote", get(rollout_handlers::should_promote))
        .route("/checkin", post(handlers::checkin))
        .route("/metrics", get(handlers::current_metrics))
        .route("/snapshot", get(handlers::snapshot));

    Router::new()
        .nest("/v1", v1_routes)
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::prometheus_metrics))
        .with_state(api_state)
}
