use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::require_auth;
use crate::engine::assignment::{assign, AssignOutcome};
use crate::engine::timeout::{run_timeout_sweep, TimeoutSweepSummary};
use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/assign-driver", post(assign_driver))
        .route("/driver-timeout", post(driver_timeout))
}

#[derive(Deserialize)]
pub struct AssignDriverRequest {
    pub order_id: Uuid,
    /// Extra exclusions for this attempt, on top of the order's own
    /// timed-out set.
    #[serde(default)]
    pub skip_driver_ids: Vec<Uuid>,
}

/// Runs one assignment attempt. Whatever the engine decides comes back as
/// a 200 with a tagged outcome; only a missing order is an error.
async fn assign_driver(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<AssignDriverRequest>,
) -> Result<Json<AssignOutcome>, AppError> {
    require_auth(&headers, &state.config)?;

    let started = Instant::now();
    let outcome = assign(&state, payload.order_id, &payload.skip_driver_ids)?;

    let label = outcome.metric_label();
    state
        .metrics
        .assignments_total
        .with_label_values(&[label])
        .inc();
    state
        .metrics
        .assignment_latency_seconds
        .with_label_values(&[label])
        .observe(started.elapsed().as_secs_f64());

    Ok(Json(outcome))
}

/// Entry point for the external scheduler's recovery cadence.
async fn driver_timeout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<TimeoutSweepSummary>, AppError> {
    require_auth(&headers, &state.config)?;
    Ok(Json(run_timeout_sweep(&state)))
}
