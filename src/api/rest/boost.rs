use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;

use crate::api::rest::require_auth;
use crate::engine::surge::run_boost_tick;
use crate::error::AppError;
use crate::models::boost::BoostState;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/boost", get(get_boost).post(boost_tick))
}

/// Serves the last computed snapshot without recomputing anything; the
/// cache header tells polling clients how long it stays good.
async fn get_boost(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let max_age = format!("public, max-age={}", state.config.boost_cache_seconds);
    (
        [("cache-control", max_age)],
        Json(state.boost_snapshot()),
    )
}

/// Entry point for the external scheduler's surge cadence.
async fn boost_tick(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<BoostState>, AppError> {
    require_auth(&headers, &state.config)?;
    Ok(Json(run_boost_tick(&state, Utc::now())))
}
