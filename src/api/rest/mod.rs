pub mod boost;
pub mod deliveries;
pub mod dispatch;
pub mod drivers;
pub mod orders;
pub mod settings;
pub mod trust;
pub mod ws;

use std::sync::Arc;

use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Serialize;
use tower_http::cors::CorsLayer;

use crate::config::Config;
use crate::error::AppError;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(drivers::router())
        .merge(orders::router())
        .merge(deliveries::router())
        .merge(dispatch::router())
        .merge(boost::router())
        .merge(trust::router())
        .merge(settings::router())
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/ws", get(ws::ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Mutating endpoints accept either the operator secret or the scheduler's
/// bearer token. With neither configured the service runs open, which is
/// only meant for development.
pub(crate) fn require_auth(headers: &HeaderMap, config: &Config) -> Result<(), AppError> {
    if !config.auth_enabled() {
        return Ok(());
    }

    if let Some(expected) = &config.admin_secret {
        let presented = headers.get("x-admin-secret").and_then(|v| v.to_str().ok());
        if presented == Some(expected.as_str()) {
            return Ok(());
        }
    }

    if let Some(token) = &config.scheduler_token {
        let presented = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        if presented == Some(token.as_str()) {
            return Ok(());
        }
    }

    Err(AppError::Unauthorized(
        "missing or invalid credentials".to_string(),
    ))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    drivers: usize,
    orders: usize,
    deliveries: usize,
    fraud_events: usize,
    boost_active: bool,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        drivers: state.drivers.len(),
        orders: state.orders.len(),
        deliveries: state.deliveries.len(),
        fraud_events: state.fraud_events.len(),
        boost_active: state.boost_snapshot().is_active,
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}
