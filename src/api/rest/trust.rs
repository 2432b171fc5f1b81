use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::rest::require_auth;
use crate::engine::performance::{update_driver_score, PerformanceReport};
use crate::error::AppError;
use crate::fraud::risk::{reset_driver_risk, run_fraud_check, FraudCheckReport};
use crate::models::delivery::DeliveryStatus;
use crate::models::driver::Driver;
use crate::models::fraud::{FraudEvent, ReviewStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/fraud-check", post(fraud_check))
        .route("/validate-delivery", post(validate_delivery))
        .route("/update-driver-score", post(driver_score))
        .route("/drivers/:id/reset-risk", post(reset_risk))
        .route("/fraud-events", get(list_fraud_events))
        .route("/fraud-events/:id/resolve", post(resolve_fraud_event))
}

#[derive(Deserialize)]
pub struct DeliveryRef {
    pub delivery_id: Uuid,
}

#[derive(Deserialize)]
pub struct DriverRef {
    pub driver_id: Uuid,
}

async fn fraud_check(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<DeliveryRef>,
) -> Result<Json<FraudCheckReport>, AppError> {
    require_auth(&headers, &state.config)?;
    Ok(Json(run_fraud_check(&state, payload.delivery_id)?))
}

#[derive(Serialize)]
pub struct WeatherInfo {
    pub condition: String,
    pub is_raining: bool,
    /// False when the value came from the cache or the neutral fallback.
    pub fresh: bool,
}

#[derive(Serialize)]
pub struct ValidateDeliveryResponse {
    pub delivery_id: Uuid,
    pub status: DeliveryStatus,
    pub rain_bonus: f64,
    pub weather: WeatherInfo,
    pub total_pay: f64,
    pub fraud_score: u8,
    pub review_status: ReviewStatus,
}

/// Post-completion validation: settles the weather bonus, moves the
/// delivery to validated and runs the fraud check in the same breath. The
/// weather feed failing quietly costs the bonus, never the validation.
async fn validate_delivery(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<DeliveryRef>,
) -> Result<Json<ValidateDeliveryResponse>, AppError> {
    require_auth(&headers, &state.config)?;

    let delivery_id = payload.delivery_id;
    let (weather, fresh) = state.weather.get(Utc::now()).await;
    let settings = state.settings_snapshot();

    let (rain_bonus, total_pay) = {
        let mut delivery = state
            .deliveries
            .get_mut(&delivery_id)
            .ok_or_else(|| AppError::NotFound(format!("delivery {delivery_id} not found")))?;

        if delivery.delivered_at.is_none() {
            return Err(AppError::PreconditionFailed(format!(
                "delivery {delivery_id} has not been completed"
            )));
        }
        if delivery.status != DeliveryStatus::Pending {
            return Err(AppError::PreconditionFailed(format!(
                "delivery {delivery_id} was already validated"
            )));
        }

        let rain_bonus = if weather.is_raining {
            settings.rain_bonus_amount
        } else {
            0.0
        };
        delivery.pay.rain_bonus = rain_bonus;
        delivery.pay.recompute_total();
        delivery.status = DeliveryStatus::Validated;
        (rain_bonus, delivery.pay.total)
    };

    let report = run_fraud_check(&state, delivery_id)?;

    Ok(Json(ValidateDeliveryResponse {
        delivery_id,
        status: DeliveryStatus::Validated,
        rain_bonus,
        weather: WeatherInfo {
            condition: weather.condition,
            is_raining: weather.is_raining,
            fresh,
        },
        total_pay,
        fraud_score: report.fraud_score,
        review_status: report.review_status,
    }))
}

async fn driver_score(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<DriverRef>,
) -> Result<Json<PerformanceReport>, AppError> {
    require_auth(&headers, &state.config)?;
    Ok(Json(update_driver_score(&state, payload.driver_id)?))
}

async fn reset_risk(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<Driver>, AppError> {
    require_auth(&headers, &state.config)?;
    reset_driver_risk(&state, id)?;

    let driver = state
        .drivers
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))?;
    Ok(Json(driver.value().clone()))
}

#[derive(Deserialize, Default)]
pub struct FraudEventsQuery {
    pub driver_id: Option<Uuid>,
    pub resolved: Option<bool>,
}

async fn list_fraud_events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FraudEventsQuery>,
) -> Json<Vec<FraudEvent>> {
    let mut events: Vec<FraudEvent> = state
        .fraud_events
        .iter()
        .map(|entry| entry.value().clone())
        .filter(|event| query.driver_id.is_none_or(|id| event.driver_id == id))
        .filter(|event| query.resolved.is_none_or(|r| event.resolved == r))
        .collect();
    events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Json(events)
}

async fn resolve_fraud_event(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<FraudEvent>, AppError> {
    require_auth(&headers, &state.config)?;

    let mut event = state
        .fraud_events
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("fraud event {id} not found")))?;

    if !event.resolved {
        event.resolved = true;
        event.resolved_at = Some(Utc::now());
    }

    Ok(Json(event.clone()))
}
