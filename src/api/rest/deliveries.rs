use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::rest::require_auth;
use crate::error::AppError;
use crate::fraud::risk::run_fraud_check;
use crate::geo::GeoPoint;
use crate::models::delivery::{Delivery, DeliveryStatus, GeoSnapshot, PaymentType};
use crate::models::driver::DriverStatus;
use crate::models::order::OrderStatus;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/deliveries", get(list_deliveries))
        .route("/deliveries/:id", get(get_delivery))
        .route("/deliveries/:id/pickup", post(pickup_delivery))
        .route("/deliveries/:id/complete", post(complete_delivery))
        .route("/deliveries/:id/cancel", post(cancel_delivery))
        .route("/deliveries/:id/settle-cash", post(settle_cash))
        .route("/deliveries/:id/mark-paid", post(mark_paid))
}

#[derive(Deserialize, Default)]
pub struct ReportedLocationRequest {
    pub location: Option<GeoPoint>,
    pub accuracy_m: Option<f64>,
}

async fn list_deliveries(State(state): State<Arc<AppState>>) -> Json<Vec<Delivery>> {
    let deliveries = state
        .deliveries
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    Json(deliveries)
}

async fn get_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Delivery>, AppError> {
    let delivery = state
        .deliveries
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("delivery {id} not found")))?;

    Ok(Json(delivery.value().clone()))
}

/// The position the driver reports for a transition, falling back to their
/// latest heartbeat fix.
fn reported_fix(
    state: &AppState,
    driver_id: Uuid,
    payload: &ReportedLocationRequest,
    now: DateTime<Utc>,
) -> Option<GeoSnapshot> {
    match payload.location {
        Some(point) => Some(GeoSnapshot {
            point,
            accuracy_m: payload.accuracy_m,
            recorded_at: now,
        }),
        None => state.driver_locations.get(&driver_id).map(|location| GeoSnapshot {
            point: location.point,
            accuracy_m: location.accuracy_m,
            recorded_at: location.recorded_at,
        }),
    }
}

fn guard_open(delivery: &Delivery, id: Uuid) -> Result<(), AppError> {
    if delivery.status == DeliveryStatus::Paid {
        return Err(AppError::PreconditionFailed(format!(
            "delivery {id} is already paid out"
        )));
    }
    if delivery.cancelled_at.is_some() {
        return Err(AppError::PreconditionFailed(format!(
            "delivery {id} is cancelled"
        )));
    }
    Ok(())
}

async fn pickup_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<ReportedLocationRequest>,
) -> Result<Json<Delivery>, AppError> {
    require_auth(&headers, &state.config)?;

    let now = Utc::now();
    let driver_id = state
        .deliveries
        .get(&id)
        .map(|entry| entry.value().driver_id)
        .ok_or_else(|| AppError::NotFound(format!("delivery {id} not found")))?;
    let fix = reported_fix(&state, driver_id, &payload, now);

    let mut delivery = state
        .deliveries
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("delivery {id} not found")))?;
    guard_open(&delivery, id)?;
    if delivery.picked_up_at.is_some() {
        return Err(AppError::PreconditionFailed(format!(
            "delivery {id} was already picked up"
        )));
    }

    delivery.picked_up_at = Some(now);
    delivery.reported_pickup = fix;

    Ok(Json(delivery.clone()))
}

async fn complete_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<ReportedLocationRequest>,
) -> Result<Json<Delivery>, AppError> {
    require_auth(&headers, &state.config)?;

    let now = Utc::now();
    let settings = state.settings_snapshot();
    let boost = state.boost_snapshot();
    let driver_id = state
        .deliveries
        .get(&id)
        .map(|entry| entry.value().driver_id)
        .ok_or_else(|| AppError::NotFound(format!("delivery {id} not found")))?;
    let fix = reported_fix(&state, driver_id, &payload, now);

    let completed = {
        let mut delivery = state
            .deliveries
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("delivery {id} not found")))?;
        guard_open(&delivery, id)?;
        if delivery.delivered_at.is_some() {
            return Err(AppError::PreconditionFailed(format!(
                "delivery {id} was already completed"
            )));
        }
        if delivery.picked_up_at.is_none() {
            return Err(AppError::PreconditionFailed(format!(
                "delivery {id} has not been picked up"
            )));
        }

        delivery.delivered_at = Some(now);
        delivery.reported_drop = fix;

        let minutes = delivery.duration_minutes().unwrap_or(i64::MAX);
        delivery.pay.base = settings.base_fee;
        delivery.pay.distance = settings.per_km_fee * delivery.distance_km;
        delivery.pay.speed_bonus = if minutes < settings.fast_delivery_minutes {
            settings.speed_bonus_amount
        } else {
            0.0
        };
        delivery.pay.boost_bonus = if boost.is_active { boost.bonus } else { 0.0 };
        delivery.pay.recompute_total();

        delivery.clone()
    };

    if let Some(mut order) = state.orders.get_mut(&completed.order_id) {
        order.status = OrderStatus::Delivered;
    }
    release_driver(&state, driver_id, completed.order_id, now);

    info!(
        delivery_id = %id,
        driver_id = %driver_id,
        total = completed.pay.total,
        "delivery completed"
    );

    Ok(Json(completed))
}

async fn cancel_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<Delivery>, AppError> {
    require_auth(&headers, &state.config)?;

    let now = Utc::now();
    let cancelled = {
        let mut delivery = state
            .deliveries
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("delivery {id} not found")))?;
        guard_open(&delivery, id)?;
        if delivery.delivered_at.is_some() {
            return Err(AppError::PreconditionFailed(format!(
                "delivery {id} was already completed"
            )));
        }

        delivery.cancelled_at = Some(now);
        delivery.clone()
    };

    if let Some(mut order) = state.orders.get_mut(&cancelled.order_id) {
        order.status = OrderStatus::Cancelled;
    }
    release_driver(&state, cancelled.driver_id, cancelled.order_id, now);

    // Cancelling with the goods in hand is one of the rule set's triggers,
    // so the check runs right away instead of waiting for the scheduler.
    if cancelled.picked_up_at.is_some() {
        match run_fraud_check(&state, id) {
            Ok(report) => info!(
                delivery_id = %id,
                fraud_score = report.fraud_score,
                "fraud check after cancellation"
            ),
            Err(err) => warn!(delivery_id = %id, error = %err, "fraud check failed"),
        }
    }

    Ok(Json(cancelled))
}

async fn settle_cash(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<Delivery>, AppError> {
    require_auth(&headers, &state.config)?;

    let mut delivery = state
        .deliveries
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("delivery {id} not found")))?;

    if delivery.payment != PaymentType::Cash {
        return Err(AppError::BadRequest(format!(
            "delivery {id} is not a cash delivery"
        )));
    }
    if !delivery.cash_settled {
        delivery.cash_settled = true;
        delivery.cash_settled_at = Some(Utc::now());
    }

    Ok(Json(delivery.clone()))
}

async fn mark_paid(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<Delivery>, AppError> {
    require_auth(&headers, &state.config)?;

    let mut delivery = state
        .deliveries
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("delivery {id} not found")))?;

    if delivery.status != DeliveryStatus::Validated {
        return Err(AppError::PreconditionFailed(format!(
            "delivery {id} must be validated before payout"
        )));
    }
    delivery.status = DeliveryStatus::Paid;

    Ok(Json(delivery.clone()))
}

fn release_driver(state: &AppState, driver_id: Uuid, order_id: Uuid, now: DateTime<Utc>) {
    if let Some(mut driver) = state.drivers.get_mut(&driver_id) {
        driver.active_order_ids.remove(&order_id);
        driver.last_seen_at = now;
        if driver.active_order_ids.is_empty() && driver.status == DriverStatus::Busy {
            driver.status = DriverStatus::Online;
        }
    }
}
