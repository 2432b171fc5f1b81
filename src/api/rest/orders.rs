use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::require_auth;
use crate::error::AppError;
use crate::geo::{haversine_km, GeoPoint};
use crate::models::delivery::{Delivery, PaymentType};
use crate::models::order::{FulfillmentType, Order, OrderStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/accept", post(accept_order))
}

fn default_fulfillment() -> FulfillmentType {
    FulfillmentType::Delivery
}

fn default_payment() -> PaymentType {
    PaymentType::Online
}

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    #[serde(default = "default_fulfillment")]
    pub fulfillment: FulfillmentType,
    pub pickup: Option<GeoPoint>,
    pub dropoff: Option<GeoPoint>,
    #[serde(default = "default_payment")]
    pub payment: PaymentType,
    #[serde(default)]
    pub is_rush: bool,
}

#[derive(Deserialize)]
pub struct AcceptOrderRequest {
    pub driver_id: Uuid,
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<Json<Order>, AppError> {
    require_auth(&headers, &state.config)?;

    let order = Order::new(
        payload.fulfillment,
        payload.pickup,
        payload.dropoff,
        payload.payment,
        payload.is_rush,
    );
    state.orders.insert(order.id, order.clone());
    Ok(Json(order))
}

async fn list_orders(State(state): State<Arc<AppState>>) -> Json<Vec<Order>> {
    let orders = state
        .orders
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    Json(orders)
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let order = state
        .orders
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;

    Ok(Json(order.value().clone()))
}

/// The assigned driver confirms the order, which opens the delivery that
/// tracks it from here on. Confirmation is conditional on the assignment
/// still being theirs.
async fn accept_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<AcceptOrderRequest>,
) -> Result<Json<Delivery>, AppError> {
    require_auth(&headers, &state.config)?;

    let now = Utc::now();
    let accepted = {
        let mut order = state
            .orders
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;

        if order.status != OrderStatus::AssignedPending {
            return Err(AppError::PreconditionFailed(format!(
                "order {id} is not awaiting acceptance"
            )));
        }
        if order.assigned_driver_id != Some(payload.driver_id) {
            return Err(AppError::PreconditionFailed(format!(
                "order {id} is not assigned to driver {}",
                payload.driver_id
            )));
        }

        order.status = OrderStatus::InProgress;
        order.clone()
    };

    let distance_km = match (accepted.pickup, accepted.dropoff) {
        (Some(pickup), Some(dropoff)) => haversine_km(&pickup, &dropoff),
        _ => 0.0,
    };
    let delivery = Delivery::new(
        accepted.id,
        payload.driver_id,
        accepted.payment,
        accepted.pickup,
        accepted.dropoff,
        distance_km,
        now,
    );
    state.deliveries.insert(delivery.id, delivery.clone());

    Ok(Json(delivery))
}
