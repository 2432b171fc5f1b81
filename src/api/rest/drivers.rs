use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{patch, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::require_auth;
use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::driver::{Driver, DriverLocation, DriverStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers", post(create_driver).get(list_drivers))
        .route("/drivers/:id/status", patch(update_driver_status))
        .route("/drivers/:id/location", patch(update_driver_location))
}

#[derive(Deserialize)]
pub struct CreateDriverRequest {
    pub name: String,
    pub rating: f64,
    pub location: Option<GeoPoint>,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub online: Option<bool>,
    pub status: Option<DriverStatus>,
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    pub location: GeoPoint,
    pub accuracy_m: Option<f64>,
}

async fn create_driver(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CreateDriverRequest>,
) -> Result<Json<Driver>, AppError> {
    require_auth(&headers, &state.config)?;

    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    let driver = Driver::new(payload.name, payload.rating);
    if let Some(point) = payload.location {
        state.driver_locations.insert(
            driver.id,
            DriverLocation::first_fix(driver.id, point, None, Utc::now()),
        );
    }

    state.drivers.insert(driver.id, driver.clone());
    Ok(Json(driver))
}

async fn list_drivers(State(state): State<Arc<AppState>>) -> Json<Vec<Driver>> {
    let drivers = state
        .drivers
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    Json(drivers)
}

async fn update_driver_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Driver>, AppError> {
    require_auth(&headers, &state.config)?;

    let mut driver = state
        .drivers
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))?;

    if let Some(status) = payload.status {
        driver.status = status;
        driver.online = status != DriverStatus::Offline;
    }
    if let Some(online) = payload.online {
        driver.online = online;
        if !online {
            driver.status = DriverStatus::Offline;
        } else if driver.status == DriverStatus::Offline {
            driver.status = DriverStatus::Online;
        }
    }
    driver.last_seen_at = Utc::now();

    Ok(Json(driver.clone()))
}

/// Heartbeat from the driver app. Each fix shifts the previous one down a
/// slot; the fraud rules compare the two.
async fn update_driver_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<DriverLocation>, AppError> {
    require_auth(&headers, &state.config)?;

    let now = Utc::now();
    {
        let mut driver = state
            .drivers
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))?;
        driver.last_seen_at = now;
    }

    let location = match state.driver_locations.get_mut(&id) {
        Some(mut location) => {
            location.advance(payload.location, payload.accuracy_m, now);
            location.clone()
        }
        None => {
            let location = DriverLocation::first_fix(id, payload.location, payload.accuracy_m, now);
            state.driver_locations.insert(id, location.clone());
            location
        }
    };

    Ok(Json(location))
}
