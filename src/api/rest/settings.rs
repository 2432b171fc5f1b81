use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::get;
use axum::Json;
use axum::Router;

use crate::api::rest::require_auth;
use crate::error::AppError;
use crate::models::settings::DeliverySettings;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/settings", get(get_settings).put(update_settings))
}

async fn get_settings(State(state): State<Arc<AppState>>) -> Json<DeliverySettings> {
    Json(state.settings_snapshot())
}

/// Full replacement of the fee singleton. Takes effect for deliveries
/// completed after the call; nothing already priced is touched.
async fn update_settings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(mut payload): Json<DeliverySettings>,
) -> Result<Json<DeliverySettings>, AppError> {
    require_auth(&headers, &state.config)?;

    let amounts = [
        payload.base_fee,
        payload.per_km_fee,
        payload.speed_bonus_amount,
        payload.rain_bonus_amount,
    ];
    if amounts.iter().any(|a| !a.is_finite() || *a < 0.0) {
        return Err(AppError::BadRequest(
            "fees and bonuses must be non-negative".to_string(),
        ));
    }
    if payload.fast_delivery_minutes <= 0 {
        return Err(AppError::BadRequest(
            "fast_delivery_minutes must be positive".to_string(),
        ));
    }
    if payload.boost_tiers.is_empty() {
        return Err(AppError::BadRequest(
            "at least one boost tier is required".to_string(),
        ));
    }
    if payload
        .boost_tiers
        .iter()
        .any(|t| !t.min_ratio.is_finite() || !t.amount.is_finite() || t.min_ratio <= 0.0 || t.amount < 0.0)
    {
        return Err(AppError::BadRequest(
            "boost tiers must have positive ratios and non-negative amounts".to_string(),
        ));
    }

    // The surge lookup walks the table top down.
    payload
        .boost_tiers
        .sort_by(|a, b| b.min_ratio.total_cmp(&a.min_ratio));

    *state.settings.write().expect("settings lock poisoned") = payload.clone();
    Ok(Json(payload))
}
