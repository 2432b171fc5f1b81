use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

const SPEED_WEIGHT: f64 = 0.4;
const ACCEPTANCE_WEIGHT: f64 = 0.3;
const RATING_WEIGHT: f64 = 0.3;

/// Average accept→deliver span at or under this pace scores full marks.
const FAST_MINUTES: f64 = 15.0;
/// At or beyond this pace the speed component bottoms out.
const SLOW_MINUTES: f64 = 60.0;
/// Speed score until the driver has completed anything.
const NEUTRAL_SPEED: f64 = 50.0;

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceReport {
    pub driver_id: Uuid,
    pub score: f64,
    pub avg_delivery_minutes: Option<f64>,
    pub acceptance_rate: f64,
    pub client_rating: f64,
}

/// Recomputes a driver's composite performance score from their completed
/// deliveries, assignment history and client rating, and persists it. The
/// score only matters during rush-hour assignment.
pub fn update_driver_score(
    state: &AppState,
    driver_id: Uuid,
) -> Result<PerformanceReport, AppError> {
    let (assigned_count, timeout_count, rating) = {
        let driver = state
            .drivers
            .get(&driver_id)
            .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;
        (driver.assigned_count, driver.timeout_count, driver.rating)
    };

    let durations: Vec<i64> = state
        .deliveries
        .iter()
        .filter(|entry| entry.value().driver_id == driver_id)
        .filter_map(|entry| entry.value().duration_minutes())
        .collect();

    let avg_delivery_minutes = if durations.is_empty() {
        None
    } else {
        Some(durations.iter().sum::<i64>() as f64 / durations.len() as f64)
    };

    let speed_score = match avg_delivery_minutes {
        None => NEUTRAL_SPEED,
        Some(avg) => ((SLOW_MINUTES - avg) / (SLOW_MINUTES - FAST_MINUTES) * 100.0).clamp(0.0, 100.0),
    };

    let acceptance_rate = if assigned_count == 0 {
        1.0
    } else {
        let kept = assigned_count.saturating_sub(timeout_count);
        (f64::from(kept) / f64::from(assigned_count)).clamp(0.0, 1.0)
    };

    let rating_score = rating / 5.0 * 100.0;
    let score = (SPEED_WEIGHT * speed_score
        + ACCEPTANCE_WEIGHT * acceptance_rate * 100.0
        + RATING_WEIGHT * rating_score)
        .clamp(0.0, 100.0);

    if let Some(mut driver) = state.drivers.get_mut(&driver_id) {
        driver.performance_score = score;
    }

    info!(
        driver_id = %driver_id,
        score,
        acceptance_rate,
        avg_minutes = ?avg_delivery_minutes,
        "driver performance updated"
    );

    Ok(PerformanceReport {
        driver_id,
        score,
        avg_delivery_minutes,
        acceptance_rate,
        client_rating: rating,
    })
}
