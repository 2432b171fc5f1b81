use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::engine::assignment::{self, AssignOutcome};
use crate::error::AppError;
use crate::models::driver::DriverStatus;
use crate::models::order::OrderStatus;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct TimeoutSweepSummary {
    pub processed: usize,
    pub reassigned: usize,
    pub results: Vec<OrderTimeoutResult>,
}

#[derive(Debug, Serialize)]
pub struct OrderTimeoutResult {
    pub order_id: Uuid,
    pub released_driver_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<AssignOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Recovers orders whose assignment was never accepted in time: releases
/// the stale driver, grows the order's exclusion set and asks the
/// assignment engine for a replacement. Every order is handled inside its
/// own error boundary so one bad record cannot sink the whole sweep.
pub fn run_timeout_sweep(state: &AppState) -> TimeoutSweepSummary {
    let now = Utc::now();
    let stale_after = Duration::minutes(state.config.assignment_timeout_minutes);

    let stale: Vec<(Uuid, Uuid)> = state
        .orders
        .iter()
        .filter_map(|entry| {
            let order = entry.value();
            let in_scope = matches!(
                order.status,
                OrderStatus::New | OrderStatus::AssignedPending
            );
            match (in_scope, order.assigned_driver_id, order.assigned_at) {
                (true, Some(driver_id), Some(assigned_at)) if now - assigned_at > stale_after => {
                    Some((order.id, driver_id))
                }
                _ => None,
            }
        })
        .collect();

    let mut results = Vec::with_capacity(stale.len());
    let mut reassigned = 0;

    for (order_id, stale_driver) in stale {
        match recover_order(state, order_id, stale_driver, now) {
            Ok(Some(outcome)) => {
                if matches!(outcome, AssignOutcome::Assigned { .. }) {
                    reassigned += 1;
                    state.metrics.timeout_reassigned_total.inc();
                }
                results.push(OrderTimeoutResult {
                    order_id,
                    released_driver_id: Some(stale_driver),
                    outcome: Some(outcome),
                    error: None,
                });
            }
            Ok(None) => {
                // Someone else moved the order between the scan and the
                // release; nothing to recover.
                results.push(OrderTimeoutResult {
                    order_id,
                    released_driver_id: None,
                    outcome: None,
                    error: None,
                });
            }
            Err(err) => {
                error!(order_id = %order_id, error = %err, "timeout recovery failed");
                results.push(OrderTimeoutResult {
                    order_id,
                    released_driver_id: Some(stale_driver),
                    outcome: None,
                    error: Some(err.to_string()),
                });
            }
        }
        state.metrics.timeout_orders_processed_total.inc();
    }

    state.metrics.timeout_sweeps_total.inc();
    info!(
        processed = results.len(),
        reassigned, "timeout sweep finished"
    );

    TimeoutSweepSummary {
        processed: results.len(),
        reassigned,
        results,
    }
}

/// Releases one stale assignment and retries. The release only happens if
/// the same driver still holds the order (conditional write, same guard
/// discipline as the claim).
fn recover_order(
    state: &AppState,
    order_id: Uuid,
    stale_driver: Uuid,
    now: DateTime<Utc>,
) -> Result<Option<AssignOutcome>, AppError> {
    let released = match state.orders.get_mut(&order_id) {
        None => return Ok(None),
        Some(mut order) => {
            if order.assigned_driver_id != Some(stale_driver) {
                false
            } else {
                order.timed_out_driver_ids.insert(stale_driver);
                order.clear_assignment();
                order.last_timeout_at = Some(now);
                true
            }
        }
    };

    if !released {
        return Ok(None);
    }

    if let Some(mut driver) = state.drivers.get_mut(&stale_driver) {
        driver.active_order_ids.remove(&order_id);
        driver.timeout_count += 1;
        if driver.active_order_ids.is_empty() && driver.status == DriverStatus::Busy {
            driver.status = DriverStatus::Online;
        }
    }

    info!(
        order_id = %order_id,
        driver_id = %stale_driver,
        "stale assignment released"
    );

    let outcome = assignment::assign(state, order_id, &[])?;
    Ok(Some(outcome))
}
