use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::engine::scoring::assignment_cost;
use crate::error::AppError;
use crate::geo::haversine_km;
use crate::models::driver::{Driver, DriverStatus};
use crate::models::event::DomainEvent;
use crate::models::order::{FulfillmentType, OrderStatus};
use crate::state::AppState;

/// The order was not a candidate for assignment in the first place.
/// Calling assign on such an order is a no-op, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NotADelivery,
    MissingCoordinates,
    AlreadyAssigned,
}

/// Supply fell short right now; the caller simply tries again next cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoCapacityReason {
    NoAvailableDrivers,
    NoDriversWithLocation,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AssignOutcome {
    Assigned {
        driver_id: Uuid,
        driver_name: String,
        distance_km: f64,
        candidate_count: usize,
    },
    NotAssigned {
        reason: NoCapacityReason,
    },
    Skipped {
        reason: SkipReason,
    },
}

impl AssignOutcome {
    pub fn metric_label(&self) -> &'static str {
        match self {
            AssignOutcome::Assigned { .. } => "assigned",
            AssignOutcome::NotAssigned { .. } => "not_assigned",
            AssignOutcome::Skipped { .. } => "skipped",
        }
    }
}

struct Candidate {
    driver_id: Uuid,
    driver_name: String,
    cost: f64,
    distance_km: f64,
}

/// Picks the cheapest eligible driver for one order and claims the order
/// for them. `skip` holds drivers the caller wants excluded on top of the
/// order's own timed-out set.
pub fn assign(state: &AppState, order_id: Uuid, skip: &[Uuid]) -> Result<AssignOutcome, AppError> {
    let order = state
        .orders
        .get(&order_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

    if order.fulfillment != FulfillmentType::Delivery {
        return Ok(AssignOutcome::Skipped {
            reason: SkipReason::NotADelivery,
        });
    }
    let Some(pickup) = order.pickup else {
        return Ok(AssignOutcome::Skipped {
            reason: SkipReason::MissingCoordinates,
        });
    };
    if order.assigned_driver_id.is_some() {
        return Ok(AssignOutcome::Skipped {
            reason: SkipReason::AlreadyAssigned,
        });
    }

    let now = Utc::now();
    let freshness = Duration::minutes(state.config.driver_freshness_minutes);
    let mut excluded: BTreeSet<Uuid> = order.timed_out_driver_ids.clone();
    excluded.extend(skip.iter().copied());

    let eligible: Vec<Driver> = state
        .drivers
        .iter()
        .filter(|entry| {
            is_eligible(
                entry.value(),
                &excluded,
                now,
                freshness,
                state.config.max_active_orders,
            )
        })
        .map(|entry| entry.value().clone())
        .collect();

    if eligible.is_empty() {
        return Ok(AssignOutcome::NotAssigned {
            reason: NoCapacityReason::NoAvailableDrivers,
        });
    }

    let candidates: Vec<Candidate> = eligible
        .into_iter()
        .filter_map(|driver| {
            let location = state.driver_locations.get(&driver.id)?;
            let distance_km = haversine_km(&location.point, &pickup);
            let cost = assignment_cost(
                distance_km,
                driver.rating,
                driver.performance_score,
                order.is_rush,
            );
            Some(Candidate {
                driver_id: driver.id,
                driver_name: driver.name,
                cost,
                distance_km,
            })
        })
        .collect();

    if candidates.is_empty() {
        return Ok(AssignOutcome::NotAssigned {
            reason: NoCapacityReason::NoDriversWithLocation,
        });
    }

    // Lowest cost wins; a tie keeps the earliest candidate, so the pick is
    // deterministic for a fixed candidate snapshot.
    let mut winner = &candidates[0];
    for candidate in &candidates[1..] {
        if candidate.cost < winner.cost {
            winner = candidate;
        }
    }

    // The claim is a single conditional write: the entry guard spans the
    // recheck and the mutation, so two concurrent attempts cannot both set
    // the assignment.
    let claimed = match state.orders.get_mut(&order_id) {
        None => {
            return Err(AppError::NotFound(format!(
                "order {order_id} vanished during assignment"
            )))
        }
        Some(mut entry) => {
            if entry.assigned_driver_id.is_some() {
                false
            } else {
                entry.assigned_driver_id = Some(winner.driver_id);
                entry.assigned_driver_name = Some(winner.driver_name.clone());
                entry.assigned_at = Some(now);
                entry.assigned_distance_km = Some(winner.distance_km);
                entry.status = OrderStatus::AssignedPending;
                true
            }
        }
    };

    if !claimed {
        return Ok(AssignOutcome::Skipped {
            reason: SkipReason::AlreadyAssigned,
        });
    }

    if let Some(mut driver) = state.drivers.get_mut(&winner.driver_id) {
        driver.active_order_ids.insert(order_id);
        driver.assigned_count += 1;
        if driver.status == DriverStatus::Online {
            driver.status = DriverStatus::Busy;
        }
    }

    state.emit(DomainEvent::OrderAssigned {
        order_id,
        driver_id: winner.driver_id,
        driver_name: winner.driver_name.clone(),
        distance_km: winner.distance_km,
        at: now,
    });

    info!(
        order_id = %order_id,
        driver_id = %winner.driver_id,
        distance_km = winner.distance_km,
        candidates = candidates.len(),
        "order assigned"
    );

    Ok(AssignOutcome::Assigned {
        driver_id: winner.driver_id,
        driver_name: winner.driver_name.clone(),
        distance_km: winner.distance_km,
        candidate_count: candidates.len(),
    })
}

fn is_eligible(
    driver: &Driver,
    excluded: &BTreeSet<Uuid>,
    now: DateTime<Utc>,
    freshness: Duration,
    cap: usize,
) -> bool {
    if excluded.contains(&driver.id) {
        return false;
    }
    if !driver.online {
        return false;
    }
    match driver.status {
        DriverStatus::Offline => return false,
        DriverStatus::Busy if driver.active_order_ids.len() >= cap => return false,
        _ => {}
    }
    if now - driver.last_seen_at > freshness {
        return false;
    }
    !driver.is_blocked
}
