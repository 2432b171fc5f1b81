use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::fraud::{evaluate_rules, RuleContext};
use crate::models::event::DomainEvent;
use crate::models::fraud::{FraudEvent, FraudFlag, ReviewStatus, Severity};
use crate::state::AppState;

/// Delivery score at which the payout is held for review.
pub const WARNING_SCORE: u8 = 60;
/// Delivery score at which the payout is refused outright.
pub const BLOCKED_SCORE: u8 = 80;

/// Deliveries weighted heavily in the rolling driver risk.
pub const RECENT_BAND: usize = 7;
/// Total deliveries the rolling risk looks back over.
pub const HISTORY_BAND: usize = 20;
const RECENT_WEIGHT: f64 = 0.7;
const OLDER_WEIGHT: f64 = 0.3;

#[derive(Debug, Serialize)]
pub struct FraudCheckReport {
    pub delivery_id: Uuid,
    pub driver_id: Uuid,
    pub flags: Vec<FraudFlag>,
    pub fraud_score: u8,
    pub review_status: ReviewStatus,
    pub driver_risk_score: u8,
    pub is_blocked: bool,
    pub new_events: usize,
}

/// Sums rule impacts into the delivery score, capped at 100.
pub fn aggregate_score(flags: &[FraudFlag]) -> u8 {
    let total: u32 = flags.iter().map(|f| f.impact).sum();
    total.min(100) as u8
}

pub fn review_status_for(score: u8) -> ReviewStatus {
    if score >= BLOCKED_SCORE {
        ReviewStatus::Blocked
    } else if score >= WARNING_SCORE {
        ReviewStatus::Warning
    } else {
        ReviewStatus::Ok
    }
}

/// Blends the driver's recent delivery scores, newest first: the last
/// seven carry most of the weight, the thirteen before them the rest. A
/// band with nothing in it contributes zero rather than being skipped, so
/// a thin history reads as low risk.
pub fn driver_risk_score(scores: &[u8]) -> u8 {
    let scores = &scores[..scores.len().min(HISTORY_BAND)];
    let split = scores.len().min(RECENT_BAND);
    let (recent, older) = scores.split_at(split);

    let avg = |band: &[u8]| {
        if band.is_empty() {
            0.0
        } else {
            band.iter().map(|s| f64::from(*s)).sum::<f64>() / band.len() as f64
        }
    };

    let blended = avg(recent) * RECENT_WEIGHT + avg(older) * OLDER_WEIGHT;
    blended.round().min(100.0) as u8
}

/// Runs the rule set against one delivery, persists the verdict, files
/// events for every medium-or-worse flag and refreshes the driver's
/// rolling risk. Crossing the block threshold announces itself exactly
/// once.
pub fn run_fraud_check(state: &AppState, delivery_id: Uuid) -> Result<FraudCheckReport, AppError> {
    let delivery = state
        .deliveries
        .get(&delivery_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("delivery {delivery_id} not found")))?;

    let driver_id = delivery.driver_id;
    let driver = state
        .drivers
        .get(&driver_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;

    let order = state
        .orders
        .get(&delivery.order_id)
        .map(|entry| entry.value().clone());
    let location = state
        .driver_locations
        .get(&driver_id)
        .map(|entry| entry.value().clone());
    let history: Vec<_> = state
        .deliveries
        .iter()
        .filter(|entry| {
            let d = entry.value();
            d.driver_id == driver_id && d.id != delivery_id
        })
        .map(|entry| entry.value().clone())
        .collect();

    let now = Utc::now();
    let ctx = RuleContext {
        delivery: &delivery,
        order: order.as_ref(),
        driver: &driver,
        location: location.as_ref(),
        history: &history,
        now,
    };

    let flags = evaluate_rules(&ctx);
    let fraud_score = aggregate_score(&flags);
    let review_status = review_status_for(fraud_score);

    if let Some(mut stored) = state.deliveries.get_mut(&delivery_id) {
        stored.fraud_flags = flags.iter().map(|f| f.key.clone()).collect();
        stored.fraud_score = fraud_score;
        stored.review_status = review_status;
    }

    let mut new_events = 0;
    for flag in &flags {
        state
            .metrics
            .fraud_flags_total
            .with_label_values(&[flag.key.as_str()])
            .inc();
        if flag.severity >= Severity::Medium {
            let event = FraudEvent::from_flag(delivery_id, driver_id, flag, now);
            state.fraud_events.insert(event.id, event);
            new_events += 1;
        }
    }

    let risk = recompute_driver_risk(state, driver_id);
    let strikes = flags.iter().filter(|f| f.severity == Severity::High).count() as u32;

    let (is_blocked, newly_blocked, strikes_count) = match state.drivers.get_mut(&driver_id) {
        Some(mut stored) => {
            let was_blocked = stored.is_blocked;
            stored.risk_score = risk;
            stored.strikes_count += strikes;
            stored.is_blocked = risk >= state.config.block_threshold;
            (
                stored.is_blocked,
                stored.is_blocked && !was_blocked,
                stored.strikes_count,
            )
        }
        None => (false, false, 0),
    };

    if newly_blocked {
        warn!(driver_id = %driver_id, risk, "driver blocked for fraud risk");
        state.emit(DomainEvent::DriverBlocked {
            driver_id,
            risk_score: risk,
            strikes_count,
            at: now,
        });
    }
    state.refresh_blocked_gauge();

    state
        .metrics
        .fraud_checks_total
        .with_label_values(&[review_label(review_status)])
        .inc();
    info!(
        delivery_id = %delivery_id,
        driver_id = %driver_id,
        fraud_score,
        risk,
        flags = flags.len(),
        "fraud check complete"
    );

    Ok(FraudCheckReport {
        delivery_id,
        driver_id,
        flags,
        fraud_score,
        review_status,
        driver_risk_score: risk,
        is_blocked,
        new_events,
    })
}

/// Clears a driver's rolling risk, strike count and block. The per-delivery
/// scores stay; the next fraud check rebuilds the risk from them.
pub fn reset_driver_risk(state: &AppState, driver_id: Uuid) -> Result<(), AppError> {
    {
        let mut driver = state
            .drivers
            .get_mut(&driver_id)
            .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;
        driver.risk_score = 0;
        driver.strikes_count = 0;
        driver.is_blocked = false;
    }
    state.refresh_blocked_gauge();
    info!(driver_id = %driver_id, "driver risk reset");
    Ok(())
}

fn recompute_driver_risk(state: &AppState, driver_id: Uuid) -> u8 {
    let mut scored: Vec<(DateTime<Utc>, u8)> = state
        .deliveries
        .iter()
        .filter(|entry| entry.value().driver_id == driver_id)
        .map(|entry| (entry.value().activity_at(), entry.value().fraud_score))
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));

    let scores: Vec<u8> = scored.into_iter().map(|(_, score)| score).collect();
    driver_risk_score(&scores)
}

fn review_label(status: ReviewStatus) -> &'static str {
    match status {
        ReviewStatus::Ok => "ok",
        ReviewStatus::Warning => "warning",
        ReviewStatus::Blocked => "blocked",
    }
}
