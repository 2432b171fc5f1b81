use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::models::boost::{BoostState, BoostTier};
use crate::models::event::DomainEvent;
use crate::models::order::OrderStatus;
use crate::state::AppState;

/// Looks the ratio up in the tier table (sorted highest `min_ratio`
/// first). No tier reached means no bonus.
pub fn bonus_for_ratio(ratio: f64, tiers: &[BoostTier]) -> f64 {
    tiers
        .iter()
        .find(|tier| ratio >= tier.min_ratio)
        .map(|tier| tier.amount)
        .unwrap_or(0.0)
}

/// One surge tick: measures unassigned demand against recently-seen
/// supply, persists the new snapshot and announces the OFF→ON edge.
/// Ongoing surge and the ON→OFF edge stay quiet so subscribers only hear
/// about a surge once.
pub fn run_boost_tick(state: &AppState, now: DateTime<Utc>) -> BoostState {
    let pending_orders = state
        .orders
        .iter()
        .filter(|entry| entry.value().status == OrderStatus::New)
        .count() as u64;

    let active_window = Duration::seconds(state.config.surge_active_window_seconds);
    let active_drivers = state
        .drivers
        .iter()
        .filter(|entry| {
            let driver = entry.value();
            driver.online && !driver.is_blocked && now - driver.last_seen_at <= active_window
        })
        .count() as u64;

    // A floor of one driver keeps an empty roster from reading as
    // infinite demand.
    let ratio = pending_orders as f64 / active_drivers.max(1) as f64;
    let tiers = state.settings_snapshot().boost_tiers;
    let bonus = bonus_for_ratio(ratio, &tiers);
    let is_active = bonus > 0.0;

    let snapshot = BoostState {
        ratio,
        bonus,
        pending_orders,
        active_drivers,
        is_active,
        reason: format!(
            "{pending_orders} pending orders / {active_drivers} active drivers (ratio {ratio:.2})"
        ),
        computed_at: now,
    };

    let turned_on = {
        let mut boost = state.boost.write().expect("boost state lock poisoned");
        let was_active = boost.is_active;
        *boost = snapshot.clone();
        is_active && !was_active
    };

    state.metrics.boost_ratio.set(ratio);
    state.metrics.boost_bonus.set(bonus);

    if turned_on {
        info!(ratio, bonus, pending_orders, active_drivers, "surge activated");
        state.emit(DomainEvent::SurgeActivated {
            ratio,
            bonus,
            pending_orders,
            active_drivers,
            at: now,
        });
    }

    snapshot
}
