use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One surge tier: orders-per-driver ratio at or above `min_ratio` pays
/// `amount` extra per delivery.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoostTier {
    pub min_ratio: f64,
    pub amount: f64,
}

/// Current surge snapshot, overwritten on every tick. History lives only in
/// the event log of OFF→ON transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostState {
    pub ratio: f64,
    pub bonus: f64,
    pub pending_orders: u64,
    pub active_drivers: u64,
    pub is_active: bool,
    pub reason: String,
    pub computed_at: DateTime<Utc>,
}

impl BoostState {
    pub fn inactive(at: DateTime<Utc>) -> Self {
        Self {
            ratio: 0.0,
            bonus: 0.0,
            pending_orders: 0,
            active_drivers: 0,
            is_active: false,
            reason: "no demand data yet".to_string(),
            computed_at: at,
        }
    }
}

impl Default for BoostState {
    fn default() -> Self {
        Self::inactive(Utc::now())
    }
}
