use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// State transitions other parties care about. Emitted on the broadcast bus;
/// the websocket feed and the notifier consume them, and a lost event never
/// affects the transition that produced it.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    OrderAssigned {
        order_id: Uuid,
        driver_id: Uuid,
        driver_name: String,
        distance_km: f64,
        at: DateTime<Utc>,
    },
    SurgeActivated {
        ratio: f64,
        bonus: f64,
        pending_orders: u64,
        active_drivers: u64,
        at: DateTime<Utc>,
    },
    DriverBlocked {
        driver_id: Uuid,
        risk_score: u8,
        strikes_count: u32,
        at: DateTime<Utc>,
    },
}
