use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::GeoPoint;
use crate::models::delivery::PaymentType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FulfillmentType {
    Delivery,
    Pickup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderStatus {
    New,
    AssignedPending,
    InProgress,
    Delivered,
    Cancelled,
}

/// An order as the platform stores it. `assigned_driver_id` set implies
/// `assigned_at` set; both are cleared together by the timeout sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub fulfillment: FulfillmentType,
    pub pickup: Option<GeoPoint>,
    pub dropoff: Option<GeoPoint>,
    pub payment: PaymentType,
    pub is_rush: bool,
    pub status: OrderStatus,
    pub assigned_driver_id: Option<Uuid>,
    pub assigned_driver_name: Option<String>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub assigned_distance_km: Option<f64>,
    /// Drivers that let an assignment for this order go stale. Grows
    /// monotonically; every future assignment excludes them.
    pub timed_out_driver_ids: BTreeSet<Uuid>,
    pub last_timeout_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn new(
        fulfillment: FulfillmentType,
        pickup: Option<GeoPoint>,
        dropoff: Option<GeoPoint>,
        payment: PaymentType,
        is_rush: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            fulfillment,
            pickup,
            dropoff,
            payment,
            is_rush,
            status: OrderStatus::New,
            assigned_driver_id: None,
            assigned_driver_name: None,
            assigned_at: None,
            assigned_distance_km: None,
            timed_out_driver_ids: BTreeSet::new(),
            last_timeout_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn clear_assignment(&mut self) {
        self.assigned_driver_id = None;
        self.assigned_driver_name = None;
        self.assigned_at = None;
        self.assigned_distance_km = None;
        self.status = OrderStatus::New;
    }
}
