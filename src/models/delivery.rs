use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::GeoPoint;
use crate::models::fraud::ReviewStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentType {
    Cash,
    Online,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Validated,
    Paid,
}

/// A driver-location snapshot reported at a lifecycle transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoSnapshot {
    pub point: GeoPoint,
    pub accuracy_m: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PayBreakdown {
    pub base: f64,
    pub distance: f64,
    pub speed_bonus: f64,
    pub boost_bonus: f64,
    pub rain_bonus: f64,
    pub total: f64,
}

impl PayBreakdown {
    pub fn recompute_total(&mut self) {
        self.total = self.base + self.distance + self.speed_bonus + self.boost_bonus + self.rain_bonus;
    }
}

/// One fulfillment attempt by one driver. Created at acceptance; immutable
/// once paid apart from administrative overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
    pub id: Uuid,
    pub order_id: Uuid,
    pub driver_id: Uuid,
    pub status: DeliveryStatus,
    pub payment: PaymentType,
    pub store_point: Option<GeoPoint>,
    pub customer_point: Option<GeoPoint>,
    /// Great-circle pickup→drop distance, frozen at acceptance.
    pub distance_km: f64,
    pub accepted_at: DateTime<Utc>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub reported_pickup: Option<GeoSnapshot>,
    pub reported_drop: Option<GeoSnapshot>,
    pub cash_settled: bool,
    pub cash_settled_at: Option<DateTime<Utc>>,
    pub pay: PayBreakdown,
    pub fraud_flags: Vec<String>,
    pub fraud_score: u8,
    pub review_status: ReviewStatus,
}

impl Delivery {
    pub fn new(
        order_id: Uuid,
        driver_id: Uuid,
        payment: PaymentType,
        store_point: Option<GeoPoint>,
        customer_point: Option<GeoPoint>,
        distance_km: f64,
        accepted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            driver_id,
            status: DeliveryStatus::Pending,
            payment,
            store_point,
            customer_point,
            distance_km,
            accepted_at,
            picked_up_at: None,
            delivered_at: None,
            cancelled_at: None,
            reported_pickup: None,
            reported_drop: None,
            cash_settled: false,
            cash_settled_at: None,
            pay: PayBreakdown::default(),
            fraud_flags: Vec::new(),
            fraud_score: 0,
            review_status: ReviewStatus::Ok,
        }
    }

    /// Accept→deliver span in whole minutes, when the delivery completed.
    pub fn duration_minutes(&self) -> Option<i64> {
        self.delivered_at
            .map(|done| (done - self.accepted_at).num_minutes())
    }

    /// The instant this delivery last did something: completion, then
    /// cancellation, then acceptance.
    pub fn activity_at(&self) -> DateTime<Utc> {
        self.delivered_at
            .or(self.cancelled_at)
            .unwrap_or(self.accepted_at)
    }
}
