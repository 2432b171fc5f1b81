use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverStatus {
    Online,
    Busy,
    Offline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: Uuid,
    pub name: String,
    pub online: bool,
    pub status: DriverStatus,
    pub last_seen_at: DateTime<Utc>,
    /// Client rating, 0–5.
    pub rating: f64,
    /// Delivery-speed/acceptance/rating composite, 0–100. Independent of
    /// `risk_score`; only rush scoring reads it.
    pub performance_score: f64,
    pub active_order_ids: BTreeSet<Uuid>,
    pub assigned_count: u32,
    pub timeout_count: u32,
    /// Rolling fraud risk over recent deliveries, 0–100.
    pub risk_score: u8,
    pub strikes_count: u32,
    /// A blocked driver is never eligible for assignment, whatever the
    /// other criteria say.
    pub is_blocked: bool,
    pub created_at: DateTime<Utc>,
}

impl Driver {
    pub fn new(name: String, rating: f64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            online: true,
            status: DriverStatus::Online,
            last_seen_at: now,
            rating: rating.clamp(0.0, 5.0),
            performance_score: 50.0,
            active_order_ids: BTreeSet::new(),
            assigned_count: 0,
            timeout_count: 0,
            risk_score: 0,
            strikes_count: 0,
            is_blocked: false,
            created_at: now,
        }
    }
}

/// Last known position, kept apart from the driver document. The previous
/// fix stays around so the location-jump rule can compare the two most
/// recent positions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverLocation {
    pub driver_id: Uuid,
    pub point: GeoPoint,
    pub accuracy_m: Option<f64>,
    pub recorded_at: DateTime<Utc>,
    pub previous_point: Option<GeoPoint>,
    pub previous_recorded_at: Option<DateTime<Utc>>,
}

impl DriverLocation {
    pub fn first_fix(
        driver_id: Uuid,
        point: GeoPoint,
        accuracy_m: Option<f64>,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            driver_id,
            point,
            accuracy_m,
            recorded_at,
            previous_point: None,
            previous_recorded_at: None,
        }
    }

    /// Records a new fix, shifting the current one into the previous slot.
    pub fn advance(&mut self, point: GeoPoint, accuracy_m: Option<f64>, recorded_at: DateTime<Utc>) {
        self.previous_point = Some(self.point);
        self.previous_recorded_at = Some(self.recorded_at);
        self.point = point;
        self.accuracy_m = accuracy_m;
        self.recorded_at = recorded_at;
    }
}
