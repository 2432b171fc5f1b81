use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Severity ranks low < medium < high; the event log keeps medium and up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Ok,
    Warning,
    Blocked,
}

/// One rule's verdict on one delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudFlag {
    pub key: String,
    pub severity: Severity,
    pub impact: u32,
    pub details: Value,
}

impl FraudFlag {
    pub fn new(key: &str, severity: Severity, impact: u32, details: Value) -> Self {
        Self {
            key: key.to_string(),
            severity,
            impact,
            details,
        }
    }
}

/// Append-only record of a medium/high flag, markable resolved by an
/// operator but never rewritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudEvent {
    pub id: Uuid,
    pub delivery_id: Uuid,
    pub driver_id: Uuid,
    pub flag_key: String,
    pub severity: Severity,
    pub impact: u32,
    pub details: Value,
    pub created_at: DateTime<Utc>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl FraudEvent {
    pub fn from_flag(delivery_id: Uuid, driver_id: Uuid, flag: &FraudFlag, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            delivery_id,
            driver_id,
            flag_key: flag.key.clone(),
            severity: flag.severity,
            impact: flag.impact,
            details: flag.details.clone(),
            created_at: at,
            resolved: false,
            resolved_at: None,
        }
    }
}
