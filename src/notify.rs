use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::error::AppError;
use crate::models::event::DomainEvent;
use crate::state::AppState;

/// Outbound notification channel. Push, SMS and chat delivery belong to
/// other services; they plug in here.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, event: &DomainEvent) -> Result<(), AppError>;
}

/// Default sink: structured log lines only.
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn deliver(&self, event: &DomainEvent) -> Result<(), AppError> {
        match event {
            DomainEvent::OrderAssigned {
                order_id,
                driver_id,
                distance_km,
                ..
            } => info!(
                order_id = %order_id,
                driver_id = %driver_id,
                distance_km,
                "notify: order assigned"
            ),
            DomainEvent::SurgeActivated { ratio, bonus, .. } => info!(
                ratio,
                bonus, "notify: surge bonus activated for all online drivers"
            ),
            DomainEvent::DriverBlocked {
                driver_id,
                risk_score,
                ..
            } => info!(
                driver_id = %driver_id,
                risk_score,
                "notify: driver blocked pending review"
            ),
        }
        Ok(())
    }
}

/// Drains the event bus into the sink. Delivery failures are logged and
/// dropped; the state transition that emitted the event already happened
/// and must not be disturbed.
pub async fn run_notifier(state: Arc<AppState>, sink: Box<dyn NotificationSink>) {
    let mut rx = state.subscribe();
    info!("notifier started");

    loop {
        match rx.recv().await {
            Ok(event) => {
                if let Err(err) = sink.deliver(&event).await {
                    warn!(error = %err, "notification delivery failed");
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "notifier lagged behind the event bus");
            }
            Err(RecvError::Closed) => break,
        }
    }

    warn!("notifier stopped: event channel closed");
}
