use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::warn;

use crate::error::AppError;

#[derive(Debug, Clone, Serialize)]
pub struct WeatherSignal {
    pub condition: String,
    pub is_raining: bool,
}

impl WeatherSignal {
    pub fn from_condition(condition: &str) -> Self {
        let lowered = condition.to_lowercase();
        let is_raining = ["rain", "drizzle", "storm", "thunder", "snow"]
            .iter()
            .any(|wet| lowered.contains(wet));
        Self {
            condition: lowered,
            is_raining,
        }
    }

    /// Degraded stand-in when the feed is down and nothing is cached.
    pub fn neutral() -> Self {
        Self {
            condition: "unknown".to_string(),
            is_raining: false,
        }
    }
}

#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn current(&self) -> Result<WeatherSignal, AppError>;
}

/// Stand-in provider reporting a fixed condition from configuration. The
/// real feed lives behind the same trait.
pub struct StaticWeatherProvider {
    condition: String,
}

impl StaticWeatherProvider {
    pub fn new(condition: String) -> Self {
        Self { condition }
    }
}

#[async_trait]
impl WeatherProvider for StaticWeatherProvider {
    async fn current(&self) -> Result<WeatherSignal, AppError> {
        Ok(WeatherSignal::from_condition(&self.condition))
    }
}

struct CachedSignal {
    signal: WeatherSignal,
    fetched_at: DateTime<Utc>,
}

/// Read-through cache over the weather feed. The caller passes `now`, so
/// freshness is decided by the clock the caller lives on, and the returned
/// bool says whether the value is trustworthy (cached-fresh or just fetched)
/// as opposed to degraded (stale fallback or neutral default).
pub struct WeatherService {
    provider: Box<dyn WeatherProvider>,
    ttl: Duration,
    slot: RwLock<Option<CachedSignal>>,
}

impl WeatherService {
    pub fn new(provider: Box<dyn WeatherProvider>, ttl_seconds: i64) -> Self {
        Self {
            provider,
            ttl: Duration::seconds(ttl_seconds),
            slot: RwLock::new(None),
        }
    }

    pub async fn get(&self, now: DateTime<Utc>) -> (WeatherSignal, bool) {
        {
            let slot = self.slot.read().expect("weather cache lock poisoned");
            if let Some(cached) = slot.as_ref() {
                if now - cached.fetched_at <= self.ttl {
                    return (cached.signal.clone(), true);
                }
            }
        }

        match self.provider.current().await {
            Ok(signal) => {
                let mut slot = self.slot.write().expect("weather cache lock poisoned");
                *slot = Some(CachedSignal {
                    signal: signal.clone(),
                    fetched_at: now,
                });
                (signal, true)
            }
            Err(err) => {
                warn!(error = %err, "weather lookup failed; degrading to neutral signal");
                let slot = self.slot.read().expect("weather cache lock poisoned");
                match slot.as_ref() {
                    Some(cached) => (cached.signal.clone(), false),
                    None => (WeatherSignal::neutral(), false),
                }
            }
        }
    }
}
