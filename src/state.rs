use std::sync::RwLock;

use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::config::Config;
use crate::models::boost::BoostState;
use crate::models::delivery::Delivery;
use crate::models::driver::{Driver, DriverLocation};
use crate::models::event::DomainEvent;
use crate::models::fraud::FraudEvent;
use crate::models::order::Order;
use crate::models::settings::DeliverySettings;
use crate::observability::metrics::Metrics;
use crate::weather::{StaticWeatherProvider, WeatherProvider, WeatherService};

/// Shared store and service handles. Orders and drivers are mutated by
/// several actors at once; writers go through the DashMap entry guards so a
/// full read-modify-write happens under one entry lock.
pub struct AppState {
    pub config: Config,
    pub orders: DashMap<Uuid, Order>,
    pub drivers: DashMap<Uuid, Driver>,
    pub driver_locations: DashMap<Uuid, DriverLocation>,
    pub deliveries: DashMap<Uuid, Delivery>,
    pub fraud_events: DashMap<Uuid, FraudEvent>,
    pub boost: RwLock<BoostState>,
    pub settings: RwLock<DeliverySettings>,
    pub events_tx: broadcast::Sender<DomainEvent>,
    pub weather: WeatherService,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let provider = Box::new(StaticWeatherProvider::new(config.weather_condition.clone()));
        Self::with_weather_provider(config, provider)
    }

    pub fn with_weather_provider(config: Config, provider: Box<dyn WeatherProvider>) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(config.event_buffer_size);
        let weather = WeatherService::new(provider, config.weather_ttl_seconds);
        let settings = DeliverySettings {
            boost_tiers: config.boost_tiers.clone(),
            ..DeliverySettings::default()
        };

        Self {
            config,
            orders: DashMap::new(),
            drivers: DashMap::new(),
            driver_locations: DashMap::new(),
            deliveries: DashMap::new(),
            fraud_events: DashMap::new(),
            boost: RwLock::new(BoostState::default()),
            settings: RwLock::new(settings),
            events_tx,
            weather,
            metrics: Metrics::new(),
        }
    }

    /// Fire-and-forget: nobody listening is fine.
    pub fn emit(&self, event: DomainEvent) {
        let _ = self.events_tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.events_tx.subscribe()
    }

    pub fn settings_snapshot(&self) -> DeliverySettings {
        self.settings
            .read()
            .expect("settings lock poisoned")
            .clone()
    }

    pub fn boost_snapshot(&self) -> BoostState {
        self.boost.read().expect("boost state lock poisoned").clone()
    }

    pub fn refresh_blocked_gauge(&self) {
        let blocked = self
            .drivers
            .iter()
            .filter(|entry| entry.value().is_blocked)
            .count();
        self.metrics.blocked_drivers.set(blocked as i64);
    }
}
