use std::env;

use crate::error::AppError;
use crate::models::boost::BoostTier;
use crate::models::settings::default_boost_tiers;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    /// Shared operator secret for mutating endpoints (`X-Admin-Secret`).
    pub admin_secret: Option<String>,
    /// Bearer token presented by the external scheduler.
    pub scheduler_token: Option<String>,
    pub event_buffer_size: usize,
    /// An assignment nobody accepted within this window is stale.
    pub assignment_timeout_minutes: i64,
    /// `last_seen_at` freshness required to be assignable at all.
    pub driver_freshness_minutes: i64,
    /// Tighter freshness used when counting surge supply.
    pub surge_active_window_seconds: i64,
    /// Max concurrent orders per driver.
    pub max_active_orders: usize,
    /// Rolling risk score at which a driver is blocked.
    pub block_threshold: u8,
    /// Initial surge tier table; runtime updates go through the settings
    /// singleton.
    pub boost_tiers: Vec<BoostTier>,
    pub boost_cache_seconds: u32,
    pub weather_ttl_seconds: i64,
    /// Condition reported by the built-in weather provider until a real
    /// feed is wired in.
    pub weather_condition: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            admin_secret: None,
            scheduler_token: None,
            event_buffer_size: 1024,
            assignment_timeout_minutes: 3,
            driver_freshness_minutes: 5,
            surge_active_window_seconds: 60,
            max_active_orders: 3,
            block_threshold: 80,
            boost_tiers: default_boost_tiers(),
            boost_cache_seconds: 30,
            weather_ttl_seconds: 300,
            weather_condition: "clear".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let defaults = Config::default();

        let boost_tiers = match env::var("BOOST_TIERS") {
            Ok(raw) => parse_boost_tiers(&raw)?,
            Err(_) => defaults.boost_tiers,
        };

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", defaults.http_port)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            admin_secret: env::var("ADMIN_SECRET").ok(),
            scheduler_token: env::var("SCHEDULER_TOKEN").ok(),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", defaults.event_buffer_size)?,
            assignment_timeout_minutes: parse_or_default(
                "ASSIGNMENT_TIMEOUT_MINUTES",
                defaults.assignment_timeout_minutes,
            )?,
            driver_freshness_minutes: parse_or_default(
                "DRIVER_FRESHNESS_MINUTES",
                defaults.driver_freshness_minutes,
            )?,
            surge_active_window_seconds: parse_or_default(
                "SURGE_ACTIVE_WINDOW_SECONDS",
                defaults.surge_active_window_seconds,
            )?,
            max_active_orders: parse_or_default("MAX_ACTIVE_ORDERS", defaults.max_active_orders)?,
            block_threshold: parse_or_default("BLOCK_THRESHOLD", defaults.block_threshold)?,
            boost_tiers,
            boost_cache_seconds: parse_or_default("BOOST_CACHE_SECONDS", defaults.boost_cache_seconds)?,
            weather_ttl_seconds: parse_or_default("WEATHER_TTL_SECONDS", defaults.weather_ttl_seconds)?,
            weather_condition: env::var("WEATHER_CONDITION").unwrap_or(defaults.weather_condition),
        })
    }

    /// True once either secret is configured; otherwise the service runs
    /// open (development mode).
    pub fn auth_enabled(&self) -> bool {
        self.admin_secret.is_some() || self.scheduler_token.is_some()
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}

/// Parses `"min_ratio:amount,min_ratio:amount,…"` and sorts the tiers
/// highest ratio first, which is the order the surge lookup expects.
pub fn parse_boost_tiers(raw: &str) -> Result<Vec<BoostTier>, AppError> {
    let mut tiers = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (ratio, amount) = part.split_once(':').ok_or_else(|| {
            AppError::Internal(format!("invalid BOOST_TIERS entry {part:?}: expected ratio:amount"))
        })?;
        let min_ratio: f64 = ratio
            .trim()
            .parse()
            .map_err(|err| AppError::Internal(format!("invalid BOOST_TIERS ratio {ratio:?}: {err}")))?;
        let amount: f64 = amount
            .trim()
            .parse()
            .map_err(|err| AppError::Internal(format!("invalid BOOST_TIERS amount {amount:?}: {err}")))?;
        tiers.push(BoostTier { min_ratio, amount });
    }
    if tiers.is_empty() {
        return Err(AppError::Internal("BOOST_TIERS must define at least one tier".to_string()));
    }
    tiers.sort_by(|a, b| b.min_ratio.total_cmp(&a.min_ratio));
    Ok(tiers)
}
