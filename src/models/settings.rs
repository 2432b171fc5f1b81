use serde::{Deserialize, Serialize};

use crate::models::boost::BoostTier;

/// Tunable fee and bonus parameters, kept as a single runtime-replaceable
/// document. Business owners change these at runtime; nothing here is
/// compiled in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliverySettings {
    pub base_fee: f64,
    pub per_km_fee: f64,
    /// Paid when accept→deliver stays under `fast_delivery_minutes`.
    pub speed_bonus_amount: f64,
    pub fast_delivery_minutes: i64,
    pub rain_bonus_amount: f64,
    /// Surge tiers, highest `min_ratio` first.
    pub boost_tiers: Vec<BoostTier>,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            base_fee: 3.0,
            per_km_fee: 1.2,
            speed_bonus_amount: 2.0,
            fast_delivery_minutes: 15,
            rain_bonus_amount: 1.5,
            boost_tiers: default_boost_tiers(),
        }
    }
}

pub fn default_boost_tiers() -> Vec<BoostTier> {
    vec![
        BoostTier {
            min_ratio: 4.0,
            amount: 5.0,
        },
        BoostTier {
            min_ratio: 3.0,
            amount: 3.0,
        },
        BoostTier {
            min_ratio: 2.0,
            amount: 1.5,
        },
    ]
}
