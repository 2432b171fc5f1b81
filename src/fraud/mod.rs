use chrono::{DateTime, Utc};

use crate::models::delivery::Delivery;
use crate::models::driver::{Driver, DriverLocation};
use crate::models::fraud::FraudFlag;
use crate::models::order::Order;

pub mod risk;
pub mod rules;

/// Everything a rule may look at, assembled once per check. Rules are pure
/// functions over this snapshot; they never touch shared state themselves.
pub struct RuleContext<'a> {
    pub delivery: &'a Delivery,
    pub order: Option<&'a Order>,
    pub driver: &'a Driver,
    pub location: Option<&'a DriverLocation>,
    /// The driver's other deliveries, current one excluded.
    pub history: &'a [Delivery],
    pub now: DateTime<Utc>,
}

pub type Rule = for<'a, 'b> fn(&'a RuleContext<'b>) -> Option<FraudFlag>;

/// Runs the full rule set in its published order. A rule that does not
/// apply stays silent; there is no short-circuiting, every rule sees every
/// delivery.
pub fn evaluate_rules(ctx: &RuleContext) -> Vec<FraudFlag> {
    rules::ALL.iter().filter_map(|rule| rule(ctx)).collect()
}
