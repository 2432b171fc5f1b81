use std::iter;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use super::{Rule, RuleContext};
use crate::geo::{haversine_km, haversine_m};
use crate::models::delivery::PaymentType;
use crate::models::fraud::{FraudFlag, Severity};

/// The published rule set, in evaluation order.
pub(crate) const ALL: &[Rule] = &[
    drop_not_at_customer,
    pickup_not_at_store,
    impossible_speed,
    too_fast_for_distance,
    speed_bonus_suspect,
    speed_bonus_repeat,
    repeated_gps_pattern,
    location_jump,
    boost_farming,
    boost_pattern,
    cash_not_settled_24h,
    cash_risk_repeat,
    high_cancel_rate,
    cancel_after_pickup,
];

const DROP_RADIUS_M: f64 = 150.0;
const PICKUP_RADIUS_M: f64 = 150.0;
/// A fix this coarse turns the drop mismatch into a soft signal.
const POOR_ACCURACY_M: f64 = 100.0;
const MAX_SPEED_KMH: f64 = 80.0;
/// Below this leg length speed says nothing.
const MIN_MEASURED_KM: f64 = 0.1;
const TOO_FAST_MINUTES: i64 = 5;
const TOO_FAST_KM: f64 = 2.0;
const BONUS_SUSPECT_KM: f64 = 3.0;
const BONUS_SUSPECT_MINUTES: i64 = 12;
const BONUS_REPEAT_WINDOW_MINUTES: i64 = 60;
const BONUS_REPEAT_COUNT: usize = 2;
const GPS_PATTERN_RADIUS_M: f64 = 10.0;
const GPS_PATTERN_COUNT: usize = 2;
const JUMP_KM: f64 = 5.0;
const JUMP_WINDOW_SECONDS: i64 = 120;
const FARMING_WINDOW_MINUTES: i64 = 60;
const FARMING_COUNT: usize = 6;
const PATTERN_WINDOW_MINUTES: i64 = 30;
const PATTERN_COUNT: usize = 4;
const CASH_OVERDUE_HOURS: i64 = 24;
const CASH_REPEAT_DAYS: i64 = 7;
const CASH_REPEAT_COUNT: usize = 3;
const CANCEL_WINDOW_MINUTES: i64 = 60;
const CANCEL_COUNT: usize = 3;

/// Rolling windows end at the delivery's completion; an unfinished
/// delivery is judged against the present.
fn anchor(ctx: &RuleContext) -> DateTime<Utc> {
    ctx.delivery.delivered_at.unwrap_or(ctx.now)
}

fn within_minutes(window: i64, at: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    at <= end && end - at <= Duration::minutes(window)
}

pub fn drop_not_at_customer(ctx: &RuleContext) -> Option<FraudFlag> {
    let drop = ctx.delivery.reported_drop.as_ref()?;
    let customer = ctx.delivery.customer_point?;
    let distance_m = haversine_m(&drop.point, &customer);
    if distance_m <= DROP_RADIUS_M {
        return None;
    }

    let details = json!({
        "distance_m": distance_m.round(),
        "accuracy_m": drop.accuracy_m,
    });
    let poor_fix = drop.accuracy_m.map_or(false, |a| a > POOR_ACCURACY_M);
    Some(if poor_fix {
        FraudFlag::new("drop_not_at_customer", Severity::Medium, 20, details)
    } else {
        FraudFlag::new("drop_not_at_customer", Severity::High, 40, details)
    })
}

pub fn pickup_not_at_store(ctx: &RuleContext) -> Option<FraudFlag> {
    let pickup = ctx.delivery.reported_pickup.as_ref()?;
    let store = ctx.delivery.store_point?;
    let distance_m = haversine_m(&pickup.point, &store);
    if distance_m <= PICKUP_RADIUS_M {
        return None;
    }
    Some(FraudFlag::new(
        "pickup_not_at_store",
        Severity::High,
        30,
        json!({
            "distance_m": distance_m.round(),
            "accuracy_m": pickup.accuracy_m,
        }),
    ))
}

pub fn impossible_speed(ctx: &RuleContext) -> Option<FraudFlag> {
    let delivered = ctx.delivery.delivered_at?;
    if ctx.delivery.distance_km < MIN_MEASURED_KM {
        return None;
    }
    let start = ctx.delivery.picked_up_at.unwrap_or(ctx.delivery.accepted_at);
    let transit_seconds = (delivered - start).num_seconds();
    let speed_kmh = if transit_seconds > 0 {
        ctx.delivery.distance_km * 3600.0 / transit_seconds as f64
    } else {
        f64::MAX
    };
    if speed_kmh <= MAX_SPEED_KMH {
        return None;
    }
    Some(FraudFlag::new(
        "impossible_speed",
        Severity::High,
        35,
        json!({
            "speed_kmh": if transit_seconds > 0 {
                json!((speed_kmh * 10.0).round() / 10.0)
            } else {
                json!(null)
            },
            "distance_km": ctx.delivery.distance_km,
            "transit_seconds": transit_seconds,
        }),
    ))
}

pub fn too_fast_for_distance(ctx: &RuleContext) -> Option<FraudFlag> {
    let minutes = ctx.delivery.duration_minutes()?;
    if minutes >= TOO_FAST_MINUTES || ctx.delivery.distance_km <= TOO_FAST_KM {
        return None;
    }
    Some(FraudFlag::new(
        "too_fast_for_distance",
        Severity::High,
        30,
        json!({
            "duration_minutes": minutes,
            "distance_km": ctx.delivery.distance_km,
        }),
    ))
}

pub fn speed_bonus_suspect(ctx: &RuleContext) -> Option<FraudFlag> {
    if ctx.delivery.pay.speed_bonus <= 0.0 {
        return None;
    }
    let minutes = ctx.delivery.duration_minutes()?;
    if ctx.delivery.distance_km <= BONUS_SUSPECT_KM || minutes >= BONUS_SUSPECT_MINUTES {
        return None;
    }
    Some(FraudFlag::new(
        "speed_bonus_suspect",
        Severity::Medium,
        20,
        json!({
            "duration_minutes": minutes,
            "distance_km": ctx.delivery.distance_km,
        }),
    ))
}

pub fn speed_bonus_repeat(ctx: &RuleContext) -> Option<FraudFlag> {
    if ctx.delivery.pay.speed_bonus <= 0.0 {
        return None;
    }
    let end = anchor(ctx);
    let repeats = ctx
        .history
        .iter()
        .filter(|d| d.pay.speed_bonus > 0.0)
        .filter_map(|d| d.delivered_at)
        .filter(|at| within_minutes(BONUS_REPEAT_WINDOW_MINUTES, *at, end))
        .count();
    if repeats < BONUS_REPEAT_COUNT {
        return None;
    }
    Some(FraudFlag::new(
        "speed_bonus_repeat",
        Severity::High,
        30,
        json!({ "recent_bonus_deliveries": repeats }),
    ))
}

pub fn repeated_gps_pattern(ctx: &RuleContext) -> Option<FraudFlag> {
    let drop = ctx.delivery.reported_drop.as_ref()?;
    let matches = ctx
        .history
        .iter()
        .filter_map(|d| d.reported_drop.as_ref())
        .filter(|prior| haversine_m(&prior.point, &drop.point) <= GPS_PATTERN_RADIUS_M)
        .count();
    if matches < GPS_PATTERN_COUNT {
        return None;
    }
    Some(FraudFlag::new(
        "repeated_gps_pattern",
        Severity::Medium,
        20,
        json!({ "matching_prior_drops": matches }),
    ))
}

pub fn location_jump(ctx: &RuleContext) -> Option<FraudFlag> {
    let location = ctx.location?;
    let previous = location.previous_point?;
    let previous_at = location.previous_recorded_at?;
    let gap_seconds = (location.recorded_at - previous_at).num_seconds();
    if gap_seconds < 0 || gap_seconds >= JUMP_WINDOW_SECONDS {
        return None;
    }
    let jump_km = haversine_km(&previous, &location.point);
    if jump_km <= JUMP_KM {
        return None;
    }
    Some(FraudFlag::new(
        "location_jump",
        Severity::High,
        35,
        json!({
            "jump_km": (jump_km * 100.0).round() / 100.0,
            "gap_seconds": gap_seconds,
        }),
    ))
}

pub fn boost_farming(ctx: &RuleContext) -> Option<FraudFlag> {
    boost_streak(
        ctx,
        "boost_farming",
        FARMING_WINDOW_MINUTES,
        FARMING_COUNT,
        40,
    )
}

pub fn boost_pattern(ctx: &RuleContext) -> Option<FraudFlag> {
    boost_streak(
        ctx,
        "boost_pattern",
        PATTERN_WINDOW_MINUTES,
        PATTERN_COUNT,
        35,
    )
}

/// Shared body of the two boost-abuse rules; the delivery under review
/// counts toward its own streak.
fn boost_streak(
    ctx: &RuleContext,
    key: &str,
    window_minutes: i64,
    threshold: usize,
    impact: u32,
) -> Option<FraudFlag> {
    if ctx.delivery.pay.boost_bonus <= 0.0 {
        return None;
    }
    let end = anchor(ctx);
    let streak = 1 + ctx
        .history
        .iter()
        .filter(|d| d.pay.boost_bonus > 0.0)
        .filter_map(|d| d.delivered_at)
        .filter(|at| within_minutes(window_minutes, *at, end))
        .count();
    if streak < threshold {
        return None;
    }
    Some(FraudFlag::new(
        key,
        Severity::High,
        impact,
        json!({
            "boosted_deliveries": streak,
            "window_minutes": window_minutes,
        }),
    ))
}

pub fn cash_not_settled_24h(ctx: &RuleContext) -> Option<FraudFlag> {
    let end = anchor(ctx);
    let overdue = iter::once(ctx.delivery)
        .chain(ctx.history.iter())
        .filter(|d| d.payment == PaymentType::Cash && !d.cash_settled)
        .filter_map(|d| d.delivered_at)
        .filter(|at| end - *at > Duration::hours(CASH_OVERDUE_HOURS))
        .count();
    if overdue == 0 {
        return None;
    }
    Some(FraudFlag::new(
        "cash_not_settled_24h",
        Severity::High,
        40,
        json!({ "overdue_deliveries": overdue }),
    ))
}

pub fn cash_risk_repeat(ctx: &RuleContext) -> Option<FraudFlag> {
    let end = anchor(ctx);
    let window = Duration::days(CASH_REPEAT_DAYS);
    let unsettled = iter::once(ctx.delivery)
        .chain(ctx.history.iter())
        .filter(|d| d.payment == PaymentType::Cash && !d.cash_settled)
        .filter_map(|d| d.delivered_at)
        .filter(|at| *at <= end && end - *at <= window)
        .count();
    if unsettled < CASH_REPEAT_COUNT {
        return None;
    }
    Some(FraudFlag::new(
        "cash_risk_repeat",
        Severity::High,
        50,
        json!({ "unsettled_cash_deliveries": unsettled }),
    ))
}

pub fn high_cancel_rate(ctx: &RuleContext) -> Option<FraudFlag> {
    let end = anchor(ctx);
    let cancels = iter::once(ctx.delivery)
        .chain(ctx.history.iter())
        .filter_map(|d| d.cancelled_at)
        .filter(|at| within_minutes(CANCEL_WINDOW_MINUTES, *at, end))
        .count();
    if cancels < CANCEL_COUNT {
        return None;
    }
    Some(FraudFlag::new(
        "high_cancel_rate",
        Severity::Medium,
        15,
        json!({ "cancellations_last_hour": cancels }),
    ))
}

pub fn cancel_after_pickup(ctx: &RuleContext) -> Option<FraudFlag> {
    let cancelled = ctx.delivery.cancelled_at?;
    let picked_up = ctx.delivery.picked_up_at?;
    if cancelled <= picked_up {
        return None;
    }
    Some(FraudFlag::new(
        "cancel_after_pickup",
        Severity::High,
        35,
        json!({
            "minutes_after_pickup": (cancelled - picked_up).num_minutes(),
        }),
    ))
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};
    use uuid::Uuid;

    use super::*;
    use crate::fraud::{evaluate_rules, RuleContext};
    use crate::geo::GeoPoint;
    use crate::models::delivery::{Delivery, GeoSnapshot, PaymentType};
    use crate::models::driver::{Driver, DriverLocation};

    const STORE: GeoPoint = GeoPoint {
        lat: 52.5200,
        lng: 13.4050,
    };
    const CUSTOMER: GeoPoint = GeoPoint {
        lat: 52.5300,
        lng: 13.4150,
    };

    fn north_of(p: GeoPoint, meters: f64) -> GeoPoint {
        GeoPoint {
            lat: p.lat + meters / 111_195.0,
            lng: p.lng,
        }
    }

    fn snapshot(point: GeoPoint, accuracy_m: f64, at: DateTime<Utc>) -> GeoSnapshot {
        GeoSnapshot {
            point,
            accuracy_m: Some(accuracy_m),
            recorded_at: at,
        }
    }

    struct Fixture {
        delivery: Delivery,
        driver: Driver,
        location: Option<DriverLocation>,
        history: Vec<Delivery>,
        now: DateTime<Utc>,
    }

    impl Fixture {
        /// An unremarkable delivery: 1.3 km in 30 minutes, clean GPS at
        /// both ends, paid online.
        fn new() -> Self {
            let now = Utc::now();
            let driver = Driver::new("suspect".to_string(), 4.5);
            let mut delivery = Delivery::new(
                Uuid::new_v4(),
                driver.id,
                PaymentType::Online,
                Some(STORE),
                Some(CUSTOMER),
                crate::geo::haversine_km(&STORE, &CUSTOMER),
                now - Duration::minutes(40),
            );
            delivery.picked_up_at = Some(now - Duration::minutes(30));
            delivery.delivered_at = Some(now - Duration::minutes(10));
            delivery.reported_pickup = Some(snapshot(STORE, 10.0, now - Duration::minutes(30)));
            delivery.reported_drop = Some(snapshot(CUSTOMER, 10.0, now - Duration::minutes(10)));
            Self {
                delivery,
                driver,
                location: None,
                history: Vec::new(),
                now,
            }
        }

        fn ctx(&self) -> RuleContext<'_> {
            RuleContext {
                delivery: &self.delivery,
                order: None,
                driver: &self.driver,
                location: self.location.as_ref(),
                history: &self.history,
                now: self.now,
            }
        }

        fn anchor(&self) -> DateTime<Utc> {
            self.delivery.delivered_at.unwrap_or(self.now)
        }

        fn history_delivery(&mut self, delivered_minutes_before_anchor: i64) -> &mut Delivery {
            let delivered = self.anchor() - Duration::minutes(delivered_minutes_before_anchor);
            let mut past = Delivery::new(
                Uuid::new_v4(),
                self.driver.id,
                PaymentType::Online,
                Some(STORE),
                Some(CUSTOMER),
                2.0,
                delivered - Duration::minutes(20),
            );
            past.delivered_at = Some(delivered);
            self.history.push(past);
            self.history.last_mut().expect("just pushed")
        }
    }

    #[test]
    fn clean_delivery_raises_no_flags() {
        let fixture = Fixture::new();
        assert!(evaluate_rules(&fixture.ctx()).is_empty());
    }

    #[test]
    fn drop_far_from_customer_with_good_fix_is_high() {
        let mut fixture = Fixture::new();
        let at = fixture.anchor();
        fixture.delivery.reported_drop = Some(snapshot(north_of(CUSTOMER, 300.0), 10.0, at));

        let flag = drop_not_at_customer(&fixture.ctx()).expect("flag raised");
        assert_eq!(flag.severity, Severity::High);
        assert_eq!(flag.impact, 40);
    }

    #[test]
    fn drop_far_from_customer_with_poor_fix_is_downgraded() {
        let mut fixture = Fixture::new();
        let at = fixture.anchor();
        fixture.delivery.reported_drop = Some(snapshot(north_of(CUSTOMER, 300.0), 150.0, at));

        let flag = drop_not_at_customer(&fixture.ctx()).expect("flag raised");
        assert_eq!(flag.severity, Severity::Medium);
        assert_eq!(flag.impact, 20);
    }

    #[test]
    fn drop_within_radius_is_fine() {
        let mut fixture = Fixture::new();
        let at = fixture.anchor();
        fixture.delivery.reported_drop = Some(snapshot(north_of(CUSTOMER, 100.0), 10.0, at));
        assert!(drop_not_at_customer(&fixture.ctx()).is_none());
    }

    #[test]
    fn pickup_far_from_store_is_flagged() {
        let mut fixture = Fixture::new();
        let at = fixture.delivery.picked_up_at.expect("fixture has pickup");
        fixture.delivery.reported_pickup = Some(snapshot(north_of(STORE, 400.0), 10.0, at));

        let flag = pickup_not_at_store(&fixture.ctx()).expect("flag raised");
        assert_eq!(flag.severity, Severity::High);
        assert_eq!(flag.impact, 30);
        assert!(pickup_not_at_store(&Fixture::new().ctx()).is_none());
    }

    #[test]
    fn unrealistic_average_speed_is_flagged() {
        let mut fixture = Fixture::new();
        fixture.delivery.distance_km = 40.0;

        let flag = impossible_speed(&fixture.ctx()).expect("flag raised");
        assert_eq!(flag.impact, 35);
        // 40 km over the 20 minute transit leg is 120 km/h.
        assert_eq!(flag.details["speed_kmh"], 120.0);
    }

    #[test]
    fn zero_length_transit_counts_as_impossible() {
        let mut fixture = Fixture::new();
        fixture.delivery.distance_km = 5.0;
        fixture.delivery.delivered_at = fixture.delivery.picked_up_at;
        assert!(impossible_speed(&fixture.ctx()).is_some());
    }

    #[test]
    fn normal_speed_is_not_flagged() {
        let mut fixture = Fixture::new();
        fixture.delivery.distance_km = 20.0;
        assert!(impossible_speed(&fixture.ctx()).is_none());
    }

    #[test]
    fn short_total_time_over_long_distance_is_flagged() {
        let mut fixture = Fixture::new();
        fixture.delivery.distance_km = 5.0;
        fixture.delivery.delivered_at = Some(fixture.delivery.accepted_at + Duration::minutes(3));

        let flag = too_fast_for_distance(&fixture.ctx()).expect("flag raised");
        assert_eq!(flag.impact, 30);

        fixture.delivery.distance_km = 1.5;
        assert!(too_fast_for_distance(&fixture.ctx()).is_none());
    }

    #[test]
    fn quick_bonus_on_long_leg_is_suspect() {
        let mut fixture = Fixture::new();
        fixture.delivery.pay.speed_bonus = 2.0;
        fixture.delivery.distance_km = 4.0;
        fixture.delivery.delivered_at = Some(fixture.delivery.accepted_at + Duration::minutes(10));

        let flag = speed_bonus_suspect(&fixture.ctx()).expect("flag raised");
        assert_eq!(flag.severity, Severity::Medium);

        fixture.delivery.pay.speed_bonus = 0.0;
        assert!(speed_bonus_suspect(&fixture.ctx()).is_none());
    }

    #[test]
    fn bonus_streak_across_other_deliveries_is_flagged() {
        let mut fixture = Fixture::new();
        fixture.delivery.pay.speed_bonus = 2.0;
        fixture.history_delivery(20).pay.speed_bonus = 2.0;
        assert!(speed_bonus_repeat(&fixture.ctx()).is_none());

        fixture.history_delivery(40).pay.speed_bonus = 2.0;
        let flag = speed_bonus_repeat(&fixture.ctx()).expect("flag raised");
        assert_eq!(flag.impact, 30);
    }

    #[test]
    fn old_bonus_deliveries_fall_out_of_the_window() {
        let mut fixture = Fixture::new();
        fixture.delivery.pay.speed_bonus = 2.0;
        fixture.history_delivery(90).pay.speed_bonus = 2.0;
        fixture.history_delivery(120).pay.speed_bonus = 2.0;
        assert!(speed_bonus_repeat(&fixture.ctx()).is_none());
    }

    #[test]
    fn two_prior_drops_at_the_same_spot_is_a_pattern() {
        let mut fixture = Fixture::new();
        let at = fixture.anchor();
        fixture.history_delivery(60 * 24).reported_drop =
            Some(snapshot(north_of(CUSTOMER, 4.0), 10.0, at));
        assert!(repeated_gps_pattern(&fixture.ctx()).is_none());

        fixture.history_delivery(60 * 48).reported_drop = Some(snapshot(CUSTOMER, 10.0, at));
        let flag = repeated_gps_pattern(&fixture.ctx()).expect("flag raised");
        assert_eq!(flag.severity, Severity::Medium);
        assert_eq!(flag.impact, 20);
    }

    #[test]
    fn teleporting_between_fixes_is_flagged() {
        let mut fixture = Fixture::new();
        let mut location = DriverLocation::first_fix(
            fixture.driver.id,
            north_of(CUSTOMER, 6_000.0),
            Some(10.0),
            fixture.now - Duration::seconds(90),
        );
        location.advance(CUSTOMER, Some(10.0), fixture.now - Duration::seconds(30));
        fixture.location = Some(location);

        let flag = location_jump(&fixture.ctx()).expect("flag raised");
        assert_eq!(flag.impact, 35);
    }

    #[test]
    fn slow_or_short_moves_are_not_jumps() {
        let mut fixture = Fixture::new();

        let mut crawl = DriverLocation::first_fix(
            fixture.driver.id,
            north_of(CUSTOMER, 6_000.0),
            Some(10.0),
            fixture.now - Duration::minutes(12),
        );
        crawl.advance(CUSTOMER, Some(10.0), fixture.now - Duration::minutes(2));
        fixture.location = Some(crawl);
        assert!(location_jump(&fixture.ctx()).is_none());

        let mut hop = DriverLocation::first_fix(
            fixture.driver.id,
            north_of(CUSTOMER, 1_000.0),
            Some(10.0),
            fixture.now - Duration::seconds(90),
        );
        hop.advance(CUSTOMER, Some(10.0), fixture.now - Duration::seconds(30));
        fixture.location = Some(hop);
        assert!(location_jump(&fixture.ctx()).is_none());
    }

    #[test]
    fn six_boosted_deliveries_in_an_hour_is_farming() {
        let mut fixture = Fixture::new();
        fixture.delivery.pay.boost_bonus = 1.5;
        for minutes in [5, 15, 25, 35] {
            fixture.history_delivery(minutes).pay.boost_bonus = 1.5;
        }
        assert!(boost_farming(&fixture.ctx()).is_none());

        fixture.history_delivery(45).pay.boost_bonus = 1.5;
        let flag = boost_farming(&fixture.ctx()).expect("flag raised");
        assert_eq!(flag.impact, 40);
        assert_eq!(flag.details["boosted_deliveries"], 6);
    }

    #[test]
    fn four_boosted_deliveries_in_half_an_hour_is_a_pattern() {
        let mut fixture = Fixture::new();
        fixture.delivery.pay.boost_bonus = 1.5;
        for minutes in [5, 10] {
            fixture.history_delivery(minutes).pay.boost_bonus = 1.5;
        }
        assert!(boost_pattern(&fixture.ctx()).is_none());

        fixture.history_delivery(15).pay.boost_bonus = 1.5;
        let flag = boost_pattern(&fixture.ctx()).expect("flag raised");
        assert_eq!(flag.impact, 35);
    }

    #[test]
    fn unboosted_delivery_never_joins_a_boost_streak() {
        let mut fixture = Fixture::new();
        for minutes in [5, 10, 15, 20, 25, 30] {
            fixture.history_delivery(minutes).pay.boost_bonus = 1.5;
        }
        assert!(boost_farming(&fixture.ctx()).is_none());
        assert!(boost_pattern(&fixture.ctx()).is_none());
    }

    #[test]
    fn cash_unsettled_past_a_day_is_flagged() {
        let mut fixture = Fixture::new();
        let stale = fixture.history_delivery(30 * 60);
        stale.payment = PaymentType::Cash;

        let flag = cash_not_settled_24h(&fixture.ctx()).expect("flag raised");
        assert_eq!(flag.impact, 40);
    }

    #[test]
    fn settled_or_recent_cash_is_fine() {
        let mut fixture = Fixture::new();
        let settled = fixture.history_delivery(30 * 60);
        settled.payment = PaymentType::Cash;
        settled.cash_settled = true;

        let fresh = fixture.history_delivery(60);
        fresh.payment = PaymentType::Cash;

        assert!(cash_not_settled_24h(&fixture.ctx()).is_none());
    }

    #[test]
    fn three_unsettled_cash_runs_in_a_week_is_flagged() {
        let mut fixture = Fixture::new();
        for days in [1, 2] {
            fixture.history_delivery(days * 24 * 60).payment = PaymentType::Cash;
        }
        assert!(cash_risk_repeat(&fixture.ctx()).is_none());

        fixture.history_delivery(3 * 24 * 60).payment = PaymentType::Cash;
        let flag = cash_risk_repeat(&fixture.ctx()).expect("flag raised");
        assert_eq!(flag.impact, 50);
    }

    #[test]
    fn unsettled_cash_older_than_a_week_does_not_repeat_count() {
        let mut fixture = Fixture::new();
        for days in [8, 9, 10] {
            fixture.history_delivery(days * 24 * 60).payment = PaymentType::Cash;
        }
        assert!(cash_risk_repeat(&fixture.ctx()).is_none());
        // They are still overdue, so the 24h rule fires instead.
        assert!(cash_not_settled_24h(&fixture.ctx()).is_some());
    }

    #[test]
    fn cancel_burst_within_the_hour_is_flagged() {
        let mut fixture = Fixture::new();
        fixture.delivery.delivered_at = None;
        fixture.delivery.cancelled_at = Some(fixture.now - Duration::minutes(5));

        let now = fixture.now;
        for minutes in [20, 40] {
            let past = fixture.history_delivery(minutes);
            past.delivered_at = None;
            past.cancelled_at = Some(now - Duration::minutes(minutes));
        }

        let flag = high_cancel_rate(&fixture.ctx()).expect("flag raised");
        assert_eq!(flag.severity, Severity::Medium);
        assert_eq!(flag.impact, 15);
    }

    #[test]
    fn two_cancels_stay_under_the_rate_limit() {
        let mut fixture = Fixture::new();
        fixture.delivery.delivered_at = None;
        fixture.delivery.cancelled_at = Some(fixture.now - Duration::minutes(5));

        let now = fixture.now;
        let past = fixture.history_delivery(20);
        past.delivered_at = None;
        past.cancelled_at = Some(now - Duration::minutes(20));

        assert!(high_cancel_rate(&fixture.ctx()).is_none());
    }

    #[test]
    fn cancelling_after_pickup_is_flagged() {
        let mut fixture = Fixture::new();
        fixture.delivery.delivered_at = None;
        fixture.delivery.cancelled_at =
            Some(fixture.delivery.picked_up_at.expect("fixture has pickup") + Duration::minutes(5));

        let flag = cancel_after_pickup(&fixture.ctx()).expect("flag raised");
        assert_eq!(flag.impact, 35);
        assert_eq!(flag.details["minutes_after_pickup"], 5);
    }

    #[test]
    fn cancelling_before_pickup_is_allowed() {
        let mut fixture = Fixture::new();
        fixture.delivery.delivered_at = None;
        fixture.delivery.picked_up_at = None;
        fixture.delivery.cancelled_at = Some(fixture.now);
        assert!(cancel_after_pickup(&fixture.ctx()).is_none());
    }

    #[test]
    fn independent_violations_stack() {
        let mut fixture = Fixture::new();
        let at = fixture.anchor();
        fixture.delivery.reported_drop = Some(snapshot(north_of(CUSTOMER, 300.0), 10.0, at));
        fixture.delivery.distance_km = 40.0;

        let flags = evaluate_rules(&fixture.ctx());
        let keys: Vec<&str> = flags.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["drop_not_at_customer", "impossible_speed"]);
    }
}
