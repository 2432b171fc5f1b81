/// One rating star is worth half a kilometre of proximity.
pub const RATING_WEIGHT: f64 = 0.5;
/// On rush orders, each performance point shaves 50 m off the cost.
pub const RUSH_PERFORMANCE_WEIGHT: f64 = 0.05;

/// Cost of sending one driver to one order; lower is better. Pure and
/// bit-for-bit reproducible for the same inputs.
pub fn assignment_cost(distance_km: f64, rating: f64, performance_score: f64, is_rush: bool) -> f64 {
    let base = distance_km - rating * RATING_WEIGHT;
    if is_rush {
        base - performance_score * RUSH_PERFORMANCE_WEIGHT
    } else {
        base
    }
}
