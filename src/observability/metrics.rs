use prometheus::{
    Encoder, Gauge, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub assignments_total: IntCounterVec,
    pub assignment_latency_seconds: HistogramVec,
    pub timeout_sweeps_total: IntCounter,
    pub timeout_orders_processed_total: IntCounter,
    pub timeout_reassigned_total: IntCounter,
    pub boost_ratio: Gauge,
    pub boost_bonus: Gauge,
    pub fraud_checks_total: IntCounterVec,
    pub fraud_flags_total: IntCounterVec,
    pub blocked_drivers: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let assignments_total = IntCounterVec::new(
            Opts::new("assignments_total", "Assignment attempts by outcome"),
            &["outcome"],
        )
        .expect("valid assignments_total metric");

        let assignment_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "assignment_latency_seconds",
                "Latency of assignment processing in seconds",
            ),
            &["outcome"],
        )
        .expect("valid assignment_latency_seconds metric");

        let timeout_sweeps_total =
            IntCounter::new("timeout_sweeps_total", "Completed timeout sweeps")
                .expect("valid timeout_sweeps_total metric");

        let timeout_orders_processed_total = IntCounter::new(
            "timeout_orders_processed_total",
            "Stale orders handled by the timeout sweep",
        )
        .expect("valid timeout_orders_processed_total metric");

        let timeout_reassigned_total = IntCounter::new(
            "timeout_reassigned_total",
            "Stale orders handed to a new driver",
        )
        .expect("valid timeout_reassigned_total metric");

        let boost_ratio = Gauge::new("boost_ratio", "Pending orders per active driver")
            .expect("valid boost_ratio metric");

        let boost_bonus = Gauge::new("boost_bonus", "Current surge bonus amount")
            .expect("valid boost_bonus metric");

        let fraud_checks_total = IntCounterVec::new(
            Opts::new("fraud_checks_total", "Fraud checks by review verdict"),
            &["review_status"],
        )
        .expect("valid fraud_checks_total metric");

        let fraud_flags_total = IntCounterVec::new(
            Opts::new("fraud_flags_total", "Fraud flags raised, by rule"),
            &["rule"],
        )
        .expect("valid fraud_flags_total metric");

        let blocked_drivers = IntGauge::new("blocked_drivers", "Drivers currently blocked")
            .expect("valid blocked_drivers metric");

        registry
            .register(Box::new(assignments_total.clone()))
            .expect("register assignments_total");
        registry
            .register(Box::new(assignment_latency_seconds.clone()))
            .expect("register assignment_latency_seconds");
        registry
            .register(Box::new(timeout_sweeps_total.clone()))
            .expect("register timeout_sweeps_total");
        registry
            .register(Box::new(timeout_orders_processed_total.clone()))
            .expect("register timeout_orders_processed_total");
        registry
            .register(Box::new(timeout_reassigned_total.clone()))
            .expect("register timeout_reassigned_total");
        registry
            .register(Box::new(boost_ratio.clone()))
            .expect("register boost_ratio");
        registry
            .register(Box::new(boost_bonus.clone()))
            .expect("register boost_bonus");
        registry
            .register(Box::new(fraud_checks_total.clone()))
            .expect("register fraud_checks_total");
        registry
            .register(Box::new(fraud_flags_total.clone()))
            .expect("register fraud_flags_total");
        registry
            .register(Box::new(blocked_drivers.clone()))
            .expect("register blocked_drivers");

        Self {
            registry,
            assignments_total,
            assignment_latency_seconds,
            timeout_sweeps_total,
            timeout_orders_processed_total,
            timeout_reassigned_total,
            boost_ratio,
            boost_bonus,
            fraud_checks_total,
            fraud_flags_total,
            blocked_drivers,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
