use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub transitions_total: IntCounterVec,
    pub points_awarded_total: IntCounter,
    pub pending_credits: IntGauge,
    pub credit_failures_total: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let transitions_total = IntCounterVec::new(
            Opts::new(
                "pickup_transitions_total",
                "Status transitions by target status",
            ),
            &["target"],
        )
        .expect("valid pickup_transitions_total metric");

        let points_awarded_total = IntCounter::new(
            "points_awarded_total",
            "Loyalty points credited for completed pickups",
        )
        .expect("valid points_awarded_total metric");

        let pending_credits = IntGauge::new(
            "pending_point_credits",
            "Completion awards whose ledger credit has not landed",
        )
        .expect("valid pending_point_credits metric");

        let credit_failures_total = IntCounter::new(
            "point_credit_failures_total",
            "Failed point-ledger credit attempts",
        )
        .expect("valid point_credit_failures_total metric");

        registry
            .register(Box::new(transitions_total.clone()))
            .expect("register pickup_transitions_total");
        registry
            .register(Box::new(points_awarded_total.clone()))
            .expect("register points_awarded_total");
        registry
            .register(Box::new(pending_credits.clone()))
            .expect("register pending_point_credits");
        registry
            .register(Box::new(credit_failures_total.clone()))
            .expect("register point_credit_failures_total");

        Self {
            registry,
            transitions_total,
            points_awarded_total,
            pending_credits,
            credit_failures_total,
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

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
