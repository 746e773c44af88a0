use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub donation_transitions_total: IntCounterVec,
    pub expiry_predictions_total: IntCounterVec,
    pub location_updates_total: IntCounter,
    pub auth_failures_total: IntCounter,
    pub upstream_latency_seconds: HistogramVec,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let donation_transitions_total = IntCounterVec::new(
            Opts::new(
                "donation_transitions_total",
                "Donation lifecycle transitions by transition and outcome",
            ),
            &["transition", "outcome"],
        )
        .expect("valid donation_transitions_total metric");

        let expiry_predictions_total = IntCounterVec::new(
            Opts::new("expiry_predictions_total", "Expiry predictions by outcome"),
            &["outcome"],
        )
        .expect("valid expiry_predictions_total metric");

        let location_updates_total =
            IntCounter::new("location_updates_total", "Location upserts accepted")
                .expect("valid location_updates_total metric");

        let auth_failures_total =
            IntCounter::new("auth_failures_total", "Bearer tokens rejected by the verifier")
                .expect("valid auth_failures_total metric");

        let upstream_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "upstream_latency_seconds",
                "Latency of calls to external services in seconds",
            ),
            &["service"],
        )
        .expect("valid upstream_latency_seconds metric");

        registry
            .register(Box::new(donation_transitions_total.clone()))
            .expect("register donation_transitions_total");
        registry
            .register(Box::new(expiry_predictions_total.clone()))
            .expect("register expiry_predictions_total");
        registry
            .register(Box::new(location_updates_total.clone()))
            .expect("register location_updates_total");
        registry
            .register(Box::new(auth_failures_total.clone()))
            .expect("register auth_failures_total");
        registry
            .register(Box::new(upstream_latency_seconds.clone()))
            .expect("register upstream_latency_seconds");

        Self {
            registry,
            donation_transitions_total,
            expiry_predictions_total,
            location_updates_total,
            auth_failures_total,
            upstream_latency_seconds,
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
