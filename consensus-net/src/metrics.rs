//! Consensus metrics surface.
//!
//! The metric names and buckets here are an observable contract consumed by
//! the fleet's dashboards and alerts.  Collectors are passed to each
//! transport instance by explicit configuration — there is no process-wide
//! registry — which keeps tests free to wire their own.

use {
    qdv_consensus_qbft::Duty,
    qdv_monitoring::{prometheus, Counter, LabeledCounter, LabeledGauge, LabeledHistogram},
    std::time::Instant,
};

/// Metrics for consensus instances, partitioned by duty type.
pub struct ConsensusMetrics {
    /// Number of rounds it took to decide consensus instances by duty type.
    /// A gauge since the value changes slowly, once per slot.
    pub decided_rounds: LabeledGauge,
    /// Duration of a consensus instance in seconds by duty.
    pub duration_seconds: LabeledHistogram,
    /// Total count of consensus timeouts by duty.
    pub timeout_total: LabeledCounter,
    /// Total count of consensus errors.
    pub error_total: Counter,
}

impl ConsensusMetrics {
    pub fn new() -> Self {
        Self {
            decided_rounds: LabeledGauge::new(
                "consensus_decided_rounds",
                "Number of rounds it took to decide consensus instances by duty type",
                "duty",
            ),
            duration_seconds: LabeledHistogram::new(
                "consensus_duration_seconds",
                "Duration of a consensus instance in seconds by duty",
                "duty",
                vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0],
            ),
            timeout_total: LabeledCounter::new(
                "consensus_timeout_total",
                "Total count of consensus timeouts by duty",
                "duty",
            ),
            error_total: Counter::new(
                "consensus_error_total",
                "Total count of consensus errors",
            ),
        }
    }

    /// Record a decided instance: the round it decided in and how long the
    /// instance ran.
    pub fn instrument_consensus(&self, duty: Duty, round: i64, started_at: Instant) {
        let label = duty.typ.as_str();
        self.decided_rounds.set(label, round as f64);
        self.duration_seconds
            .observe(label, started_at.elapsed().as_secs_f64());
    }

    /// Record a round timeout.
    pub fn observe_timeout(&self, duty: Duty) {
        self.timeout_total.inc(duty.typ.as_str());
    }

    /// Record a consensus error.
    pub fn observe_error(&self) {
        self.error_total.inc();
    }

    /// Render the full exposition page for the `/metrics` endpoint.
    pub fn encode_prometheus(&self) -> String {
        let mut out = String::with_capacity(1024);
        prometheus::write_labeled_gauge(&mut out, &self.decided_rounds);
        prometheus::write_labeled_histogram(&mut out, &self.duration_seconds);
        prometheus::write_labeled_counter(&mut out, &self.timeout_total);
        prometheus::write_counter(&mut out, &self.error_total);
        out
    }
}

impl Default for ConsensusMetrics {
    fn default() -> Self {
        Self::new()
    }
}
