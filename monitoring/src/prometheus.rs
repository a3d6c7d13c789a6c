//! Prometheus text format exporter for QDV metrics.
//!
//! Encodes metric primitives into the [Prometheus exposition format](https://prometheus.io/docs/instrumenting/exposition_formats/)
//! (text/plain; version=0.0.4).
//!
//! The writers here are composable: each metric owner (e.g. the consensus
//! transport's metrics surface) assembles its own exposition page from the
//! families it holds and serves the result on its `/metrics` endpoint.

use crate::{Counter, Gauge, Histogram, LabeledCounter, LabeledGauge, LabeledHistogram};

// ---------------------------------------------------------------------------
// Plain families
// ---------------------------------------------------------------------------

/// Encode a [`Counter`] with its HELP/TYPE preamble.
pub fn write_counter(out: &mut String, counter: &Counter) {
    let name = counter.name();
    out.push_str(&format!("# HELP {name} {}\n", counter.help()));
    out.push_str(&format!("# TYPE {name} counter\n"));
    out.push_str(&format!("{name} {}\n\n", counter.get()));
}

/// Encode a [`Gauge`] with its HELP/TYPE preamble.
pub fn write_gauge(out: &mut String, gauge: &Gauge) {
    let name = gauge.name();
    out.push_str(&format!("# HELP {name} {}\n", gauge.help()));
    out.push_str(&format!("# TYPE {name} gauge\n"));
    out.push_str(&format!("{name} {}\n\n", gauge.get()));
}

/// Encode a [`Histogram`] as `_bucket`/`_sum`/`_count` series.
pub fn write_histogram(out: &mut String, histogram: &Histogram) {
    let name = histogram.name();
    out.push_str(&format!("# HELP {name} {}\n", histogram.help()));
    out.push_str(&format!("# TYPE {name} histogram\n"));
    for (bound, cumulative) in histogram.get_buckets() {
        out.push_str(&format!("{name}_bucket{{le=\"{bound}\"}} {cumulative}\n"));
    }
    // Always include the +Inf bucket.
    out.push_str(&format!(
        "{name}_bucket{{le=\"+Inf\"}} {}\n",
        histogram.get_count()
    ));
    out.push_str(&format!("{name}_sum {}\n", histogram.get_sum()));
    out.push_str(&format!("{name}_count {}\n\n", histogram.get_count()));
}

// ---------------------------------------------------------------------------
// Labelled families
// ---------------------------------------------------------------------------

/// Encode a [`LabeledCounter`], one sample line per label value.
pub fn write_labeled_counter(out: &mut String, counter: &LabeledCounter) {
    let name = counter.name();
    let label = counter.label();
    out.push_str(&format!("# HELP {name} {}\n", counter.help()));
    out.push_str(&format!("# TYPE {name} counter\n"));
    for (value, count) in counter.snapshot() {
        out.push_str(&format!("{name}{{{label}=\"{value}\"}} {count}\n"));
    }
    out.push('\n');
}

/// Encode a [`LabeledGauge`], one sample line per label value.
pub fn write_labeled_gauge(out: &mut String, gauge: &LabeledGauge) {
    let name = gauge.name();
    let label = gauge.label();
    out.push_str(&format!("# HELP {name} {}\n", gauge.help()));
    out.push_str(&format!("# TYPE {name} gauge\n"));
    for (value, v) in gauge.snapshot() {
        out.push_str(&format!("{name}{{{label}=\"{value}\"}} {v}\n"));
    }
    out.push('\n');
}

/// Encode a [`LabeledHistogram`]: per label value, the full
/// `_bucket`/`_sum`/`_count` series with both the family label and `le`.
pub fn write_labeled_histogram(out: &mut String, histogram: &LabeledHistogram) {
    let name = histogram.name();
    let label = histogram.label();
    out.push_str(&format!("# HELP {name} {}\n", histogram.help()));
    out.push_str(&format!("# TYPE {name} histogram\n"));
    for (value, data) in histogram.snapshot() {
        for (bound, cumulative) in histogram.buckets().iter().zip(data.counts.iter()) {
            out.push_str(&format!(
                "{name}_bucket{{{label}=\"{value}\",le=\"{bound}\"}} {cumulative}\n"
            ));
        }
        out.push_str(&format!(
            "{name}_bucket{{{label}=\"{value}\",le=\"+Inf\"}} {}\n",
            data.count
        ));
        out.push_str(&format!("{name}_sum{{{label}=\"{value}\"}} {}\n", data.sum));
        out.push_str(&format!(
            "{name}_count{{{label}=\"{value}\"}} {}\n",
            data.count
        ));
    }
    out.push('\n');
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_counter_format() {
        let c = Counter::new("consensus_error_total", "Total count of consensus errors");
        c.add(3);
        let mut out = String::new();
        write_counter(&mut out, &c);
        assert!(out.contains("# HELP consensus_error_total Total count of consensus errors"));
        assert!(out.contains("# TYPE consensus_error_total counter"));
        assert!(out.contains("consensus_error_total 3"));
    }

    #[test]
    fn test_write_gauge_format() {
        let g = Gauge::new("inflight_instances", "Live consensus instances");
        g.set(7);
        let mut out = String::new();
        write_gauge(&mut out, &g);
        assert!(out.contains("# TYPE inflight_instances gauge"));
        assert!(out.contains("inflight_instances 7"));
    }

    #[test]
    fn test_write_histogram_buckets_and_inf() {
        let h = Histogram::new("duration_seconds", "help", vec![1.0, 3.0, 5.0]);
        h.observe(1.0);
        h.observe(3.0);
        h.observe(5.0);
        let mut out = String::new();
        write_histogram(&mut out, &h);
        assert!(out.contains("duration_seconds_bucket{le=\"1\"} 1"));
        assert!(out.contains("duration_seconds_bucket{le=\"3\"} 2"));
        assert!(out.contains("duration_seconds_bucket{le=\"5\"} 3"));
        assert!(out.contains("duration_seconds_bucket{le=\"+Inf\"} 3"));
        assert!(out.contains("duration_seconds_sum 9"));
        assert!(out.contains("duration_seconds_count 3"));
    }

    #[test]
    fn test_write_labeled_counter_samples() {
        let c = LabeledCounter::new("consensus_timeout_total", "help", "duty");
        c.inc("attester");
        c.inc("attester");
        c.inc("proposer");
        let mut out = String::new();
        write_labeled_counter(&mut out, &c);
        assert!(out.contains("consensus_timeout_total{duty=\"attester\"} 2"));
        assert!(out.contains("consensus_timeout_total{duty=\"proposer\"} 1"));
    }

    #[test]
    fn test_write_labeled_histogram_series() {
        let h = LabeledHistogram::new("consensus_duration_seconds", "help", "duty", vec![0.5, 1.0]);
        h.observe("attester", 0.2);
        h.observe("attester", 2.0);
        let mut out = String::new();
        write_labeled_histogram(&mut out, &h);
        assert!(out.contains("consensus_duration_seconds_bucket{duty=\"attester\",le=\"0.5\"} 1"));
        assert!(out.contains("consensus_duration_seconds_bucket{duty=\"attester\",le=\"1\"} 1"));
        assert!(out.contains("consensus_duration_seconds_bucket{duty=\"attester\",le=\"+Inf\"} 2"));
        assert!(out.contains("consensus_duration_seconds_sum{duty=\"attester\"} 2.2"));
        assert!(out.contains("consensus_duration_seconds_count{duty=\"attester\"} 2"));
    }
}
