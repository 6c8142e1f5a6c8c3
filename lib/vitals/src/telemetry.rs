use std::{sync::Arc, time::Duration};

use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};

use crate::{state::CheckState, status::AvailabilityStatus};

/// Telemetry for a single check.
///
/// - `health.check.status`: current status (`gauge`, `1` for up, `0` for unknown, `-1` for down)
/// - `health.check.latency_secs`: execution time of each invocation (`histogram`, in seconds)
/// - `health.check.failures_total`: number of failed invocations (`counter`)
///
/// All metrics carry a `check_name` tag.
pub(crate) struct CheckTelemetry {
    status: Gauge,
    latency_secs: Histogram,
    failures_total: Counter,
}

impl CheckTelemetry {
    pub fn new(name: &str) -> Self {
        let check_name: Arc<str> = Arc::from(name);

        Self {
            status: gauge!("health.check.status", "check_name" => Arc::clone(&check_name)),
            latency_secs: histogram!("health.check.latency_secs", "check_name" => Arc::clone(&check_name)),
            failures_total: counter!("health.check.failures_total", "check_name" => check_name),
        }
    }

    pub fn record(&self, state: &CheckState, latency: Duration) {
        self.status.set(state.status.as_gauge_value());
        self.latency_secs.record(latency.as_secs_f64());
        if state.contiguous_fails > 0 {
            self.failures_total.increment(1);
        }
    }
}

/// Telemetry for the aggregate status, emitted as `health.status` (`gauge`, same encoding as per-check status).
pub(crate) struct AggregateTelemetry {
    status: Gauge,
}

impl AggregateTelemetry {
    pub fn new() -> Self {
        Self {
            status: gauge!("health.status"),
        }
    }

    pub fn record(&self, status: &AvailabilityStatus) {
        self.status.set(status.as_gauge_value());
    }
}
