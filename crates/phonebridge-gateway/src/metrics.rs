//! Prometheus metrics recording and endpoint.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus metrics recorder and return the handle for rendering.
pub fn install_prometheus_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

pub fn record_ws_connect() {
    metrics::gauge!("ws_connections_active").increment(1.0);
}

pub fn record_ws_disconnect() {
    metrics::gauge!("ws_connections_active").decrement(1.0);
}

pub fn record_call_start() {
    metrics::gauge!("calls_active").increment(1.0);
}

pub fn record_call_end() {
    metrics::gauge!("calls_active").decrement(1.0);
}

/// Record a finished turn with its outcome label and duration.
pub fn record_turn(outcome: &str, duration_secs: f64) {
    let labels = [("outcome", outcome.to_string())];
    metrics::counter!("turns_total", &labels).increment(1);
    metrics::histogram!("turn_duration_seconds").record(duration_secs);
}

/// Record an error of a given kind.
pub fn record_error(kind: &str) {
    let labels = [("kind", kind.to_string())];
    metrics::counter!("errors_total", &labels).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorders_do_not_panic_without_exporter() {
        // The metrics facade falls back to a no-op recorder.
        record_ws_connect();
        record_ws_disconnect();
        record_call_start();
        record_call_end();
        record_turn("replied", 0.42);
        record_error("transcription");
    }
}
