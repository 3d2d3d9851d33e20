//! Prometheus metrics exposition
//!
//! - `pipe_requests_total` (counter): labels `resource`, `status`
//! - `pipe_request_duration_seconds` (histogram): label `resource`
//! - `pipe_upstream_errors_total` (counter): label `stage`
//! - `pipe_rewrite_ad_breaks_total`, `pipe_rewrite_uris_elided_total`
//!   (counters), emitted by the stream crate on every manifest rewrite. A live
//!   playlist repeats a break on each refresh, so these count break-rewrites,
//!   not distinct breaks.

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new().set_buckets_for_metric(
        Matcher::Full("pipe_request_duration_seconds".to_string()),
        DURATION_BUCKETS,
    )
}

/// Install the global Prometheus recorder and return a handle for `/metrics`.
///
/// Request durations render as a histogram (`_bucket` lines) from 5ms to 60s;
/// the upper end covers a cold start (login plus negotiation).
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    builder()?.install_recorder()
}

/// Record a served request. `resource` is one of `master`, `child`,
/// `segment`, `games`, `errors`.
pub fn record_request(resource: &'static str, status: u16, duration_secs: f64) {
    metrics::counter!("pipe_requests_total", "resource" => resource, "status" => status.to_string())
        .increment(1);
    metrics::histogram!("pipe_request_duration_seconds", "resource" => resource)
        .record(duration_secs);
}

/// Record a pipeline failure by stage (`auth`, `negotiation`, `fetch`, `schedule`).
pub fn record_upstream_error(stage: &'static str) {
    metrics::counter!("pipe_upstream_errors_total", "stage" => stage).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusRecorder;

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        record_request("master", 200, 0.05);
        record_upstream_error("fetch");
    }

    /// Isolated recorder/handle pair; only one global recorder may exist per process.
    fn isolated_recorder() -> (PrometheusRecorder, PrometheusHandle) {
        let recorder = builder().unwrap().build_recorder();
        let handle = recorder.handle();
        (recorder, handle)
    }

    #[test]
    fn record_request_increments_counter_and_histogram() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_request("master", 200, 0.042);
        record_request("segment", 404, 0.2);

        let output = handle.render();
        assert!(output.contains("pipe_requests_total"));
        assert!(output.contains("resource=\"master\""));
        assert!(output.contains("status=\"200\""));
        assert!(output.contains("resource=\"segment\""));
        assert!(output.contains("status=\"404\""));
        assert!(
            output.contains("pipe_request_duration_seconds_bucket"),
            "durations must render as a histogram"
        );
        assert!(output.contains("le=\"0.005\""));
        assert!(output.contains("le=\"60\""));
    }

    #[test]
    fn record_upstream_error_carries_stage() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_upstream_error("auth");
        record_upstream_error("negotiation");

        let output = handle.render();
        assert!(output.contains("pipe_upstream_errors_total"));
        assert!(output.contains("stage=\"auth\""));
        assert!(output.contains("stage=\"negotiation\""));
    }
}
