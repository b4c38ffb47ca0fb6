use std::sync::OnceLock;
use std::time::Duration;

use anyhow::Result;
use axum::http::StatusCode;
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

const HTTP_REQUESTS_TOTAL: &str = "nagarik_api_http_requests_total";
const HTTP_REQUEST_DURATION_SECONDS: &str = "nagarik_api_http_request_duration_seconds";
const HTTP_REQUEST_ERRORS_TOTAL: &str = "nagarik_api_http_errors_total";
const EVENTS_INGESTED_TOTAL: &str = "nagarik_api_events_ingested_total";
const EVENTS_REJECTED_TOTAL: &str = "nagarik_api_events_rejected_total";
const FEED_PAGES_TOTAL: &str = "nagarik_api_feed_pages_total";
const AGGREGATION_RUNS_TOTAL: &str = "nagarik_api_aggregation_runs_total";
const AGGREGATION_RUN_DURATION_MS: &str = "nagarik_api_aggregation_run_duration_ms";

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub fn init_metrics() -> Result<()> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = METRICS_HANDLE.set(handle);
    Ok(())
}

pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

pub fn register_http_request(method: &str, route: &str, status: StatusCode, elapsed: Duration) {
    let status_code = status.as_u16().to_string();
    let duration_seconds = elapsed.as_secs_f64();
    let result = if status.is_server_error() {
        "error"
    } else {
        "success"
    };

    counter!(
        HTTP_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "route" => route.to_string(),
        "status" => status_code.clone(),
        "result" => result
    )
    .increment(1);

    histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "method" => method.to_string(),
        "route" => route.to_string(),
        "status" => status_code
    )
    .record(duration_seconds);

    if status.is_server_error() {
        counter!(
            HTTP_REQUEST_ERRORS_TOTAL,
            "method" => method.to_string(),
            "route" => route.to_string(),
            "status" => status.as_u16().to_string()
        )
        .increment(1);
    }
}

pub fn register_event_ingested(event_type: &str, outcome: &str) {
    counter!(
        EVENTS_INGESTED_TOTAL,
        "event_type" => event_type.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

pub fn register_event_rejected(reason: &str) {
    counter!(
        EVENTS_REJECTED_TOTAL,
        "reason" => reason.to_string()
    )
    .increment(1);
}

pub fn register_feed_page(outcome: &str, degraded: bool) {
    counter!(
        FEED_PAGES_TOTAL,
        "outcome" => outcome.to_string(),
        "degraded" => if degraded { "true" } else { "false" }
    )
    .increment(1);
}

pub fn register_aggregation_run(job: &str, result: &str, duration_ms: f64) {
    counter!(
        AGGREGATION_RUNS_TOTAL,
        "job" => job.to_string(),
        "result" => result.to_string()
    )
    .increment(1);

    histogram!(
        AGGREGATION_RUN_DURATION_MS,
        "job" => job.to_string()
    )
    .record(duration_ms.max(0.0));
}
