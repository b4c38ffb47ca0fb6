use std::sync::OnceLock;

use anyhow::Result;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

const AGGREGATION_RUNS_TOTAL: &str = "nagarik_worker_aggregation_runs_total";
const AGGREGATION_RUN_DURATION_MS: &str = "nagarik_worker_aggregation_run_duration_ms";
const AGGREGATION_ROWS_UPDATED_TOTAL: &str = "nagarik_worker_aggregation_rows_updated_total";
const RETENTION_PRUNED_TOTAL: &str = "nagarik_worker_retention_pruned_events_total";
const RETENTION_LAST_PRUNED_GAUGE: &str = "nagarik_worker_retention_last_pruned_events";

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub fn init_metrics() -> Result<()> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = METRICS_HANDLE.set(handle);
    Ok(())
}

pub fn register_aggregation_run(job: &str, result: &str, duration_ms: f64, rows_updated: usize) {
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

    counter!(
        AGGREGATION_ROWS_UPDATED_TOTAL,
        "job" => job.to_string()
    )
    .increment(rows_updated as u64);
}

pub fn register_retention_prune(pruned: u64) {
    counter!(RETENTION_PRUNED_TOTAL).increment(pruned);
    gauge!(RETENTION_LAST_PRUNED_GAUGE).set(pruned as f64);
}
