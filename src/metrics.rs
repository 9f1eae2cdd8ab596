// src/metrics.rs
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use std::net::SocketAddr;

use crate::errors::{WorkerError, WorkerResult};

/// One-time metrics registration (so series show up before the first run ends).
pub fn ensure_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("worker_runs_total", "Runs finished, by status.");
        describe_counter!(
            "worker_points_extracted_total",
            "Points produced by the table extractor."
        );
        describe_counter!(
            "worker_points_rejected_total",
            "Points dropped by the data quality gate."
        );
        describe_counter!(
            "worker_history_appended_total",
            "History rows appended to the canonical store."
        );
        describe_counter!(
            "worker_store_errors_total",
            "Persistence failures, by store."
        );
        describe_counter!("worker_fetch_errors_total", "Source page fetch failures.");
        describe_histogram!("worker_run_duration_ms", "Run duration in milliseconds.");
        describe_histogram!("worker_extract_ms", "Table extraction time in milliseconds.");
        describe_gauge!("worker_last_run_ts", "Unix ts when the last run finished.");
    });
}

/// Install the Prometheus recorder with its own HTTP listener on `addr`.
/// Must be called from within the tokio runtime.
pub fn install_exporter(addr: &str) -> WorkerResult<()> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| WorkerError::Config(format!("METRICS_ADDR={addr:?}: {e}")))?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WorkerError::Internal(format!("prometheus exporter: {e}")))?;
    ensure_described();
    tracing::info!(%addr, "metrics exporter listening");
    Ok(())
}
