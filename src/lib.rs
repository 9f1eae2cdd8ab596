// src/lib.rs
// Public library surface for both binaries and the integration tests.

pub mod config;
pub mod errors;
pub mod ingest;
pub mod logging;
pub mod metrics;
pub mod store;
pub mod worker;

// ---- Re-exports for stable public API ----
pub use crate::config::WorkerConfig;
pub use crate::errors::{WorkerError, WorkerResult};
pub use crate::ingest::types::{Family, Geo, MetricPoint, PageSource, Unit};
pub use crate::store::{RunRecord, RunStatus};
pub use crate::worker::Worker;

/// Shared startup for both binaries: `.env`, logging, config, optional exporter.
pub fn bootstrap(log_target: logging::LogTarget) -> anyhow::Result<WorkerConfig> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    logging::init(log_target);

    let cfg = WorkerConfig::load()?;
    if let Some(addr) = &cfg.metrics_addr {
        crate::metrics::install_exporter(addr)?;
    }
    Ok(cfg)
}
