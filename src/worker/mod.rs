// src/worker/mod.rs
//! One run: fetch, extract, gate, persist to both stores, audit.

pub mod scheduler;

use chrono::{DateTime, Utc};
use metrics::{counter, gauge, histogram};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::WorkerConfig;
use crate::errors::{StoreKind, WorkerError, WorkerResult};
use crate::ingest::extract::ExtractionDebug;
use crate::ingest::fetch::HttpFetcher;
use crate::ingest::quality::{apply_gate, GateOutcome};
use crate::ingest::scrape;
use crate::ingest::types::{MetricPoint, PageSource};
use crate::store::mirror::MirrorConnector;
use crate::store::mongo::MongoConnector;
use crate::store::{CanonicalStore, RunRecord, RunStatus};

pub struct Worker {
    cfg: WorkerConfig,
    source: Box<dyn PageSource>,
    mirror: Option<Box<dyn MirrorConnector>>,
}

/// Counters accumulated during one run.
#[derive(Debug, Default)]
struct RunTally {
    points_count: u64,
    points_valid_count: u64,
    stored_latest_count: u64,
    stored_history_count: u64,
    skipped_history_count: u64,
    dq_errors_count: u64,
    errors_count: u64,
    dq_sample: Option<String>,
    error_sample: Option<String>,
}

impl RunTally {
    fn record_gate(&mut self, gate: &GateOutcome) {
        self.points_valid_count = gate.valid.len() as u64;
        self.dq_errors_count = gate.dq_errors_count() as u64;
        self.dq_sample = gate.rejected.first().map(|r| r.sample());
    }

    fn record_error(&mut self, err: &WorkerError) {
        self.errors_count += 1;
        if self.error_sample.is_none() {
            self.error_sample = Some(err.to_string());
        }
    }

    fn status(&self) -> RunStatus {
        if self.errors_count > 0 {
            RunStatus::Error
        } else if self.dq_errors_count > 0 {
            RunStatus::Warn
        } else {
            RunStatus::Ok
        }
    }

    fn into_record(
        self,
        run_id: String,
        source_url: &str,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> RunRecord {
        let status = self.status();
        RunRecord {
            run_id,
            started_at,
            finished_at,
            duration_ms: (finished_at - started_at).num_milliseconds(),
            status,
            source_url: source_url.to_string(),
            points_count: self.points_count,
            points_valid_count: self.points_valid_count,
            stored_latest_count: self.stored_latest_count,
            stored_history_count: self.stored_history_count,
            skipped_history_count: self.skipped_history_count,
            dq_errors_count: self.dq_errors_count,
            errors_count: self.errors_count,
            error_sample: self.error_sample.or(self.dq_sample),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct CanonicalCounts {
    latest: u64,
    history: u64,
    skipped: u64,
}

impl Worker {
    pub fn new(
        cfg: WorkerConfig,
        source: Box<dyn PageSource>,
        mirror: Option<Box<dyn MirrorConnector>>,
    ) -> Self {
        Self {
            cfg,
            source,
            mirror,
        }
    }

    /// Production wiring: HTTP fetcher and, unless disabled, the MongoDB mirror.
    pub fn from_config(cfg: WorkerConfig) -> WorkerResult<Self> {
        let source = HttpFetcher::new(cfg.source_url.clone(), cfg.request_timeout())?;
        let mirror: Option<Box<dyn MirrorConnector>> = if cfg.mirror_enabled {
            Some(Box::new(MongoConnector::from_config(&cfg)))
        } else {
            None
        };
        Ok(Self::new(cfg, Box::new(source), mirror))
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.cfg
    }

    /// Execute one full cycle. Never fails: every outcome ends in a [`RunRecord`],
    /// which is also written to the canonical store (best effort).
    pub async fn run_once(&self) -> RunRecord {
        crate::metrics::ensure_described();

        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let source_url = self.source.url().to_string();
        let mut tally = RunTally::default();

        info!(run_id = %run_id, source_url = %source_url, "run_started");

        match scrape(self.source.as_ref(), started_at, self.cfg.extract_limits()).await {
            Err(e) => {
                tally.record_error(&e);
                error!(run_id = %run_id, source_url = %source_url, error = %e, "scrape_failed");
            }
            Ok(extraction) => {
                tally.points_count = extraction.points.len() as u64;
                let gate = apply_gate(extraction.points, &self.cfg.quality_limits());
                tally.record_gate(&gate);

                match persist_canonical(&self.cfg.sqlite_db_path, gate.valid.clone()).await {
                    Ok(counts) => {
                        tally.stored_latest_count = counts.latest;
                        tally.stored_history_count = counts.history;
                        tally.skipped_history_count = counts.skipped;
                    }
                    Err((counts, e)) => {
                        tally.stored_latest_count = counts.latest;
                        tally.stored_history_count = counts.history;
                        tally.skipped_history_count = counts.skipped;
                        tally.record_error(&e);
                        counter!("worker_store_errors_total", "store" => StoreKind::Canonical.as_str())
                            .increment(1);
                        error!(run_id = %run_id, store = "canonical", error = %e, "persist_failed");
                    }
                }

                if let Some(connector) = &self.mirror {
                    let mirrored =
                        persist_mirror(connector.as_ref(), &run_id, started_at, &extraction.debug, &gate.valid)
                            .await;
                    if let Err(e) = mirrored {
                        tally.record_error(&e);
                        counter!("worker_store_errors_total", "store" => StoreKind::Mirror.as_str())
                            .increment(1);
                        error!(run_id = %run_id, store = "mirror", error = %e, "persist_failed");
                    }
                }

                match tally.status() {
                    RunStatus::Ok => info!(
                        run_id = %run_id,
                        tables_found = extraction.debug.tables_found,
                        points_count = tally.points_count,
                        points_valid_count = tally.points_valid_count,
                        stored_latest_count = tally.stored_latest_count,
                        stored_history_count = tally.stored_history_count,
                        skipped_history_count = tally.skipped_history_count,
                        "scrape_ok"
                    ),
                    RunStatus::Warn => warn!(
                        run_id = %run_id,
                        tables_found = extraction.debug.tables_found,
                        points_count = tally.points_count,
                        points_valid_count = tally.points_valid_count,
                        dq_errors_count = tally.dq_errors_count,
                        stored_latest_count = tally.stored_latest_count,
                        stored_history_count = tally.stored_history_count,
                        skipped_history_count = tally.skipped_history_count,
                        dq_sample = tally.dq_sample.as_deref().unwrap_or_default(),
                        "scrape_warn"
                    ),
                    // Already logged where it was caught.
                    RunStatus::Error => {}
                }
            }
        }

        self.finish(tally, run_id, &source_url, started_at).await
    }

    /// Audit a run whose task died before producing a record (a panic).
    pub async fn record_aborted_run(&self, started_at: DateTime<Utc>, reason: &str) -> RunRecord {
        let run_id = Uuid::new_v4().to_string();
        let source_url = self.source.url().to_string();
        let err = WorkerError::Internal(format!("run aborted: {reason}"));
        error!(run_id = %run_id, error = %err, "run_aborted");

        let mut tally = RunTally::default();
        tally.record_error(&err);
        self.finish(tally, run_id, &source_url, started_at).await
    }

    /// Build the record, write it (best effort), emit run metrics.
    async fn finish(
        &self,
        tally: RunTally,
        run_id: String,
        source_url: &str,
        started_at: DateTime<Utc>,
    ) -> RunRecord {
        let finished_at = Utc::now();
        let record = tally.into_record(run_id, source_url, started_at, finished_at);

        if let Err(e) = persist_run_record(&self.cfg.sqlite_db_path, record.clone()).await {
            counter!("worker_store_errors_total", "store" => StoreKind::Canonical.as_str())
                .increment(1);
            error!(run_id = %record.run_id, error = %e, "run_record_persist_failed");
        }

        counter!("worker_runs_total", "status" => record.status.as_str()).increment(1);
        counter!("worker_history_appended_total").increment(record.stored_history_count);
        histogram!("worker_run_duration_ms").record(record.duration_ms as f64);
        gauge!("worker_last_run_ts").set(finished_at.timestamp() as f64);

        info!(
            run_id = %record.run_id,
            status = %record.status,
            duration_ms = record.duration_ms,
            errors_count = record.errors_count,
            error_sample = record.error_sample.as_deref().unwrap_or_default(),
            "run_done"
        );
        record
    }
}

async fn blocking<T, F>(f: F) -> WorkerResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> WorkerResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| WorkerError::Internal(format!("blocking task: {e}")))?
}

/// Latest + conditional history, one transaction per point. Counts cover the
/// points committed before any failure.
async fn persist_canonical(
    db_path: &str,
    points: Vec<MetricPoint>,
) -> Result<CanonicalCounts, (CanonicalCounts, WorkerError)> {
    let path = PathBuf::from(db_path);
    let joined = tokio::task::spawn_blocking(move || {
        let mut counts = CanonicalCounts::default();
        match write_points(&path, &points, &mut counts) {
            Ok(()) => Ok(counts),
            Err(e) => Err((counts, e)),
        }
    })
    .await;

    match joined {
        Ok(result) => result,
        Err(e) => Err((
            CanonicalCounts::default(),
            WorkerError::Internal(format!("blocking task: {e}")),
        )),
    }
}

fn write_points(path: &Path, points: &[MetricPoint], counts: &mut CanonicalCounts) -> WorkerResult<()> {
    let mut store = CanonicalStore::open(path)?;
    store.ensure_schema()?;
    for p in points {
        if store.persist_point(p)? {
            counts.history += 1;
        } else {
            counts.skipped += 1;
        }
        counts.latest += 1;
    }
    Ok(())
}

async fn persist_run_record(db_path: &str, record: RunRecord) -> WorkerResult<()> {
    let path = PathBuf::from(db_path);
    blocking(move || {
        let store = CanonicalStore::open(&path)?;
        store.ensure_schema()?;
        store.insert_run(&record)
    })
    .await
}

async fn persist_mirror(
    connector: &dyn MirrorConnector,
    run_id: &str,
    scraped_at: DateTime<Utc>,
    debug: &ExtractionDebug,
    points: &[MetricPoint],
) -> WorkerResult<()> {
    let mirror = connector.open().await?;
    mirror.ensure_indexes().await?;
    mirror
        .insert_raw_run(run_id, &debug.source_url, scraped_at, debug)
        .await?;
    mirror.upsert_observations(points).await?;
    mirror.upsert_latest(points).await?;
    Ok(())
}
