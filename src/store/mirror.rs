// src/store/mirror.rs
//! Document mirror seam plus an in-process implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::errors::{WorkerError, WorkerResult};
use crate::ingest::extract::ExtractionDebug;
use crate::ingest::types::MetricPoint;
use crate::store::LatestSnapshot;

/// One open mirror session. Every write is idempotent except `insert_raw_run`,
/// which is guarded by a unique `run_id`.
#[async_trait]
pub trait MirrorStore: Send + Sync {
    async fn ensure_indexes(&self) -> WorkerResult<()>;

    async fn insert_raw_run(
        &self,
        run_id: &str,
        source_url: &str,
        scraped_at: DateTime<Utc>,
        raw_debug: &ExtractionDebug,
    ) -> WorkerResult<()>;

    /// Upsert keyed by `(metric_uid, scraped_at)`.
    async fn upsert_observations(&self, points: &[MetricPoint]) -> WorkerResult<()>;

    /// Upsert keyed by `metric_uid`, keeping `first_seen_at` from the first insert.
    async fn upsert_latest(&self, points: &[MetricPoint]) -> WorkerResult<()>;
}

/// Opens a fresh mirror session per run.
#[async_trait]
pub trait MirrorConnector: Send + Sync {
    async fn open(&self) -> WorkerResult<Box<dyn MirrorStore>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawRunDoc {
    pub run_id: String,
    pub source_url: String,
    pub scraped_at: DateTime<Utc>,
    pub raw_debug: serde_json::Value,
}

#[derive(Debug, Default)]
struct MemoryState {
    indexes_ready: bool,
    raw_runs: BTreeMap<String, RawRunDoc>,
    observations: BTreeMap<(String, DateTime<Utc>), MetricPoint>,
    latest: BTreeMap<String, LatestSnapshot>,
}

/// In-memory mirror with the same keys and upsert rules as the MongoDB one.
/// Clones share state, so a connector handed to the worker can be inspected later.
#[derive(Debug, Clone, Default)]
pub struct MemoryMirror {
    state: Arc<Mutex<MemoryState>>,
    fail_with: Option<String>,
}

impl MemoryMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every operation fails with `message`, like an unreachable server.
    pub fn failing(message: &str) -> Self {
        Self {
            state: Arc::default(),
            fail_with: Some(message.to_string()),
        }
    }

    fn check(&self) -> WorkerResult<()> {
        match &self.fail_with {
            Some(msg) => Err(WorkerError::mirror(msg.clone())),
            None => Ok(()),
        }
    }

    fn lock(&self) -> WorkerResult<std::sync::MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| WorkerError::Internal("memory mirror mutex poisoned".to_string()))
    }

    pub fn raw_runs(&self) -> Vec<RawRunDoc> {
        self.lock()
            .map(|s| s.raw_runs.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn observations(&self) -> Vec<MetricPoint> {
        self.lock()
            .map(|s| s.observations.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn latest(&self) -> Vec<LatestSnapshot> {
        self.lock()
            .map(|s| s.latest.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn indexes_ready(&self) -> bool {
        self.lock().map(|s| s.indexes_ready).unwrap_or(false)
    }
}

#[async_trait]
impl MirrorStore for MemoryMirror {
    async fn ensure_indexes(&self) -> WorkerResult<()> {
        self.check()?;
        self.lock()?.indexes_ready = true;
        Ok(())
    }

    async fn insert_raw_run(
        &self,
        run_id: &str,
        source_url: &str,
        scraped_at: DateTime<Utc>,
        raw_debug: &ExtractionDebug,
    ) -> WorkerResult<()> {
        self.check()?;
        let raw_debug = serde_json::to_value(raw_debug)?;
        let mut state = self.lock()?;
        if state.raw_runs.contains_key(run_id) {
            return Err(WorkerError::mirror(format!(
                "duplicate key error: run_id {run_id}"
            )));
        }
        state.raw_runs.insert(
            run_id.to_string(),
            RawRunDoc {
                run_id: run_id.to_string(),
                source_url: source_url.to_string(),
                scraped_at,
                raw_debug,
            },
        );
        Ok(())
    }

    async fn upsert_observations(&self, points: &[MetricPoint]) -> WorkerResult<()> {
        self.check()?;
        let mut state = self.lock()?;
        for p in points {
            state
                .observations
                .insert((p.metric_uid.clone(), p.scraped_at), p.clone());
        }
        Ok(())
    }

    async fn upsert_latest(&self, points: &[MetricPoint]) -> WorkerResult<()> {
        self.check()?;
        let mut state = self.lock()?;
        for p in points {
            let first_seen_at = state
                .latest
                .get(&p.metric_uid)
                .map(|s| s.first_seen_at)
                .unwrap_or(p.scraped_at);
            state.latest.insert(
                p.metric_uid.clone(),
                LatestSnapshot {
                    point: p.clone(),
                    first_seen_at,
                    last_seen_at: p.scraped_at,
                },
            );
        }
        Ok(())
    }
}

#[async_trait]
impl MirrorConnector for MemoryMirror {
    async fn open(&self) -> WorkerResult<Box<dyn MirrorStore>> {
        self.check()?;
        Ok(Box::new(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::{Geo, Unit};
    use chrono::TimeZone;

    fn point(value: f64, at: DateTime<Utc>) -> MetricPoint {
        MetricPoint {
            metric_uid: "insee_indices:province".into(),
            metric_name: "INSEE indices - Province".into(),
            geo: Geo::Province,
            unit: Unit::IndexBase,
            period: "2025-T2".into(),
            value,
            source: "insee".into(),
            source_url: "https://example.test".into(),
            scraped_at: at,
        }
    }

    #[tokio::test]
    async fn observations_are_idempotent_per_scrape_timestamp() {
        let m = MemoryMirror::new();
        let t0 = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2025, 3, 1, 8, 5, 0).unwrap();
        m.upsert_observations(&[point(120.0, t0)]).await.unwrap();
        m.upsert_observations(&[point(120.0, t0)]).await.unwrap();
        assert_eq!(m.observations().len(), 1);
        m.upsert_observations(&[point(120.0, t1)]).await.unwrap();
        assert_eq!(m.observations().len(), 2);
    }

    #[tokio::test]
    async fn latest_keeps_first_seen() {
        let m = MemoryMirror::new();
        let t0 = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2025, 3, 1, 8, 5, 0).unwrap();
        m.upsert_latest(&[point(120.0, t0)]).await.unwrap();
        m.upsert_latest(&[point(121.0, t1)]).await.unwrap();
        let latest = m.latest();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].first_seen_at, t0);
        assert_eq!(latest[0].last_seen_at, t1);
        assert_eq!(latest[0].point.value, 121.0);
    }

    #[tokio::test]
    async fn failing_mirror_refuses_to_open() {
        let m = MemoryMirror::failing("connection refused");
        let err = m.open().await.err().unwrap();
        assert!(err.to_string().contains("connection refused"));
    }
}
