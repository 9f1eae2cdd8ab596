// src/store/mod.rs
pub mod canonical;
pub mod mirror;
pub mod mongo;
pub mod schema;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ingest::types::MetricPoint;

pub use canonical::CanonicalStore;
pub use mirror::{MemoryMirror, MirrorConnector, MirrorStore};
pub use mongo::MongoConnector;

/// RFC 3339 UTC with fixed microsecond precision, so text order is time order.
pub fn iso(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Most recent observation of one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestSnapshot {
    pub point: MetricPoint,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub point: MetricPoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Ok,
    Warn,
    Error,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Ok => "ok",
            RunStatus::Warn => "warn",
            RunStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> RunStatus {
        match s {
            "warn" => RunStatus::Warn,
            "error" => RunStatus::Error,
            _ => RunStatus::Ok,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit row, one per run invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub status: RunStatus,
    pub source_url: String,

    pub points_count: u64,
    pub points_valid_count: u64,
    pub stored_latest_count: u64,
    pub stored_history_count: u64,
    pub skipped_history_count: u64,
    pub dq_errors_count: u64,

    pub errors_count: u64,
    pub error_sample: Option<String>,
}
