// src/store/canonical.rs
//! SQLite store: latest snapshot, deduplicated history, run audit log.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::time::Duration;

use crate::errors::{WorkerError, WorkerResult};
use crate::ingest::types::{Geo, MetricPoint, Unit};
use crate::store::schema::{DDL, INDEXES, RUNS_COLUMN_MIGRATIONS, RUNS_TABLE};
use crate::store::{iso, HistoryEntry, LatestSnapshot, RunRecord, RunStatus};

const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// What `ensure_schema` changed on an existing database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaReport {
    pub added_columns: Vec<String>,
    pub failed_columns: Vec<String>,
}

pub struct CanonicalStore {
    conn: Connection,
}

impl CanonicalStore {
    pub fn open(path: &Path) -> WorkerResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                WorkerError::canonical(format!("creating {}: {e}", parent.display()))
            })?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> WorkerResult<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    /// Create missing tables, add missing run columns, then ensure indexes.
    ///
    /// A column that cannot be added is logged and reported, not returned as an error.
    pub fn ensure_schema(&self) -> WorkerResult<SchemaReport> {
        self.conn.execute_batch(DDL)?;

        let mut report = SchemaReport::default();
        for (column, definition) in RUNS_COLUMN_MIGRATIONS {
            match ensure_column(&self.conn, RUNS_TABLE, column, definition) {
                Ok(true) => report.added_columns.push(column.to_string()),
                Ok(false) => {}
                Err(e) => {
                    let err = WorkerError::SchemaMigration(format!("{RUNS_TABLE}.{column}: {e}"));
                    tracing::warn!(error = %err, "schema migration step failed");
                    report.failed_columns.push(column.to_string());
                }
            }
        }
        if !report.added_columns.is_empty() {
            tracing::info!(table = RUNS_TABLE, added = ?report.added_columns, "schema migrated");
        }

        for stmt in INDEXES {
            self.conn.execute(stmt, [])?;
        }
        Ok(report)
    }

    /// Insert or refresh the snapshot for `p.metric_uid`.
    ///
    /// Returns `true` when the metric is new or its `(period, value)` moved.
    pub fn upsert_latest(&self, p: &MetricPoint) -> WorkerResult<bool> {
        upsert_latest_on(&self.conn, p)
    }

    /// Unconditional append. Callers gate on [`Self::upsert_latest`].
    pub fn insert_history(&self, p: &MetricPoint) -> WorkerResult<()> {
        insert_history_on(&self.conn, p)
    }

    /// Upsert plus conditional history in one short transaction.
    pub fn persist_point(&mut self, p: &MetricPoint) -> WorkerResult<bool> {
        let tx = self.conn.transaction()?;
        let changed = upsert_latest_on(&tx, p)?;
        if changed {
            insert_history_on(&tx, p)?;
        }
        tx.commit()?;
        Ok(changed)
    }

    pub fn insert_run(&self, r: &RunRecord) -> WorkerResult<()> {
        self.conn.execute(
            "INSERT INTO realtime_price_runs(
               run_id, started_at, finished_at, duration_ms, status,
               source_url,
               points_count, points_valid_count,
               stored_latest_count, stored_history_count, skipped_history_count,
               dq_errors_count,
               errors_count, error_sample
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                r.run_id,
                iso(r.started_at),
                iso(r.finished_at),
                r.duration_ms,
                r.status.as_str(),
                r.source_url,
                r.points_count as i64,
                r.points_valid_count as i64,
                r.stored_latest_count as i64,
                r.stored_history_count as i64,
                r.skipped_history_count as i64,
                r.dq_errors_count as i64,
                r.errors_count as i64,
                r.error_sample,
            ],
        )?;
        Ok(())
    }

    // --- read side (dashboard queries) ---

    pub fn latest_snapshot(&self, metric_uid: &str) -> WorkerResult<Option<LatestSnapshot>> {
        let snap = self
            .conn
            .query_row(
                &format!("{LATEST_SELECT} WHERE metric_uid = ?1"),
                [metric_uid],
                snapshot_from_row,
            )
            .optional()?;
        Ok(snap)
    }

    pub fn latest_snapshots(&self) -> WorkerResult<Vec<LatestSnapshot>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{LATEST_SELECT} ORDER BY metric_uid"))?;
        let rows = stmt.query_map([], snapshot_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Newest first.
    pub fn history(&self, metric_uid: &str, limit: usize) -> WorkerResult<Vec<HistoryEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, metric_uid, metric_name, geo, unit, period, value, source, source_url, scraped_at
             FROM realtime_price_history
             WHERE metric_uid = ?1
             ORDER BY scraped_at DESC, id DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![metric_uid, limit as i64], |row| {
            Ok(HistoryEntry {
                id: row.get(0)?,
                point: point_from_row(row, 1, 9)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn history_len(&self) -> WorkerResult<u64> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM realtime_price_history", [], |r| r.get(0))?;
        Ok(n as u64)
    }

    /// Newest first.
    pub fn runs(&self, limit: usize) -> WorkerResult<Vec<RunRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT run_id, started_at, finished_at, duration_ms, status, source_url,
                    points_count, points_valid_count, stored_latest_count,
                    stored_history_count, skipped_history_count, dq_errors_count,
                    errors_count, error_sample
             FROM realtime_price_runs
             ORDER BY started_at DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit as i64], |row| {
            let status: String = row.get(4)?;
            Ok(RunRecord {
                run_id: row.get(0)?,
                started_at: ts_col(row, 1)?,
                finished_at: ts_col(row, 2)?,
                duration_ms: row.get(3)?,
                status: RunStatus::parse(&status),
                source_url: row.get(5)?,
                points_count: row.get::<_, i64>(6)? as u64,
                points_valid_count: row.get::<_, i64>(7)? as u64,
                stored_latest_count: row.get::<_, i64>(8)? as u64,
                stored_history_count: row.get::<_, i64>(9)? as u64,
                skipped_history_count: row.get::<_, i64>(10)? as u64,
                dq_errors_count: row.get::<_, i64>(11)? as u64,
                errors_count: row.get::<_, i64>(12)? as u64,
                error_sample: row.get(13)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    #[cfg(test)]
    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }
}

const LATEST_SELECT: &str = "SELECT metric_uid, metric_name, geo, unit, period, value, source, source_url,
        scraped_at, first_seen_at, last_seen_at
 FROM realtime_price_latest";

fn upsert_latest_on(conn: &Connection, p: &MetricPoint) -> WorkerResult<bool> {
    let prior: Option<(String, f64)> = conn
        .query_row(
            "SELECT period, value FROM realtime_price_latest WHERE metric_uid = ?1",
            [&p.metric_uid],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let changed = match &prior {
        None => true,
        Some((period, value)) => *period != p.period || *value != p.value,
    };

    let now = iso(p.scraped_at);
    // first_seen_at is only written by the INSERT branch.
    conn.execute(
        "INSERT INTO realtime_price_latest(
           metric_uid, metric_name, geo, unit, period, value,
           source, source_url, first_seen_at, last_seen_at, scraped_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
         ON CONFLICT(metric_uid) DO UPDATE SET
           metric_name=excluded.metric_name,
           geo=excluded.geo,
           unit=excluded.unit,
           period=excluded.period,
           value=excluded.value,
           source=excluded.source,
           source_url=excluded.source_url,
           last_seen_at=excluded.last_seen_at,
           scraped_at=excluded.scraped_at",
        params![
            p.metric_uid,
            p.metric_name,
            p.geo.as_str(),
            p.unit.as_str(),
            p.period,
            p.value,
            p.source,
            p.source_url,
            now,
            now,
            now,
        ],
    )?;

    Ok(changed)
}

fn insert_history_on(conn: &Connection, p: &MetricPoint) -> WorkerResult<()> {
    conn.execute(
        "INSERT INTO realtime_price_history(
           metric_uid, metric_name, geo, unit, period, value, source, source_url, scraped_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            p.metric_uid,
            p.metric_name,
            p.geo.as_str(),
            p.unit.as_str(),
            p.period,
            p.value,
            p.source,
            p.source_url,
            iso(p.scraped_at),
        ],
    )?;
    Ok(())
}

/// Returns `true` when the column had to be added.
fn ensure_column(
    conn: &Connection,
    table: &str,
    column: &str,
    definition: &str,
) -> rusqlite::Result<bool> {
    if column_exists(conn, table, column)? {
        return Ok(false);
    }
    conn.execute(&format!("ALTER TABLE {table} ADD COLUMN {definition}"), [])?;
    Ok(true)
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

fn ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Reads the eight point columns starting at `start`, plus `scraped_at` at `scraped_idx`.
fn point_from_row(row: &Row<'_>, start: usize, scraped_idx: usize) -> rusqlite::Result<MetricPoint> {
    let geo: String = row.get(start + 2)?;
    let unit: String = row.get(start + 3)?;
    let unit = Unit::parse(&unit).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            start + 3,
            Type::Text,
            format!("unknown unit {unit:?}").into(),
        )
    })?;
    Ok(MetricPoint {
        metric_uid: row.get(start)?,
        metric_name: row.get(start + 1)?,
        geo: Geo::parse(&geo),
        unit,
        period: row.get(start + 4)?,
        value: row.get(start + 5)?,
        source: row.get(start + 6)?,
        source_url: row.get(start + 7)?,
        scraped_at: ts_col(row, scraped_idx)?,
    })
}

fn snapshot_from_row(row: &Row<'_>) -> rusqlite::Result<LatestSnapshot> {
    Ok(LatestSnapshot {
        point: point_from_row(row, 0, 8)?,
        first_seen_at: ts_col(row, 9)?,
        last_seen_at: ts_col(row, 10)?,
    })
}
