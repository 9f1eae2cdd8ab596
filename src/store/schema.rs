// src/store/schema.rs
pub const RUNS_TABLE: &str = "realtime_price_runs";

/// Current schema for fresh databases. Older databases are upgraded by
/// [`RUNS_COLUMN_MIGRATIONS`].
pub const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS realtime_price_latest (
  metric_uid TEXT PRIMARY KEY,
  metric_name TEXT NOT NULL,
  geo TEXT NOT NULL,
  unit TEXT NOT NULL,

  period TEXT NOT NULL,
  value REAL NOT NULL,

  source TEXT NOT NULL,
  source_url TEXT NOT NULL,

  first_seen_at TEXT NOT NULL,
  last_seen_at TEXT NOT NULL,
  scraped_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS realtime_price_history (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  metric_uid TEXT NOT NULL,
  metric_name TEXT NOT NULL,
  geo TEXT NOT NULL,
  unit TEXT NOT NULL,

  period TEXT NOT NULL,
  value REAL NOT NULL,

  source TEXT NOT NULL,
  source_url TEXT NOT NULL,

  scraped_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS realtime_price_runs (
  run_id TEXT PRIMARY KEY,
  started_at TEXT NOT NULL,
  finished_at TEXT NOT NULL,

  duration_ms INTEGER NOT NULL DEFAULT 0,
  status TEXT NOT NULL DEFAULT 'ok',

  source_url TEXT NOT NULL,

  points_count INTEGER NOT NULL,
  points_valid_count INTEGER NOT NULL DEFAULT 0,
  stored_latest_count INTEGER NOT NULL DEFAULT 0,
  stored_history_count INTEGER NOT NULL DEFAULT 0,
  skipped_history_count INTEGER NOT NULL DEFAULT 0,
  dq_errors_count INTEGER NOT NULL DEFAULT 0,

  errors_count INTEGER NOT NULL,
  error_sample TEXT NULL
);
"#;

/// Columns added to the runs table after its first release. Additive only:
/// `(column name, full column definition)`.
pub const RUNS_COLUMN_MIGRATIONS: &[(&str, &str)] = &[
    ("duration_ms", "duration_ms INTEGER NOT NULL DEFAULT 0"),
    ("status", "status TEXT NOT NULL DEFAULT 'ok'"),
    ("points_valid_count", "points_valid_count INTEGER NOT NULL DEFAULT 0"),
    ("stored_latest_count", "stored_latest_count INTEGER NOT NULL DEFAULT 0"),
    ("stored_history_count", "stored_history_count INTEGER NOT NULL DEFAULT 0"),
    ("skipped_history_count", "skipped_history_count INTEGER NOT NULL DEFAULT 0"),
    ("dq_errors_count", "dq_errors_count INTEGER NOT NULL DEFAULT 0"),
];

/// Applied after column migrations so they can reference new columns.
pub const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_rph_metric_scraped ON realtime_price_history(metric_uid, scraped_at)",
    "CREATE INDEX IF NOT EXISTS idx_rph_scraped ON realtime_price_history(scraped_at)",
    "CREATE INDEX IF NOT EXISTS idx_rpr_started ON realtime_price_runs(started_at)",
    "CREATE INDEX IF NOT EXISTS idx_rpr_finished ON realtime_price_runs(finished_at)",
];
