// src/config.rs
//! Worker configuration: defaults, optional TOML base file, environment overrides.
//!
//! Built once at startup and passed by reference to every component.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::{WorkerError, WorkerResult};
use crate::ingest::extract::ExtractLimits;
use crate::ingest::quality::QualityLimits;

pub const ENV_CONFIG_PATH: &str = "WORKER_CONFIG_PATH";

/// The loop never sleeps less than this between runs.
pub const MIN_POLL_INTERVAL_SECS: u64 = 5;

pub const DEFAULT_SOURCE_URL: &str = "https://www.insee.fr/fr/statistiques/8669035";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub source_url: String,
    pub request_timeout_secs: u64,
    pub poll_interval_secs: u64,

    pub sqlite_db_path: String,

    pub mirror_enabled: bool,
    pub mongo_uri: String,
    pub mongo_db: String,
    pub mongo_raw_collection: String,
    pub mongo_obs_collection: String,
    pub mongo_latest_collection: String,

    /// Tables scoring below this are ignored for a kind.
    pub min_table_score: u32,
    pub index_max: f64,
    pub pct_abs_max: f64,

    /// `host:port` for the Prometheus listener; `None` disables the exporter.
    pub metrics_addr: Option<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            source_url: DEFAULT_SOURCE_URL.to_string(),
            request_timeout_secs: 20,
            poll_interval_secs: 300,
            sqlite_db_path: "/app/data/homepedia.db".to_string(),
            mirror_enabled: true,
            mongo_uri: "mongodb://homepedia-mongo:27017".to_string(),
            mongo_db: "homepedia_buffer".to_string(),
            mongo_raw_collection: "realtime_price_raw_runs".to_string(),
            mongo_obs_collection: "realtime_price_observations".to_string(),
            mongo_latest_collection: "realtime_price_latest".to_string(),
            min_table_score: 4,
            index_max: 2000.0,
            pct_abs_max: 200.0,
            metrics_addr: None,
        }
    }
}

impl WorkerConfig {
    /// Load using `$WORKER_CONFIG_PATH` (TOML) as base when set, then apply env overrides.
    pub fn load() -> WorkerResult<Self> {
        let base = match std::env::var(ENV_CONFIG_PATH) {
            Ok(p) if !p.trim().is_empty() => Self::load_from_file(Path::new(p.trim()))?,
            _ => Self::default(),
        };
        base.with_overrides(|key| std::env::var(key).ok())
    }

    /// Defaults + environment only.
    pub fn from_env() -> WorkerResult<Self> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    pub fn load_from_file(path: &Path) -> WorkerResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            WorkerError::Config(format!("reading config from {}: {e}", path.display()))
        })?;
        toml::from_str(&content).map_err(|e| {
            WorkerError::Config(format!("parsing config {}: {e}", path.display()))
        })
    }

    /// Apply overrides from a key lookup. Blank values keep the current value.
    pub fn with_overrides<F>(mut self, lookup: F) -> WorkerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(v) = get("INSEE_SOURCE_URL") {
            self.source_url = v;
        }
        if let Some(v) = get("REALTIME_REQUEST_TIMEOUT_SECONDS") {
            self.request_timeout_secs = parse_value("REALTIME_REQUEST_TIMEOUT_SECONDS", &v)?;
        }
        if let Some(v) = get("POLL_INTERVAL_SECONDS") {
            self.poll_interval_secs = parse_value("POLL_INTERVAL_SECONDS", &v)?;
        }
        // DB_PATH wins over the older SQLITE_DB_PATH name.
        if let Some(v) = get("DB_PATH").or_else(|| get("SQLITE_DB_PATH")) {
            self.sqlite_db_path = v;
        }
        if let Some(v) = get("MIRROR_ENABLED") {
            self.mirror_enabled = parse_bool("MIRROR_ENABLED", &v)?;
        }
        if let Some(v) = get("MONGO_URI") {
            self.mongo_uri = v;
        }
        if let Some(v) = get("MONGO_DB") {
            self.mongo_db = v;
        }
        if let Some(v) = get("MONGO_PRICE_RAW_COLLECTION") {
            self.mongo_raw_collection = v;
        }
        if let Some(v) = get("MONGO_PRICE_OBS_COLLECTION") {
            self.mongo_obs_collection = v;
        }
        if let Some(v) = get("MONGO_PRICE_LATEST_COLLECTION") {
            self.mongo_latest_collection = v;
        }
        if let Some(v) = get("EXTRACT_MIN_TABLE_SCORE") {
            self.min_table_score = parse_value("EXTRACT_MIN_TABLE_SCORE", &v)?;
        }
        if let Some(v) = get("DQ_INDEX_MAX") {
            self.index_max = parse_value("DQ_INDEX_MAX", &v)?;
        }
        if let Some(v) = get("DQ_PCT_ABS_MAX") {
            self.pct_abs_max = parse_value("DQ_PCT_ABS_MAX", &v)?;
        }
        if let Some(v) = get("METRICS_ADDR") {
            self.metrics_addr = Some(v);
        }

        Ok(self)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Sleep between runs, floored at [`MIN_POLL_INTERVAL_SECS`].
    pub fn sleep_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(MIN_POLL_INTERVAL_SECS))
    }

    pub fn extract_limits(&self) -> ExtractLimits {
        ExtractLimits {
            min_table_score: self.min_table_score,
        }
    }

    pub fn quality_limits(&self) -> QualityLimits {
        QualityLimits {
            index_max: self.index_max,
            pct_abs_max: self.pct_abs_max,
        }
    }
}

fn parse_value<T>(key: &str, raw: &str) -> WorkerResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| WorkerError::Config(format!("{key}={raw:?}: {e}")))
}

fn parse_bool(key: &str, raw: &str) -> WorkerResult<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(WorkerError::Config(format!("{key}={raw:?}: expected a boolean"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn overrides_replace_defaults_and_blank_keeps_them() {
        let cfg = WorkerConfig::default()
            .with_overrides(lookup(&[
                ("POLL_INTERVAL_SECONDS", "60"),
                ("MONGO_DB", "  "),
                ("SQLITE_DB_PATH", "/tmp/old.db"),
                ("DB_PATH", "/tmp/new.db"),
                ("MIRROR_ENABLED", "off"),
            ]))
            .unwrap();
        assert_eq!(cfg.poll_interval_secs, 60);
        assert_eq!(cfg.mongo_db, "homepedia_buffer");
        assert_eq!(cfg.sqlite_db_path, "/tmp/new.db");
        assert!(!cfg.mirror_enabled);
    }

    #[test]
    fn bad_number_is_a_config_error() {
        let err = WorkerConfig::default()
            .with_overrides(lookup(&[("REALTIME_REQUEST_TIMEOUT_SECONDS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, WorkerError::Config(_)));
    }

    #[test]
    fn sleep_interval_has_a_floor() {
        let cfg = WorkerConfig {
            poll_interval_secs: 1,
            ..WorkerConfig::default()
        };
        assert_eq!(cfg.sleep_interval(), Duration::from_secs(5));
        let cfg = WorkerConfig {
            poll_interval_secs: 42,
            ..WorkerConfig::default()
        };
        assert_eq!(cfg.sleep_interval(), Duration::from_secs(42));
    }
}
