// src/ingest/types.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::WorkerResult;

/// The two table kinds the extractor looks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    /// Level series, index on a fixed base.
    Indices,
    /// Year-over-year variation, in percent.
    Yoy,
}

impl Family {
    pub const ALL: [Family; 2] = [Family::Indices, Family::Yoy];

    pub fn as_str(self) -> &'static str {
        match self {
            Family::Indices => "indices",
            Family::Yoy => "yoy",
        }
    }

    /// Prefix of every `metric_uid` in this family.
    pub fn uid_prefix(self) -> &'static str {
        match self {
            Family::Indices => "insee_indices",
            Family::Yoy => "insee_yoy",
        }
    }

    pub fn unit(self) -> Unit {
        match self {
            Family::Indices => Unit::IndexBase,
            Family::Yoy => Unit::Pct,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Geo {
    #[serde(rename = "IDF")]
    Idf,
    #[serde(rename = "PROVINCE")]
    Province,
    #[serde(rename = "FR")]
    Fr,
    #[serde(rename = "NA")]
    Na,
}

impl Geo {
    pub fn as_str(self) -> &'static str {
        match self {
            Geo::Idf => "IDF",
            Geo::Province => "PROVINCE",
            Geo::Fr => "FR",
            Geo::Na => "NA",
        }
    }

    pub fn parse(s: &str) -> Geo {
        match s {
            "IDF" => Geo::Idf,
            "PROVINCE" => Geo::Province,
            "FR" => Geo::Fr,
            _ => Geo::Na,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    IndexBase,
    Pct,
}

impl Unit {
    pub fn as_str(self) -> &'static str {
        match self {
            Unit::IndexBase => "index_base",
            Unit::Pct => "pct",
        }
    }

    pub fn parse(s: &str) -> Option<Unit> {
        match s {
            "index_base" => Some(Unit::IndexBase),
            "pct" => Some(Unit::Pct),
            _ => None,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One extracted observation. Lives for a single run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub metric_uid: String,  // e.g. "insee_yoy:france"
    pub metric_name: String, // human label
    pub geo: Geo,
    pub unit: Unit,
    pub period: String, // "YYYY-T[1-4]"
    pub value: f64,
    pub source: String,
    pub source_url: String,
    pub scraped_at: DateTime<Utc>,
}

/// Where the raw page comes from. The HTTP fetcher is the production impl.
#[async_trait::async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self) -> WorkerResult<String>;
    fn url(&self) -> &str;
}
