// src/ingest/mod.rs
pub mod extract;
pub mod fetch;
pub mod parse;
pub mod quality;
pub mod tables;
pub mod types;

use chrono::{DateTime, Utc};

use crate::errors::WorkerResult;
use crate::ingest::extract::{extract_points, ExtractLimits, Extraction};
use crate::ingest::types::PageSource;

/// Fetch the page once and extract whatever points it yields.
///
/// Only the fetch can fail; an unexpected page shape gives an empty extraction.
pub async fn scrape(
    source: &dyn PageSource,
    scraped_at: DateTime<Utc>,
    limits: ExtractLimits,
) -> WorkerResult<Extraction> {
    let html = source.fetch_page().await?;
    Ok(extract_points(&html, source.url(), scraped_at, limits))
}
