// src/ingest/extract.rs
//! Heuristic table selection and latest-row extraction.

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::ingest::parse::{infer_geo, parse_number, slugify};
use crate::ingest::tables::{parse_tables, Table};
use crate::ingest::types::{Family, MetricPoint};

pub const SOURCE_NAME: &str = "insee";
const HEADER_SAMPLE_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractLimits {
    pub min_table_score: u32,
}

impl Default for ExtractLimits {
    fn default() -> Self {
        Self { min_table_score: 4 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TablePick {
    pub score: u32,
    pub table_index: usize,
}

/// Always produced, even when no point comes out. Mirrored as `raw_debug`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionDebug {
    pub source_url: String,
    pub scraped_at: DateTime<Utc>,
    pub tables_found: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_indices: Option<TablePick>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_yoy: Option<TablePick>,
    pub points_count: usize,
    #[serde(default)]
    pub indices_headers_sample: Vec<String>,
    #[serde(default)]
    pub yoy_headers_sample: Vec<String>,
}

impl ExtractionDebug {
    fn new(source_url: &str, scraped_at: DateTime<Utc>, tables_found: usize) -> Self {
        Self {
            source_url: source_url.to_string(),
            scraped_at,
            tables_found,
            error: None,
            best_indices: None,
            best_yoy: None,
            points_count: 0,
            indices_headers_sample: Vec::new(),
            yoy_headers_sample: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Extraction {
    pub points: Vec<MetricPoint>,
    pub debug: ExtractionDebug,
}

fn re_quarter_token() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?i)\d{4}\s*[- ]?\s*T\s*[1-4]").unwrap())
}

fn has_any(txt: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| txt.contains(n))
}

/// Relevance of `table` for `family`. Higher is better.
pub fn score_table(table: &Table, family: Family) -> u32 {
    let txt = table.full_text().to_lowercase();
    let mut score = 0;

    if txt.contains("logements anciens") {
        score += 3;
    }

    match family {
        Family::Indices => {
            if has_any(&txt, &["indice", "index"]) {
                score += 3;
            }
            if txt.contains("base") && txt.contains("100") {
                score += 1;
            }
            if has_any(&txt, &["ile-de-france", "île-de-france"]) {
                score += 2;
            }
            if txt.contains("province") {
                score += 2;
            }
        }
        Family::Yoy => {
            if txt.contains("variation") {
                score += 3;
            }
            if has_any(&txt, &["sur un an", "annuelle", "annual", "year-on-year"]) {
                score += 2;
            }
            if has_any(&txt, &["%", "pourcentage", "percentage"]) {
                score += 1;
            }
            if txt.contains("france") {
                score += 2;
            }
        }
    }

    if has_any(&txt, &["appartement", "apartment"]) {
        score += 1;
    }
    if has_any(&txt, &["maison", "house"]) {
        score += 1;
    }

    if re_quarter_token().is_match(&txt) {
        score += 2;
    }

    score
}

/// Highest scoring table for `family`; the earliest table wins ties.
pub fn pick_best(tables: &[Table], family: Family) -> Option<TablePick> {
    let mut best: Option<TablePick> = None;
    for (i, t) in tables.iter().enumerate() {
        let score = score_table(t, family);
        if best.map_or(true, |b| score > b.score) {
            best = Some(TablePick {
                score,
                table_index: i,
            });
        }
    }
    best
}

/// Turn the latest quarter row of `table` into points. Empty when no row qualifies.
pub fn points_from_table(
    table: &Table,
    family: Family,
    source_url: &str,
    scraped_at: DateTime<Utc>,
) -> Vec<MetricPoint> {
    let Some((period, row)) = table.latest_period_row() else {
        return Vec::new();
    };
    let values = &row[1..];
    let headers = table.header_labels();

    // Header rows usually carry a label for the period column too.
    let labels: Vec<String> = if headers.len() > values.len() {
        headers[headers.len() - values.len()..].to_vec()
    } else {
        (1..=values.len()).map(|i| format!("col_{i}")).collect()
    };

    labels
        .iter()
        .zip(values)
        .filter_map(|(label, cell)| {
            let value = parse_number(cell)?;
            Some(MetricPoint {
                metric_uid: format!("{}:{}", family.uid_prefix(), slugify(label)),
                metric_name: format!("INSEE {} - {}", family.as_str(), label),
                geo: infer_geo(label),
                unit: family.unit(),
                period: period.clone(),
                value,
                source: SOURCE_NAME.to_string(),
                source_url: source_url.to_string(),
                scraped_at,
            })
        })
        .collect()
}

/// Best-effort extraction over a whole page. Never fails; problems show up in `debug`.
pub fn extract_points(
    html: &str,
    source_url: &str,
    scraped_at: DateTime<Utc>,
    limits: ExtractLimits,
) -> Extraction {
    let t0 = std::time::Instant::now();
    let tables = parse_tables(html);
    let mut debug = ExtractionDebug::new(source_url, scraped_at, tables.len());

    if tables.is_empty() {
        debug.error = Some("no_tables_found_in_html".to_string());
        tracing::debug!(source_url, "no tables in page");
        return Extraction {
            points: Vec::new(),
            debug,
        };
    }

    let mut points = Vec::new();
    for family in Family::ALL {
        let Some(pick) = pick_best(&tables, family) else {
            continue;
        };
        let table = &tables[pick.table_index];
        let sample: Vec<String> = table
            .header_labels()
            .into_iter()
            .take(HEADER_SAMPLE_LEN)
            .collect();

        match family {
            Family::Indices => {
                debug.best_indices = Some(pick);
                debug.indices_headers_sample = sample;
            }
            Family::Yoy => {
                debug.best_yoy = Some(pick);
                debug.yoy_headers_sample = sample;
            }
        }

        if pick.score < limits.min_table_score {
            tracing::debug!(
                family = family.as_str(),
                score = pick.score,
                min = limits.min_table_score,
                "best table below threshold, kind skipped"
            );
            continue;
        }
        points.extend(points_from_table(table, family, source_url, scraped_at));
    }

    debug.points_count = points.len();
    histogram!("worker_extract_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    counter!("worker_points_extracted_total").increment(points.len() as u64);

    Extraction { points, debug }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::tables::{Cell, Row};

    fn table(caption: &str, rows: Vec<Vec<Cell>>) -> Table {
        Table {
            caption: Some(caption.to_string()),
            rows: rows.into_iter().map(|cells| Row { cells }).collect(),
        }
    }

    #[test]
    fn indices_keywords_score_high() {
        let t = table(
            "Indice des prix des logements anciens, base 100",
            vec![
                vec![
                    Cell::header("Trimestre"),
                    Cell::header("Île-de-France"),
                    Cell::header("Province"),
                ],
                vec![Cell::header("2025 T2"), Cell::data("120"), Cell::data("125")],
            ],
        );
        // 3 (logements anciens) + 3 (indice) + 1 (base 100) + 2 + 2 (geos) + 2 (quarter)
        assert_eq!(score_table(&t, Family::Indices), 13);
    }

    #[test]
    fn ties_go_to_first_table() {
        let a = table("variation annuelle", vec![]);
        let b = table("variation annuelle", vec![]);
        let pick = pick_best(&[a, b], Family::Yoy).unwrap();
        assert_eq!(pick.table_index, 0);
        assert_eq!(pick.score, 5);
    }

    #[test]
    fn short_headers_get_positional_labels() {
        let t = table(
            "x",
            vec![vec![
                Cell::data("2024T4"),
                Cell::data("1,5"),
                Cell::data("2,5"),
            ]],
        );
        let pts = points_from_table(&t, Family::Yoy, "https://example.test", Utc::now());
        let uids: Vec<_> = pts.iter().map(|p| p.metric_uid.as_str()).collect();
        assert_eq!(uids, vec!["insee_yoy:col_1", "insee_yoy:col_2"]);
        assert_eq!(pts[0].period, "2024-T4");
    }

    #[test]
    fn unparseable_cells_are_skipped() {
        let t = table(
            "x",
            vec![
                vec![
                    Cell::header("Période"),
                    Cell::header("France"),
                    Cell::header("Province"),
                ],
                vec![Cell::data("T1 2025"), Cell::data("n.d."), Cell::data("-1,2")],
            ],
        );
        let pts = points_from_table(&t, Family::Yoy, "https://example.test", Utc::now());
        assert_eq!(pts.len(), 1);
        assert_eq!(pts[0].metric_uid, "insee_yoy:province");
        assert_eq!(pts[0].value, -1.2);
        assert_eq!(pts[0].period, "2025-T1");
    }

    #[test]
    fn page_without_tables_reports_error_in_debug() {
        let ex = extract_points(
            "<html><p>maintenance</p></html>",
            "https://example.test",
            Utc::now(),
            ExtractLimits::default(),
        );
        assert!(ex.points.is_empty());
        assert_eq!(ex.debug.tables_found, 0);
        assert_eq!(ex.debug.error.as_deref(), Some("no_tables_found_in_html"));
    }
}
