// src/ingest/parse.rs
//! Cell-level helpers: numbers, quarters, slugs, geography.

use once_cell::sync::OnceCell;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::ingest::types::Geo;

fn re_year_quarter() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(\d{4})\s*[- ]?\s*T\s*([1-4])").unwrap())
}

fn re_quarter_year() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"T\s*([1-4])\s*(\d{4})").unwrap())
}

fn re_canonical_period() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}-T[1-4]$").unwrap())
}

fn re_ws() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

/// Parse a French-formatted numeric cell ("1 234,0", "12,5 %", "-0,4").
pub fn parse_number(cell: &str) -> Option<f64> {
    let s = cell.replace('\u{a0}', " ");
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let cleaned: String = s
        .replace(',', ".")
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    cleaned.parse::<f64>().ok()
}

/// Normalize quarter labels to `YYYY-T[1-4]`.
///
/// Accepts `2025-T3`, `2025 T3`, `2025T3` and `T3 2025`, case-insensitive.
pub fn normalize_period(cell: &str) -> Option<String> {
    let upper = cell.replace('\u{a0}', " ").trim().to_uppercase();
    if upper.is_empty() {
        return None;
    }
    let s = re_ws().replace_all(&upper, " ");

    if let Some(caps) = re_year_quarter().captures(&s) {
        return Some(format!("{}-T{}", &caps[1], &caps[2]));
    }
    if let Some(caps) = re_quarter_year().captures(&s) {
        return Some(format!("{}-T{}", &caps[2], &caps[1]));
    }
    None
}

pub fn is_canonical_period(period: &str) -> bool {
    re_canonical_period().is_match(period)
}

/// Lowercase, accent-stripped, `_`-separated identifier. Never empty.
pub fn slugify(label: &str) -> String {
    let folded: String = label
        .trim()
        .to_lowercase()
        .nfkd()
        .filter(char::is_ascii)
        .collect();

    let mut out = String::with_capacity(folded.len());
    for c in folded.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    let out = out.trim_matches('_');
    if out.is_empty() {
        "col".to_string()
    } else {
        out.to_string()
    }
}

/// Ordered substring checks; "France" alone only matches after the regional names.
pub fn infer_geo(label: &str) -> Geo {
    let l = label.to_lowercase();
    if l.contains("ile-de-france") || l.contains("île-de-france") || l.contains("idf") {
        Geo::Idf
    } else if l.contains("province") {
        Geo::Province
    } else if l.contains("france") {
        Geo::Fr
    } else {
        Geo::Na
    }
}
