// src/ingest/quality.rs
//! Data quality gate. Violations are values, never errors.

use std::fmt;

use crate::ingest::parse::is_canonical_period;
use crate::ingest::types::{MetricPoint, Unit};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityLimits {
    /// `index_base` values must be in `(0, index_max]`.
    pub index_max: f64,
    /// `pct` values must be in `[-pct_abs_max, pct_abs_max]`.
    pub pct_abs_max: f64,
}

impl Default for QualityLimits {
    fn default() -> Self {
        Self {
            index_max: 2000.0,
            pct_abs_max: 200.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Violation {
    MetricUidEmpty,
    PeriodEmpty,
    PeriodInvalid(String),
    ValueNotFinite,
    ValueOutOfRangeIndex(f64),
    ValueOutOfRangePct(f64),
    SourceUrlEmpty,
}

impl Violation {
    /// Stable code without the offending value.
    pub fn code(&self) -> &'static str {
        match self {
            Violation::MetricUidEmpty => "metric_uid_empty",
            Violation::PeriodEmpty => "period_empty",
            Violation::PeriodInvalid(_) => "period_invalid",
            Violation::ValueNotFinite => "value_not_finite",
            Violation::ValueOutOfRangeIndex(_) => "value_out_of_range_index",
            Violation::ValueOutOfRangePct(_) => "value_out_of_range_pct",
            Violation::SourceUrlEmpty => "source_url_empty",
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::PeriodInvalid(p) => write!(f, "{}:{p}", self.code()),
            Violation::ValueOutOfRangeIndex(v) | Violation::ValueOutOfRangePct(v) => {
                write!(f, "{}:{v}", self.code())
            }
            other => f.write_str(other.code()),
        }
    }
}

pub fn validate_point(p: &MetricPoint, limits: &QualityLimits) -> Vec<Violation> {
    let mut errs = Vec::new();

    if p.metric_uid.trim().is_empty() {
        errs.push(Violation::MetricUidEmpty);
    }

    let period = p.period.trim();
    if period.is_empty() {
        errs.push(Violation::PeriodEmpty);
    } else if !is_canonical_period(&p.period) {
        errs.push(Violation::PeriodInvalid(p.period.clone()));
    }

    if !p.value.is_finite() {
        errs.push(Violation::ValueNotFinite);
        return errs;
    }

    let v = p.value;
    match p.unit {
        Unit::IndexBase if v <= 0.0 || v > limits.index_max => {
            errs.push(Violation::ValueOutOfRangeIndex(v));
        }
        Unit::Pct if v < -limits.pct_abs_max || v > limits.pct_abs_max => {
            errs.push(Violation::ValueOutOfRangePct(v));
        }
        _ => {}
    }

    if p.source_url.trim().is_empty() {
        errs.push(Violation::SourceUrlEmpty);
    }

    errs
}

/// A point that failed the gate, with every reason.
#[derive(Debug, Clone)]
pub struct Rejected {
    pub metric_uid: String,
    pub violations: Vec<Violation>,
}

impl Rejected {
    /// `dq:<uid>:<code>|<code>` as stored in a run's `error_sample`.
    pub fn sample(&self) -> String {
        let codes: Vec<String> = self.violations.iter().map(ToString::to_string).collect();
        format!("dq:{}:{}", self.metric_uid, codes.join("|"))
    }
}

#[derive(Debug, Clone, Default)]
pub struct GateOutcome {
    pub valid: Vec<MetricPoint>,
    pub rejected: Vec<Rejected>,
}

impl GateOutcome {
    pub fn dq_errors_count(&self) -> usize {
        self.rejected.len()
    }
}

/// Split points into persistable ones and rejects.
pub fn apply_gate(points: Vec<MetricPoint>, limits: &QualityLimits) -> GateOutcome {
    let mut out = GateOutcome::default();
    for p in points {
        let violations = validate_point(&p, limits);
        if violations.is_empty() {
            out.valid.push(p);
        } else {
            tracing::debug!(metric_uid = %p.metric_uid, ?violations, "point rejected by dq gate");
            out.rejected.push(Rejected {
                metric_uid: p.metric_uid,
                violations,
            });
        }
    }
    metrics::counter!("worker_points_rejected_total").increment(out.rejected.len() as u64);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::Geo;
    use chrono::Utc;

    fn point(uid: &str, unit: Unit, period: &str, value: f64) -> MetricPoint {
        MetricPoint {
            metric_uid: uid.to_string(),
            metric_name: uid.to_string(),
            geo: Geo::Fr,
            unit,
            period: period.to_string(),
            value,
            source: "insee".into(),
            source_url: "https://example.test".into(),
            scraped_at: Utc::now(),
        }
    }

    #[test]
    fn index_above_max_is_rejected() {
        let lim = QualityLimits::default();
        let errs = validate_point(&point("insee_indices:x", Unit::IndexBase, "2025-T1", 2500.0), &lim);
        assert_eq!(errs, vec![Violation::ValueOutOfRangeIndex(2500.0)]);
        assert_eq!(errs[0].to_string(), "value_out_of_range_index:2500");
        assert!(validate_point(&point("insee_indices:x", Unit::IndexBase, "2025-T1", 2000.0), &lim).is_empty());
        assert!(!validate_point(&point("insee_indices:x", Unit::IndexBase, "2025-T1", 0.0), &lim).is_empty());
    }

    #[test]
    fn pct_bounds_are_inclusive() {
        let lim = QualityLimits::default();
        assert!(validate_point(&point("insee_yoy:x", Unit::Pct, "2025-T1", -200.0), &lim).is_empty());
        assert_eq!(
            validate_point(&point("insee_yoy:x", Unit::Pct, "2025-T1", 200.5), &lim),
            vec![Violation::ValueOutOfRangePct(200.5)]
        );
    }

    #[test]
    fn non_finite_stops_further_checks() {
        let mut p = point("", Unit::Pct, "2025 T1", f64::NAN);
        p.source_url = String::new();
        let errs = validate_point(&p, &QualityLimits::default());
        assert_eq!(
            errs,
            vec![
                Violation::MetricUidEmpty,
                Violation::PeriodInvalid("2025 T1".into()),
                Violation::ValueNotFinite,
            ]
        );
    }

    #[test]
    fn gate_splits_and_samples() {
        let out = apply_gate(
            vec![
                point("insee_indices:ok", Unit::IndexBase, "2025-T1", 120.0),
                point("insee_indices:bad", Unit::IndexBase, "", 2500.0),
            ],
            &QualityLimits::default(),
        );
        assert_eq!(out.valid.len(), 1);
        assert_eq!(out.dq_errors_count(), 1);
        assert_eq!(
            out.rejected[0].sample(),
            "dq:insee_indices:bad:period_empty|value_out_of_range_index:2500"
        );
    }
}
