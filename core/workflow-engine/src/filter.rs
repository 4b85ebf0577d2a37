//! FILENAME: core/workflow-engine/src/filter.rs
//! PURPOSE: Normalizes filter-shelf rules into workflow filters.
//! CONTEXT: Rules arrive with whatever the UI stored (numbers, numeric
//! strings, date strings). The executor expects numeric ranges and epoch
//! milliseconds, so the conversion happens here, once.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rustc_hash::FxHashSet;

use crate::error::{WorkflowError, WorkflowResult};
use crate::field::{FilterField, FilterRule, Literal};
use crate::workflow::{VisFilter, VisFilterRule};

/// Date-time layouts accepted for temporal endpoints, after RFC 3339.
const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M"];

/// Compiles a filter field into a workflow filter and records its key in
/// `view_keys`.
///
/// # Arguments
/// * `filter` - The filter field with its rule.
/// * `view_keys` - The set of field keys used by the view.
///
/// # Returns
/// The normalized filter, or `InvalidFilterRule` if the field has no rule
/// or a range endpoint cannot be converted.
pub fn compile_filter(
    filter: &FilterField,
    view_keys: &mut FxHashSet<String>,
) -> WorkflowResult<VisFilter> {
    let fid = filter.fid();
    view_keys.insert(fid.to_string());

    let rule = filter
        .rule
        .as_ref()
        .ok_or_else(|| invalid(fid, "filter has no rule"))?;

    let rule = match rule {
        FilterRule::OneOf(values) => VisFilterRule::OneOf(values.clone()),
        FilterRule::TemporalRange([lo, hi]) => {
            VisFilterRule::TemporalRange(to_epoch_millis(fid, lo)?, to_epoch_millis(fid, hi)?)
        }
        FilterRule::Range([lo, hi]) => VisFilterRule::Range(to_number(fid, lo)?, to_number(fid, hi)?),
    };

    Ok(VisFilter {
        fid: fid.to_string(),
        rule,
    })
}

fn invalid(fid: &str, reason: impl Into<String>) -> WorkflowError {
    WorkflowError::InvalidFilterRule {
        fid: fid.to_string(),
        reason: reason.into(),
    }
}

fn to_number(fid: &str, value: &Literal) -> WorkflowResult<f64> {
    value
        .as_f64()
        .ok_or_else(|| invalid(fid, format!("range endpoint {:?} is not a number", value)))
}

/// Converts a temporal endpoint to epoch milliseconds.
/// Numbers are taken as milliseconds already; strings are parsed as
/// RFC 3339, a naive date-time (UTC), a bare date (UTC midnight), or an
/// integer millisecond count.
fn to_epoch_millis(fid: &str, value: &Literal) -> WorkflowResult<i64> {
    let millis = match value {
        Literal::Number(n) if n.is_finite() => Some(n.trunc() as i64),
        Literal::Text(s) => parse_date_millis(s.trim()),
        _ => None,
    };
    millis.ok_or_else(|| invalid(fid, format!("temporal endpoint {:?} is not a date", value)))
}

fn parse_date_millis(s: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt.and_utc().timestamp_millis());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc().timestamp_millis());
    }
    s.parse::<i64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;

    fn compile(filter: &FilterField) -> WorkflowResult<VisFilter> {
        let mut keys = FxHashSet::default();
        compile_filter(filter, &mut keys)
    }

    #[test]
    fn test_one_of_copies_values() {
        let values = vec![Literal::text("East"), Literal::text("West")];
        let filter = FilterField::new(Field::dimension("Region"), FilterRule::OneOf(values.clone()));
        let compiled = compile(&filter).unwrap();
        assert_eq!(compiled.fid, "Region");
        assert_eq!(compiled.rule, VisFilterRule::OneOf(values));
    }

    #[test]
    fn test_range_converts_numeric_strings() {
        let filter = FilterField::new(
            Field::measure("Sales", "sum"),
            FilterRule::Range([Literal::text("10"), Literal::Number(99.5)]),
        );
        assert_eq!(compile(&filter).unwrap().rule, VisFilterRule::Range(10.0, 99.5));
    }

    #[test]
    fn test_range_rejects_non_numeric() {
        let filter = FilterField::new(
            Field::measure("Sales", "sum"),
            FilterRule::Range([Literal::text("low"), Literal::Number(1.0)]),
        );
        assert!(matches!(
            compile(&filter),
            Err(WorkflowError::InvalidFilterRule { ref fid, .. }) if fid == "Sales"
        ));
    }

    #[test]
    fn test_temporal_range_to_millis() {
        let filter = FilterField::new(
            Field::dimension("Date"),
            FilterRule::TemporalRange([
                Literal::text("2024-01-01"),
                Literal::text("2024-01-02T00:00:00Z"),
            ]),
        );
        assert_eq!(
            compile(&filter).unwrap().rule,
            VisFilterRule::TemporalRange(1_704_067_200_000, 1_704_153_600_000)
        );
    }

    #[test]
    fn test_temporal_range_accepts_millis() {
        let filter = FilterField::new(
            Field::dimension("Date"),
            FilterRule::TemporalRange([Literal::Number(0.0), Literal::text("86400000")]),
        );
        assert_eq!(compile(&filter).unwrap().rule, VisFilterRule::TemporalRange(0, 86_400_000));
    }

    #[test]
    fn test_missing_rule_is_invalid() {
        let filter = FilterField::without_rule(Field::dimension("Region"));
        assert!(matches!(compile(&filter), Err(WorkflowError::InvalidFilterRule { .. })));
    }

    #[test]
    fn test_registers_view_key() {
        let mut keys = FxHashSet::default();
        let filter = FilterField::new(Field::dimension("Region"), FilterRule::OneOf(vec![]));
        compile_filter(&filter, &mut keys).unwrap();
        assert!(keys.contains("Region"));
    }
}
