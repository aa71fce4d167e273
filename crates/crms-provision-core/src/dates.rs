//! Date parsing and fixed 365-day year arithmetic.
//!
//! Year fractions and year offsets here deliberately ignore leap days: a
//! year is always 365 days. Thresholds computed with these helpers match the
//! guideline workbook, not a calendar.

use chrono::{Datelike, Days, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;

use crate::error::ProvisionError;
use crate::types::Years;
use crate::ProvisionResult;

/// Format of the run-level date parameters, e.g. `31-Oct-2024`.
pub const PARAMETER_DATE_FORMAT: &str = "%d-%b-%Y";

/// Day count of one year in every age and threshold calculation.
pub const DAYS_PER_YEAR: u64 = 365;

/// Years before this are treated as a mis-parse (e.g. `24` read as year 0024).
const MIN_PLAUSIBLE_YEAR: i32 = 1900;

const CLASSIFICATION_DATE_FORMATS: &[&str] = &[
    "%d-%b-%Y",
    "%d-%b-%y",
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d.%m.%Y",
];

const CLASSIFICATION_DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Parse a run-level date parameter (`31-Oct-2024`).
///
/// `parameter` is only used to name the offending input in the error.
pub fn parse_parameter_date(parameter: &str, value: &str) -> ProvisionResult<NaiveDate> {
    let trimmed = value.trim();
    // chrono's %b also takes full month names; only the abbreviation is valid here.
    let month = trimmed.split('-').nth(1).unwrap_or_default();
    if month.len() != 3 {
        return Err(ProvisionError::InvalidDate {
            parameter: parameter.into(),
            value: value.into(),
            reason: "expected DD-Mon-YYYY with a three-letter month".into(),
        });
    }

    let date = NaiveDate::parse_from_str(trimmed, PARAMETER_DATE_FORMAT).map_err(|e| {
        ProvisionError::InvalidDate {
            parameter: parameter.into(),
            value: value.into(),
            reason: format!("expected DD-Mon-YYYY, {e}"),
        }
    })?;

    if date.year() < MIN_PLAUSIBLE_YEAR {
        return Err(ProvisionError::InvalidDate {
            parameter: parameter.into(),
            value: value.into(),
            reason: "year must have four digits".into(),
        });
    }

    Ok(date)
}

/// Leniently parse a per-row classification date.
///
/// Returns `None` for empty or unrecognised values; callers substitute the
/// fallback date rather than failing the row.
pub fn parse_classification_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    for fmt in CLASSIFICATION_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, fmt) {
            if date.year() >= MIN_PLAUSIBLE_YEAR {
                return Some(date);
            }
        }
    }

    CLASSIFICATION_DATETIME_FORMATS
        .iter()
        .filter_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .map(|dt| dt.date())
        .find(|date| date.year() >= MIN_PLAUSIBLE_YEAR)
}

/// Elapsed years between two dates as whole days / 365.
///
/// Negative when `to` precedes `from`.
pub fn years_between(from: NaiveDate, to: NaiveDate) -> Years {
    let days = (to - from).num_days();
    Decimal::from(days) / Decimal::from(DAYS_PER_YEAR)
}

/// Shift a date forward by `years` fixed 365-day years.
pub fn add_fixed_years(date: NaiveDate, years: u64) -> ProvisionResult<NaiveDate> {
    date.checked_add_days(Days::new(years * DAYS_PER_YEAR))
        .ok_or_else(|| {
            ProvisionError::DateError(format!(
                "{date} plus {years} x {DAYS_PER_YEAR} days is out of range"
            ))
        })
}
