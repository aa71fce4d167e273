//! Raw loan records and the normalization pass (step 1).
//!
//! Normalization is total: every missing or unparseable input is replaced by
//! a fixed substitute so the provisioning steps never branch on absence.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::dates::parse_classification_date;
use crate::types::Money;

/// Classification date assumed when the row's date is missing or unreadable.
///
/// Old enough that the exposure is treated as long overdue.
pub const FALLBACK_CLASSIFICATION_DATE: NaiveDate = match NaiveDate::from_ymd_opt(2000, 1, 1) {
    Some(d) => d,
    None => panic!("invalid fallback classification date"),
};

/// One Stage 3 wholesale exposure as supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoanRecord {
    /// NPL classification date as written in the source, any supported format.
    #[serde(default)]
    pub classification_date: Option<String>,
    /// Gross exposure (TOTAL OS).
    #[serde(default)]
    pub total_outstanding: Option<Money>,
    /// Collateral value net of haircut.
    #[serde(default)]
    pub collateral_after_haircut: Option<Money>,
    /// Unsecured portion covered by expected or discounted cash flows.
    #[serde(default)]
    pub unsecured_covered_by_cashflow: Option<Money>,
    /// Provision held under the prior regime; the floor.
    #[serde(default)]
    pub existing_ecl_held: Option<Money>,
}

/// A loan record with every field populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedLoan {
    pub classification_date: NaiveDate,
    /// True when `classification_date` is the fallback, not the source value.
    pub classification_date_substituted: bool,
    pub total_outstanding: Money,
    pub collateral_after_haircut: Money,
    pub unsecured_covered_by_cashflow: Money,
    pub existing_ecl_held: Money,
}

/// Step 1: replace missing values with their substitutes.
///
/// Amounts default to zero and a negative outstanding balance is clamped to
/// zero. The other amounts pass through as given.
pub fn normalize(record: &LoanRecord) -> NormalizedLoan {
    let parsed_date = record
        .classification_date
        .as_deref()
        .and_then(parse_classification_date);

    NormalizedLoan {
        classification_date: parsed_date.unwrap_or(FALLBACK_CLASSIFICATION_DATE),
        classification_date_substituted: parsed_date.is_none(),
        total_outstanding: record
            .total_outstanding
            .unwrap_or(Decimal::ZERO)
            .max(Decimal::ZERO),
        collateral_after_haircut: record.collateral_after_haircut.unwrap_or(Decimal::ZERO),
        unsecured_covered_by_cashflow: record
            .unsecured_covered_by_cashflow
            .unwrap_or(Decimal::ZERO),
        existing_ecl_held: record.existing_ecl_held.unwrap_or(Decimal::ZERO),
    }
}

/// Parse an amount cell from a delimited-text export.
///
/// Accepts thousands separators and scientific notation. Returns `None` for
/// empty or unparseable text.
pub fn parse_amount(raw: &str) -> Option<Money> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }
    Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .ok()
}
