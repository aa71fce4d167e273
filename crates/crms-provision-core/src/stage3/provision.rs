//! Stage 3 CRMS minimum provisioning pipeline.
//!
//! Covers, per loan and in dependency order:
//! 1. **Exposure split** -- unsecured (whole), net secured, NUSP after cash-flow cover.
//! 2. **Unsecured provision** -- max of NUSP in full (A) and the time-based
//!    percentage of the whole unsecured portion (B).
//! 3. **Secured provision** -- 25% of net secured once the loan is over 4 years NPL.
//! 4. **Floor** -- never below the ECL already held.
//! 5. **Outstanding cap** -- when held ECL exceeds outstanding, floor at outstanding instead.
//!
//! All arithmetic uses `rust_decimal::Decimal`. No `f64`.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

use super::record::{normalize, LoanRecord, NormalizedLoan, FALLBACK_CLASSIFICATION_DATE};
use super::summary::{summarize, PortfolioSummary};
use crate::dates::{add_fixed_years, parse_parameter_date, years_between, DAYS_PER_YEAR};
use crate::types::{with_metadata, ComputationOutput, Money, Rate, Years};
use crate::ProvisionResult;

/// Years after which both the secured and unsecured thresholds bite.
pub const THRESHOLD_YEARS: u64 = 4;

/// Share of net secured exposure provided once the loan is past the threshold.
pub const SECURED_PROVISION_RATE: Rate = dec!(0.25);

/// Share of whole unsecured exposure provided before the guideline's 4-year mark.
pub const UNSECURED_RATE_BEFORE_THRESHOLD: Rate = dec!(0.25);

/// Share of whole unsecured exposure provided from the guideline's 4-year mark.
pub const UNSECURED_RATE_AFTER_THRESHOLD: Rate = dec!(1.00);

// ---------------------------------------------------------------------------
// Input / Output
// ---------------------------------------------------------------------------

/// Run-level dates shared by every row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunParameters {
    /// Date the CRMS guideline took force.
    pub crms_issue_date: NaiveDate,
    /// As-of date of the computation.
    pub run_date: NaiveDate,
}

impl RunParameters {
    /// Parse both dates from `DD-Mon-YYYY` strings.
    ///
    /// Either date failing to parse is fatal; the error names which one.
    pub fn parse(crms_issue_date: &str, run_date: &str) -> ProvisionResult<Self> {
        Ok(Self {
            crms_issue_date: parse_parameter_date("crms_issue_date", crms_issue_date)?,
            run_date: parse_parameter_date("run_date", run_date)?,
        })
    }
}

/// Per-run values resolved once before any row is processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionSchedule {
    pub params: RunParameters,
    /// CRMS issue date plus 4 x 365 days.
    pub four_year_threshold: NaiveDate,
    /// Multiplier applied to whole unsecured exposure for candidate B.
    pub unsecured_multiplier: Rate,
}

impl ProvisionSchedule {
    pub fn new(params: &RunParameters) -> ProvisionResult<Self> {
        // Step 7
        let four_year_threshold = add_fixed_years(params.crms_issue_date, THRESHOLD_YEARS)?;
        let unsecured_multiplier = if params.run_date >= four_year_threshold {
            UNSECURED_RATE_AFTER_THRESHOLD
        } else {
            UNSECURED_RATE_BEFORE_THRESHOLD
        };

        debug!(
            crms_issue_date = %params.crms_issue_date,
            run_date = %params.run_date,
            four_year_threshold = %four_year_threshold,
            unsecured_multiplier = %unsecured_multiplier,
            "Provision schedule resolved"
        );

        Ok(Self {
            params: *params,
            four_year_threshold,
            unsecured_multiplier,
        })
    }
}

/// Fields derived for one loan, in the order they are computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedFields {
    /// (run date - classification date) in days / 365.
    pub years_since_npl: Years,
    /// max(outstanding - collateral, 0).
    pub unsecured_whole: Money,
    /// min(collateral, outstanding).
    pub net_secured: Money,
    /// NUSP: unsecured (whole) less cash-flow cover. May be negative.
    pub net_unsecured: Money,
    /// Candidate A: NUSP provided in full.
    pub nusp_provision_a: Money,
    /// Candidate B: whole unsecured x time-based multiplier.
    pub nusp_provision_b: Money,
    /// max(A, B).
    pub unsecured_provision: Money,
    pub secured_provision: Money,
    /// Unsecured plus secured provision.
    pub required_provision: Money,
    /// max(required, existing ECL held).
    pub floored_ecl: Money,
    /// Existing ECL held / outstanding, zero when outstanding is zero.
    pub held_to_outstanding_ratio: Rate,
    pub final_ecl: Money,
}

/// A normalized loan with its derived fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionedLoan {
    pub loan: NormalizedLoan,
    pub derived: DerivedFields,
}

/// JSON-friendly input: date strings plus raw records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage3ProvisionInput {
    /// CRMS issue date, `DD-Mon-YYYY`.
    pub crms_issue_date: String,
    /// Run date, `DD-Mon-YYYY`.
    pub run_date: String,
    pub loans: Vec<LoanRecord>,
}

/// Output of a full Stage 3 provisioning run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage3ProvisionOutput {
    pub four_year_threshold: NaiveDate,
    pub unsecured_multiplier: Rate,
    pub loans: Vec<ProvisionedLoan>,
    pub summary: PortfolioSummary,
}

// ---------------------------------------------------------------------------
// Core functions
// ---------------------------------------------------------------------------

/// Steps 2-14 for a single normalized loan.
pub fn derive_fields(loan: &NormalizedLoan, schedule: &ProvisionSchedule) -> DerivedFields {
    let os = loan.total_outstanding;
    let collateral = loan.collateral_after_haircut;
    let held = loan.existing_ecl_held;

    // Step 2
    let years_since_npl = years_between(loan.classification_date, schedule.params.run_date);

    // Steps 3-5
    // Amounts near the Decimal range saturate rather than abort the batch.
    let unsecured_whole = os.saturating_sub(collateral).max(Decimal::ZERO);
    let net_secured = collateral.min(os);
    let net_unsecured = unsecured_whole.saturating_sub(loan.unsecured_covered_by_cashflow);

    // Steps 6-9
    let nusp_provision_a = net_unsecured;
    let nusp_provision_b = unsecured_whole.saturating_mul(schedule.unsecured_multiplier);
    let unsecured_provision = nusp_provision_a.max(nusp_provision_b);

    // Step 10
    let secured_provision = if years_since_npl > Decimal::from(THRESHOLD_YEARS) {
        net_secured.saturating_mul(SECURED_PROVISION_RATE)
    } else {
        Decimal::ZERO
    };

    // Steps 11-12
    let required_provision = unsecured_provision.saturating_add(secured_provision);
    let floored_ecl = required_provision.max(held);

    // Steps 13-14
    let held_to_outstanding_ratio = if os.is_zero() {
        Decimal::ZERO
    } else {
        held.checked_div(os).unwrap_or(if held.is_sign_negative() {
            Decimal::MIN
        } else {
            Decimal::MAX
        })
    };
    let final_ecl = if held_to_outstanding_ratio > Decimal::ONE {
        required_provision.max(os)
    } else {
        required_provision.max(held)
    };

    DerivedFields {
        years_since_npl,
        unsecured_whole,
        net_secured,
        net_unsecured,
        nusp_provision_a,
        nusp_provision_b,
        unsecured_provision,
        secured_provision,
        required_provision,
        floored_ecl,
        held_to_outstanding_ratio,
        final_ecl,
    }
}

/// Normalize and provision every record. Rows are independent; output order
/// matches input order.
pub fn compute(
    records: &[LoanRecord],
    params: &RunParameters,
) -> ProvisionResult<Vec<ProvisionedLoan>> {
    let schedule = ProvisionSchedule::new(params)?;
    Ok(provision_all(records.iter().map(normalize), &schedule))
}

pub(crate) fn provision_all(
    loans: impl Iterator<Item = NormalizedLoan>,
    schedule: &ProvisionSchedule,
) -> Vec<ProvisionedLoan> {
    loans
        .map(|loan| {
            let derived = derive_fields(&loan, schedule);
            ProvisionedLoan { loan, derived }
        })
        .collect()
}

/// Run-level warnings. Row-level substitutions are counted in the summary.
pub(crate) fn run_warnings(params: &RunParameters) -> Vec<String> {
    let mut warnings = Vec::new();
    if params.run_date < params.crms_issue_date {
        warn!(
            crms_issue_date = %params.crms_issue_date,
            run_date = %params.run_date,
            "Run date precedes CRMS issue date"
        );
        warnings.push(format!(
            "Run date {} precedes CRMS issue date {}; the 4-year threshold is not meaningful.",
            params.run_date, params.crms_issue_date
        ));
    }
    warnings
}

pub(crate) fn assumptions(schedule: &ProvisionSchedule) -> serde_json::Value {
    serde_json::json!({
        "crms_issue_date": schedule.params.crms_issue_date,
        "run_date": schedule.params.run_date,
        "four_year_threshold": schedule.four_year_threshold,
        "unsecured_multiplier": schedule.unsecured_multiplier,
        "secured_provision_rate": SECURED_PROVISION_RATE,
        "secured_threshold_years": THRESHOLD_YEARS,
        "day_count": format!("actual days / {DAYS_PER_YEAR}"),
        "fallback_classification_date": FALLBACK_CLASSIFICATION_DATE,
    })
}

/// Compute Stage 3 CRMS provisions for a batch of typed records.
pub fn calculate_stage3_provisions(
    input: &Stage3ProvisionInput,
) -> ProvisionResult<ComputationOutput<Stage3ProvisionOutput>> {
    let start = Instant::now();

    let params = RunParameters::parse(&input.crms_issue_date, &input.run_date)?;
    let schedule = ProvisionSchedule::new(&params)?;
    let warnings = run_warnings(&params);

    let loans = provision_all(input.loans.iter().map(normalize), &schedule);
    let summary = summarize(&loans);

    info!(
        loans = summary.loan_count,
        total_final_ecl = %summary.total_final_ecl,
        "Stage 3 provisions computed"
    );

    let rows = loans.len();
    let output = Stage3ProvisionOutput {
        four_year_threshold: schedule.four_year_threshold,
        unsecured_multiplier: schedule.unsecured_multiplier,
        loans,
        summary,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "CRMS Stage 3 minimum provision with held-ECL floor",
        &assumptions(&schedule),
        warnings,
        rows,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn schedule(crms: NaiveDate, run: NaiveDate) -> ProvisionSchedule {
        ProvisionSchedule::new(&RunParameters {
            crms_issue_date: crms,
            run_date: run,
        })
        .unwrap()
    }

    /// Issue date well over 4 years before the run date: 100% multiplier.
    fn mature_schedule() -> ProvisionSchedule {
        schedule(ymd(2019, 1, 1), ymd(2025, 3, 22))
    }

    fn loan(os: Decimal, collateral: Decimal, cover: Decimal, held: Decimal) -> NormalizedLoan {
        NormalizedLoan {
            // 5 x 365 days before the run date
            classification_date: ymd(2025, 3, 22) - chrono::Days::new(5 * 365),
            classification_date_substituted: false,
            total_outstanding: os,
            collateral_after_haircut: collateral,
            unsecured_covered_by_cashflow: cover,
            existing_ecl_held: held,
        }
    }

    #[test]
    fn test_end_to_end_reference_loan() {
        let d = derive_fields(
            &loan(dec!(100), dec!(40), dec!(10), dec!(20)),
            &mature_schedule(),
        );
        assert_eq!(d.years_since_npl, dec!(5));
        assert_eq!(d.unsecured_whole, dec!(60));
        assert_eq!(d.net_secured, dec!(40));
        assert_eq!(d.net_unsecured, dec!(50));
        assert_eq!(d.nusp_provision_a, dec!(50));
        assert_eq!(d.nusp_provision_b, dec!(60));
        assert_eq!(d.unsecured_provision, dec!(60));
        assert_eq!(d.secured_provision, dec!(10));
        assert_eq!(d.required_provision, dec!(70));
        assert_eq!(d.floored_ecl, dec!(70));
        assert_eq!(d.held_to_outstanding_ratio, dec!(0.2));
        assert_eq!(d.final_ecl, dec!(70));
    }

    #[test]
    fn test_ratio_inversion_caps_at_outstanding() {
        // Legacy provision of 20 against an exposure that has shrunk to 5
        let s = schedule(ymd(2024, 10, 31), ymd(2025, 3, 22));
        let mut l = loan(dec!(5), dec!(2), dec!(0), dec!(20));
        l.classification_date = ymd(2024, 1, 1);
        let d = derive_fields(&l, &s);
        assert_eq!(d.unsecured_whole, dec!(3));
        assert_eq!(d.nusp_provision_a, dec!(3));
        assert_eq!(d.nusp_provision_b, dec!(0.75));
        assert_eq!(d.secured_provision, Decimal::ZERO);
        assert_eq!(d.required_provision, dec!(3));
        assert_eq!(d.floored_ecl, dec!(20));
        assert_eq!(d.held_to_outstanding_ratio, dec!(4));
        assert_eq!(d.final_ecl, dec!(5));
    }

    #[test]
    fn test_ratio_exactly_one_keeps_held_floor() {
        let d = derive_fields(&loan(dec!(50), dec!(50), dec!(0), dec!(50)), &mature_schedule());
        assert_eq!(d.held_to_outstanding_ratio, Decimal::ONE);
        // required = 0 unsecured + 12.5 secured
        assert_eq!(d.required_provision, dec!(12.5));
        assert_eq!(d.final_ecl, dec!(50));
    }

    #[test]
    fn test_zero_outstanding_ratio_is_zero() {
        let d = derive_fields(&loan(dec!(0), dec!(10), dec!(0), dec!(30)), &mature_schedule());
        assert_eq!(d.held_to_outstanding_ratio, Decimal::ZERO);
        assert_eq!(d.unsecured_whole, Decimal::ZERO);
        assert_eq!(d.net_secured, Decimal::ZERO);
        assert_eq!(d.floored_ecl, dec!(30));
        assert_eq!(d.final_ecl, dec!(30));
    }

    #[test]
    fn test_excess_collateral_is_not_banked() {
        let d = derive_fields(&loan(dec!(100), dec!(250), dec!(0), dec!(0)), &mature_schedule());
        assert_eq!(d.unsecured_whole, Decimal::ZERO);
        assert_eq!(d.net_secured, dec!(100));
        assert_eq!(d.secured_provision, dec!(25));
    }

    #[test]
    fn test_cashflow_cover_exceeding_unsecured_goes_negative() {
        let d = derive_fields(&loan(dec!(100), dec!(80), dec!(50), dec!(0)), &mature_schedule());
        assert_eq!(d.unsecured_whole, dec!(20));
        assert_eq!(d.net_unsecured, dec!(-30));
        assert_eq!(d.nusp_provision_a, dec!(-30));
        // B absorbs the negative candidate
        assert_eq!(d.unsecured_provision, dec!(20));
    }

    #[test]
    fn test_unsecured_multiplier_threshold_boundaries() {
        let crms = ymd(2020, 1, 1);
        // 2020-01-01 + 1460 days = 2023-12-31
        assert_eq!(schedule(crms, ymd(2024, 1, 2)).unsecured_multiplier, dec!(1.00));
        assert_eq!(schedule(crms, ymd(2023, 12, 31)).unsecured_multiplier, dec!(1.00));
        assert_eq!(schedule(crms, ymd(2023, 12, 30)).unsecured_multiplier, dec!(0.25));
        assert_eq!(schedule(crms, ymd(2023, 12, 30)).four_year_threshold, ymd(2023, 12, 31));
    }

    #[test]
    fn test_candidate_b_pre_threshold_is_quarter() {
        let s = schedule(ymd(2024, 10, 31), ymd(2025, 3, 22));
        let d = derive_fields(&loan(dec!(100), dec!(40), dec!(60), dec!(0)), &s);
        assert_eq!(d.nusp_provision_a, Decimal::ZERO);
        assert_eq!(d.nusp_provision_b, dec!(15));
        assert_eq!(d.unsecured_provision, dec!(15));
    }

    #[test]
    fn test_secured_provision_requires_strictly_over_four_years() {
        let s = mature_schedule();
        let mut l = loan(dec!(100), dec!(100), dec!(0), dec!(0));

        // Exactly 4 x 365 days: not over 4 years
        l.classification_date = ymd(2025, 3, 22) - chrono::Days::new(4 * 365);
        let at = derive_fields(&l, &s);
        assert_eq!(at.years_since_npl, dec!(4));
        assert_eq!(at.secured_provision, Decimal::ZERO);

        l.classification_date = ymd(2025, 3, 22) - chrono::Days::new(4 * 365 + 1);
        let past = derive_fields(&l, &s);
        assert!(past.years_since_npl > dec!(4));
        assert_eq!(past.secured_provision, dec!(25));
    }

    #[test]
    fn test_future_classification_date_gives_negative_age() {
        let s = mature_schedule();
        let mut l = loan(dec!(100), dec!(100), dec!(0), dec!(0));
        l.classification_date = ymd(2026, 3, 22);
        let d = derive_fields(&l, &s);
        assert_eq!(d.years_since_npl, dec!(-1));
        assert_eq!(d.secured_provision, Decimal::ZERO);
    }

    #[test]
    fn test_compute_fallback_date_treated_as_old() {
        let params = RunParameters::parse("31-Oct-2024", "22-Mar-2025").unwrap();
        let records = vec![LoanRecord {
            classification_date: None,
            total_outstanding: Some(dec!(100)),
            collateral_after_haircut: Some(dec!(100)),
            unsecured_covered_by_cashflow: None,
            existing_ecl_held: None,
        }];
        let out = compute(&records, &params).unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0].loan.classification_date_substituted);
        assert!(out[0].derived.years_since_npl > dec!(25));
        assert_eq!(out[0].derived.secured_provision, dec!(25));
    }

    #[test]
    fn test_compute_preserves_row_order() {
        let params = RunParameters::parse("31-Oct-2024", "22-Mar-2025").unwrap();
        let records: Vec<LoanRecord> = (1..=3)
            .map(|i| LoanRecord {
                total_outstanding: Some(Decimal::from(i * 100)),
                ..Default::default()
            })
            .collect();
        let out = compute(&records, &params).unwrap();
        let os: Vec<Decimal> = out.iter().map(|p| p.loan.total_outstanding).collect();
        assert_eq!(os, vec![dec!(100), dec!(200), dec!(300)]);
    }

    #[test]
    fn test_run_parameters_parse_errors_name_parameter() {
        let err = RunParameters::parse("31-Oct-2024", "bad").unwrap_err();
        assert!(err.to_string().contains("run_date"));
        let err = RunParameters::parse("31/10/2024", "22-Mar-2025").unwrap_err();
        assert!(err.to_string().contains("crms_issue_date"));
    }

    #[test]
    fn test_calculate_envelope() {
        let input = Stage3ProvisionInput {
            crms_issue_date: "31-Oct-2024".into(),
            run_date: "22-Mar-2025".into(),
            loans: vec![LoanRecord {
                classification_date: Some("01-Jan-2018".into()),
                total_outstanding: Some(dec!(1_000)),
                collateral_after_haircut: Some(dec!(600)),
                unsecured_covered_by_cashflow: Some(dec!(100)),
                existing_ecl_held: Some(dec!(450)),
            }],
        };
        let out = calculate_stage3_provisions(&input).unwrap();
        assert!(out.warnings.is_empty());
        assert_eq!(out.result.four_year_threshold, ymd(2028, 10, 30));
        assert_eq!(out.result.unsecured_multiplier, dec!(0.25));
        let d = &out.result.loans[0].derived;
        // unsecured 400, A = 300, B = 100, secured 600 x 0.25 = 150
        assert_eq!(d.unsecured_provision, dec!(300));
        assert_eq!(d.secured_provision, dec!(150));
        assert_eq!(d.required_provision, dec!(450));
        assert_eq!(d.final_ecl, dec!(450));
        assert_eq!(out.result.summary.total_final_ecl, dec!(450));
        assert_eq!(out.assumptions["four_year_threshold"], "2028-10-30");
        assert_eq!(out.metadata.rows_processed, 1);
    }

    #[test]
    fn test_calculate_warns_when_run_precedes_issue() {
        let input = Stage3ProvisionInput {
            crms_issue_date: "31-Oct-2024".into(),
            run_date: "30-Sep-2024".into(),
            loans: vec![],
        };
        let out = calculate_stage3_provisions(&input).unwrap();
        assert_eq!(out.warnings.len(), 1);
        assert!(out.warnings[0].contains("precedes"));
        assert_eq!(out.result.summary.loan_count, 0);
    }

    #[test]
    fn test_calculate_rejects_bad_issue_date() {
        let input = Stage3ProvisionInput {
            crms_issue_date: "Oct 31 2024".into(),
            run_date: "22-Mar-2025".into(),
            loans: vec![LoanRecord::default()],
        };
        assert!(calculate_stage3_provisions(&input).is_err());
    }
}
