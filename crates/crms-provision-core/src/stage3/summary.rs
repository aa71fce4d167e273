//! Portfolio-level totals over a provisioned batch.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::provision::{ProvisionedLoan, THRESHOLD_YEARS};
use crate::types::{Money, Rate};

/// Totals and counts for one provisioning run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub loan_count: usize,
    pub total_outstanding: Money,
    pub total_existing_ecl: Money,
    pub total_required_provision: Money,
    pub total_floored_ecl: Money,
    pub total_final_ecl: Money,
    /// Total final ECL less total ECL already held.
    pub provision_uplift: Money,
    /// Total final ECL / total outstanding (zero when nothing is outstanding).
    pub coverage_ratio: Rate,
    /// Rows whose classification date fell back to the default.
    pub fallback_date_count: usize,
    /// Rows more than 4 years past classification (secured provision applies).
    pub secured_threshold_count: usize,
    /// Rows where held ECL exceeded outstanding and the cap applied.
    pub ratio_inverted_count: usize,
}

/// Aggregate a provisioned batch.
pub fn summarize(loans: &[ProvisionedLoan]) -> PortfolioSummary {
    let threshold = Decimal::from(THRESHOLD_YEARS);
    let mut s = PortfolioSummary {
        loan_count: loans.len(),
        ..Default::default()
    };

    for p in loans {
        s.total_outstanding = s.total_outstanding.saturating_add(p.loan.total_outstanding);
        s.total_existing_ecl = s.total_existing_ecl.saturating_add(p.loan.existing_ecl_held);
        s.total_required_provision = s
            .total_required_provision
            .saturating_add(p.derived.required_provision);
        s.total_floored_ecl = s.total_floored_ecl.saturating_add(p.derived.floored_ecl);
        s.total_final_ecl = s.total_final_ecl.saturating_add(p.derived.final_ecl);

        if p.loan.classification_date_substituted {
            s.fallback_date_count += 1;
        }
        if p.derived.years_since_npl > threshold {
            s.secured_threshold_count += 1;
        }
        if p.derived.held_to_outstanding_ratio > Decimal::ONE {
            s.ratio_inverted_count += 1;
        }
    }

    s.provision_uplift = s.total_final_ecl.saturating_sub(s.total_existing_ecl);
    s.coverage_ratio = s
        .total_final_ecl
        .checked_div(s.total_outstanding)
        .unwrap_or(Decimal::ZERO);
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage3::provision::{compute, RunParameters};
    use crate::stage3::record::LoanRecord;
    use rust_decimal_macros::dec;

    fn record(date: Option<&str>, os: Decimal, collateral: Decimal, held: Decimal) -> LoanRecord {
        LoanRecord {
            classification_date: date.map(String::from),
            total_outstanding: Some(os),
            collateral_after_haircut: Some(collateral),
            unsecured_covered_by_cashflow: None,
            existing_ecl_held: Some(held),
        }
    }

    #[test]
    fn test_empty_batch() {
        let s = summarize(&[]);
        assert_eq!(s, PortfolioSummary::default());
        assert_eq!(s.coverage_ratio, Decimal::ZERO);
    }

    #[test]
    fn test_totals_and_counts() {
        let params = RunParameters::parse("31-Oct-2024", "22-Mar-2025").unwrap();
        let loans = compute(
            &[
                // recent: NUSP 60 provided in full
                record(Some("01-Jan-2024"), dec!(100), dec!(40), dec!(20)),
                // missing date -> old; secured 200 x 0.25 = 50
                record(None, dec!(200), dec!(200), dec!(10)),
                // held 30 > os 10: capped at outstanding
                record(Some("01-Jan-2024"), dec!(10), dec!(10), dec!(30)),
            ],
            &params,
        )
        .unwrap();

        let s = summarize(&loans);
        assert_eq!(s.loan_count, 3);
        assert_eq!(s.total_outstanding, dec!(310));
        assert_eq!(s.total_existing_ecl, dec!(60));
        assert_eq!(s.total_required_provision, dec!(110));
        assert_eq!(s.total_floored_ecl, dec!(140));
        assert_eq!(s.total_final_ecl, dec!(120));
        assert_eq!(s.provision_uplift, dec!(60));
        assert_eq!(s.coverage_ratio, dec!(120) / dec!(310));
        assert_eq!(s.fallback_date_count, 1);
        assert_eq!(s.secured_threshold_count, 1);
        assert_eq!(s.ratio_inverted_count, 1);
    }
}
