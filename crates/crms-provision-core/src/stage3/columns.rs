//! Column names of the delimited-text loan file.
//!
//! The held-ECL column and two output columns carry the reporting quarter of
//! the floor, e.g. `Existing ECL held Q3'24`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ProvisionError;

pub const CLASSIFICATION_DATE: &str = "Classification date";
pub const TOTAL_OS: &str = "TOTAL OS";
pub const COLLATERAL_AFTER_HC: &str = "Collateral after H.C";
pub const CASHFLOW_COVER: &str = "Unsecured Portion Covered by ECF/DCF";

pub const PARSED_CLASSIFICATION_DATE: &str = "Classification Date";
pub const YEARS_SINCE_NPL: &str = "Years Since NPL";
pub const UNSECURED_WHOLE: &str = "Unsecured Portion (as whole)";
pub const NET_SECURED: &str = "NET SECURED Portion";
pub const NET_UNSECURED: &str = "NET Unsecured Portion (NUSP)";
pub const NUSP_PROVISION_A: &str = "Min. Provision Required on NUSP (A)";
pub const NUSP_PROVISION_B: &str = "Min. Provision Required on NUSP (B)";
pub const UNSECURED_PROVISION: &str = "Provision Unsecured Portion";
pub const SECURED_PROVISION: &str = "Min. Provision on entire SECURED Portion";
pub const REQUIRED_PROVISION: &str = "FINAL Required Provision/ECL CRMS";
pub const FINAL_ECL_OS_CONSIDERED: &str = "Final ECL with OS considered";

/// Reporting quarter of the held-ECL floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FloorQuarter {
    /// 1 to 4.
    pub quarter: u8,
    /// Four-digit year.
    pub year: i32,
}

impl Default for FloorQuarter {
    fn default() -> Self {
        Self {
            quarter: 3,
            year: 2024,
        }
    }
}

impl FloorQuarter {
    pub fn new(quarter: u8, year: i32) -> Result<Self, ProvisionError> {
        if !(1..=4).contains(&quarter) {
            return Err(ProvisionError::InvalidInput {
                field: "floor_quarter".into(),
                reason: format!("quarter must be 1-4, got {quarter}"),
            });
        }
        Ok(Self { quarter, year })
    }

    fn short_year(&self) -> i32 {
        self.year.rem_euclid(100)
    }

    /// `Existing ECL held Q3'24`
    pub fn held_ecl_column(&self) -> String {
        format!("Existing ECL held Q{}'{:02}", self.quarter, self.short_year())
    }

    /// `Final Calculated ECL with Q3 2024 floor`
    pub fn floored_ecl_column(&self) -> String {
        format!("Final Calculated ECL with Q{} {} floor", self.quarter, self.year)
    }

    /// `Ratio Existing ECL Q3'24 to Total OS`
    pub fn held_ratio_column(&self) -> String {
        format!(
            "Ratio Existing ECL Q{}'{:02} to Total OS",
            self.quarter,
            self.short_year()
        )
    }

    /// Input columns the table must contain, in lookup order.
    pub fn required_columns(&self) -> [String; 5] {
        [
            CLASSIFICATION_DATE.to_string(),
            TOTAL_OS.to_string(),
            COLLATERAL_AFTER_HC.to_string(),
            CASHFLOW_COVER.to_string(),
            self.held_ecl_column(),
        ]
    }

    /// Columns appended to the table, in order.
    pub fn derived_columns(&self) -> Vec<String> {
        vec![
            PARSED_CLASSIFICATION_DATE.to_string(),
            YEARS_SINCE_NPL.to_string(),
            UNSECURED_WHOLE.to_string(),
            NET_SECURED.to_string(),
            NET_UNSECURED.to_string(),
            NUSP_PROVISION_A.to_string(),
            NUSP_PROVISION_B.to_string(),
            UNSECURED_PROVISION.to_string(),
            SECURED_PROVISION.to_string(),
            REQUIRED_PROVISION.to_string(),
            self.floored_ecl_column(),
            self.held_ratio_column(),
            FINAL_ECL_OS_CONSIDERED.to_string(),
        ]
    }
}

impl fmt::Display for FloorQuarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Q{}'{:02}", self.quarter, self.short_year())
    }
}

impl FromStr for FloorQuarter {
    type Err = ProvisionError;

    /// Accepts `Q3'24`, `Q3 2024`, `Q3-2024` and lowercase `q`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ProvisionError::InvalidInput {
            field: "floor_quarter".into(),
            reason: format!("expected a tag like Q3'24 or Q3 2024, got '{s}'"),
        };

        let rest = s
            .trim()
            .strip_prefix(|c: char| matches!(c, 'Q' | 'q'))
            .ok_or_else(invalid)?;
        let mut chars = rest.chars();
        let quarter = chars
            .next()
            .and_then(|c| c.to_digit(10))
            .ok_or_else(invalid)? as u8;

        let year_part = chars.as_str();
        let year_digits = year_part
            .strip_prefix(|c: char| matches!(c, '\'' | ' ' | '-'))
            .ok_or_else(invalid)?;
        if !year_digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let year = match year_digits.len() {
            2 => 2000 + year_digits.parse::<i32>().map_err(|_| invalid())?,
            4 => year_digits.parse::<i32>().map_err(|_| invalid())?,
            _ => return Err(invalid()),
        };

        FloorQuarter::new(quarter, year)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_quarter_headers() {
        let q = FloorQuarter::default();
        assert_eq!(q.held_ecl_column(), "Existing ECL held Q3'24");
        assert_eq!(q.floored_ecl_column(), "Final Calculated ECL with Q3 2024 floor");
        assert_eq!(q.held_ratio_column(), "Ratio Existing ECL Q3'24 to Total OS");
        assert_eq!(q.to_string(), "Q3'24");
    }

    #[test]
    fn test_parse_tags() {
        let expected = FloorQuarter::new(4, 2025).unwrap();
        for tag in ["Q4'25", "Q4 2025", "Q4-2025", "q4'25", " Q4'25 "] {
            assert_eq!(tag.parse::<FloorQuarter>().unwrap(), expected, "{tag}");
        }
    }

    #[test]
    fn test_parse_rejects_bad_tags() {
        for tag in ["", "Q5'24", "Q0 2024", "3'24", "Q3", "Q3'2", "Q3 20x4", "Q3/24"] {
            assert!(tag.parse::<FloorQuarter>().is_err(), "{tag}");
        }
    }

    #[test]
    fn test_required_and_derived_columns() {
        let q = FloorQuarter::new(1, 2025).unwrap();
        assert_eq!(q.required_columns()[4], "Existing ECL held Q1'25");
        let derived = q.derived_columns();
        assert_eq!(derived.len(), 13);
        assert_eq!(derived[0], PARSED_CLASSIFICATION_DATE);
        assert_eq!(derived[10], "Final Calculated ECL with Q1 2025 floor");
        assert_eq!(derived[12], FINAL_ECL_OS_CONSIDERED);
    }
}
