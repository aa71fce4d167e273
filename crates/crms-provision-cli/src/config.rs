//! Run configuration: flag, then environment, then config file, then default.
//!
//! Clap resolves flag-over-environment; this module layers the YAML run
//! file and built-in defaults underneath.

use clap::Args;
use serde::Deserialize;

use crms_provision_core::stage3::columns::FloorQuarter;

use crate::input;

/// Guideline issue date used when none is configured.
pub const DEFAULT_CRMS_ISSUE_DATE: &str = "31-Oct-2024";

/// Run-level settings shared by every provisioning command.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Path to a YAML/JSON run-config file
    #[arg(long)]
    pub config: Option<String>,

    /// CRMS guideline issue date (DD-Mon-YYYY)
    #[arg(long, env = "CRMS_ISSUE_DATE")]
    pub crms_issue_date: Option<String>,

    /// Run / as-of date (DD-Mon-YYYY)
    #[arg(long, env = "CRMS_RUN_DATE")]
    pub run_date: Option<String>,

    /// Reporting quarter of the held-ECL floor, e.g. Q3'24
    #[arg(long, env = "CRMS_FLOOR_QUARTER")]
    pub floor_quarter: Option<String>,

    /// CSV field delimiter
    #[arg(long)]
    pub delimiter: Option<char>,
}

/// Contents of a run-config file. Every key is optional.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RunConfigFile {
    pub crms_issue_date: Option<String>,
    pub run_date: Option<String>,
    pub floor_quarter: Option<String>,
    pub delimiter: Option<char>,
}

/// Fully resolved settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub crms_issue_date: String,
    pub run_date: String,
    pub floor_quarter: FloorQuarter,
    pub delimiter: u8,
}

impl RunArgs {
    /// Load the config file (if any) and layer flags over it.
    pub fn resolve(&self) -> Result<RunSettings, Box<dyn std::error::Error>> {
        let file: RunConfigFile = match self.config {
            Some(ref path) => input::file::read_yaml(path)?,
            None => RunConfigFile::default(),
        };
        merge(self, file)
    }
}

/// Layer flags over file values over defaults.
pub fn merge(
    args: &RunArgs,
    file: RunConfigFile,
) -> Result<RunSettings, Box<dyn std::error::Error>> {
    let crms_issue_date = args
        .crms_issue_date
        .clone()
        .or(file.crms_issue_date)
        .unwrap_or_else(|| DEFAULT_CRMS_ISSUE_DATE.to_string());

    let run_date = args
        .run_date
        .clone()
        .or(file.run_date)
        .ok_or("run_date is required (--run-date, CRMS_RUN_DATE or run_date in --config)")?;

    let floor_quarter = match args.floor_quarter.clone().or(file.floor_quarter) {
        Some(tag) => tag.parse::<FloorQuarter>()?,
        None => FloorQuarter::default(),
    };

    let delimiter = args.delimiter.or(file.delimiter).unwrap_or(',');
    if !delimiter.is_ascii() {
        return Err(format!("delimiter must be a single ASCII character, got '{delimiter}'").into());
    }

    Ok(RunSettings {
        crms_issue_date,
        run_date,
        floor_quarter,
        delimiter: delimiter as u8,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_apply_when_only_run_date_given() {
        let args = RunArgs {
            run_date: Some("22-Mar-2025".into()),
            ..Default::default()
        };
        let s = merge(&args, RunConfigFile::default()).unwrap();
        assert_eq!(
            s,
            RunSettings {
                crms_issue_date: DEFAULT_CRMS_ISSUE_DATE.into(),
                run_date: "22-Mar-2025".into(),
                floor_quarter: FloorQuarter::default(),
                delimiter: b',',
            }
        );
    }

    #[test]
    fn test_flags_override_file() {
        let args = RunArgs {
            run_date: Some("31-Dec-2025".into()),
            floor_quarter: Some("Q4'25".into()),
            ..Default::default()
        };
        let file = RunConfigFile {
            crms_issue_date: Some("01-Jan-2020".into()),
            run_date: Some("22-Mar-2025".into()),
            floor_quarter: Some("Q1'25".into()),
            delimiter: Some(';'),
        };
        let s = merge(&args, file).unwrap();
        assert_eq!(s.crms_issue_date, "01-Jan-2020");
        assert_eq!(s.run_date, "31-Dec-2025");
        assert_eq!(s.floor_quarter, FloorQuarter::new(4, 2025).unwrap());
        assert_eq!(s.delimiter, b';');
    }

    #[test]
    fn test_missing_run_date_is_an_error() {
        let err = merge(&RunArgs::default(), RunConfigFile::default()).unwrap_err();
        assert!(err.to_string().contains("run_date"));
    }

    #[test]
    fn test_bad_floor_quarter_is_an_error() {
        let args = RunArgs {
            run_date: Some("22-Mar-2025".into()),
            floor_quarter: Some("third quarter".into()),
            ..Default::default()
        };
        assert!(merge(&args, RunConfigFile::default()).is_err());
    }

    #[test]
    fn test_config_file_yaml_and_unknown_keys() {
        let file: RunConfigFile =
            serde_yaml::from_str("run_date: 22-Mar-2025\nfloor_quarter: \"Q3'24\"\n").unwrap();
        assert_eq!(file.run_date.as_deref(), Some("22-Mar-2025"));

        let json: RunConfigFile =
            serde_yaml::from_str(r#"{"crms_issue_date": "31-Oct-2024", "delimiter": ";"}"#).unwrap();
        assert_eq!(json.delimiter, Some(';'));

        assert!(serde_yaml::from_str::<RunConfigFile>("rundate: 22-Mar-2025\n").is_err());
    }
}
