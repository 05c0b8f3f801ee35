use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::{Error, Result, ValidationError};
use crate::utils::time_utils::year_start;

/// Reporting windows offered to the reporting layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportingPeriod {
    OneMonth,
    ThreeMonths,
    SixMonths,
    Ytd,
    OneYear,
    TwoYears,
    ThreeYears,
    FiveYears,
    All,
    Custom { start: NaiveDate, end: NaiveDate },
}

impl ReportingPeriod {
    /// Presets checked by the validation harness.
    pub const PRESETS: [ReportingPeriod; 9] = [
        ReportingPeriod::OneMonth,
        ReportingPeriod::ThreeMonths,
        ReportingPeriod::SixMonths,
        ReportingPeriod::Ytd,
        ReportingPeriod::OneYear,
        ReportingPeriod::TwoYears,
        ReportingPeriod::ThreeYears,
        ReportingPeriod::FiveYears,
        ReportingPeriod::All,
    ];

    pub fn label(&self) -> String {
        match self {
            ReportingPeriod::OneMonth => "1M".to_string(),
            ReportingPeriod::ThreeMonths => "3M".to_string(),
            ReportingPeriod::SixMonths => "6M".to_string(),
            ReportingPeriod::Ytd => "YTD".to_string(),
            ReportingPeriod::OneYear => "1Y".to_string(),
            ReportingPeriod::TwoYears => "2Y".to_string(),
            ReportingPeriod::ThreeYears => "3Y".to_string(),
            ReportingPeriod::FiveYears => "5Y".to_string(),
            ReportingPeriod::All => "ALL".to_string(),
            ReportingPeriod::Custom { start, end } => format!("{}..{}", start, end),
        }
    }

    fn trailing_months(&self) -> Option<u32> {
        match self {
            ReportingPeriod::OneMonth => Some(1),
            ReportingPeriod::ThreeMonths => Some(3),
            ReportingPeriod::SixMonths => Some(6),
            ReportingPeriod::OneYear => Some(12),
            ReportingPeriod::TwoYears => Some(24),
            ReportingPeriod::ThreeYears => Some(36),
            ReportingPeriod::FiveYears => Some(60),
            _ => None,
        }
    }

    /// Inclusive range of days whose returns are chained for this window.
    ///
    /// Trailing windows start the day after `as_of` minus the span, so the
    /// base is the close of that day. `All` starts at `inception`, or at
    /// `as_of` when the series has no data yet.
    pub fn window(&self, as_of: NaiveDate, inception: Option<NaiveDate>) -> Result<(NaiveDate, NaiveDate)> {
        let start = match self {
            ReportingPeriod::Custom { start, end } => {
                if start > end {
                    return Err(Error::Validation(ValidationError::InvalidInput(format!(
                        "Custom window start {} is after end {}",
                        start, end
                    ))));
                }
                return Ok((*start, *end));
            }
            ReportingPeriod::Ytd => year_start(as_of),
            ReportingPeriod::All => inception.unwrap_or(as_of).min(as_of),
            trailing => {
                let months = trailing.trailing_months().unwrap_or(0);
                as_of
                    .checked_sub_months(Months::new(months))
                    .and_then(|base| base.succ_opt())
                    .ok_or_else(|| {
                        Error::Validation(ValidationError::InvalidInput(format!(
                            "Window {} is out of range for {}",
                            trailing.label(),
                            as_of
                        )))
                    })?
            }
        };
        Ok((start, as_of))
    }
}

impl fmt::Display for ReportingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl FromStr for ReportingPeriod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let period = match s.trim().to_ascii_uppercase().as_str() {
            "1M" => ReportingPeriod::OneMonth,
            "3M" => ReportingPeriod::ThreeMonths,
            "6M" => ReportingPeriod::SixMonths,
            "YTD" => ReportingPeriod::Ytd,
            "1Y" => ReportingPeriod::OneYear,
            "2Y" => ReportingPeriod::TwoYears,
            "3Y" => ReportingPeriod::ThreeYears,
            "5Y" => ReportingPeriod::FiveYears,
            "ALL" | "MAX" => ReportingPeriod::All,
            other => {
                let Some((start, end)) = other.split_once("..") else {
                    return Err(Error::Validation(ValidationError::InvalidInput(format!(
                        "Unknown reporting period '{}'",
                        s
                    ))));
                };
                ReportingPeriod::Custom {
                    start: start.parse()?,
                    end: end.parse()?,
                }
            }
        };
        Ok(period)
    }
}
