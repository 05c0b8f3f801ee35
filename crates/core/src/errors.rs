//! Core error types for the performance engine.
//!
//! Absent data is never an error here: consolidation returns `None` and window
//! resolution reports `has_sufficient_data == false`. Errors are reserved for
//! malformed input and failures of the external collaborators.

use chrono::{NaiveDate, ParseError as ChronoParseError};
use thiserror::Error;

/// Type alias for Result using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Root error type for the performance engine.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Performance calculation failed: {0}")]
    Calculation(#[from] CalculatorError),

    #[error("Input validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Unsupported consolidated record: {0}")]
    Schema(String),
}

/// Errors raised by the pure calculation functions when their input would
/// poison a compounding factor.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalculatorError {
    #[error("Non-finite {field} ({value}) on {date:?}")]
    NonFiniteInput {
        field: &'static str,
        value: f64,
        date: Option<NaiveDate>,
    },

    #[error("Daily change {change_percent}% is worse than a total loss")]
    ChangeBelowTotalLoss { change_percent: f64 },

    #[error("A -100% day on {date:?} cannot be weighted without the value held before it")]
    WipeoutWithoutOpeningValue { date: Option<NaiveDate> },

    #[error("Cannot apply a daily change of {change_percent}% after a total wipeout")]
    ChainAfterWipeout { change_percent: f64 },

    #[error("Compounding factor became non-finite ({0})")]
    NonFiniteFactor(f64),

    #[error("Compounding factor must be positive, got {0}")]
    NonPositiveFactor(f64),

    #[error("Records for currency {currency} are not strictly ascending at {date}")]
    UnorderedRecords { currency: String, date: NaiveDate },

    #[error("Record dated {date} does not belong to period {period_key}")]
    MixedPeriod { period_key: String, date: NaiveDate },

    #[error("Expected {expected} periods, got {actual} period {period_key}")]
    PeriodTypeMismatch {
        expected: &'static str,
        actual: &'static str,
        period_key: String,
    },

    #[error("Calculation failed: {0}")]
    Calculation(String),
}

/// Validation errors for boundary input and parsing.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid period key '{0}'")]
    InvalidPeriodKey(String),

    #[error("Failed to parse date/time: {0}")]
    DateTimeParse(#[from] ChronoParseError),
}

impl From<ChronoParseError> for Error {
    fn from(err: ChronoParseError) -> Self {
        Error::Validation(ValidationError::DateTimeParse(err))
    }
}
