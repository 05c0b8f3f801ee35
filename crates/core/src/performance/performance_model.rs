//! Performance domain models: daily return records, compounding factors and
//! consolidated month/year periods.

use chrono::{Datelike, NaiveDate};
use num_traits::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::constants::{CONSOLIDATED_SCHEMA_VERSION, MIN_SUPPORTED_SCHEMA_VERSION};
use crate::errors::{CalculatorError, Error, Result, ValidationError};
use crate::utils::time_utils::{month_end, month_start, year_end, year_start};

// =============================================================================
// Currency
// =============================================================================

/// ISO-4217 style currency code, normalized to upper case at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    pub fn parse(code: &str) -> Result<Self> {
        let normalized = code.trim().to_ascii_uppercase();
        if normalized.len() != 3 || !normalized.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(Error::Validation(ValidationError::InvalidInput(format!(
                "Invalid currency code '{}'",
                code
            ))));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Currency {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Currency::parse(&value)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0
    }
}

impl FromStr for Currency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Currency::parse(s)
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Daily records
// =============================================================================

/// One day of an (account, currency) series, produced upstream.
///
/// `adjusted_change_percent` already excludes the day's cash flow:
/// `(end - start - cash_flow) / start * 100`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyReturnRecord {
    pub date: NaiveDate,
    pub currency: Currency,
    pub total_value: Decimal,
    pub total_investment: Decimal,
    pub cash_flow: Decimal,
    pub adjusted_change_percent: f64,
}

impl DailyReturnRecord {
    /// Rejects values that would poison a compounding factor.
    pub fn validate(&self) -> Result<()> {
        if !self.adjusted_change_percent.is_finite() {
            return Err(CalculatorError::NonFiniteInput {
                field: "adjustedChangePercent",
                value: self.adjusted_change_percent,
                date: Some(self.date),
            }
            .into());
        }
        if self.adjusted_change_percent < -100.0 {
            return Err(CalculatorError::ChangeBelowTotalLoss {
                change_percent: self.adjusted_change_percent,
            }
            .into());
        }
        if self.total_value.is_sign_negative() && !self.total_value.is_zero() {
            return Err(Error::Validation(ValidationError::InvalidInput(format!(
                "Negative total value {} on {} ({})",
                self.total_value, self.date, self.currency
            ))));
        }
        Ok(())
    }

    /// Value just before this day's return was applied, with the day's cash
    /// flow removed. `None` on a total-loss day, where it cannot be recovered.
    pub fn opening_value(&self) -> Option<Decimal> {
        let growth = 1.0 + self.adjusted_change_percent / 100.0;
        if growth <= 0.0 {
            return None;
        }
        let growth = Decimal::from_f64(growth)?;
        (self.total_value - self.cash_flow).checked_div(growth)
    }
}

// =============================================================================
// Compounding factor
// =============================================================================

/// Cumulative growth multiplier; `1.0` means no change since its base.
///
/// Always finite and non-negative. Zero only after a total wipeout, and a
/// wiped-out factor cannot be used as a period start.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct CompoundingFactor(f64);

impl CompoundingFactor {
    pub const ONE: CompoundingFactor = CompoundingFactor(1.0);

    pub fn new(value: f64) -> std::result::Result<Self, CalculatorError> {
        if !value.is_finite() {
            return Err(CalculatorError::NonFiniteFactor(value));
        }
        if value < 0.0 {
            return Err(CalculatorError::NonPositiveFactor(value));
        }
        Ok(Self(value))
    }

    pub fn value(self) -> f64 {
        self.0
    }

    pub fn is_wiped_out(self) -> bool {
        self.0 == 0.0
    }

    /// Cumulative return in percent relative to the factor's base.
    pub fn return_percent(self) -> f64 {
        (self.0 - 1.0) * 100.0
    }
}

impl TryFrom<f64> for CompoundingFactor {
    type Error = CalculatorError;

    fn try_from(value: f64) -> std::result::Result<Self, CalculatorError> {
        CompoundingFactor::new(value)
    }
}

impl From<CompoundingFactor> for f64 {
    fn from(factor: CompoundingFactor) -> Self {
        factor.0
    }
}

/// Factor immediately before a period's first return and after its last one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodBoundarySnapshot {
    pub factor_at_start: CompoundingFactor,
    pub factor_at_end: CompoundingFactor,
}

impl PeriodBoundarySnapshot {
    /// Growth over the period. Periods are chained through this ratio, never
    /// through raw factors, because each period has its own base.
    pub fn ratio(&self) -> std::result::Result<f64, CalculatorError> {
        let start = self.factor_at_start.value();
        if start <= 0.0 {
            return Err(CalculatorError::NonPositiveFactor(start));
        }
        let ratio = self.factor_at_end.value() / start;
        if !ratio.is_finite() {
            return Err(CalculatorError::NonFiniteFactor(ratio));
        }
        Ok(ratio)
    }

    pub fn return_percent(&self) -> std::result::Result<f64, CalculatorError> {
        Ok((self.ratio()? - 1.0) * 100.0)
    }
}

// =============================================================================
// Periods
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    Month,
    Year,
}

impl PeriodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodType::Month => "month",
            PeriodType::Year => "year",
        }
    }
}

impl fmt::Display for PeriodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `"2025-03"` for a month, `"2025"` for a year.
///
/// Ordering matches the lexicographic ordering of the string form within one
/// period type, which is what range queries in the period store rely on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PeriodKey {
    Year(i32),
    Month { year: i32, month: u32 },
}

impl PeriodKey {
    pub fn month_of(date: NaiveDate) -> Self {
        PeriodKey::Month {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year_of(date: NaiveDate) -> Self {
        PeriodKey::Year(date.year())
    }

    pub fn period_type(&self) -> PeriodType {
        match self {
            PeriodKey::Year(_) => PeriodType::Year,
            PeriodKey::Month { .. } => PeriodType::Month,
        }
    }

    pub fn year(&self) -> i32 {
        match self {
            PeriodKey::Year(year) | PeriodKey::Month { year, .. } => *year,
        }
    }

    /// First calendar day of the period.
    pub fn start_date(&self) -> Option<NaiveDate> {
        match self {
            PeriodKey::Year(year) => NaiveDate::from_ymd_opt(*year, 1, 1),
            PeriodKey::Month { year, month } => NaiveDate::from_ymd_opt(*year, *month, 1),
        }
    }

    /// Last calendar day of the period.
    pub fn end_date(&self) -> Option<NaiveDate> {
        let start = self.start_date()?;
        Some(match self {
            PeriodKey::Year(_) => year_end(start),
            PeriodKey::Month { .. } => month_end(start),
        })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        match self {
            PeriodKey::Year(year) => date.year() == *year,
            PeriodKey::Month { year, month } => date.year() == *year && date.month() == *month,
        }
    }

    /// Closed periods end strictly before `as_of`.
    pub fn is_closed(&self, as_of: NaiveDate) -> bool {
        self.end_date().map(|end| end < as_of).unwrap_or(false)
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeriodKey::Year(year) => write!(f, "{:04}", year),
            PeriodKey::Month { year, month } => write!(f, "{:04}-{:02}", year, month),
        }
    }
}

impl FromStr for PeriodKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::Validation(ValidationError::InvalidPeriodKey(s.to_string()));
        let key = match s.split_once('-') {
            None if s.len() == 4 => PeriodKey::Year(s.parse().map_err(|_| invalid())?),
            Some((year, month)) if year.len() == 4 && month.len() == 2 => PeriodKey::Month {
                year: year.parse().map_err(|_| invalid())?,
                month: month.parse().map_err(|_| invalid())?,
            },
            _ => return Err(invalid()),
        };
        if key.start_date().is_none() {
            return Err(invalid());
        }
        Ok(key)
    }
}

impl TryFrom<String> for PeriodKey {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<PeriodKey> for String {
    fn from(key: PeriodKey) -> Self {
        key.to_string()
    }
}

/// Per-currency summary of one consolidated period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrencyPeriodSummary {
    /// Always `1.0`: every period is re-based at its own start.
    pub factor_at_start: CompoundingFactor,
    pub factor_at_end: CompoundingFactor,
    pub period_return_percent: f64,
    pub start_total_value: Decimal,
    pub end_total_value: Decimal,
    pub start_total_investment: Decimal,
    pub end_total_investment: Decimal,
    pub total_cash_flow: Decimal,
    /// Value before the first day's return, used as Modified Dietz opening capital.
    #[serde(default)]
    pub opening_value: Decimal,
    pub money_weighted_return_percent: f64,
}

impl CurrencyPeriodSummary {
    pub fn boundary(&self) -> PeriodBoundarySnapshot {
        PeriodBoundarySnapshot {
            factor_at_start: self.factor_at_start,
            factor_at_end: self.factor_at_end,
        }
    }
}

/// Precomputed summary of one closed month or year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidatedPeriod {
    pub period_type: PeriodType,
    pub period_key: PeriodKey,
    /// First and last dates that carried data.
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub record_count: u32,
    pub schema_version: u32,
    pub per_currency: BTreeMap<Currency, CurrencyPeriodSummary>,
}

impl ConsolidatedPeriod {
    pub fn summary(&self, currency: &Currency) -> Option<&CurrencyPeriodSummary> {
        self.per_currency.get(currency)
    }

    /// First calendar day this record accounts for.
    pub fn covered_start(&self) -> NaiveDate {
        match self.period_type {
            PeriodType::Month => month_start(self.start_date),
            PeriodType::Year => year_start(self.start_date),
        }
    }

    /// Last calendar day this record accounts for. A partial year built from
    /// its closed months covers through the end of its last month.
    pub fn covered_through(&self) -> NaiveDate {
        month_end(self.end_date)
    }

    /// Readers reject layouts they do not understand instead of guessing.
    pub fn ensure_supported_schema(&self) -> Result<()> {
        if self.schema_version < MIN_SUPPORTED_SCHEMA_VERSION
            || self.schema_version > CONSOLIDATED_SCHEMA_VERSION
        {
            return Err(Error::Schema(format!(
                "{} {} has schema version {} (supported {}..={})",
                self.period_type,
                self.period_key,
                self.schema_version,
                MIN_SUPPORTED_SCHEMA_VERSION,
                CONSOLIDATED_SCHEMA_VERSION
            )));
        }
        if self.period_key.period_type() != self.period_type {
            return Err(Error::Schema(format!(
                "period key {} does not match period type {}",
                self.period_key, self.period_type
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Multi-account blending
// =============================================================================

/// One account's state on a single date, as seen by the blender.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDayValue {
    /// End-of-day value, after the day's change.
    pub current_value: Decimal,
    pub change_percent: f64,
    /// Value held before the day's change. Only consulted on a -100% day,
    /// where it cannot be derived from `current_value`.
    #[serde(default)]
    pub opening_value: Option<Decimal>,
}

/// Value-weighted blend of several accounts for one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiAccountDailyBlend {
    pub date: NaiveDate,
    pub blended_change_percent: f64,
    pub total_pre_change_value: Decimal,
}

/// One account's daily series, possibly in several currencies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSeries {
    pub account_id: String,
    pub records: Vec<DailyReturnRecord>,
}

// =============================================================================
// Window resolution
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Year,
    Month,
    Day,
}

/// A sub-range of a reporting window and the growth it contributed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowSegment {
    pub granularity: Granularity,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub factor_ratio: f64,
    /// Daily records chained for day segments, the period's count otherwise.
    pub record_count: u32,
}

/// Result of chaining a reporting window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowResolution {
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    pub factor: CompoundingFactor,
    pub return_percent: f64,
    /// False when nothing at all covered the window. A zero return with data
    /// is a different answer.
    pub has_sufficient_data: bool,
    pub segments: Vec<WindowSegment>,
}

impl WindowResolution {
    pub fn return_if_sufficient(&self) -> Option<f64> {
        self.has_sufficient_data.then_some(self.return_percent)
    }
}
