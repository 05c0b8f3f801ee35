//! Validation harness models: tolerances, per-check summaries and integrity
//! findings.

use chrono::NaiveDate;
use num_traits::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::constants::{
    DECIMAL_PRECISION, DEFAULT_CHART_TOLERANCE_MULTIPLIER, DEFAULT_EQUIVALENCE_RELATIVE_TOLERANCE,
    DEFAULT_MWR_TOLERANCE_MULTIPLIER, DEFAULT_TWR_TOLERANCE_PP,
};
use crate::performance::{Currency, OwnerFailure, PerformanceScope};

// =============================================================================
// Configuration
// =============================================================================

/// Tolerances for comparing the hierarchical and the naive computation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidationConfig {
    /// Percentage points allowed between hierarchical and naive TWR.
    pub twr_tolerance_pp: f64,
    pub mwr_tolerance_multiplier: f64,
    pub chart_tolerance_multiplier: f64,
    /// Relative tolerance for factor equivalence checks.
    pub equivalence_relative_tolerance: f64,
    /// Money-weighted differences only warn unless this is set.
    pub mwr_is_blocking: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            twr_tolerance_pp: DEFAULT_TWR_TOLERANCE_PP,
            mwr_tolerance_multiplier: DEFAULT_MWR_TOLERANCE_MULTIPLIER,
            chart_tolerance_multiplier: DEFAULT_CHART_TOLERANCE_MULTIPLIER,
            equivalence_relative_tolerance: DEFAULT_EQUIVALENCE_RELATIVE_TOLERANCE,
            mwr_is_blocking: false,
        }
    }
}

impl ValidationConfig {
    pub fn mwr_tolerance_pp(&self) -> f64 {
        self.twr_tolerance_pp * self.mwr_tolerance_multiplier
    }

    pub fn chart_tolerance_pp(&self) -> f64 {
        self.twr_tolerance_pp * self.chart_tolerance_multiplier
    }
}

// =============================================================================
// Severity
// =============================================================================

/// Ordered from lowest to highest: Info < Warning < Error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Integrity issues
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntegrityCategory {
    /// Two independently derived numbers disagree.
    Inconsistency,
    /// A closed period is missing or the calendar has a hole.
    CoverageGap,
    /// A stored record uses an old or unknown layout.
    SchemaVersion,
}

impl IntegrityCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrityCategory::Inconsistency => "INCONSISTENCY",
            IntegrityCategory::CoverageGap => "COVERAGE_GAP",
            IntegrityCategory::SchemaVersion => "SCHEMA_VERSION",
        }
    }
}

impl std::fmt::Display for IntegrityCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A finding for operational follow-up. Never an error by itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityIssue {
    /// Stable id, e.g. `"year_vs_months:2024:USD"`.
    pub id: String,
    pub severity: Severity,
    pub category: IntegrityCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<Currency>,
    /// Relative difference for inconsistencies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difference: Option<f64>,
}

impl IntegrityIssue {
    pub fn builder(category: IntegrityCategory, id: impl Into<String>) -> IntegrityIssueBuilder {
        IntegrityIssueBuilder {
            id: id.into(),
            category,
            severity: Severity::Warning,
            message: String::new(),
            period_key: None,
            currency: None,
            difference: None,
        }
    }
}

#[derive(Debug)]
pub struct IntegrityIssueBuilder {
    id: String,
    category: IntegrityCategory,
    severity: Severity,
    message: String,
    period_key: Option<String>,
    currency: Option<Currency>,
    difference: Option<f64>,
}

impl IntegrityIssueBuilder {
    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn period_key(mut self, key: impl ToString) -> Self {
        self.period_key = Some(key.to_string());
        self
    }

    pub fn currency(mut self, currency: &Currency) -> Self {
        self.currency = Some(currency.clone());
        self
    }

    pub fn difference(mut self, difference: f64) -> Self {
        self.difference = Some(difference);
        self
    }

    pub fn build(self) -> IntegrityIssue {
        IntegrityIssue {
            id: self.id,
            severity: self.severity,
            category: self.category,
            message: self.message,
            period_key: self.period_key,
            currency: self.currency,
            difference: self.difference,
        }
    }
}

// =============================================================================
// Check summaries
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckKind {
    Twr,
    Mwr,
    Chart,
}

/// Rounds a percentage for reporting; comparisons use the unrounded value.
pub fn round_percent(value: f64) -> f64 {
    Decimal::from_f64(value)
        .map(|d| d.round_dp(DECIMAL_PRECISION))
        .and_then(|d| d.to_f64())
        .unwrap_or(value)
}

/// One comparison that exceeded its tolerance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckDifference {
    /// What was compared, e.g. `"YTD"` or `"2024"` or `"2025-03-31"`.
    pub label: String,
    pub hierarchical_percent: f64,
    pub naive_percent: f64,
    pub diff_pp: f64,
}

/// Outcome of one check family for one currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckSummary {
    pub kind: CheckKind,
    pub tolerance_pp: f64,
    /// A blocking check fails the report when any comparison exceeds tolerance.
    pub blocking: bool,
    pub comparisons: usize,
    pub max_abs_diff_pp: f64,
    pub exceeded: Vec<CheckDifference>,
}

impl CheckSummary {
    pub fn new(kind: CheckKind, tolerance_pp: f64, blocking: bool) -> Self {
        Self {
            kind,
            tolerance_pp,
            blocking,
            comparisons: 0,
            max_abs_diff_pp: 0.0,
            exceeded: Vec::new(),
        }
    }

    /// Records one comparison and returns whether it stayed within tolerance.
    pub fn record(&mut self, label: impl Into<String>, hierarchical_percent: f64, naive_percent: f64) -> bool {
        let diff = (hierarchical_percent - naive_percent).abs();
        self.comparisons += 1;
        if diff > self.max_abs_diff_pp || diff.is_nan() {
            self.max_abs_diff_pp = diff;
        }
        // NaN never compares within tolerance.
        let within = diff <= self.tolerance_pp;
        if !within {
            self.exceeded.push(CheckDifference {
                label: label.into(),
                hierarchical_percent: round_percent(hierarchical_percent),
                naive_percent: round_percent(naive_percent),
                diff_pp: round_percent(diff),
            });
        }
        within
    }

    pub fn passed(&self) -> bool {
        self.exceeded.is_empty()
    }

    /// False only when a blocking comparison exceeded tolerance.
    pub fn is_acceptable(&self) -> bool {
        !self.blocking || self.passed()
    }
}

// =============================================================================
// Reports
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrencyValidation {
    pub currency: Currency,
    pub twr: CheckSummary,
    pub mwr: CheckSummary,
    pub chart: CheckSummary,
}

impl CurrencyValidation {
    pub fn passed(&self) -> bool {
        self.twr.is_acceptable() && self.mwr.is_acceptable() && self.chart.is_acceptable()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeValidationReport {
    pub scope: PerformanceScope,
    pub as_of: NaiveDate,
    pub currencies: Vec<CurrencyValidation>,
    pub issues: Vec<IntegrityIssue>,
    pub passed: bool,
}

impl ScopeValidationReport {
    pub fn max_severity(&self) -> Option<Severity> {
        self.issues.iter().map(|i| i.severity).max()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerValidationReport {
    pub owner_id: String,
    pub as_of: NaiveDate,
    pub scopes: Vec<ScopeValidationReport>,
    pub passed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchValidationReport {
    pub reports: Vec<OwnerValidationReport>,
    pub failures: Vec<OwnerFailure>,
}

impl BatchValidationReport {
    pub fn passed(&self) -> bool {
        self.failures.is_empty() && self.reports.iter().all(|r| r.passed)
    }

    pub fn issue_count(&self) -> usize {
        self.reports
            .iter()
            .flat_map(|r| r.scopes.iter())
            .map(|s| s.issues.len())
            .sum()
    }
}
