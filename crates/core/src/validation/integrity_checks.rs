//! Consistency and coverage checks over stored consolidated records.
//!
//! Every finding is returned as an [`IntegrityIssue`]; historical data can be
//! legitimately imperfect, so nothing here fails the caller.

use chrono::NaiveDate;
use log::warn;
use std::collections::BTreeSet;

use crate::constants::{CONSOLIDATED_SCHEMA_VERSION, MIN_SUPPORTED_SCHEMA_VERSION};
use crate::performance::{consolidate, ConsolidatedPeriod, DailyReturnRecord, PeriodKey, PeriodType};
use crate::utils::time_utils::{months_between, next_month_start};

use super::validation_model::{IntegrityCategory, IntegrityIssue, Severity};

fn relative_difference(actual: f64, expected: f64) -> f64 {
    let scale = expected.abs();
    if scale > f64::EPSILON {
        (actual - expected).abs() / scale
    } else {
        (actual - expected).abs()
    }
}

/// Compares a year record's growth with the product of its months' ratios.
pub fn check_year_against_months(
    year: &ConsolidatedPeriod,
    months: &[ConsolidatedPeriod],
    relative_tolerance: f64,
) -> Vec<IntegrityIssue> {
    let mut issues = Vec::new();
    let year_months: Vec<&ConsolidatedPeriod> = months
        .iter()
        .filter(|m| m.period_type == PeriodType::Month && m.period_key.year() == year.period_key.year())
        .collect();

    for (currency, summary) in &year.per_currency {
        let ratios: Vec<f64> = year_months
            .iter()
            .filter_map(|m| m.summary(currency))
            .filter_map(|s| s.boundary().ratio().ok())
            .collect();

        if ratios.is_empty() {
            issues.push(
                IntegrityIssue::builder(
                    IntegrityCategory::CoverageGap,
                    format!("year_without_months:{}:{}", year.period_key, currency),
                )
                .message(format!(
                    "Year {} has {} but no month records to back it",
                    year.period_key, currency
                ))
                .period_key(year.period_key)
                .currency(currency)
                .build(),
            );
            continue;
        }

        let chained: f64 = ratios.iter().product();
        let year_ratio = match summary.boundary().ratio() {
            Ok(ratio) => ratio,
            Err(e) => {
                issues.push(
                    IntegrityIssue::builder(
                        IntegrityCategory::Inconsistency,
                        format!("year_factor:{}:{}", year.period_key, currency),
                    )
                    .severity(Severity::Error)
                    .message(format!("Year {} has an unusable factor: {}", year.period_key, e))
                    .period_key(year.period_key)
                    .currency(currency)
                    .build(),
                );
                continue;
            }
        };

        let difference = relative_difference(year_ratio, chained);
        if difference > relative_tolerance {
            warn!(
                "Year {} {} factor {} differs from its months' product {} ({:.2e})",
                year.period_key, currency, year_ratio, chained, difference
            );
            issues.push(
                IntegrityIssue::builder(
                    IntegrityCategory::Inconsistency,
                    format!("year_vs_months:{}:{}", year.period_key, currency),
                )
                .message(format!(
                    "Year {} factor {:.8} does not match the product of its months {:.8}",
                    year.period_key, year_ratio, chained
                ))
                .period_key(year.period_key)
                .currency(currency)
                .difference(difference)
                .build(),
            );
        }
    }
    issues
}

/// Re-chains a month's daily records and compares them with the stored record.
pub fn check_month_against_daily(
    month: &ConsolidatedPeriod,
    daily_records: &[DailyReturnRecord],
    relative_tolerance: f64,
) -> Vec<IntegrityIssue> {
    let key = month.period_key;
    let records: Vec<DailyReturnRecord> = daily_records
        .iter()
        .filter(|r| key.contains(r.date))
        .cloned()
        .collect();

    let inconsistency = |id: String| IntegrityIssue::builder(IntegrityCategory::Inconsistency, id).period_key(key);

    let recomputed = match consolidate(&records, key) {
        Ok(Some(period)) => period,
        Ok(None) => {
            return vec![inconsistency(format!("month_without_daily:{}", key))
                .message(format!("Month {} is stored but has no daily records", key))
                .build()];
        }
        Err(e) => {
            return vec![inconsistency(format!("month_daily_invalid:{}", key))
                .severity(Severity::Error)
                .message(format!("Daily records of {} cannot be consolidated: {}", key, e))
                .build()];
        }
    };

    let mut issues = Vec::new();
    for (currency, stored) in &month.per_currency {
        let Some(fresh) = recomputed.summary(currency) else {
            issues.push(
                inconsistency(format!("month_currency_removed:{}:{}", key, currency))
                    .currency(currency)
                    .message(format!("Month {} stores {} but its daily records no longer do", key, currency))
                    .build(),
            );
            continue;
        };
        let (Ok(stored_ratio), Ok(fresh_ratio)) = (stored.boundary().ratio(), fresh.boundary().ratio()) else {
            issues.push(
                inconsistency(format!("month_factor:{}:{}", key, currency))
                    .severity(Severity::Error)
                    .currency(currency)
                    .message(format!("Month {} {} has an unusable factor", key, currency))
                    .build(),
            );
            continue;
        };
        let difference = relative_difference(stored_ratio, fresh_ratio);
        if difference > relative_tolerance {
            warn!(
                "Month {} {} stored factor {} differs from daily records {}",
                key, currency, stored_ratio, fresh_ratio
            );
            issues.push(
                inconsistency(format!("month_vs_daily:{}:{}", key, currency))
                    .currency(currency)
                    .difference(difference)
                    .message(format!(
                        "Month {} factor {:.8} does not match its daily records {:.8}",
                        key, stored_ratio, fresh_ratio
                    ))
                    .build(),
            );
        }
    }

    for currency in recomputed.per_currency.keys() {
        if month.summary(currency).is_none() {
            issues.push(
                inconsistency(format!("month_currency_missing:{}:{}", key, currency))
                    .currency(currency)
                    .message(format!("Month {} is missing {} present in its daily records", key, currency))
                    .build(),
            );
        }
    }
    issues
}

/// Finds closed months or years that should exist but do not, and calendar
/// holes between stored months.
///
/// A missing closed month with daily data is a warning to re-run
/// consolidation; a hole with no daily data at all is informational.
pub fn find_coverage_gaps(
    yearly_periods: &[ConsolidatedPeriod],
    monthly_periods: &[ConsolidatedPeriod],
    daily_records: &[DailyReturnRecord],
    as_of: NaiveDate,
) -> Vec<IntegrityIssue> {
    let expected: BTreeSet<PeriodKey> = daily_records
        .iter()
        .map(|r| PeriodKey::month_of(r.date))
        .filter(|k| k.is_closed(as_of))
        .collect();
    let present: BTreeSet<PeriodKey> = monthly_periods.iter().map(|m| m.period_key).collect();
    let years: BTreeSet<i32> = yearly_periods.iter().map(|y| y.period_key.year()).collect();

    let mut issues = Vec::new();
    for key in expected.difference(&present) {
        warn!("Closed month {} has daily records but no consolidated record", key);
        issues.push(
            IntegrityIssue::builder(IntegrityCategory::CoverageGap, format!("missing_month:{}", key))
                .message(format!(
                    "Closed month {} has daily records but was never consolidated",
                    key
                ))
                .period_key(key)
                .build(),
        );
    }

    let ordered: Vec<&PeriodKey> = present.iter().collect();
    for pair in ordered.windows(2) {
        let (Some(previous), Some(next)) = (pair[0].start_date(), pair[1].start_date()) else {
            continue;
        };
        let Some(before_next) = next.pred_opt() else {
            continue;
        };
        for hole in months_between(next_month_start(previous), before_next) {
            let key = PeriodKey::month_of(hole);
            if expected.contains(&key) {
                continue;
            }
            issues.push(
                IntegrityIssue::builder(IntegrityCategory::CoverageGap, format!("calendar_gap:{}", key))
                    .severity(Severity::Info)
                    .message(format!(
                        "No record for {} between {} and {}, and no daily data",
                        key, pair[0], pair[1]
                    ))
                    .period_key(key)
                    .build(),
            );
        }
    }

    let month_years: BTreeSet<i32> = present.iter().map(|k| k.year()).collect();
    for year in month_years.difference(&years) {
        warn!("Year {} has consolidated months but no year record", year);
        issues.push(
            IntegrityIssue::builder(IntegrityCategory::CoverageGap, format!("missing_year:{}", year))
                .message(format!("Year {} has month records but no year record", year))
                .period_key(PeriodKey::Year(*year))
                .build(),
        );
    }
    issues
}

/// Flags records written with an older layout or one this build cannot read.
pub fn check_schema_versions(periods: &[ConsolidatedPeriod]) -> Vec<IntegrityIssue> {
    periods
        .iter()
        .filter(|p| p.schema_version != CONSOLIDATED_SCHEMA_VERSION)
        .map(|p| {
            let id = format!("schema:{}:{}", p.period_type, p.period_key);
            let builder = IntegrityIssue::builder(IntegrityCategory::SchemaVersion, id).period_key(p.period_key);
            let builder = if p.schema_version < MIN_SUPPORTED_SCHEMA_VERSION
                || p.schema_version > CONSOLIDATED_SCHEMA_VERSION
            {
                builder.severity(Severity::Error).message(format!(
                    "{} {} has unsupported schema version {}",
                    p.period_type, p.period_key, p.schema_version
                ))
            } else {
                builder.severity(Severity::Info).message(format!(
                    "{} {} uses schema version {}; re-consolidate to upgrade to {}",
                    p.period_type, p.period_key, p.schema_version, CONSOLIDATED_SCHEMA_VERSION
                ))
            };
            builder.build()
        })
        .collect()
}
