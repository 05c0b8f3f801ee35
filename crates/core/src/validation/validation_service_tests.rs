//! Tests for the validation harness.

use super::*;
use crate::errors::{Error, Result};
use crate::performance::{
    consolidate_closed_periods, AccountSeries, CompoundingFactor, ConsolidatedPeriod,
    ConsolidatedPeriodRepositoryTrait, ConsolidationService, ConsolidationServiceTrait, Currency,
    DailyReturnRecord, DailyReturnRepositoryTrait, PerformanceScope, PeriodKey, PeriodType,
    ReportingPeriod,
};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use num_traits::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, RwLock};

// ============================================================================
// Fixtures
// ============================================================================

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn usd() -> Currency {
    Currency::parse("USD").unwrap()
}

fn as_of() -> NaiveDate {
    d(2025, 10, 19)
}

/// Daily series with a deposit on the 3rd of roughly every third month.
fn daily_series(start: NaiveDate, end: NaiveDate, seed: u32) -> Vec<DailyReturnRecord> {
    let mut records = Vec::new();
    let mut value = dec!(20000);
    let mut date = start;
    let mut i = seed;
    while date <= end {
        let pct = f64::from((i * 5) % 13) * 0.25 - 1.5;
        let flow = if date.day() == 3 && i % 3 == 0 {
            dec!(2500)
        } else {
            Decimal::ZERO
        };
        let growth = Decimal::from_f64(1.0 + pct / 100.0).unwrap();
        value = (value * growth).round_dp(2) + flow;
        records.push(DailyReturnRecord {
            date,
            currency: usd(),
            total_value: value,
            total_investment: dec!(20000),
            cash_flow: flow,
            adjusted_change_percent: pct,
        });
        date = date.succ_opt().unwrap();
        i += 1;
    }
    records
}

struct Series {
    daily: Vec<DailyReturnRecord>,
    years: Vec<ConsolidatedPeriod>,
    months: Vec<ConsolidatedPeriod>,
}

fn consolidated_series() -> Series {
    let daily = daily_series(d(2022, 8, 8), as_of(), 0);
    let closed = consolidate_closed_periods(&daily, as_of()).unwrap();
    Series {
        daily,
        years: closed.years,
        months: closed.months,
    }
}

fn validate(series: &Series, config: &ValidationConfig) -> ScopeValidationReport {
    validate_series(
        PerformanceScope::Aggregate,
        &series.daily,
        &series.years,
        &series.months,
        as_of(),
        config,
    )
    .unwrap()
}

// ============================================================================
// validate_series
// ============================================================================

#[test]
fn freshly_consolidated_series_passes_every_check() {
    let series = consolidated_series();
    let report = validate(&series, &ValidationConfig::default());

    assert!(report.passed);
    assert!(report.issues.is_empty(), "{:?}", report.issues);
    assert_eq!(report.currencies.len(), 1);

    let usd_report = &report.currencies[0];
    assert_eq!(usd_report.twr.comparisons, ReportingPeriod::PRESETS.len());
    assert!(usd_report.twr.max_abs_diff_pp < 1e-6);
    assert_eq!(usd_report.mwr.comparisons, 4);
    assert_eq!(usd_report.chart.comparisons, series.months.len());
    assert!(usd_report.chart.max_abs_diff_pp < 1e-6);
}

#[test]
fn money_weighted_divergence_is_non_blocking_by_default() {
    let series = consolidated_series();
    let strict = ValidationConfig {
        twr_tolerance_pp: 1e-6,
        mwr_tolerance_multiplier: 1.0,
        ..ValidationConfig::default()
    };

    let report = validate(&series, &strict);
    let mwr = &report.currencies[0].mwr;
    // Midpoint placement of monthly flows cannot match daily flow dates exactly.
    assert!(!mwr.passed());
    assert!(!mwr.blocking);
    assert!(report.passed);

    let blocking = ValidationConfig {
        mwr_is_blocking: true,
        ..strict
    };
    assert!(!validate(&series, &blocking).passed);
}

#[test]
fn tampered_month_fails_the_twr_check() {
    let mut series = consolidated_series();
    let november = series
        .months
        .iter_mut()
        .find(|m| m.period_key == PeriodKey::Month { year: 2024, month: 11 })
        .unwrap();
    let summary = november.per_currency.get_mut(&usd()).unwrap();
    summary.factor_at_end = CompoundingFactor::new(summary.factor_at_end.value() * 1.02).unwrap();

    let report = validate(&series, &ValidationConfig::default());
    assert!(!report.passed);

    let twr = &report.currencies[0].twr;
    assert!(twr.exceeded.iter().any(|e| e.label == "1Y"));
    assert!(twr.max_abs_diff_pp > 1.0);

    let ids: Vec<&str> = report.issues.iter().map(|i| i.id.as_str()).collect();
    assert!(ids.contains(&"year_vs_months:2024:USD"));
    assert!(ids.contains(&"month_vs_daily:2024-11:USD"));
    assert_eq!(report.max_severity(), Some(Severity::Warning));
}

#[test]
fn missing_month_is_a_coverage_gap_but_windows_still_agree() {
    let mut series = consolidated_series();
    series
        .months
        .retain(|m| m.period_key != PeriodKey::Month { year: 2025, month: 8 });
    series.years.retain(|y| y.period_key != PeriodKey::Year(2025));

    let report = validate(&series, &ValidationConfig::default());
    let gaps: Vec<&IntegrityIssue> = report
        .issues
        .iter()
        .filter(|i| i.category == IntegrityCategory::CoverageGap)
        .collect();
    assert_eq!(gaps.len(), 2);
    assert!(gaps.iter().any(|i| i.id == "missing_month:2025-08"));
    assert!(gaps.iter().any(|i| i.id == "missing_year:2025"));

    // Windows fall back to daily records for August.
    assert!(report.currencies[0].twr.passed());
    // The month-end chart skips August and drifts.
    assert!(!report.currencies[0].chart.passed());
    assert!(!report.passed);
}

#[test]
fn unsupported_records_are_reported_and_ignored() {
    let mut series = consolidated_series();
    for month in series.months.iter_mut().filter(|m| m.period_key.year() == 2023) {
        month.schema_version = 99;
    }

    let report = validate(&series, &ValidationConfig::default());
    let schema_errors = report
        .issues
        .iter()
        .filter(|i| i.category == IntegrityCategory::SchemaVersion && i.severity == Severity::Error)
        .count();
    assert_eq!(schema_errors, 12);
    assert!(report.currencies[0].twr.passed());
}

#[test]
fn malformed_daily_input_is_an_error() {
    let mut series = consolidated_series();
    series.daily[40].adjusted_change_percent = f64::INFINITY;
    let result = validate_series(
        PerformanceScope::Aggregate,
        &series.daily,
        &series.years,
        &series.months,
        as_of(),
        &ValidationConfig::default(),
    );
    assert!(matches!(result, Err(Error::Calculation(_))));
}

#[test]
fn empty_scope_passes_with_nothing_to_compare() {
    let report = validate_series(
        PerformanceScope::Account("empty".to_string()),
        &[],
        &[],
        &[],
        as_of(),
        &ValidationConfig::default(),
    )
    .unwrap();
    assert!(report.passed);
    assert!(report.currencies.is_empty());
    assert!(report.issues.is_empty());
}

// ============================================================================
// ValidationService
// ============================================================================

#[derive(Default)]
struct MockStore {
    owners: BTreeMap<String, Vec<AccountSeries>>,
    failing: HashSet<String>,
    periods: RwLock<BTreeMap<(String, PerformanceScope, PeriodKey), ConsolidatedPeriod>>,
}

#[async_trait]
impl DailyReturnRepositoryTrait for MockStore {
    async fn list_owners(&self) -> Result<Vec<String>> {
        Ok(self.owners.keys().cloned().collect())
    }

    async fn list_accounts(&self, owner_id: &str) -> Result<Vec<String>> {
        if self.failing.contains(owner_id) {
            return Err(Error::Repository("connection reset".to_string()));
        }
        Ok(self
            .owners
            .get(owner_id)
            .map(|a| a.iter().map(|s| s.account_id.clone()).collect())
            .unwrap_or_default())
    }

    async fn get_daily_records(
        &self,
        owner_id: &str,
        account_id: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<DailyReturnRecord>> {
        Ok(self
            .owners
            .get(owner_id)
            .and_then(|a| a.iter().find(|s| s.account_id == account_id))
            .map(|s| {
                s.records
                    .iter()
                    .filter(|r| start_date.map_or(true, |x| r.date >= x))
                    .filter(|r| end_date.map_or(true, |x| r.date <= x))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl ConsolidatedPeriodRepositoryTrait for MockStore {
    async fn get_period(
        &self,
        owner_id: &str,
        scope: &PerformanceScope,
        period_key: &PeriodKey,
    ) -> Result<Option<ConsolidatedPeriod>> {
        Ok(self
            .periods
            .read()
            .unwrap()
            .get(&(owner_id.to_string(), scope.clone(), *period_key))
            .cloned())
    }

    async fn get_periods(
        &self,
        owner_id: &str,
        scope: &PerformanceScope,
        period_type: PeriodType,
        from_key: &PeriodKey,
        to_key: &PeriodKey,
    ) -> Result<Vec<ConsolidatedPeriod>> {
        Ok(self
            .periods
            .read()
            .unwrap()
            .iter()
            .filter(|((o, s, k), _)| {
                o == owner_id && s == scope && k.period_type() == period_type && k >= from_key && k <= to_key
            })
            .map(|(_, p)| p.clone())
            .collect())
    }

    async fn save_period(
        &self,
        owner_id: &str,
        scope: &PerformanceScope,
        period: &ConsolidatedPeriod,
    ) -> Result<()> {
        self.periods
            .write()
            .unwrap()
            .insert((owner_id.to_string(), scope.clone(), period.period_key), period.clone());
        Ok(())
    }
}

fn services(store: MockStore) -> (Arc<ConsolidationService>, ValidationService) {
    let store = Arc::new(store);
    let consolidation = Arc::new(ConsolidationService::new(store.clone(), store.clone()));
    let validation = ValidationService::new(
        store.clone(),
        store,
        consolidation.clone(),
        ValidationConfig::default(),
    );
    (consolidation, validation)
}

#[tokio::test]
async fn validates_every_scope_of_every_owner() {
    let mut store = MockStore::default();
    store.owners.insert(
        "alice".to_string(),
        vec![
            AccountSeries {
                account_id: "taxable".to_string(),
                records: daily_series(d(2023, 2, 1), as_of(), 0),
            },
            AccountSeries {
                account_id: "roth".to_string(),
                records: daily_series(d(2024, 7, 15), as_of(), 7),
            },
        ],
    );
    store.owners.insert(
        "bob".to_string(),
        vec![AccountSeries {
            account_id: "joint".to_string(),
            records: daily_series(d(2025, 1, 2), as_of(), 3),
        }],
    );
    store.failing.insert("mallory".to_string());

    let (consolidation, validation) = services(store);
    let owners = vec!["alice".to_string(), "bob".to_string(), "mallory".to_string()];
    let consolidated = consolidation.consolidate_owners(&owners, as_of()).await;
    assert_eq!(consolidated.failures.len(), 1);

    let batch = validation.validate_owners(&owners, as_of()).await;
    assert_eq!(batch.reports.len(), 2);
    assert_eq!(batch.failures.len(), 1);
    assert_eq!(batch.failures[0].owner_id, "mallory");
    assert!(!batch.passed());
    assert!(batch.reports.iter().all(|r| r.passed));

    let alice = batch.reports.iter().find(|r| r.owner_id == "alice").unwrap();
    let scopes: Vec<&PerformanceScope> = alice.scopes.iter().map(|s| &s.scope).collect();
    assert_eq!(
        scopes,
        vec![
            &PerformanceScope::Account("taxable".to_string()),
            &PerformanceScope::Account("roth".to_string()),
            &PerformanceScope::Aggregate
        ]
    );
    assert_eq!(batch.issue_count(), 0);
}

#[tokio::test]
async fn unconsolidated_owner_reports_missing_months() {
    let mut store = MockStore::default();
    store.owners.insert(
        "erin".to_string(),
        vec![AccountSeries {
            account_id: "solo".to_string(),
            records: daily_series(d(2025, 6, 2), as_of(), 1),
        }],
    );
    let (_, validation) = services(store);

    let report = validation.validate_owner("erin", as_of()).await.unwrap();
    // Windows still agree because everything falls back to daily records.
    assert!(report.passed);
    let account = &report.scopes[0];
    let missing: Vec<&str> = account
        .issues
        .iter()
        .filter(|i| i.category == IntegrityCategory::CoverageGap)
        .filter_map(|i| i.period_key.as_deref())
        .collect();
    assert_eq!(missing, vec!["2025-06", "2025-07", "2025-08", "2025-09"]);
    assert_eq!(validation.config().twr_tolerance_pp, 0.01);
}
