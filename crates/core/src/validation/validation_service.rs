//! Proves the hierarchical computation against the naive one.
//!
//! For each scope and currency the harness compares every reporting preset,
//! every year's money-weighted return and the month-end chart series, and
//! collects integrity findings over the stored records.

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::future::join_all;
use log::{debug, error, warn};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::constants::EARLIEST_PERIOD_YEAR;
use crate::errors::Result;
use crate::performance::{
    chain_ratios, chain_sequence, consolidate, resolve_window, resolve_window_naive,
    CompoundingFactor, ConsolidatedPeriod, ConsolidatedPeriodRepositoryTrait,
    ConsolidationServiceTrait, Currency, DailyReturnRecord, DailyReturnRepositoryTrait,
    OwnerFailure, PerformanceScope, PeriodKey, PeriodType, ReportingPeriod,
};

use super::integrity_checks::{
    check_month_against_daily, check_schema_versions, check_year_against_months,
    find_coverage_gaps,
};
use super::validation_model::{
    BatchValidationReport, CheckKind, CheckSummary, CurrencyValidation, OwnerValidationReport,
    ScopeValidationReport, ValidationConfig,
};

/// Validates one scope's stored records against its daily series.
///
/// Records with an unsupported schema are reported and left out of the
/// comparisons. Malformed daily input is an error; disagreement is not.
pub fn validate_series(
    scope: PerformanceScope,
    daily_records: &[DailyReturnRecord],
    yearly_periods: &[ConsolidatedPeriod],
    monthly_periods: &[ConsolidatedPeriod],
    as_of: NaiveDate,
    config: &ValidationConfig,
) -> Result<ScopeValidationReport> {
    let mut issues = check_schema_versions(yearly_periods);
    issues.extend(check_schema_versions(monthly_periods));

    let readable = |periods: &[ConsolidatedPeriod]| -> Vec<ConsolidatedPeriod> {
        let mut kept: Vec<ConsolidatedPeriod> = periods
            .iter()
            .filter(|p| p.ensure_supported_schema().is_ok())
            .cloned()
            .collect();
        kept.sort_by_key(|p| p.period_key);
        kept
    };
    let years = readable(yearly_periods);
    let months = readable(monthly_periods);

    issues.extend(find_coverage_gaps(&years, &months, daily_records, as_of));
    for year in &years {
        issues.extend(check_year_against_months(
            year,
            &months,
            config.equivalence_relative_tolerance,
        ));
    }
    for month in &months {
        issues.extend(check_month_against_daily(
            month,
            daily_records,
            config.equivalence_relative_tolerance,
        ));
    }

    let mut inceptions: BTreeMap<&Currency, NaiveDate> = BTreeMap::new();
    for record in daily_records {
        inceptions
            .entry(&record.currency)
            .and_modify(|d| *d = (*d).min(record.date))
            .or_insert(record.date);
    }

    let mut currencies = Vec::with_capacity(inceptions.len());
    for (currency, inception) in inceptions {
        let validation = CurrencyValidation {
            currency: currency.clone(),
            twr: twr_check(&years, &months, daily_records, currency, inception, as_of, config)?,
            mwr: mwr_check(&years, daily_records, currency, config)?,
            chart: chart_check(&months, daily_records, currency, config)?,
        };
        if !validation.passed() {
            warn!(
                "Validation failed for {} {}: twr max {:.6}pp, chart max {:.6}pp",
                scope, currency, validation.twr.max_abs_diff_pp, validation.chart.max_abs_diff_pp
            );
        }
        currencies.push(validation);
    }

    let passed = currencies.iter().all(|c| c.passed());
    Ok(ScopeValidationReport {
        scope,
        as_of,
        currencies,
        issues,
        passed,
    })
}

/// Every reporting preset, hierarchical vs naive. Blocking.
fn twr_check(
    years: &[ConsolidatedPeriod],
    months: &[ConsolidatedPeriod],
    daily_records: &[DailyReturnRecord],
    currency: &Currency,
    inception: NaiveDate,
    as_of: NaiveDate,
    config: &ValidationConfig,
) -> Result<CheckSummary> {
    let mut summary = CheckSummary::new(CheckKind::Twr, config.twr_tolerance_pp, true);
    for period in ReportingPeriod::PRESETS {
        let (start, end) = period.window(as_of, Some(inception))?;
        let hierarchical = resolve_window(years, months, daily_records, currency, start, end)?;
        let naive = resolve_window_naive(daily_records, currency, start, end)?;
        if !hierarchical.has_sufficient_data && !naive.has_sufficient_data {
            continue;
        }
        summary.record(period.label(), hierarchical.return_percent, naive.return_percent);
    }
    Ok(summary)
}

/// Each year's stored MWR vs a single pass over that year's daily records.
///
/// Year records place each month's cash flow at the month midpoint, so some
/// divergence is expected; the check is non-blocking unless configured.
fn mwr_check(
    years: &[ConsolidatedPeriod],
    daily_records: &[DailyReturnRecord],
    currency: &Currency,
    config: &ValidationConfig,
) -> Result<CheckSummary> {
    let mut summary = CheckSummary::new(CheckKind::Mwr, config.mwr_tolerance_pp(), config.mwr_is_blocking);
    for year in years {
        let Some(stored) = year.summary(currency) else {
            continue;
        };
        let (from, through) = (year.covered_start(), year.covered_through());
        let records: Vec<DailyReturnRecord> = daily_records
            .iter()
            .filter(|r| &r.currency == currency && r.date >= from && r.date <= through)
            .cloned()
            .collect();
        let Some(single_pass) = consolidate(&records, year.period_key)? else {
            continue;
        };
        if let Some(direct) = single_pass.summary(currency) {
            summary.record(
                year.period_key.to_string(),
                stored.money_weighted_return_percent,
                direct.money_weighted_return_percent,
            );
        }
    }
    Ok(summary)
}

/// Cumulative return at every month end: chained month ratios vs daily records.
fn chart_check(
    months: &[ConsolidatedPeriod],
    daily_records: &[DailyReturnRecord],
    currency: &Currency,
    config: &ValidationConfig,
) -> Result<CheckSummary> {
    let mut summary = CheckSummary::new(CheckKind::Chart, config.chart_tolerance_pp(), true);
    let series: Vec<&ConsolidatedPeriod> = months
        .iter()
        .filter(|m| m.summary(currency).is_some())
        .collect();
    let Some(first) = series.first() else {
        return Ok(summary);
    };

    let daily: BTreeMap<NaiveDate, f64> = daily_records
        .iter()
        .filter(|r| &r.currency == currency)
        .map(|r| (r.date, r.adjusted_change_percent))
        .collect();

    let mut chained = CompoundingFactor::ONE;
    let mut naive = CompoundingFactor::ONE;
    let mut next_day = Some(first.covered_start());

    for month in &series {
        let Some(month_summary) = month.summary(currency) else {
            continue;
        };
        chained = chain_ratios(chained, [month_summary.boundary().ratio()?])?;

        let through = month.covered_through();
        if let Some(from) = next_day.filter(|from| *from <= through) {
            naive = chain_sequence(naive, daily.range(from..=through).map(|(_, pct)| *pct))?;
        }
        next_day = through.succ_opt();

        summary.record(through.to_string(), chained.return_percent(), naive.return_percent());
    }
    debug!(
        "Chart check for {}: {} month ends, max {:.6}pp",
        currency, summary.comparisons, summary.max_abs_diff_pp
    );
    Ok(summary)
}

#[async_trait]
pub trait ValidationServiceTrait: Send + Sync {
    async fn validate_scope(
        &self,
        owner_id: &str,
        scope: &PerformanceScope,
        as_of: NaiveDate,
    ) -> Result<ScopeValidationReport>;

    /// Validates every account of the owner and their aggregate.
    async fn validate_owner(&self, owner_id: &str, as_of: NaiveDate) -> Result<OwnerValidationReport>;

    /// One owner's failure is reported without stopping the others.
    async fn validate_owners(&self, owner_ids: &[String], as_of: NaiveDate) -> BatchValidationReport;
}

pub struct ValidationService {
    daily_repository: Arc<dyn DailyReturnRepositoryTrait>,
    period_repository: Arc<dyn ConsolidatedPeriodRepositoryTrait>,
    consolidation_service: Arc<dyn ConsolidationServiceTrait>,
    config: ValidationConfig,
}

impl ValidationService {
    pub fn new(
        daily_repository: Arc<dyn DailyReturnRepositoryTrait>,
        period_repository: Arc<dyn ConsolidatedPeriodRepositoryTrait>,
        consolidation_service: Arc<dyn ConsolidationServiceTrait>,
        config: ValidationConfig,
    ) -> Self {
        Self {
            daily_repository,
            period_repository,
            consolidation_service,
            config,
        }
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }
}

#[async_trait]
impl ValidationServiceTrait for ValidationService {
    async fn validate_scope(
        &self,
        owner_id: &str,
        scope: &PerformanceScope,
        as_of: NaiveDate,
    ) -> Result<ScopeValidationReport> {
        let daily = self
            .consolidation_service
            .load_scope_daily_records(owner_id, scope, None, Some(as_of))
            .await?;
        let years = self
            .period_repository
            .get_periods(
                owner_id,
                scope,
                PeriodType::Year,
                &PeriodKey::Year(EARLIEST_PERIOD_YEAR),
                &PeriodKey::year_of(as_of),
            )
            .await?;
        let months = self
            .period_repository
            .get_periods(
                owner_id,
                scope,
                PeriodType::Month,
                &PeriodKey::Month {
                    year: EARLIEST_PERIOD_YEAR,
                    month: 1,
                },
                &PeriodKey::month_of(as_of),
            )
            .await?;

        validate_series(scope.clone(), &daily, &years, &months, as_of, &self.config)
    }

    async fn validate_owner(&self, owner_id: &str, as_of: NaiveDate) -> Result<OwnerValidationReport> {
        let accounts = self.daily_repository.list_accounts(owner_id).await?;
        let mut scopes: Vec<PerformanceScope> = accounts.into_iter().map(PerformanceScope::Account).collect();
        if !scopes.is_empty() {
            scopes.push(PerformanceScope::Aggregate);
        }

        let mut reports = Vec::with_capacity(scopes.len());
        for scope in &scopes {
            reports.push(self.validate_scope(owner_id, scope, as_of).await?);
        }

        let passed = reports.iter().all(|r| r.passed);
        Ok(OwnerValidationReport {
            owner_id: owner_id.to_string(),
            as_of,
            scopes: reports,
            passed,
        })
    }

    async fn validate_owners(&self, owner_ids: &[String], as_of: NaiveDate) -> BatchValidationReport {
        let runs = owner_ids
            .iter()
            .map(|owner_id| async move { (owner_id, self.validate_owner(owner_id, as_of).await) });

        let mut batch = BatchValidationReport::default();
        for (owner_id, result) in join_all(runs).await {
            match result {
                Ok(report) => batch.reports.push(report),
                Err(e) => {
                    error!("Validation failed to run for owner {}: {}", owner_id, e);
                    batch.failures.push(OwnerFailure {
                        owner_id: owner_id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }
        batch
    }
}
