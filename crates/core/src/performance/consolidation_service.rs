use async_trait::async_trait;
use chrono::NaiveDate;
use futures::future::{join_all, try_join_all};
use log::{debug, error, warn};
use std::sync::Arc;

use crate::constants::EARLIEST_PERIOD_YEAR;
use crate::errors::{Error, Result};
use crate::utils::time_utils::months_between;

use super::account_aggregator::blend_series;
use super::consolidation_model::{
    BatchConsolidationReport, ConsolidationSummary, OwnerFailure, ScopeConsolidation,
};
use super::performance_model::{
    AccountSeries, Currency, DailyReturnRecord, PeriodKey, PeriodType, WindowResolution,
};
use super::performance_traits::{
    ConsolidatedPeriodRepositoryTrait, ConsolidationServiceTrait, DailyReturnRepositoryTrait,
    PerformanceScope,
};
use super::period_chainer::{evaluate_window, plan_window};
use super::period_consolidator::{consolidate_closed_periods, SeriesConsolidation};
use super::reporting_period::ReportingPeriod;

pub struct ConsolidationService {
    daily_repository: Arc<dyn DailyReturnRepositoryTrait>,
    period_repository: Arc<dyn ConsolidatedPeriodRepositoryTrait>,
}

impl ConsolidationService {
    pub fn new(
        daily_repository: Arc<dyn DailyReturnRepositoryTrait>,
        period_repository: Arc<dyn ConsolidatedPeriodRepositoryTrait>,
    ) -> Self {
        Self {
            daily_repository,
            period_repository,
        }
    }

    /// Fetches every account of the owner concurrently.
    pub async fn load_account_series(
        &self,
        owner_id: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<AccountSeries>> {
        let account_ids = self.daily_repository.list_accounts(owner_id).await?;
        let fetches = account_ids.into_iter().map(|account_id| async move {
            let records = self
                .daily_repository
                .get_daily_records(owner_id, &account_id, start_date, end_date)
                .await?;
            Ok::<_, Error>(AccountSeries {
                account_id,
                records,
            })
        });
        try_join_all(fetches).await
    }

    /// Persists precomputed scopes. Callers compute every scope before the
    /// first write, so a calculation failure leaves the stored records untouched.
    async fn save_scopes(&self, owner_id: &str, computed: &[ComputedScope]) -> Result<()> {
        for scope in computed {
            let consolidation = &scope.consolidation;
            for period in consolidation.months.iter().chain(consolidation.years.iter()) {
                self.period_repository
                    .save_period(owner_id, &scope.scope, period)
                    .await?;
            }
        }
        Ok(())
    }

    async fn inception_date(
        &self,
        owner_id: &str,
        scope: &PerformanceScope,
        as_of: NaiveDate,
    ) -> Result<Option<NaiveDate>> {
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
        if let Some(first) = years.first() {
            return Ok(Some(first.start_date));
        }

        let daily = self
            .load_scope_daily_records(owner_id, scope, None, Some(as_of))
            .await?;
        Ok(daily.first().map(|r| r.date))
    }
}

/// One scope's closed periods, computed but not yet written.
struct ComputedScope {
    scope: PerformanceScope,
    consolidation: SeriesConsolidation,
    daily_records_read: usize,
}

impl ComputedScope {
    fn compute(scope: PerformanceScope, records: &[DailyReturnRecord], as_of: NaiveDate) -> Result<Self> {
        Ok(Self {
            scope,
            consolidation: consolidate_closed_periods(records, as_of)?,
            daily_records_read: records.len(),
        })
    }

    fn summary(&self) -> ScopeConsolidation {
        let months = &self.consolidation.months;
        let months_absent = match (months.first(), months.last()) {
            (Some(first), Some(last)) => {
                months_between(first.start_date, last.start_date).len() - months.len()
            }
            _ => 0,
        };
        ScopeConsolidation {
            scope: self.scope.clone(),
            months_written: months.len(),
            years_written: self.consolidation.years.len(),
            months_absent,
            daily_records_read: self.daily_records_read,
        }
    }
}

/// Joins ranges that touch so each gap is fetched with one query.
fn merge_daily_ranges(ranges: Vec<(NaiveDate, NaiveDate)>) -> Vec<(NaiveDate, NaiveDate)> {
    let mut merged: Vec<(NaiveDate, NaiveDate)> = Vec::with_capacity(ranges.len());
    for (start, end) in ranges {
        match merged.last_mut() {
            Some(last) if last.1.succ_opt() == Some(start) => last.1 = end,
            _ => merged.push((start, end)),
        }
    }
    merged
}

#[async_trait]
impl ConsolidationServiceTrait for ConsolidationService {
    async fn consolidate_owner(&self, owner_id: &str, as_of: NaiveDate) -> Result<ConsolidationSummary> {
        let series = self.load_account_series(owner_id, None, None).await?;
        if series.is_empty() {
            warn!("Owner {} has no accounts, nothing to consolidate", owner_id);
        }

        let mut computed = Vec::with_capacity(series.len() + 1);
        for account in &series {
            let scope = PerformanceScope::Account(account.account_id.clone());
            computed.push(ComputedScope::compute(scope, &account.records, as_of)?);
        }
        if !series.is_empty() {
            let blended = blend_series(&series)?;
            computed.push(ComputedScope::compute(PerformanceScope::Aggregate, &blended, as_of)?);
        }

        self.save_scopes(owner_id, &computed).await?;

        let scopes: Vec<ScopeConsolidation> = computed.iter().map(ComputedScope::summary).collect();
        for scope in &scopes {
            debug!(
                "Consolidated {} for owner {}: {} months, {} years from {} daily records",
                scope.scope, owner_id, scope.months_written, scope.years_written, scope.daily_records_read
            );
            if scope.months_absent > 0 {
                warn!(
                    "{} month(s) without daily records inside the history of {} for owner {}",
                    scope.months_absent, scope.scope, owner_id
                );
            }
        }

        Ok(ConsolidationSummary {
            owner_id: owner_id.to_string(),
            as_of,
            scopes,
        })
    }

    async fn consolidate_owners(&self, owner_ids: &[String], as_of: NaiveDate) -> BatchConsolidationReport {
        let runs = owner_ids.iter().map(|owner_id| async move {
            (owner_id, self.consolidate_owner(owner_id, as_of).await)
        });

        let mut report = BatchConsolidationReport::default();
        for (owner_id, result) in join_all(runs).await {
            match result {
                Ok(summary) => report.summaries.push(summary),
                Err(e) => {
                    error!("Consolidation failed for owner {}: {}", owner_id, e);
                    report.failures.push(OwnerFailure {
                        owner_id: owner_id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }
        report
    }

    async fn load_scope_daily_records(
        &self,
        owner_id: &str,
        scope: &PerformanceScope,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<DailyReturnRecord>> {
        match scope {
            PerformanceScope::Account(account_id) => {
                self.daily_repository
                    .get_daily_records(owner_id, account_id, start_date, end_date)
                    .await
            }
            PerformanceScope::Aggregate => {
                let series = self
                    .load_account_series(owner_id, start_date, end_date)
                    .await?;
                blend_series(&series)
            }
        }
    }

    async fn resolve_reporting_period(
        &self,
        owner_id: &str,
        scope: &PerformanceScope,
        currency: &Currency,
        period: ReportingPeriod,
        as_of: NaiveDate,
    ) -> Result<WindowResolution> {
        let inception = match period {
            ReportingPeriod::All => self.inception_date(owner_id, scope, as_of).await?,
            _ => None,
        };
        let (window_start, window_end) = period.window(as_of, inception)?;

        let years = self
            .period_repository
            .get_periods(
                owner_id,
                scope,
                PeriodType::Year,
                &PeriodKey::year_of(window_start),
                &PeriodKey::year_of(window_end),
            )
            .await?;
        let months = self
            .period_repository
            .get_periods(
                owner_id,
                scope,
                PeriodType::Month,
                &PeriodKey::month_of(window_start),
                &PeriodKey::month_of(window_end),
            )
            .await?;

        let plan = plan_window(&years, &months, currency, window_start, window_end)?;
        let ranges = merge_daily_ranges(plan.iter().filter_map(|s| s.daily_range()).collect());

        let mut daily = Vec::new();
        for (start, end) in ranges {
            daily.extend(
                self.load_scope_daily_records(owner_id, scope, Some(start), Some(end))
                    .await?,
            );
        }

        let resolution = evaluate_window(&plan, &daily, currency, window_start, window_end)?;
        if !resolution.has_sufficient_data {
            warn!(
                "No performance data for {} {} {} as of {}",
                owner_id, scope, period, as_of
            );
        }
        Ok(resolution)
    }
}
