//! Unit tests for the consolidation service.

use super::*;
use crate::errors::{Error, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

// ============================================================================
// Mock Implementations
// ============================================================================

#[derive(Default)]
struct MockDailyReturnRepository {
    /// owner -> accounts
    owners: BTreeMap<String, Vec<AccountSeries>>,
    failing_owners: HashSet<String>,
    /// Every (account, start, end) requested.
    requests: Mutex<Vec<(String, Option<NaiveDate>, Option<NaiveDate>)>>,
}

impl MockDailyReturnRepository {
    fn with_owner(mut self, owner_id: &str, accounts: Vec<AccountSeries>) -> Self {
        self.owners.insert(owner_id.to_string(), accounts);
        self
    }

    fn failing(mut self, owner_id: &str) -> Self {
        self.failing_owners.insert(owner_id.to_string());
        self.owners.insert(owner_id.to_string(), Vec::new());
        self
    }

    fn clear_requests(&self) {
        self.requests.lock().unwrap().clear();
    }

    fn requests(&self) -> Vec<(String, Option<NaiveDate>, Option<NaiveDate>)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl DailyReturnRepositoryTrait for MockDailyReturnRepository {
    async fn list_owners(&self) -> Result<Vec<String>> {
        Ok(self.owners.keys().cloned().collect())
    }

    async fn list_accounts(&self, owner_id: &str) -> Result<Vec<String>> {
        if self.failing_owners.contains(owner_id) {
            return Err(Error::Repository(format!("daily store unavailable for {}", owner_id)));
        }
        Ok(self
            .owners
            .get(owner_id)
            .map(|accounts| accounts.iter().map(|a| a.account_id.clone()).collect())
            .unwrap_or_default())
    }

    async fn get_daily_records(
        &self,
        owner_id: &str,
        account_id: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<DailyReturnRecord>> {
        self.requests
            .lock()
            .unwrap()
            .push((account_id.to_string(), start_date, end_date));
        let account = self
            .owners
            .get(owner_id)
            .and_then(|accounts| accounts.iter().find(|a| a.account_id == account_id))
            .ok_or_else(|| Error::Repository(format!("Account {} not found", account_id)))?;
        Ok(account
            .records
            .iter()
            .filter(|r| start_date.map_or(true, |s| r.date >= s))
            .filter(|r| end_date.map_or(true, |e| r.date <= e))
            .cloned()
            .collect())
    }
}

type PeriodStoreKey = (String, PerformanceScope, PeriodKey);

#[derive(Default)]
struct MockConsolidatedPeriodRepository {
    periods: RwLock<HashMap<PeriodStoreKey, ConsolidatedPeriod>>,
    save_count: Mutex<usize>,
}

impl MockConsolidatedPeriodRepository {
    fn snapshot(&self) -> HashMap<PeriodStoreKey, ConsolidatedPeriod> {
        self.periods.read().unwrap().clone()
    }

    fn save_count(&self) -> usize {
        *self.save_count.lock().unwrap()
    }
}

#[async_trait]
impl ConsolidatedPeriodRepositoryTrait for MockConsolidatedPeriodRepository {
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
        let mut periods: Vec<ConsolidatedPeriod> = self
            .periods
            .read()
            .unwrap()
            .iter()
            .filter(|((owner, s, key), _)| {
                owner == owner_id
                    && s == scope
                    && key.period_type() == period_type
                    && key >= from_key
                    && key <= to_key
            })
            .map(|(_, period)| period.clone())
            .collect();
        periods.sort_by_key(|p| p.period_key);
        Ok(periods)
    }

    async fn save_period(
        &self,
        owner_id: &str,
        scope: &PerformanceScope,
        period: &ConsolidatedPeriod,
    ) -> Result<()> {
        self.periods.write().unwrap().insert(
            (owner_id.to_string(), scope.clone(), period.period_key),
            period.clone(),
        );
        *self.save_count.lock().unwrap() += 1;
        Ok(())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn usd() -> Currency {
    Currency::parse("USD").unwrap()
}

/// Business-day-like series: weekends are skipped.
fn account(account_id: &str, start: NaiveDate, end: NaiveDate, seed: u32) -> AccountSeries {
    use chrono::{Datelike, Weekday};

    let mut records = Vec::new();
    let mut value = dec!(5000) + Decimal::from(seed * 1000);
    let mut date = start;
    let mut i = seed;
    while date <= end {
        if !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            let pct = f64::from((i * 13) % 17) * 0.2 - 1.6;
            let factor = Decimal::try_from(1.0 + pct / 100.0).unwrap();
            value = (value * factor).round_dp(2);
            records.push(DailyReturnRecord {
                date,
                currency: usd(),
                total_value: value,
                total_investment: dec!(5000),
                cash_flow: Decimal::ZERO,
                adjusted_change_percent: pct,
            });
            i += 1;
        }
        date = date.succ_opt().unwrap();
    }
    AccountSeries {
        account_id: account_id.to_string(),
        records,
    }
}

fn as_of() -> NaiveDate {
    d(2025, 10, 19)
}

fn setup(
    daily: MockDailyReturnRepository,
) -> (
    ConsolidationService,
    Arc<MockDailyReturnRepository>,
    Arc<MockConsolidatedPeriodRepository>,
) {
    let daily = Arc::new(daily);
    let periods = Arc::new(MockConsolidatedPeriodRepository::default());
    let service = ConsolidationService::new(daily.clone(), periods.clone());
    (service, daily, periods)
}

fn two_account_owner() -> MockDailyReturnRepository {
    MockDailyReturnRepository::default().with_owner(
        "alice",
        vec![
            account("brokerage", d(2023, 11, 6), as_of(), 1),
            account("ira", d(2024, 5, 13), as_of(), 4),
        ],
    )
}

fn assert_close(actual: f64, expected: f64, tolerance: f64) {
    assert!(
        (actual - expected).abs() <= tolerance,
        "expected {} got {}",
        expected,
        actual
    );
}

// ============================================================================
// Consolidation
// ============================================================================

#[tokio::test]
async fn consolidates_accounts_and_their_aggregate() {
    let (service, _, periods) = setup(two_account_owner());

    let summary = service.consolidate_owner("alice", as_of()).await.unwrap();

    assert_eq!(summary.scopes.len(), 3);
    assert_eq!(summary.scopes[2].scope, PerformanceScope::Aggregate);

    // brokerage: 2023-11 .. 2025-09 = 23 months, years 2023..2025
    let brokerage = &summary.scopes[0];
    assert_eq!(brokerage.scope, PerformanceScope::Account("brokerage".to_string()));
    assert_eq!(brokerage.months_written, 23);
    assert_eq!(brokerage.years_written, 3);

    // ira: 2024-05 .. 2025-09 = 17 months
    assert_eq!(summary.scopes[1].months_written, 17);
    assert_eq!(summary.scopes[1].years_written, 2);

    // The aggregate spans the union of dates.
    assert_eq!(summary.scopes[2].months_written, 23);
    assert_eq!(summary.months_written(), 63);
    assert_eq!(summary.months_absent(), 0);
    assert_eq!(periods.save_count(), summary.months_written() + summary.years_written());

    let october = periods
        .get_period(
            "alice",
            &PerformanceScope::Aggregate,
            &PeriodKey::Month { year: 2025, month: 10 },
        )
        .await
        .unwrap();
    assert!(october.is_none(), "the current month is still open");
}

#[tokio::test]
async fn reconsolidation_produces_identical_records() {
    let (service, _, periods) = setup(two_account_owner());

    service.consolidate_owner("alice", as_of()).await.unwrap();
    let first = periods.snapshot();
    service.consolidate_owner("alice", as_of()).await.unwrap();
    let second = periods.snapshot();

    assert_eq!(first.len(), second.len());
    for (key, period) in &first {
        assert_eq!(second.get(key), Some(period), "{:?} changed on rerun", key);
    }
}

#[tokio::test]
async fn batch_isolates_failing_owners() {
    let mut poisoned = account("cash", d(2025, 1, 6), d(2025, 3, 31), 2);
    poisoned.records[10].adjusted_change_percent = f64::NAN;

    let daily = two_account_owner()
        .failing("bob")
        .with_owner("carol", vec![poisoned]);
    let (service, _, periods) = setup(daily);

    let owners = vec!["alice".to_string(), "bob".to_string(), "carol".to_string()];
    let report = service.consolidate_owners(&owners, as_of()).await;

    assert!(!report.is_complete());
    assert_eq!(report.summaries.len(), 1);
    assert_eq!(report.summaries[0].owner_id, "alice");

    let failed: HashSet<&str> = report.failures.iter().map(|f| f.owner_id.as_str()).collect();
    assert_eq!(failed, HashSet::from(["bob", "carol"]));

    // Nothing was written for the owner whose data failed to compute.
    assert!(periods.snapshot().keys().all(|(owner, _, _)| owner == "alice"));
}

#[tokio::test]
async fn owner_without_accounts_writes_nothing() {
    let (service, _, periods) = setup(MockDailyReturnRepository::default().with_owner("dave", vec![]));
    let summary = service.consolidate_owner("dave", as_of()).await.unwrap();
    assert!(summary.scopes.is_empty());
    assert_eq!(periods.save_count(), 0);
}

/// Brokerage keeps trading; options is wiped out on 2025-03-12 and stays at zero.
fn wiped_out_owner() -> MockDailyReturnRepository {
    let mut options = account("options", d(2025, 1, 6), as_of(), 3);
    let wipeout = d(2025, 3, 12);
    for record in options.records.iter_mut().filter(|r| r.date >= wipeout) {
        record.adjusted_change_percent = if record.date == wipeout { -100.0 } else { 0.0 };
        record.total_value = Decimal::ZERO;
    }
    MockDailyReturnRepository::default().with_owner(
        "frank",
        vec![account("brokerage", d(2025, 1, 6), as_of(), 1), options],
    )
}

#[tokio::test]
async fn wiped_out_account_still_builds_the_aggregate() {
    let (service, _, periods) = setup(wiped_out_owner());

    let summary = service.consolidate_owner("frank", as_of()).await.unwrap();
    assert_eq!(summary.scopes.len(), 3);
    assert_eq!(summary.scopes[2].scope, PerformanceScope::Aggregate);
    assert_eq!(summary.scopes[2].months_written, 9);

    let options = PerformanceScope::Account("options".to_string());
    let march = periods
        .get_period("frank", &options, &PeriodKey::Month { year: 2025, month: 3 })
        .await
        .unwrap()
        .unwrap();
    assert_close(march.summary(&usd()).unwrap().period_return_percent, -100.0, 1e-9);

    let ytd = service
        .resolve_reporting_period("frank", &options, &usd(), ReportingPeriod::Ytd, as_of())
        .await
        .unwrap();
    assert_close(ytd.return_percent, -100.0, 1e-9);

    let aggregate_daily = service
        .load_scope_daily_records("frank", &PerformanceScope::Aggregate, None, None)
        .await
        .unwrap();
    let aggregate = service
        .resolve_reporting_period("frank", &PerformanceScope::Aggregate, &usd(), ReportingPeriod::Ytd, as_of())
        .await
        .unwrap();
    let naive = resolve_window_naive(&aggregate_daily, &usd(), aggregate.window_start, aggregate.window_end).unwrap();
    assert!(aggregate.has_sufficient_data);
    assert!(aggregate.return_percent > -100.0);
    assert_close(aggregate.return_percent, naive.return_percent, 1e-7);
}

#[tokio::test]
async fn failing_scope_leaves_the_owner_unwritten() {
    let mut poisoned = account("cash", d(2025, 1, 6), d(2025, 6, 30), 2);
    poisoned.records[80].adjusted_change_percent = f64::INFINITY;
    let daily = MockDailyReturnRepository::default().with_owner(
        "grace",
        vec![account("brokerage", d(2025, 1, 6), as_of(), 1), poisoned],
    );
    let (service, _, periods) = setup(daily);

    let result = service.consolidate_owner("grace", as_of()).await;
    assert!(matches!(result, Err(Error::Calculation(_))));
    assert_eq!(periods.save_count(), 0);
}

#[tokio::test]
async fn months_without_records_are_reported_absent() {
    let mut gappy = account("gappy", d(2025, 1, 6), d(2025, 1, 31), 1);
    gappy
        .records
        .extend(account("gappy", d(2025, 4, 1), d(2025, 4, 30), 1).records);
    let (service, _, _) = setup(MockDailyReturnRepository::default().with_owner("heidi", vec![gappy]));

    let summary = service.consolidate_owner("heidi", as_of()).await.unwrap();
    assert_eq!(summary.scopes[0].months_written, 2);
    assert_eq!(summary.scopes[0].months_absent, 2);
    assert_eq!(summary.months_absent(), 4);
}

// ============================================================================
// Reporting windows
// ============================================================================

#[tokio::test]
async fn reporting_periods_match_a_naive_pass_for_every_scope() {
    let (service, daily, _) = setup(two_account_owner());
    service.consolidate_owner("alice", as_of()).await.unwrap();

    let scopes = [
        PerformanceScope::Account("brokerage".to_string()),
        PerformanceScope::Account("ira".to_string()),
        PerformanceScope::Aggregate,
    ];
    for scope in &scopes {
        let all_daily = service
            .load_scope_daily_records("alice", scope, None, None)
            .await
            .unwrap();
        for period in ReportingPeriod::PRESETS {
            let resolution = service
                .resolve_reporting_period("alice", scope, &usd(), period, as_of())
                .await
                .unwrap();
            let naive = resolve_window_naive(
                &all_daily,
                &usd(),
                resolution.window_start,
                resolution.window_end,
            )
            .unwrap();
            assert!(resolution.has_sufficient_data, "{} {}", scope, period);
            assert_close(resolution.return_percent, naive.return_percent, 1e-7);
        }
    }
    assert!(!daily.requests().is_empty());
}

#[tokio::test]
async fn ytd_reads_daily_records_only_for_the_open_month() {
    let (service, daily, _) = setup(two_account_owner());
    service.consolidate_owner("alice", as_of()).await.unwrap();
    daily.clear_requests();

    let resolution = service
        .resolve_reporting_period(
            "alice",
            &PerformanceScope::Account("brokerage".to_string()),
            &usd(),
            ReportingPeriod::Ytd,
            as_of(),
        )
        .await
        .unwrap();

    assert_eq!(resolution.segments.len(), 2);
    assert_eq!(resolution.segments[0].granularity, Granularity::Year);
    assert_eq!(resolution.segments[1].granularity, Granularity::Day);
    assert_eq!(
        daily.requests(),
        vec![("brokerage".to_string(), Some(d(2025, 10, 1)), Some(as_of()))]
    );
}

#[tokio::test]
async fn all_period_starts_at_the_first_consolidated_year() {
    let (service, _, _) = setup(two_account_owner());
    service.consolidate_owner("alice", as_of()).await.unwrap();

    let resolution = service
        .resolve_reporting_period(
            "alice",
            &PerformanceScope::Account("ira".to_string()),
            &usd(),
            ReportingPeriod::All,
            as_of(),
        )
        .await
        .unwrap();
    assert_eq!(resolution.window_start, d(2024, 5, 13));
    assert_eq!(resolution.window_end, as_of());
}

#[tokio::test]
async fn all_period_without_consolidation_uses_daily_inception() {
    let (service, _, _) = setup(two_account_owner());

    let resolution = service
        .resolve_reporting_period(
            "alice",
            &PerformanceScope::Aggregate,
            &usd(),
            ReportingPeriod::All,
            as_of(),
        )
        .await
        .unwrap();
    assert_eq!(resolution.window_start, d(2023, 11, 6));
    assert!(resolution.segments.iter().all(|s| s.granularity == Granularity::Day));
}

#[tokio::test]
async fn unknown_currency_has_insufficient_data() {
    let (service, _, _) = setup(two_account_owner());
    service.consolidate_owner("alice", as_of()).await.unwrap();

    let resolution = service
        .resolve_reporting_period(
            "alice",
            &PerformanceScope::Aggregate,
            &Currency::parse("JPY").unwrap(),
            ReportingPeriod::OneYear,
            as_of(),
        )
        .await
        .unwrap();
    assert!(!resolution.has_sufficient_data);
    assert_eq!(resolution.return_if_sufficient(), None);
}
