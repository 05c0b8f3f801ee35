//! Repository and service traits for the performance engine.
//!
//! The engine never owns storage: daily records come from an upstream reader
//! and consolidated periods live in a key-value store keyed by
//! `(owner, scope, period type, period key)`.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::Result;

use super::consolidation_model::{BatchConsolidationReport, ConsolidationSummary};
use super::performance_model::{
    ConsolidatedPeriod, Currency, DailyReturnRecord, PeriodKey, PeriodType, WindowResolution,
};
use super::reporting_period::ReportingPeriod;

/// Which series a consolidated record belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "accountId")]
pub enum PerformanceScope {
    Account(String),
    /// All of an owner's accounts blended together.
    Aggregate,
}

impl fmt::Display for PerformanceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PerformanceScope::Account(id) => write!(f, "account:{}", id),
            PerformanceScope::Aggregate => f.write_str("aggregate"),
        }
    }
}

/// Read-only access to upstream daily return records.
#[async_trait]
pub trait DailyReturnRepositoryTrait: Send + Sync {
    async fn list_owners(&self) -> Result<Vec<String>>;

    async fn list_accounts(&self, owner_id: &str) -> Result<Vec<String>>;

    /// Records of one account ordered by date, all currencies, within the
    /// optional inclusive date range.
    async fn get_daily_records(
        &self,
        owner_id: &str,
        account_id: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<DailyReturnRecord>>;
}

/// Storage for consolidated month and year records.
#[async_trait]
pub trait ConsolidatedPeriodRepositoryTrait: Send + Sync {
    async fn get_period(
        &self,
        owner_id: &str,
        scope: &PerformanceScope,
        period_key: &PeriodKey,
    ) -> Result<Option<ConsolidatedPeriod>>;

    /// Records of one type with `from_key <= key <= to_key`, ascending.
    async fn get_periods(
        &self,
        owner_id: &str,
        scope: &PerformanceScope,
        period_type: PeriodType,
        from_key: &PeriodKey,
        to_key: &PeriodKey,
    ) -> Result<Vec<ConsolidatedPeriod>>;

    /// Writes a whole record, superseding any previous one under the same key.
    async fn save_period(
        &self,
        owner_id: &str,
        scope: &PerformanceScope,
        period: &ConsolidatedPeriod,
    ) -> Result<()>;
}

/// Consolidation and reporting on top of the repositories.
#[async_trait]
pub trait ConsolidationServiceTrait: Send + Sync {
    /// Consolidates every closed month and every year of one owner's accounts
    /// and of their aggregate.
    async fn consolidate_owner(&self, owner_id: &str, as_of: NaiveDate) -> Result<ConsolidationSummary>;

    /// Runs [`Self::consolidate_owner`] for many owners. One owner's failure
    /// is reported without stopping the others.
    async fn consolidate_owners(&self, owner_ids: &[String], as_of: NaiveDate) -> BatchConsolidationReport;

    /// Daily series of a scope; the aggregate is blended from all accounts.
    async fn load_scope_daily_records(
        &self,
        owner_id: &str,
        scope: &PerformanceScope,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<DailyReturnRecord>>;

    /// Answers a reporting window from consolidated years and months, reading
    /// daily records only for the sub-ranges they do not cover.
    async fn resolve_reporting_period(
        &self,
        owner_id: &str,
        scope: &PerformanceScope,
        currency: &Currency,
        period: ReportingPeriod,
        as_of: NaiveDate,
    ) -> Result<WindowResolution>;
}
