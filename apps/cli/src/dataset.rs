//! JSON dataset loading and the in-memory store the harness runs against.

use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDate;
use perfchain_core::errors::{Error, Result};
use perfchain_core::performance::{
    AccountSeries, ConsolidatedPeriod, ConsolidatedPeriodRepositoryTrait, DailyReturnRecord,
    DailyReturnRepositoryTrait, PerformanceScope, PeriodKey, PeriodType,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::RwLock;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerDataset {
    pub owner_id: String,
    pub accounts: Vec<AccountSeries>,
}

/// `{"owners": [{"ownerId": .., "accounts": [{"accountId": .., "records": [..]}]}]}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataset {
    pub owners: Vec<OwnerDataset>,
}

impl Dataset {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read dataset {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("Failed to parse dataset {}", path.display()))
    }

    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

type PeriodStoreKey = (String, PerformanceScope, PeriodKey);

/// Daily records from a dataset plus a map standing in for the period store.
pub struct InMemoryStore {
    owners: BTreeMap<String, Vec<AccountSeries>>,
    periods: RwLock<BTreeMap<PeriodStoreKey, ConsolidatedPeriod>>,
}

impl InMemoryStore {
    /// Records are ordered by date per account, as the upstream reader does.
    pub fn from_dataset(dataset: Dataset) -> Self {
        let mut owners: BTreeMap<String, Vec<AccountSeries>> = BTreeMap::new();
        for owner in dataset.owners {
            let accounts = owners.entry(owner.owner_id).or_default();
            for mut account in owner.accounts {
                account.records.sort_by_key(|r| r.date);
                accounts.push(account);
            }
        }
        Self {
            owners,
            periods: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn period_count(&self) -> usize {
        self.periods.read().map(|p| p.len()).unwrap_or(0)
    }
}

fn lock_error() -> Error {
    Error::Repository("period store lock poisoned".to_string())
}

#[async_trait]
impl DailyReturnRepositoryTrait for InMemoryStore {
    async fn list_owners(&self) -> Result<Vec<String>> {
        Ok(self.owners.keys().cloned().collect())
    }

    async fn list_accounts(&self, owner_id: &str) -> Result<Vec<String>> {
        let accounts = self
            .owners
            .get(owner_id)
            .ok_or_else(|| Error::Repository(format!("Owner {} not found", owner_id)))?;
        Ok(accounts.iter().map(|a| a.account_id.clone()).collect())
    }

    async fn get_daily_records(
        &self,
        owner_id: &str,
        account_id: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<DailyReturnRecord>> {
        let account = self
            .owners
            .get(owner_id)
            .and_then(|accounts| accounts.iter().find(|a| a.account_id == account_id))
            .ok_or_else(|| {
                Error::Repository(format!("Account {} not found for owner {}", account_id, owner_id))
            })?;
        Ok(account
            .records
            .iter()
            .filter(|r| start_date.map_or(true, |start| r.date >= start))
            .filter(|r| end_date.map_or(true, |end| r.date <= end))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ConsolidatedPeriodRepositoryTrait for InMemoryStore {
    async fn get_period(
        &self,
        owner_id: &str,
        scope: &PerformanceScope,
        period_key: &PeriodKey,
    ) -> Result<Option<ConsolidatedPeriod>> {
        let periods = self.periods.read().map_err(|_| lock_error())?;
        Ok(periods
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
        if from_key > to_key {
            return Ok(Vec::new());
        }
        let periods = self.periods.read().map_err(|_| lock_error())?;
        let from = (owner_id.to_string(), scope.clone(), *from_key);
        let to = (owner_id.to_string(), scope.clone(), *to_key);
        Ok(periods
            .range(from..=to)
            .map(|(_, period)| period)
            .filter(|period| period.period_type == period_type)
            .cloned()
            .collect())
    }

    async fn save_period(
        &self,
        owner_id: &str,
        scope: &PerformanceScope,
        period: &ConsolidatedPeriod,
    ) -> Result<()> {
        let mut periods = self.periods.write().map_err(|_| lock_error())?;
        periods.insert(
            (owner_id.to_string(), scope.clone(), period.period_key),
            period.clone(),
        );
        Ok(())
    }
}
