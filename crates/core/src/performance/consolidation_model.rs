use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::performance_traits::PerformanceScope;

/// What one scope's consolidation wrote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeConsolidation {
    pub scope: PerformanceScope,
    pub months_written: usize,
    pub years_written: usize,
    /// Calendar months inside the consolidated history with no daily records.
    pub months_absent: usize,
    pub daily_records_read: usize,
}

/// Result of consolidating one owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidationSummary {
    pub owner_id: String,
    pub as_of: NaiveDate,
    pub scopes: Vec<ScopeConsolidation>,
}

impl ConsolidationSummary {
    pub fn months_written(&self) -> usize {
        self.scopes.iter().map(|s| s.months_written).sum()
    }

    pub fn years_written(&self) -> usize {
        self.scopes.iter().map(|s| s.years_written).sum()
    }

    pub fn months_absent(&self) -> usize {
        self.scopes.iter().map(|s| s.months_absent).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerFailure {
    pub owner_id: String,
    pub error: String,
}

/// Batch outcome; failures are per owner and never abort the batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchConsolidationReport {
    pub summaries: Vec<ConsolidationSummary>,
    pub failures: Vec<OwnerFailure>,
}

impl BatchConsolidationReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}
