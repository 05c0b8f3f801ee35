//! Time-weighted return consolidation and chaining.
//!
//! Daily return records are rolled into closed months, months into years,
//! and reporting windows are answered by chaining the coarsest consolidated
//! periods that fit, falling back to daily records at the open edges.

mod account_aggregator;
mod consolidation_model;
mod consolidation_service;
mod factor_chain;
mod performance_model;
mod performance_traits;
mod period_chainer;
mod period_consolidator;
mod reporting_period;

pub use account_aggregator::*;
pub use consolidation_model::*;
pub use consolidation_service::ConsolidationService;
pub use factor_chain::*;
pub use performance_model::*;
pub use performance_traits::*;
pub use period_chainer::*;
pub use period_consolidator::{consolidate, consolidate_closed_periods, SeriesConsolidation};
pub use reporting_period::*;

#[cfg(test)]
mod consolidation_service_tests;
