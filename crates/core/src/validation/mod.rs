//! Validation harness for the consolidation engine.
//!
//! Compares the hierarchical path (consolidated years and months plus daily
//! edges) against the naive path (every daily record) within the configured
//! tolerances, and reports integrity findings over the stored records.

mod integrity_checks;
mod validation_model;
mod validation_service;

pub use integrity_checks::*;
pub use validation_model::*;
pub use validation_service::{validate_series, ValidationService, ValidationServiceTrait};

#[cfg(test)]
mod validation_service_tests;
