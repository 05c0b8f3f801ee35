//! Perfchain Core - time-weighted return consolidation engine.
//!
//! This crate holds the pure calculation code, the domain models and the
//! repository traits. It is storage-agnostic: callers provide the daily
//! record source and the consolidated period store.

pub mod constants;
pub mod errors;
pub mod performance;
pub mod utils;
pub mod validation;

// Re-export error types
pub use errors::Error;
pub use errors::Result;
