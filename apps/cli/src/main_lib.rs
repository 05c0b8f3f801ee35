use std::sync::Arc;

use perfchain_core::performance::{
    ConsolidationService, ConsolidationServiceTrait, DailyReturnRepositoryTrait,
};
use perfchain_core::validation::{ValidationService, ValidationServiceTrait};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;
use crate::dataset::{Dataset, InMemoryStore};

pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub consolidation_service: Arc<dyn ConsolidationServiceTrait>,
    pub validation_service: Arc<dyn ValidationServiceTrait>,
}

impl Harness {
    pub async fn store_owners(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.store.list_owners().await?)
    }
}

/// Logs go to stderr so reports on stdout stay machine-readable.
pub fn init_tracing(log_format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if log_format.eq_ignore_ascii_case("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_line_number(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

pub fn build_harness(config: &Config) -> anyhow::Result<Harness> {
    let path = config.dataset_path()?;
    let dataset = Dataset::load(path)?;
    tracing::info!(
        "Loaded {} owner(s) from {}",
        dataset.owners.len(),
        path.display()
    );
    Ok(harness_from_dataset(dataset, config))
}

pub fn harness_from_dataset(dataset: Dataset, config: &Config) -> Harness {
    let store = Arc::new(InMemoryStore::from_dataset(dataset));
    let consolidation_service: Arc<dyn ConsolidationServiceTrait> =
        Arc::new(ConsolidationService::new(store.clone(), store.clone()));
    let validation_service: Arc<dyn ValidationServiceTrait> = Arc::new(ValidationService::new(
        store.clone(),
        store.clone(),
        consolidation_service.clone(),
        config.validation,
    ));
    Harness {
        store,
        consolidation_service,
        validation_service,
    }
}
