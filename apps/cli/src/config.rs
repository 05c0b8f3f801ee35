use anyhow::{bail, Context};
use chrono::NaiveDate;
use perfchain_core::utils::time_utils::valuation_date_today;
use perfchain_core::validation::ValidationConfig;
use std::path::PathBuf;

pub struct Config {
    pub dataset: Option<PathBuf>,
    pub as_of: NaiveDate,
    pub validation: ValidationConfig,
    pub log_format: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let dataset = std::env::var("PERFCHAIN_DATASET").ok().map(PathBuf::from);
        let as_of = match std::env::var("PERFCHAIN_AS_OF") {
            Ok(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("Invalid PERFCHAIN_AS_OF '{}'", raw))?,
            Err(_) => valuation_date_today(),
        };

        let defaults = ValidationConfig::default();
        let validation = ValidationConfig {
            twr_tolerance_pp: env_tolerance("PERFCHAIN_TWR_TOLERANCE_PP", defaults.twr_tolerance_pp)?,
            mwr_tolerance_multiplier: env_tolerance(
                "PERFCHAIN_MWR_TOLERANCE_MULTIPLIER",
                defaults.mwr_tolerance_multiplier,
            )?,
            chart_tolerance_multiplier: env_tolerance(
                "PERFCHAIN_CHART_TOLERANCE_MULTIPLIER",
                defaults.chart_tolerance_multiplier,
            )?,
            mwr_is_blocking: std::env::var("PERFCHAIN_MWR_BLOCKING")
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(defaults.mwr_is_blocking),
            ..defaults
        };
        let log_format = std::env::var("PERFCHAIN_LOG_FORMAT").unwrap_or_else(|_| "text".into());

        Ok(Self {
            dataset,
            as_of,
            validation,
            log_format,
        })
    }

    /// Command-line values win over the environment.
    pub fn with_overrides(mut self, dataset: Option<PathBuf>, as_of: Option<NaiveDate>) -> Self {
        if dataset.is_some() {
            self.dataset = dataset;
        }
        if let Some(as_of) = as_of {
            self.as_of = as_of;
        }
        self
    }

    pub fn dataset_path(&self) -> anyhow::Result<&PathBuf> {
        self.dataset
            .as_ref()
            .context("No dataset given: pass a path or set PERFCHAIN_DATASET")
    }
}

fn env_tolerance(name: &str, default: f64) -> anyhow::Result<f64> {
    let Ok(raw) = std::env::var(name) else {
        return Ok(default);
    };
    let value: f64 = raw
        .trim()
        .parse()
        .with_context(|| format!("Invalid {} '{}'", name, raw))?;
    if !value.is_finite() || value < 0.0 {
        bail!("{} must be a non-negative number, got {}", name, raw);
    }
    Ok(value)
}
