mod args;
mod config;
mod dataset;
mod main_lib;

use anyhow::bail;
use chrono::NaiveDate;
use clap::Parser;
use perfchain_core::performance::{BatchConsolidationReport, PerformanceScope};
use perfchain_core::validation::BatchValidationReport;
use serde::Serialize;

use args::{Cli, Commands};
use config::Config;
use main_lib::{build_harness, init_tracing, Harness};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HarnessReport {
    as_of: NaiveDate,
    passed: bool,
    consolidation: BatchConsolidationReport,
    validation: BatchValidationReport,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?.with_overrides(cli.dataset, cli.as_of);
    init_tracing(&config.log_format);

    let harness = build_harness(&config)?;
    let as_of = config.as_of;

    match cli.command {
        Commands::Consolidate => {
            let report = consolidate_all(&harness, as_of).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_complete() {
                bail!("{} owner(s) failed to consolidate", report.failures.len());
            }
        }
        Commands::Validate => {
            let consolidation = consolidate_all(&harness, as_of).await?;
            let owners = harness.store_owners().await?;
            let validation = harness
                .validation_service
                .validate_owners(&owners, as_of)
                .await;
            let report = HarnessReport {
                as_of,
                passed: consolidation.is_complete() && validation.passed(),
                consolidation,
                validation,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
            tracing::info!(
                "Validation finished: {} owner(s), {} integrity issue(s)",
                report.validation.reports.len(),
                report.validation.issue_count()
            );
            if !report.passed {
                bail!("Validation failed");
            }
        }
        Commands::Report {
            owner,
            account,
            currency,
            period,
        } => {
            let summary = harness
                .consolidation_service
                .consolidate_owner(&owner, as_of)
                .await?;
            tracing::info!(
                "Consolidated {}: {} month(s), {} year(s)",
                owner,
                summary.months_written(),
                summary.years_written()
            );
            let scope = account
                .map(PerformanceScope::Account)
                .unwrap_or(PerformanceScope::Aggregate);
            let resolution = harness
                .consolidation_service
                .resolve_reporting_period(&owner, &scope, &currency, period, as_of)
                .await?;
            println!("{}", serde_json::to_string_pretty(&resolution)?);
        }
    }
    Ok(())
}

async fn consolidate_all(
    harness: &Harness,
    as_of: NaiveDate,
) -> anyhow::Result<BatchConsolidationReport> {
    let owners = harness.store_owners().await?;
    tracing::info!("Consolidating {} owner(s) as of {}", owners.len(), as_of);
    let report = harness
        .consolidation_service
        .consolidate_owners(&owners, as_of)
        .await;
    tracing::info!(
        "Consolidation finished: {} stored period(s), {} failure(s)",
        harness.store.period_count(),
        report.failures.len()
    );
    Ok(report)
}
