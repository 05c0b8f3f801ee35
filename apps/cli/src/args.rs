use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use perfchain_core::performance::{Currency, ReportingPeriod};
use std::path::PathBuf;

/// Consolidates daily return series and proves the result against them.
#[derive(Parser, Debug)]
#[command(name = "perfchain")]
#[command(about = "TWR consolidation and validation harness", long_about = None)]
pub struct Cli {
    /// JSON dataset of owners, accounts and daily records.
    #[arg(long, global = true)]
    pub dataset: Option<PathBuf>,

    /// Valuation date (YYYY-MM-DD). Defaults to today.
    #[arg(long, global = true)]
    pub as_of: Option<NaiveDate>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Consolidate every owner and print what was written.
    Consolidate,
    /// Consolidate, then validate every owner. Fails when a blocking check fails.
    Validate,
    /// Resolve one reporting window for an owner.
    Report {
        #[arg(long)]
        owner: String,

        /// Account to report on; the owner's aggregate when omitted.
        #[arg(long)]
        account: Option<String>,

        #[arg(long, default_value = "USD")]
        currency: Currency,

        /// 1M, 3M, 6M, YTD, 1Y, 2Y, 3Y, 5Y, ALL or START..END.
        #[arg(long, default_value = "1Y")]
        period: ReportingPeriod,
    },
}
