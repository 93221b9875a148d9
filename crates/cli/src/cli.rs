use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "concord",
    about = "Reconcile marketplace statement orders against warehouse order records",
    version
)]
pub struct Cli {
    /// Log at debug level (overridden by RUST_LOG)
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Match every statement order to at most one warehouse record and classify variances
    Reconcile(ReconcileArgs),

    /// Report collision risk, variance profile and likely prior-period matches
    Audit(AuditArgs),
}

#[derive(Args, Debug, Clone)]
pub struct InputArgs {
    /// Marketplace statement CSV
    #[arg(long)]
    pub orders: PathBuf,

    /// Warehouse order export CSV
    #[arg(long)]
    pub reference: PathBuf,

    /// TOML file with [matching], [orders], [reference] and [audit] tables
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ReconcileArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Write annotated rows to this CSV
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Write the run summary to this JSON file
    #[arg(long)]
    pub summary: Option<PathBuf>,

    /// First day of the accounting period (YYYY-MM-DD)
    #[arg(long, requires = "period_end")]
    pub period_start: Option<NaiveDate>,

    /// Last day of the accounting period (YYYY-MM-DD)
    #[arg(long, requires = "period_start")]
    pub period_end: Option<NaiveDate>,
}

#[derive(Args, Debug, Clone)]
pub struct AuditArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}
