use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::Context;
use concord_core::Amount;
use concord_recon::audit::{CollisionRisk, PriorPeriodFinding, VarianceProfile};
use concord_recon::{ClassifiedLineItem, ReconSummary};
use serde::Serialize;

const ROW_HEADER: [&str; 21] = [
    "row_id",
    "order_id",
    "accounting_category",
    "location_name",
    "event_timestamp",
    "order_value",
    "discount",
    "adjustment",
    "commission",
    "total_payable",
    "order_category",
    "match_status",
    "match_confidence",
    "matched_reference_id",
    "reference_value",
    "cross_window",
    "gross_value",
    "adjustment_total",
    "net_value",
    "variance",
    "variance_class",
];

fn amount_cell(amount: &Amount) -> String {
    match amount {
        Amount::Value(m) => m.to_string(),
        Amount::Missing => String::new(),
        Amount::Unparseable(raw) => raw.clone(),
    }
}

/// Writes one CSV line per annotated row, in input order.
pub fn write_rows<W: Write>(writer: W, rows: &[ClassifiedLineItem]) -> anyhow::Result<()> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(ROW_HEADER)?;
    for row in rows {
        let a = &row.annotated;
        let item = &a.item;
        out.write_record([
            item.row_id.to_string(),
            item.external_order_id.clone(),
            item.category.to_string(),
            item.location_name.clone(),
            item.event_timestamp
                .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_default(),
            amount_cell(&item.amounts.order_value),
            amount_cell(&item.amounts.discount),
            amount_cell(&item.amounts.adjustment),
            amount_cell(&item.amounts.commission),
            amount_cell(&item.amounts.total_payable),
            a.order_category.to_string(),
            a.match_status.to_string(),
            a.match_confidence.to_string(),
            a.matched_reference_id.clone().unwrap_or_default(),
            a.reference_value.map(|v| v.to_string()).unwrap_or_default(),
            a.cross_window.to_string(),
            a.gross_value.to_string(),
            a.adjustment_total.to_string(),
            a.net_value.to_string(),
            row.variance.to_string(),
            row.variance_label().to_string(),
        ])?;
    }
    out.flush()?;
    Ok(())
}

pub fn write_rows_to_path(path: &Path, rows: &[ClassifiedLineItem]) -> anyhow::Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    write_rows(file, rows).with_context(|| format!("writing {}", path.display()))
}

pub fn write_summary(path: &Path, summary: &ReconSummary) -> anyhow::Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(file, summary)
        .with_context(|| format!("writing {}", path.display()))
}

/// Plain-text digest of a run for the terminal.
pub fn print_summary(summary: &ReconSummary) {
    if summary.no_orders {
        println!("No order rows in {} line items; nothing matched.", summary.line_items);
        return;
    }
    println!("Run {}", summary.run_id);
    println!(
        "  Orders: {}  matched: {}  no reference: {}  unresolved: {}  ({:.1}%)",
        summary.orders,
        summary.status.matched,
        summary.status.no_reference,
        summary.status.unresolved,
        summary.status.match_rate()
    );
    for (status, count) in &summary.status_counts {
        println!("    {status:<22} {count:>7}");
    }
    println!("  Variance (matched orders):");
    for (class, count) in &summary.variance_counts {
        println!("    {:<22} {count:>7}", class.label());
    }
    let t = &summary.totals;
    println!(
        "  Net {}  matched net {}  matched reference {}  variance {}",
        t.net_value, t.matched_net_value, t.matched_reference_value, t.total_variance
    );
    if !t.standalone_adjustments.is_zero() {
        println!("  Standalone adjustments (excluded): {}", t.standalone_adjustments);
    }
    if summary.review_flagged > 0 {
        println!("  Flagged for review: {}", summary.review_flagged);
    }
}

#[derive(Debug, Serialize)]
pub struct AuditReport {
    pub collision_risk: CollisionRisk,
    pub variance_profile: VarianceProfile,
    pub prior_period: Vec<PriorPeriodFinding>,
}

impl AuditReport {
    pub fn print(&self) {
        let risk = &self.collision_risk;
        println!("Collision risk");
        println!("  Duplicate warehouse keys: {}", risk.reference_duplicate_keys.len());
        println!("  Duplicate statement keys: {}", risk.order_duplicate_keys.len());
        println!("  Rows with blank or zero order id: {}", risk.zero_order_ids);

        let profile = &self.variance_profile;
        println!("Variance profile ({} matches with variance)", profile.with_variance);
        if let (Some(mean), Some(median)) = (profile.mean, profile.median) {
            println!("  Mean {mean}  median {median}");
        }
        for bin in &profile.bins {
            println!("  {:>8}: {:>6}", bin.label, bin.count);
        }

        println!("Prior period lookup ({} checked)", self.prior_period.len());
        for finding in &self.prior_period {
            let closest = finding
                .closest
                .as_ref()
                .map(|c| format!("{} on {} ({})", c.reference_id, c.date, c.value))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "  {:<16} {:>6}%  {:?}  closest {}",
                finding.order_id, finding.variance_pct, finding.verdict, closest
            );
        }
    }
}
