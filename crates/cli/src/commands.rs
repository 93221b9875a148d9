use anyhow::{bail, Context};
use chrono::{Days, NaiveDate};
use concord_core::{AccountingPeriod, DateRange, LineItem, ReferenceRecord};
use concord_import::{load_line_items_from_path, load_references_from_path};
use concord_recon::audit::{collision_risk, prior_period_lookup, variance_profile};
use concord_recon::{aggregate, Reconciler, TracingSink};

use crate::cli::{AuditArgs, InputArgs, ReconcileArgs};
use crate::config::AppConfig;
use crate::report::{self, AuditReport};

fn load_inputs(
    input: &InputArgs,
    config: &AppConfig,
) -> anyhow::Result<(Vec<LineItem>, Vec<ReferenceRecord>)> {
    let items = load_line_items_from_path(&input.orders, &config.orders)
        .with_context(|| format!("loading statement {}", input.orders.display()))?;
    let references = load_references_from_path(&input.reference, &config.reference)
        .with_context(|| format!("loading warehouse records {}", input.reference.display()))?;
    Ok((items, references))
}

/// Date a warehouse record belongs to for period filtering.
fn record_date(record: &ReferenceRecord) -> NaiveDate {
    record
        .window_start
        .map(|ts| ts.date())
        .unwrap_or(record.match_key.date)
}

/// First and last event dates on the statement.
fn statement_range(items: &[LineItem]) -> Option<DateRange> {
    let mut dates = items.iter().filter_map(LineItem::event_date);
    let first = dates.next()?;
    let (start, end) = dates.fold((first, first), |(lo, hi), d| (lo.min(d), hi.max(d)));
    Some(DateRange::new(start, end))
}

/// Keeps warehouse records dated inside the accounting period, plus the day before it so orders
/// on the first day can still fall back across midnight.
fn filter_to_period(
    references: Vec<ReferenceRecord>,
    items: &[LineItem],
    accounting: DateRange,
) -> Vec<ReferenceRecord> {
    if let Some(statement) = statement_range(items) {
        match AccountingPeriod::new(accounting, statement).accrual_range() {
            Some(accrual) => tracing::info!(
                statement = %statement,
                accrual = %accrual,
                "Statement ends before the accounting period; days after it need accruing"
            ),
            None => tracing::debug!(statement = %statement, "Statement covers the accounting period"),
        }
    }

    let window = DateRange::new(
        accounting
            .start
            .checked_sub_days(Days::new(1))
            .unwrap_or(accounting.start),
        accounting.end,
    );
    let before = references.len();
    let kept: Vec<ReferenceRecord> = references
        .into_iter()
        .filter(|r| window.contains(record_date(r)))
        .collect();
    tracing::info!(
        period = %accounting,
        kept = kept.len(),
        excluded = before - kept.len(),
        "Filtered warehouse records to accounting period"
    );
    kept
}

pub fn reconcile(args: ReconcileArgs) -> anyhow::Result<()> {
    let period = match (args.period_start, args.period_end) {
        (Some(start), Some(end)) if start > end => {
            bail!("period start {start} is after period end {end}")
        }
        (Some(start), Some(end)) => Some(DateRange::new(start, end)),
        _ => None,
    };
    let config = AppConfig::load(args.input.config.as_deref())?;
    let (items, mut references) = load_inputs(&args.input, &config)?;
    if let Some(accounting) = period {
        references = filter_to_period(references, &items, accounting);
    }

    let sink = TracingSink;
    let result = Reconciler::new(config.matching.clone())
        .with_sink(&sink)
        .run(&items, &references)
        .context("reconciliation failed")?;
    result.summary.log();

    if let Some(path) = &args.out {
        report::write_rows_to_path(path, &result.rows)?;
        tracing::info!(path = %path.display(), rows = result.rows.len(), "Wrote annotated rows");
    }
    if let Some(path) = &args.summary {
        report::write_summary(path, &result.summary)?;
        tracing::info!(path = %path.display(), "Wrote run summary");
    }
    report::print_summary(&result.summary);
    Ok(())
}

pub fn audit(args: AuditArgs) -> anyhow::Result<()> {
    let config = AppConfig::load(args.input.config.as_deref())?;
    let (items, references) = load_inputs(&args.input, &config)?;

    let result = Reconciler::new(config.matching.clone())
        .run(&items, &references)
        .context("reconciliation failed")?;
    let aggregation = aggregate(&items);

    let report = AuditReport {
        collision_risk: collision_risk(&items, &aggregation, &references),
        variance_profile: variance_profile(&result.outcomes),
        prior_period: prior_period_lookup(
            &aggregation,
            &result.outcomes,
            &references,
            config.audit.prior_period_threshold_pct,
        ),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        report.print();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_core::{Category, LineAmounts, MatchKey, Money};
    use std::io::Write;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 11, day).unwrap()
    }

    fn record(id: &str, day: u32) -> ReferenceRecord {
        ReferenceRecord {
            reference_id: id.to_string(),
            match_key: MatchKey::new("1234", "Leeds", d(day)),
            value: Money::from_cents(100),
            window_start: None,
            window_end: None,
            completed: true,
        }
    }

    fn item(day: u32) -> LineItem {
        LineItem {
            row_id: 0,
            external_order_id: "1234".to_string(),
            category: Category::Order,
            location_name: "Leeds".to_string(),
            event_timestamp: d(day).and_hms_opt(10, 0, 0),
            amounts: LineAmounts::default(),
        }
    }

    #[test]
    fn period_filter_keeps_lead_day() {
        let refs = vec![record("early", 1), record("lead", 9), record("in", 10), record("late", 21)];
        let kept = filter_to_period(refs, &[item(12)], DateRange::new(d(10), d(20)));
        let ids: Vec<_> = kept.iter().map(|r| r.reference_id.as_str()).collect();
        assert_eq!(ids, vec!["lead", "in"]);
    }

    #[test]
    fn period_filter_prefers_window_start() {
        let mut r = record("r", 30);
        r.window_start = d(15).and_hms_opt(9, 0, 0);
        let kept = filter_to_period(vec![r], &[], DateRange::new(d(10), d(20)));
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn statement_range_spans_items() {
        let mut undated = item(1);
        undated.event_timestamp = None;
        let range = statement_range(&[item(7), undated, item(3), item(5)]).unwrap();
        assert_eq!(range, DateRange::new(d(3), d(7)));
        assert!(statement_range(&[]).is_none());
    }

    #[test]
    fn reconcile_command_writes_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let orders = dir.path().join("orders.csv");
        let reference = dir.path().join("reference.csv");
        let out = dir.path().join("rows.csv");
        let summary = dir.path().join("summary.json");

        let mut f = std::fs::File::create(&orders).unwrap();
        writeln!(f, "order_number,accounting_category,mfc_name,delivery_datetime_utc,order_value_gross").unwrap();
        writeln!(f, "9991234,Order Value & Commission,Leeds,2025-11-03 12:00:00,45.00").unwrap();
        let mut f = std::fs::File::create(&reference).unwrap();
        writeln!(f, "gp_order_id,mp_order_id,location_name,created_at_day,post_promo_sales_inc_vat").unwrap();
        writeln!(f, "GP-1,1234,Leeds,2025-11-03,45.00").unwrap();

        reconcile(ReconcileArgs {
            input: InputArgs {
                orders,
                reference,
                config: None,
            },
            out: Some(out.clone()),
            summary: Some(summary.clone()),
            period_start: None,
            period_end: None,
        })
        .unwrap();

        let rows = std::fs::read_to_string(&out).unwrap();
        assert!(rows.contains("GP-1"));
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&summary).unwrap()).unwrap();
        assert_eq!(json["status"]["matched"], 1);
    }

    #[test]
    fn reversed_period_is_rejected() {
        let args = ReconcileArgs {
            input: InputArgs {
                orders: "/nonexistent/orders.csv".into(),
                reference: "/nonexistent/reference.csv".into(),
                config: None,
            },
            out: None,
            summary: None,
            period_start: Some(d(20)),
            period_end: Some(d(10)),
        };
        assert!(reconcile(args).is_err());
    }
}
