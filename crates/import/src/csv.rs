use chrono::{NaiveDate, NaiveDateTime};
use concord_core::{
    parse_timestamp, Amount, Category, LineAmounts, LineItem, MatchKey, ReferenceRecord,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

/// Header names of the marketplace statement table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineItemColumns {
    pub order_id: String,
    pub category: String,
    pub location: String,
    pub timestamp: String,
    pub order_value: String,
    pub discount: String,
    pub adjustment: String,
    pub commission: String,
    pub total_payable: String,
    pub delimiter: String,
}

impl Default for LineItemColumns {
    fn default() -> Self {
        Self {
            order_id: "order_number".to_string(),
            category: "accounting_category".to_string(),
            location: "mfc_name".to_string(),
            timestamp: "delivery_datetime_utc".to_string(),
            order_value: "order_value_gross".to_string(),
            discount: "marketing_offer_discount".to_string(),
            adjustment: "adjustment_gross".to_string(),
            commission: "commission_gross".to_string(),
            total_payable: "total_payable".to_string(),
            delimiter: ",".to_string(),
        }
    }
}

/// Header names of the warehouse order export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceColumns {
    pub reference_id: String,
    /// Marketplace order id as the warehouse stores it; normalized to a suffix on load.
    pub external_id: String,
    pub location: String,
    pub date: String,
    pub value: String,
    pub window_start: String,
    pub window_end: String,
    pub completed: String,
    pub delimiter: String,
}

impl Default for ReferenceColumns {
    fn default() -> Self {
        Self {
            reference_id: "gp_order_id".to_string(),
            external_id: "mp_order_id".to_string(),
            location: "location_name".to_string(),
            date: "created_at_day".to_string(),
            value: "post_promo_sales_inc_vat".to_string(),
            window_start: "created_at_timestamp".to_string(),
            window_end: "delivered_at_timestamp".to_string(),
            completed: "order_completed".to_string(),
            delimiter: ",".to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Missing required column: {0}")]
    MissingColumn(String),
    #[error("Row {row}: unknown accounting category {value:?}")]
    InvalidCategory { row: usize, value: String },
    #[error("Row {row}: invalid date {value:?}")]
    InvalidDate { row: usize, value: String },
    #[error("No data rows")]
    NoDataRows,
}

/// Column positions resolved from a header row.
struct Header {
    positions: HashMap<String, usize>,
}

impl Header {
    fn read<R: Read>(reader: &mut csv::Reader<R>) -> Result<Self, LoadError> {
        let positions = reader
            .headers()?
            .iter()
            .enumerate()
            .map(|(i, name)| (name.trim().to_string(), i))
            .collect();
        Ok(Self { positions })
    }

    fn required(&self, name: &str) -> Result<usize, LoadError> {
        self.positions
            .get(name)
            .copied()
            .ok_or_else(|| LoadError::MissingColumn(name.to_string()))
    }

    fn optional(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }
}

fn field<'r>(record: &'r csv::StringRecord, col: Option<usize>) -> &'r str {
    col.and_then(|c| record.get(c)).unwrap_or_default().trim()
}

fn reader_for<R: Read>(data: R, delimiter: &str) -> csv::Reader<R> {
    let delimiter = delimiter.as_bytes().first().copied().unwrap_or(b',');
    csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(data)
}

/// Reads a monetary cell, accepting currency symbols and accounting parentheses.
fn parse_amount(raw: &str) -> Amount {
    let s = raw.trim();
    let (negative, s) = match s.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        Some(inner) => (true, inner),
        None => (false, s),
    };
    let cleaned = s.replace(['$', '£', '€', ' '], "");
    match Amount::parse(&cleaned) {
        Amount::Value(m) if negative => Amount::Value(-m),
        other => other,
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    for fmt in &["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d", "%d-%m-%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Some(date);
        }
    }
    parse_timestamp(s).ok().map(|ts| ts.date())
}

fn parse_optional_timestamp(s: &str) -> Option<NaiveDateTime> {
    if s.is_empty() {
        return None;
    }
    parse_timestamp(s).ok()
}

fn parse_flag(s: &str) -> bool {
    matches!(
        s.trim().to_ascii_lowercase().as_str(),
        "1" | "1.0" | "true" | "yes" | "y" | "t"
    )
}

/// Loads the marketplace statement. Row ids are zero-based data-row positions.
///
/// Timestamps that cannot be read leave the row without one; the row is kept.
pub fn load_line_items<R: Read>(
    data: R,
    columns: &LineItemColumns,
) -> Result<Vec<LineItem>, LoadError> {
    let mut reader = reader_for(data, &columns.delimiter);
    let header = Header::read(&mut reader)?;

    let id_col = header.required(&columns.order_id)?;
    let category_col = header.required(&columns.category)?;
    let location_col = header.required(&columns.location)?;
    let timestamp_col = header.required(&columns.timestamp)?;
    let order_value_col = header.optional(&columns.order_value);
    let discount_col = header.optional(&columns.discount);
    let adjustment_col = header.optional(&columns.adjustment);
    let commission_col = header.optional(&columns.commission);
    let payable_col = header.optional(&columns.total_payable);

    let mut items = Vec::new();
    let mut bad_timestamps = 0usize;

    for (row, result) in reader.records().enumerate() {
        let record = result?;
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }

        let raw_category = field(&record, Some(category_col));
        let category: Category = raw_category.parse().map_err(|_| LoadError::InvalidCategory {
            row,
            value: raw_category.to_string(),
        })?;

        let raw_ts = field(&record, Some(timestamp_col));
        let event_timestamp = parse_optional_timestamp(raw_ts);
        if event_timestamp.is_none() {
            bad_timestamps += 1;
        }

        let external_order_id = field(&record, Some(id_col));
        items.push(LineItem {
            row_id: row,
            external_order_id: external_order_id
                .strip_suffix(".0")
                .unwrap_or(external_order_id)
                .to_string(),
            category,
            location_name: field(&record, Some(location_col)).to_string(),
            event_timestamp,
            amounts: LineAmounts {
                order_value: parse_amount(field(&record, order_value_col)),
                discount: parse_amount(field(&record, discount_col)),
                adjustment: parse_amount(field(&record, adjustment_col)),
                commission: parse_amount(field(&record, commission_col)),
                total_payable: parse_amount(field(&record, payable_col)),
            },
        });
    }

    if items.is_empty() {
        return Err(LoadError::NoDataRows);
    }
    if bad_timestamps > 0 {
        tracing::warn!(rows = bad_timestamps, "Rows without a usable timestamp");
    }
    tracing::info!(rows = items.len(), "Loaded marketplace rows");
    Ok(items)
}

/// Empty cells and the `nan` a spreadsheet export leaves in place of one.
fn is_blank_id(raw: &str) -> bool {
    raw.is_empty() || raw.eq_ignore_ascii_case("nan")
}

/// Loads the warehouse export.
///
/// The key date comes from the date column, falling back to the window start. Records with no
/// completion column are treated as completed. Rows with no order id or location cannot be keyed
/// and are skipped.
pub fn load_references<R: Read>(
    data: R,
    columns: &ReferenceColumns,
) -> Result<Vec<ReferenceRecord>, LoadError> {
    let mut reader = reader_for(data, &columns.delimiter);
    let header = Header::read(&mut reader)?;

    let id_col = header.required(&columns.reference_id)?;
    let external_col = header.required(&columns.external_id)?;
    let location_col = header.required(&columns.location)?;
    let value_col = header.required(&columns.value)?;
    let date_col = header.optional(&columns.date);
    let start_col = header.optional(&columns.window_start);
    let end_col = header.optional(&columns.window_end);
    let completed_col = header.optional(&columns.completed);
    if date_col.is_none() && start_col.is_none() {
        return Err(LoadError::MissingColumn(columns.date.clone()));
    }

    let mut records = Vec::new();
    let mut unparseable_values = 0usize;
    let mut unkeyed = 0usize;

    for (row, result) in reader.records().enumerate() {
        let record = result?;
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }

        let external_id = field(&record, Some(external_col));
        let location = field(&record, Some(location_col));
        if is_blank_id(external_id) || location.is_empty() {
            unkeyed += 1;
            continue;
        }

        let window_start = parse_optional_timestamp(field(&record, start_col));
        let window_end = parse_optional_timestamp(field(&record, end_col));
        let raw_date = field(&record, date_col);
        let date = parse_date(raw_date)
            .or_else(|| window_start.map(|ts| ts.date()))
            .ok_or_else(|| LoadError::InvalidDate {
                row,
                value: raw_date.to_string(),
            })?;

        let value = parse_amount(field(&record, Some(value_col)));
        if value.is_unparseable() {
            unparseable_values += 1;
        }

        records.push(ReferenceRecord {
            reference_id: field(&record, Some(id_col)).to_string(),
            match_key: MatchKey::new(external_id, location, date),
            value: value.value_or_zero(),
            window_start,
            window_end,
            completed: completed_col.map_or(true, |c| parse_flag(field(&record, Some(c)))),
        });
    }

    if unkeyed > 0 {
        tracing::warn!(rows = unkeyed, "Skipped warehouse rows without an order id or location");
    }
    if records.is_empty() {
        return Err(LoadError::NoDataRows);
    }
    if unparseable_values > 0 {
        tracing::warn!(rows = unparseable_values, "Unparseable reference values treated as zero");
    }
    tracing::info!(records = records.len(), "Loaded warehouse records");
    Ok(records)
}

pub fn load_line_items_from_path(
    path: &Path,
    columns: &LineItemColumns,
) -> Result<Vec<LineItem>, LoadError> {
    load_line_items(File::open(path)?, columns)
}

pub fn load_references_from_path(
    path: &Path,
    columns: &ReferenceColumns,
) -> Result<Vec<ReferenceRecord>, LoadError> {
    load_references(File::open(path)?, columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_core::Money;
    use std::io::Write;

    // ── parse_amount ──────────────────────────────────────────────────────────

    #[test]
    fn parse_amount_plain() {
        assert_eq!(parse_amount("123.45"), Amount::Value(Money::from_cents(12345)));
    }

    #[test]
    fn parse_amount_with_currency_and_commas() {
        assert_eq!(parse_amount("£1,234.56"), Amount::Value(Money::from_cents(123456)));
    }

    #[test]
    fn parse_amount_accounting_parens() {
        assert_eq!(parse_amount("(75.25)"), Amount::Value(Money::from_cents(-7525)));
    }

    #[test]
    fn parse_amount_blank_and_garbage() {
        assert_eq!(parse_amount(""), Amount::Missing);
        assert_eq!(parse_amount("NaN"), Amount::Missing);
        assert!(parse_amount("n/a").is_unparseable());
    }

    // ── parse_date / flags ────────────────────────────────────────────────────

    #[test]
    fn parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2025, 11, 3);
        assert_eq!(parse_date("2025-11-03"), expected);
        assert_eq!(parse_date("03/11/2025"), expected);
        assert_eq!(parse_date("2025-11-03 14:00:00"), expected);
        assert_eq!(parse_date("yesterday"), None);
    }

    #[test]
    fn completion_flags() {
        assert!(parse_flag("1"));
        assert!(parse_flag("True"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag(""));
    }

    // ── line items ────────────────────────────────────────────────────────────

    const STATEMENT: &str = "\
order_number,accounting_category,mfc_name,delivery_datetime_utc,order_value_gross,marketing_offer_discount,adjustment_gross
5550661234.0,Order Value & Commission,Leeds,2025-11-03 12:00:00,40.00,5.00,
5550661234,Additional Fees,Leeds,2025-11-20 09:00:00,,,-6.50
777,Additional Payments,Leeds,not-a-time,,,1.25
888,Order Value & Commission,Leeds,2025-11-04T08:30:00Z,twelve,,
";

    #[test]
    fn loads_statement_rows() {
        let items = load_line_items(STATEMENT.as_bytes(), &LineItemColumns::default()).unwrap();
        assert_eq!(items.len(), 4);

        let first = &items[0];
        assert_eq!(first.row_id, 0);
        assert_eq!(first.external_order_id, "5550661234");
        assert_eq!(first.category, Category::Order);
        assert_eq!(first.amounts.gross_order_value(), Money::from_cents(4500));

        assert_eq!(items[1].category, Category::FeeAdjustment);
        assert_eq!(items[1].amounts.adjustment.value_or_zero(), Money::from_cents(-650));

        assert!(items[2].event_timestamp.is_none());
        assert_eq!(items[3].amounts.unparseable_count(), 1);
        assert!(items[3].event_timestamp.is_some());
    }

    #[test]
    fn custom_column_names() {
        let data = "id;cat;store;when;value\n1234;Order;York;2025-11-03 10:00:00;9.99\n";
        let columns = LineItemColumns {
            order_id: "id".to_string(),
            category: "cat".to_string(),
            location: "store".to_string(),
            timestamp: "when".to_string(),
            order_value: "value".to_string(),
            delimiter: ";".to_string(),
            ..Default::default()
        };
        let items = load_line_items(data.as_bytes(), &columns).unwrap();
        assert_eq!(items[0].location_name, "York");
        assert_eq!(items[0].amounts.order_value, Amount::Value(Money::from_cents(999)));
        assert_eq!(items[0].amounts.discount, Amount::Missing);
    }

    #[test]
    fn missing_required_column() {
        let data = "order_number,mfc_name\n1,Leeds\n";
        let result = load_line_items(data.as_bytes(), &LineItemColumns::default());
        assert!(matches!(result, Err(LoadError::MissingColumn(c)) if c == "accounting_category"));
    }

    #[test]
    fn unknown_category_is_rejected() {
        let data = "order_number,accounting_category,mfc_name,delivery_datetime_utc\n1,Exclude,Leeds,2025-11-03\n";
        let result = load_line_items(data.as_bytes(), &LineItemColumns::default());
        assert!(matches!(result, Err(LoadError::InvalidCategory { row: 0, .. })));
    }

    #[test]
    fn header_only_is_no_data() {
        let data = "order_number,accounting_category,mfc_name,delivery_datetime_utc\n";
        let result = load_line_items(data.as_bytes(), &LineItemColumns::default());
        assert!(matches!(result, Err(LoadError::NoDataRows)));
    }

    // ── references ────────────────────────────────────────────────────────────

    const WAREHOUSE: &str = "\
gp_order_id,mp_order_id,location_name,created_at_day,post_promo_sales_inc_vat,created_at_timestamp,delivered_at_timestamp,order_completed
GP-1,1234.0,Leeds,2025-11-03,45.00,2025-11-03 11:30:00,2025-11-03 12:10:00,1
GP-2,0660,Leeds,,12.00,2025-11-04 09:00:00,2025-11-04 09:40:00,0
";

    #[test]
    fn skips_warehouse_rows_without_id_or_location() {
        let data = "\
gp_order_id,mp_order_id,location_name,created_at_day,post_promo_sales_inc_vat
GP-BLANK,,Leeds,2025-11-03,10.00
GP-NAN,nan,Leeds,2025-11-03,10.00
GP-NOLOC,1234,,2025-11-03,10.00
GP-OK,5550000,Leeds,2025-11-03,10.00
";
        let records = load_references(data.as_bytes(), &ReferenceColumns::default()).unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.reference_id.as_str()).collect();
        assert_eq!(ids, vec!["GP-OK"]);
        assert_eq!(records[0].match_key.id_suffix, "0");
    }

    #[test]
    fn only_unkeyed_warehouse_rows_is_no_data() {
        let data = "gp_order_id,mp_order_id,location_name,created_at_day,post_promo_sales_inc_vat\nGP-1,,Leeds,2025-11-03,1.00\n";
        let result = load_references(data.as_bytes(), &ReferenceColumns::default());
        assert!(matches!(result, Err(LoadError::NoDataRows)));
    }

    #[test]
    fn loads_warehouse_records() {
        let records = load_references(WAREHOUSE.as_bytes(), &ReferenceColumns::default()).unwrap();
        assert_eq!(records.len(), 2);

        let r = &records[0];
        assert_eq!(r.match_key.id_suffix, "1234");
        assert_eq!(r.value, Money::from_cents(4500));
        assert!(r.completed);
        assert!(r.has_window());

        let pending = &records[1];
        assert_eq!(pending.match_key.id_suffix, "660");
        assert_eq!(pending.match_key.date, NaiveDate::from_ymd_opt(2025, 11, 4).unwrap());
        assert!(!pending.completed);
    }

    #[test]
    fn reference_without_any_date_is_rejected() {
        let data = "gp_order_id,mp_order_id,location_name,created_at_day,post_promo_sales_inc_vat\nGP-1,1234,Leeds,,5.00\n";
        let result = load_references(data.as_bytes(), &ReferenceColumns::default());
        assert!(matches!(result, Err(LoadError::InvalidDate { row: 0, .. })));
    }

    #[test]
    fn loads_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(WAREHOUSE.as_bytes()).unwrap();
        let records = load_references_from_path(file.path(), &ReferenceColumns::default()).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn missing_file_is_io_error() {
        let result = load_line_items_from_path(
            Path::new("/nonexistent/statement.csv"),
            &LineItemColumns::default(),
        );
        assert!(matches!(result, Err(LoadError::Io(_))));
    }
}
