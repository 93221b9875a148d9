use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDateTime;
use concord_core::{Category, LineItem, MatchKey, Money};
use serde::Serialize;

/// One marketplace order with its fee adjustments folded in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregatedOrder {
    pub order_id: String,
    /// `None` when the originating row had no usable timestamp.
    pub match_key: Option<MatchKey>,
    pub event_timestamp: Option<NaiveDateTime>,
    /// Row id of the originating Order row; the tie-break for resolution order.
    pub first_row_id: usize,
    pub gross_value: Money,
    pub adjustment_total: Money,
    pub net_value: Money,
    pub has_adjustment: bool,
    /// All rows sharing the order id, whatever their category.
    pub linked_row_count: usize,
}

/// Output of the aggregation step for one statement period.
#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    /// In order of first appearance.
    pub orders: Vec<AggregatedOrder>,
    by_id: HashMap<String, usize>,
    /// Ids that only carry adjustment rows.
    pub standalone_ids: BTreeSet<String>,
    /// Fee adjustments on standalone ids; never part of any order's net value.
    pub standalone_fee_total: Money,
    pub order_rows: usize,
    pub fee_rows: usize,
    pub payment_rows: usize,
    pub unparseable_fields: usize,
}

impl Aggregation {
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn get(&self, order_id: &str) -> Option<&AggregatedOrder> {
        self.by_id.get(order_id.trim()).map(|&i| &self.orders[i])
    }

    pub fn is_standalone(&self, order_id: &str) -> bool {
        self.standalone_ids.contains(order_id.trim())
    }

    pub fn orders_with_adjustments(&self) -> usize {
        self.orders.iter().filter(|o| o.has_adjustment).count()
    }

    pub fn orders_without_key(&self) -> usize {
        self.orders.iter().filter(|o| o.match_key.is_none()).count()
    }
}

/// Collapses raw rows into one net value per order.
///
/// Fee adjustments change the order's net value; payment adjustments belong to a different
/// settlement channel and are only counted. Ids with adjustments but no Order row are recorded
/// as standalone and never become orders.
pub fn aggregate(items: &[LineItem]) -> Aggregation {
    let mut agg = Aggregation::default();
    let mut fee_by_id: HashMap<&str, Money> = HashMap::new();
    let mut rows_by_id: HashMap<&str, usize> = HashMap::new();

    for item in items {
        let id = item.external_order_id.trim();
        agg.unparseable_fields += item.amounts.unparseable_count();
        *rows_by_id.entry(id).or_default() += 1;

        match item.category {
            Category::Order => {
                agg.order_rows += 1;
                fold_order_row(&mut agg, id, item);
            }
            Category::FeeAdjustment => {
                agg.fee_rows += 1;
                let entry = fee_by_id.entry(id).or_insert_with(Money::zero);
                *entry = *entry + item.amounts.adjustment.value_or_zero();
            }
            Category::PaymentAdjustment => {
                agg.payment_rows += 1;
            }
        }
    }

    for order in &mut agg.orders {
        let adjustment = fee_by_id
            .get(order.order_id.as_str())
            .copied()
            .unwrap_or_else(Money::zero);
        order.adjustment_total = adjustment;
        order.net_value = order.gross_value + adjustment;
        order.has_adjustment = !adjustment.is_zero();
        order.linked_row_count = rows_by_id.get(order.order_id.as_str()).copied().unwrap_or(0);
    }

    for (&id, &total) in &fee_by_id {
        if !agg.by_id.contains_key(id) {
            agg.standalone_fee_total = agg.standalone_fee_total + total;
        }
    }
    for item in items {
        let id = item.external_order_id.trim();
        if item.category != Category::Order && !agg.by_id.contains_key(id) {
            agg.standalone_ids.insert(id.to_string());
        }
    }

    agg
}

fn fold_order_row(agg: &mut Aggregation, id: &str, item: &LineItem) {
    let gross = item.amounts.gross_order_value();
    if let Some(&i) = agg.by_id.get(id) {
        // Repeated Order row: values add up, the earliest row keeps the key.
        let order = &mut agg.orders[i];
        order.gross_value = order.gross_value + gross;
        if originates_before(item, order) {
            order.event_timestamp = item.event_timestamp;
            order.match_key = key_for(item);
            order.first_row_id = item.row_id;
        }
        return;
    }

    agg.by_id.insert(id.to_string(), agg.orders.len());
    agg.orders.push(AggregatedOrder {
        order_id: id.to_string(),
        match_key: key_for(item),
        event_timestamp: item.event_timestamp,
        first_row_id: item.row_id,
        gross_value: gross,
        adjustment_total: Money::zero(),
        net_value: gross,
        has_adjustment: false,
        linked_row_count: 0,
    });
}

fn originates_before(item: &LineItem, order: &AggregatedOrder) -> bool {
    match (item.event_timestamp, order.event_timestamp) {
        (Some(a), Some(b)) => (a, item.row_id) < (b, order.first_row_id),
        (Some(_), None) => true,
        (None, Some(_)) => false,
        (None, None) => item.row_id < order.first_row_id,
    }
}

fn key_for(item: &LineItem) -> Option<MatchKey> {
    let date = item.event_date()?;
    Some(MatchKey::new(&item.external_order_id, &item.location_name, date))
}
