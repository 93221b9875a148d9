use std::collections::HashMap;
use std::fmt;

use concord_core::{Category, LineItem, Money};
use serde::{Serialize, Serializer};

use crate::aggregate::{AggregatedOrder, Aggregation};
use crate::resolver::{MatchConfidence, MatchOutcome, MatchStatus};

/// Where a raw row ended up relative to the matching run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum OrderCategory {
    #[serde(rename = "Matched")]
    Matched,
    #[serde(rename = "Matched (Grouped)")]
    MatchedGrouped,
    #[serde(rename = "Linked to Order")]
    LinkedToOrder,
    #[serde(rename = "Not Matched")]
    NotMatched,
    #[serde(rename = "Linked to Unmatched")]
    LinkedToUnmatched,
    #[serde(rename = "Standalone Adjustment")]
    StandaloneAdjustment,
    #[serde(rename = "No Orders")]
    NoOrders,
}

impl OrderCategory {
    pub fn label(self) -> &'static str {
        match self {
            OrderCategory::Matched => "Matched",
            OrderCategory::MatchedGrouped => "Matched (Grouped)",
            OrderCategory::LinkedToOrder => "Linked to Order",
            OrderCategory::NotMatched => "Not Matched",
            OrderCategory::LinkedToUnmatched => "Linked to Unmatched",
            OrderCategory::StandaloneAdjustment => "Standalone Adjustment",
            OrderCategory::NoOrders => "No Orders",
        }
    }

    /// Order rows that were paired with a reference.
    pub fn is_matched(self) -> bool {
        matches!(self, OrderCategory::Matched | OrderCategory::MatchedGrouped)
    }

    /// Rows that take part in the run's financial totals.
    pub fn counts_toward_totals(self) -> bool {
        !matches!(self, OrderCategory::StandaloneAdjustment | OrderCategory::NoOrders)
    }
}

impl fmt::Display for OrderCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-row status: an order's outcome, `LINKED` for adjustments on a matched order, or `N/A`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStatus {
    Outcome(MatchStatus),
    Linked,
    NotApplicable,
}

impl fmt::Display for RowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowStatus::Outcome(status) => fmt::Display::fmt(status, f),
            RowStatus::Linked => f.write_str("LINKED"),
            RowStatus::NotApplicable => f.write_str("N/A"),
        }
    }
}

impl Serialize for RowStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowConfidence {
    Outcome(MatchConfidence),
    Inherited,
    NotApplicable,
}

impl fmt::Display for RowConfidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowConfidence::Outcome(confidence) => fmt::Display::fmt(confidence, f),
            RowConfidence::Inherited => f.write_str("Inherited"),
            RowConfidence::NotApplicable => f.write_str("N/A"),
        }
    }
}

impl Serialize for RowConfidence {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A raw row plus what the run decided about its order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotatedLineItem {
    #[serde(flatten)]
    pub item: LineItem,
    pub order_category: OrderCategory,
    pub match_status: RowStatus,
    pub match_confidence: RowConfidence,
    pub matched_reference_id: Option<String>,
    pub reference_value: Option<Money>,
    pub cross_window: bool,
    pub gross_value: Money,
    pub adjustment_total: Money,
    pub net_value: Money,
}

impl AnnotatedLineItem {
    pub fn order_id(&self) -> &str {
        self.item.external_order_id.trim()
    }

    fn unattached(item: &LineItem, order_category: OrderCategory) -> Self {
        AnnotatedLineItem {
            item: item.clone(),
            order_category,
            match_status: RowStatus::NotApplicable,
            match_confidence: RowConfidence::NotApplicable,
            matched_reference_id: None,
            reference_value: None,
            cross_window: false,
            gross_value: Money::zero(),
            adjustment_total: Money::zero(),
            net_value: Money::zero(),
        }
    }

    fn attached(item: &LineItem, order: &AggregatedOrder, outcome: Option<&MatchOutcome>) -> Self {
        let matched = outcome.is_some_and(|o| o.status.is_matched());
        let is_order_row = item.category == Category::Order;

        let (order_category, match_status, match_confidence) = match (is_order_row, matched, outcome) {
            (true, true, Some(o)) => (
                if order.has_adjustment {
                    OrderCategory::MatchedGrouped
                } else {
                    OrderCategory::Matched
                },
                RowStatus::Outcome(o.status),
                RowConfidence::Outcome(o.confidence),
            ),
            (false, true, _) => (
                OrderCategory::LinkedToOrder,
                RowStatus::Linked,
                RowConfidence::Inherited,
            ),
            (true, _, Some(o)) => (
                OrderCategory::NotMatched,
                RowStatus::Outcome(o.status),
                RowConfidence::Outcome(o.confidence),
            ),
            (false, _, Some(o)) => (
                OrderCategory::LinkedToUnmatched,
                RowStatus::Outcome(o.status),
                RowConfidence::Outcome(o.confidence),
            ),
            (true, _, None) => (
                OrderCategory::NotMatched,
                RowStatus::NotApplicable,
                RowConfidence::NotApplicable,
            ),
            (false, _, None) => (
                OrderCategory::LinkedToUnmatched,
                RowStatus::NotApplicable,
                RowConfidence::NotApplicable,
            ),
        };

        let matched_outcome = outcome.filter(|o| o.status.is_matched());
        AnnotatedLineItem {
            item: item.clone(),
            order_category,
            match_status,
            match_confidence,
            matched_reference_id: matched_outcome.and_then(|o| o.matched_reference_id.clone()),
            reference_value: matched_outcome.and_then(|o| o.reference_value),
            cross_window: matched_outcome.is_some_and(|o| o.cross_window),
            gross_value: order.gross_value,
            adjustment_total: order.adjustment_total,
            net_value: order.net_value,
        }
    }
}

/// Annotates every input row, in input order, with its order's outcome.
///
/// Adjustment rows inherit from the order sharing their id and are never matched on their own.
pub fn propagate(
    items: &[LineItem],
    aggregation: &Aggregation,
    outcomes: &[MatchOutcome],
) -> Vec<AnnotatedLineItem> {
    if aggregation.is_empty() {
        return items
            .iter()
            .map(|item| AnnotatedLineItem::unattached(item, OrderCategory::NoOrders))
            .collect();
    }

    let by_order: HashMap<&str, &MatchOutcome> =
        outcomes.iter().map(|o| (o.order_id.as_str(), o)).collect();

    items
        .iter()
        .map(|item| {
            let id = item.external_order_id.trim();
            match aggregation.get(id) {
                Some(order) => AnnotatedLineItem::attached(item, order, by_order.get(id).copied()),
                None => AnnotatedLineItem::unattached(item, OrderCategory::StandaloneAdjustment),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;
    use crate::resolver::Confidence;
    use chrono::NaiveDate;
    use concord_core::{Amount, LineAmounts};

    fn row(row_id: usize, id: &str, category: Category, cents: i64) -> LineItem {
        let mut amounts = LineAmounts::default();
        match category {
            Category::Order => amounts.order_value = Amount::Value(Money::from_cents(cents)),
            _ => amounts.adjustment = Amount::Value(Money::from_cents(cents)),
        }
        LineItem {
            row_id,
            external_order_id: id.to_string(),
            category,
            location_name: "StoreA".to_string(),
            event_timestamp: NaiveDate::from_ymd_opt(2025, 11, 3)
                .unwrap()
                .and_hms_opt(12, 0, 0),
            amounts,
        }
    }

    fn outcome(order_id: &str, status: MatchStatus, reference: Option<(&str, i64)>) -> MatchOutcome {
        MatchOutcome {
            order_id: order_id.to_string(),
            status,
            confidence: MatchConfidence {
                level: Confidence::from(status),
                review: false,
            },
            matched_reference_id: reference.map(|(id, _)| id.to_string()),
            reference_value: reference.map(|(_, c)| Money::from_cents(c)),
            variance: None,
            cross_window: false,
            unresolved_reason: None,
        }
    }

    #[test]
    fn linked_fee_row_inherits_matched_parent() {
        let items = vec![
            row(0, "A1", Category::Order, 9000),
            row(1, "A1", Category::FeeAdjustment, -500),
        ];
        let agg = aggregate(&items);
        let outcomes = vec![outcome("A1", MatchStatus::Matched, Some(("R1", 8500)))];
        let rows = propagate(&items, &agg, &outcomes);

        assert_eq!(rows[0].order_category, OrderCategory::MatchedGrouped);
        assert_eq!(rows[0].match_status.to_string(), "MATCHED");
        assert_eq!(rows[0].match_confidence.to_string(), "High");

        assert_eq!(rows[1].order_category, OrderCategory::LinkedToOrder);
        assert_eq!(rows[1].match_status.to_string(), "LINKED");
        assert_eq!(rows[1].match_confidence.to_string(), "Inherited");
        assert_eq!(rows[1].matched_reference_id.as_deref(), Some("R1"));
        assert_eq!(rows[1].net_value, Money::from_cents(8500));
    }

    #[test]
    fn linked_row_on_unmatched_parent_copies_status() {
        let items = vec![
            row(0, "A1", Category::Order, 9000),
            row(1, "A1", Category::PaymentAdjustment, 300),
        ];
        let agg = aggregate(&items);
        let outcomes = vec![outcome("A1", MatchStatus::UnresolvedCollision, None)];
        let rows = propagate(&items, &agg, &outcomes);

        assert_eq!(rows[0].order_category, OrderCategory::NotMatched);
        assert_eq!(rows[1].order_category, OrderCategory::LinkedToUnmatched);
        assert_eq!(rows[1].match_status.to_string(), "UNRESOLVED_COLLISION");
        assert_eq!(rows[1].match_confidence.to_string(), "Ambiguous");
        assert!(rows[1].matched_reference_id.is_none());
    }

    #[test]
    fn plain_order_is_matched_not_grouped() {
        let items = vec![row(0, "A1", Category::Order, 9000)];
        let agg = aggregate(&items);
        let outcomes = vec![outcome("A1", MatchStatus::MatchedByValue, Some(("R1", 9000)))];
        let rows = propagate(&items, &agg, &outcomes);
        assert_eq!(rows[0].order_category, OrderCategory::Matched);
        assert_eq!(rows[0].match_confidence.to_string(), "Low (Value)");
    }

    #[test]
    fn standalone_rows_are_zeroed() {
        let items = vec![
            row(0, "A1", Category::Order, 9000),
            row(1, "ZZ", Category::FeeAdjustment, -500),
        ];
        let agg = aggregate(&items);
        let rows = propagate(&items, &agg, &[outcome("A1", MatchStatus::NoReference, None)]);
        let standalone = &rows[1];
        assert_eq!(standalone.order_category, OrderCategory::StandaloneAdjustment);
        assert_eq!(standalone.match_status, RowStatus::NotApplicable);
        assert_eq!(standalone.net_value, Money::zero());
        assert!(!standalone.order_category.counts_toward_totals());
    }

    #[test]
    fn every_row_is_no_orders_when_there_are_none() {
        let items = vec![row(0, "A1", Category::FeeAdjustment, -500)];
        let agg = aggregate(&items);
        let rows = propagate(&items, &agg, &[]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].order_category, OrderCategory::NoOrders);
        assert_eq!(rows[0].match_confidence.to_string(), "N/A");
    }

    #[test]
    fn categories_serialize_as_labels() {
        let json = serde_json::to_value(OrderCategory::MatchedGrouped).unwrap();
        assert_eq!(json, "Matched (Grouped)");
        let json = serde_json::to_value(RowStatus::Linked).unwrap();
        assert_eq!(json, "LINKED");
    }
}
