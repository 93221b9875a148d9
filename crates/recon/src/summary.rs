use std::collections::{BTreeMap, HashSet};

use concord_core::Money;
use serde::Serialize;
use uuid::Uuid;

use crate::aggregate::Aggregation;
use crate::classify::{ClassifiedLineItem, VarianceClass, VarianceThresholds};
use crate::index::IndexStats;
use crate::propagate::OrderCategory;
use crate::resolver::{MatchOutcome, MatchStatus};

/// Matched / no-reference / unresolved split over a set of outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub matched: usize,
    pub no_reference: usize,
    pub unresolved: usize,
}

impl StatusCounts {
    pub fn from_outcomes(outcomes: &[MatchOutcome]) -> Self {
        let mut counts = StatusCounts::default();
        for outcome in outcomes {
            match outcome.status {
                MatchStatus::NoReference => counts.no_reference += 1,
                MatchStatus::UnresolvedCollision => counts.unresolved += 1,
                _ => counts.matched += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.matched + self.no_reference + self.unresolved
    }

    /// Share of orders matched, as a percentage.
    pub fn match_rate(&self) -> f64 {
        if self.total() == 0 {
            return 0.0;
        }
        self.matched as f64 / self.total() as f64 * 100.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FinancialTotals {
    pub gross_value: Money,
    pub adjustment_total: Money,
    pub net_value: Money,
    /// Net value of matched orders only.
    pub matched_net_value: Money,
    pub matched_reference_value: Money,
    pub total_variance: Money,
    /// Fee adjustments with no order to attach to. Not part of `net_value`.
    pub standalone_adjustments: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconSummary {
    pub run_id: Uuid,
    pub no_orders: bool,
    pub line_items: usize,
    pub orders: usize,
    pub orders_with_adjustments: usize,
    pub orders_without_key: usize,
    pub standalone_ids: usize,
    pub unparseable_fields: usize,
    pub status: StatusCounts,
    pub status_counts: BTreeMap<MatchStatus, usize>,
    pub category_counts: BTreeMap<OrderCategory, usize>,
    /// Counted per matched order, not per row.
    pub variance_counts: BTreeMap<VarianceClass, usize>,
    pub review_flagged: usize,
    pub references_claimed: usize,
    pub unresolved_orders: Vec<String>,
    pub index: IndexStats,
    pub totals: FinancialTotals,
}

impl ReconSummary {
    pub fn build(
        run_id: Uuid,
        aggregation: &Aggregation,
        outcomes: &[MatchOutcome],
        rows: &[ClassifiedLineItem],
        index: IndexStats,
        references_claimed: usize,
        thresholds: &VarianceThresholds,
    ) -> Self {
        let mut status_counts = BTreeMap::new();
        let mut variance_counts = BTreeMap::new();
        let mut totals = FinancialTotals {
            standalone_adjustments: aggregation.standalone_fee_total,
            ..Default::default()
        };

        for outcome in outcomes {
            *status_counts.entry(outcome.status).or_insert(0) += 1;
            if let (Some(variance), Some(reference)) = (outcome.variance, outcome.reference_value) {
                *variance_counts.entry(thresholds.classify(variance)).or_insert(0) += 1;
                totals.matched_reference_value = totals.matched_reference_value + reference;
                totals.total_variance = totals.total_variance + variance;
            }
        }

        for order in &aggregation.orders {
            totals.gross_value = totals.gross_value + order.gross_value;
            totals.adjustment_total = totals.adjustment_total + order.adjustment_total;
            totals.net_value = totals.net_value + order.net_value;
        }
        let matched_ids: HashSet<&str> = outcomes
            .iter()
            .filter(|o| o.status.is_matched())
            .map(|o| o.order_id.as_str())
            .collect();
        totals.matched_net_value = aggregation
            .orders
            .iter()
            .filter(|o| matched_ids.contains(o.order_id.as_str()))
            .map(|o| o.net_value)
            .sum();

        let mut category_counts = BTreeMap::new();
        for row in rows {
            *category_counts.entry(row.annotated.order_category).or_insert(0) += 1;
        }

        ReconSummary {
            run_id,
            no_orders: aggregation.is_empty(),
            line_items: rows.len(),
            orders: aggregation.orders.len(),
            orders_with_adjustments: aggregation.orders_with_adjustments(),
            orders_without_key: aggregation.orders_without_key(),
            standalone_ids: aggregation.standalone_ids.len(),
            unparseable_fields: aggregation.unparseable_fields,
            status: StatusCounts::from_outcomes(outcomes),
            status_counts,
            category_counts,
            variance_counts,
            review_flagged: outcomes.iter().filter(|o| o.needs_review()).count(),
            references_claimed,
            unresolved_orders: outcomes
                .iter()
                .filter(|o| o.status == MatchStatus::UnresolvedCollision)
                .map(|o| o.order_id.clone())
                .collect(),
            index,
            totals,
        }
    }

    /// Writes the summary to the log at info level.
    pub fn log(&self) {
        if self.no_orders {
            tracing::warn!(run_id = %self.run_id, line_items = self.line_items, "No orders to reconcile");
            return;
        }
        tracing::info!(
            run_id = %self.run_id,
            orders = self.orders,
            matched = self.status.matched,
            no_reference = self.status.no_reference,
            unresolved = self.status.unresolved,
            match_rate = %format!("{:.1}%", self.status.match_rate()),
            "Match results"
        );
        for (status, count) in &self.status_counts {
            tracing::info!(status = %status, count, "Orders by status");
        }
        for (class, count) in &self.variance_counts {
            tracing::info!(class = %class, count, "Matched orders by variance");
        }
        tracing::info!(
            gross = %self.totals.gross_value,
            adjustments = %self.totals.adjustment_total,
            net = %self.totals.net_value,
            matched_net = %self.totals.matched_net_value,
            matched_reference = %self.totals.matched_reference_value,
            variance = %self.totals.total_variance,
            standalone = %self.totals.standalone_adjustments,
            "Financial totals"
        );
        if self.review_flagged > 0 {
            tracing::warn!(count = self.review_flagged, "Matches flagged for review");
        }
        if !self.unresolved_orders.is_empty() {
            tracing::warn!(count = self.unresolved_orders.len(), "Unresolved collisions");
        }
    }
}
