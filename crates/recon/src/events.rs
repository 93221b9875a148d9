use std::sync::Mutex;

use concord_core::Money;
use serde::Serialize;
use uuid::Uuid;

use crate::index::IndexStats;
use crate::resolver::MatchStatus;

/// Progress notifications emitted while a reconciliation runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ReconEvent {
    RunStarted {
        run_id: Uuid,
        line_items: usize,
        references: usize,
    },
    Aggregated {
        orders: usize,
        fees: usize,
        payments: usize,
        with_adjustments: usize,
        standalone_ids: usize,
        unparseable_fields: usize,
    },
    NoOrders,
    IndexBuilt(IndexStats),
    OrderResolved {
        order_id: String,
        status: MatchStatus,
        reference_id: Option<String>,
    },
    ReviewFlagged {
        order_id: String,
        variance: Money,
    },
    RunCompleted {
        run_id: Uuid,
        matched: usize,
        no_reference: usize,
        unresolved: usize,
    },
}

/// Receives engine events. Implementations must not influence the run.
pub trait EventSink {
    fn record(&self, event: &ReconEvent);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn record(&self, _event: &ReconEvent) {}
}

/// Forwards events to `tracing`. Per-order events go out at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: &ReconEvent) {
        match event {
            ReconEvent::RunStarted { run_id, line_items, references } => {
                tracing::info!(%run_id, line_items, references, "Reconciliation started");
            }
            ReconEvent::Aggregated {
                orders,
                fees,
                payments,
                with_adjustments,
                standalone_ids,
                unparseable_fields,
            } => {
                tracing::info!(
                    orders,
                    fees,
                    payments,
                    with_adjustments,
                    standalone_ids,
                    "Aggregated marketplace rows"
                );
                if *unparseable_fields > 0 {
                    tracing::warn!(unparseable_fields, "Unparseable amounts treated as zero");
                }
            }
            ReconEvent::NoOrders => tracing::warn!("No order rows found"),
            ReconEvent::IndexBuilt(stats) => {
                tracing::info!(
                    keys = stats.keys,
                    single = stats.single_candidate_keys,
                    collisions = stats.collision_keys,
                    excluded_incomplete = stats.excluded_incomplete,
                    "Built reference index"
                );
            }
            ReconEvent::OrderResolved { order_id, status, reference_id } => {
                tracing::debug!(order_id = %order_id, status = %status, reference_id = ?reference_id, "Order resolved");
            }
            ReconEvent::ReviewFlagged { order_id, variance } => {
                tracing::debug!(order_id = %order_id, variance = %variance, "High variance match flagged for review");
            }
            ReconEvent::RunCompleted { run_id, matched, no_reference, unresolved } => {
                tracing::info!(%run_id, matched, no_reference, unresolved, "Reconciliation complete");
            }
        }
    }
}

/// Keeps every event in memory, for tests and interactive hosts.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<ReconEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ReconEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl EventSink for CollectingSink {
    fn record(&self, event: &ReconEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
