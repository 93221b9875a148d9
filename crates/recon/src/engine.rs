use concord_core::{LineItem, ReferenceRecord};
use serde::Serialize;
use uuid::Uuid;

use crate::aggregate::aggregate;
use crate::cancel::CancelToken;
use crate::classify::{classify_rows, ClassifiedLineItem};
use crate::config::MatchConfig;
use crate::error::ReconError;
use crate::events::{EventSink, NullSink, ReconEvent};
use crate::index::ReferenceIndex;
use crate::propagate::propagate;
use crate::resolver::{ClaimSet, MatchOutcome, MatchResolver};
use crate::summary::{ReconSummary, StatusCounts};

/// Everything one run produces.
#[derive(Debug, Clone, Serialize)]
pub struct Reconciliation {
    /// One per input row, in input order.
    pub rows: Vec<ClassifiedLineItem>,
    /// One per aggregated order, in resolution order.
    pub outcomes: Vec<MatchOutcome>,
    pub summary: ReconSummary,
}

static NULL_SINK: NullSink = NullSink;

/// Configured entry point for a reconciliation run.
///
/// Each call to [`Reconciler::run`] starts from scratch; nothing carries over between runs.
pub struct Reconciler<'s> {
    config: MatchConfig,
    sink: &'s dyn EventSink,
    cancel: Option<CancelToken>,
}

impl Default for Reconciler<'static> {
    fn default() -> Self {
        Self::new(MatchConfig::default())
    }
}

impl<'s> Reconciler<'s> {
    pub fn new(config: MatchConfig) -> Self {
        Self {
            config,
            sink: &NULL_SINK,
            cancel: None,
        }
    }

    pub fn with_sink(mut self, sink: &'s dyn EventSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    pub fn run(
        &self,
        items: &[LineItem],
        references: &[ReferenceRecord],
    ) -> Result<Reconciliation, ReconError> {
        if references.is_empty() {
            return Err(ReconError::NoReferenceData);
        }
        self.config.validate()?;

        let run_id = Uuid::new_v4();
        self.sink.record(&ReconEvent::RunStarted {
            run_id,
            line_items: items.len(),
            references: references.len(),
        });

        let aggregation = aggregate(items);
        self.sink.record(&ReconEvent::Aggregated {
            orders: aggregation.orders.len(),
            fees: aggregation.fee_rows,
            payments: aggregation.payment_rows,
            with_adjustments: aggregation.orders_with_adjustments(),
            standalone_ids: aggregation.standalone_ids.len(),
            unparseable_fields: aggregation.unparseable_fields,
        });

        let index = ReferenceIndex::build(references);
        let (outcomes, claimed) = if aggregation.is_empty() {
            self.sink.record(&ReconEvent::NoOrders);
            (Vec::new(), 0)
        } else {
            self.sink.record(&ReconEvent::IndexBuilt(index.stats()));
            let resolver = MatchResolver::new(&index, &self.config);
            let resolution = resolver.resolve_all(
                &aggregation.orders,
                ClaimSet::new(),
                self.sink,
                self.cancel.as_ref(),
            )?;
            (resolution.outcomes, resolution.claims.len())
        };

        let annotated = propagate(items, &aggregation, &outcomes);
        let rows = classify_rows(annotated, &self.config.variance);

        let summary = ReconSummary::build(
            run_id,
            &aggregation,
            &outcomes,
            &rows,
            index.stats(),
            claimed,
            &self.config.variance,
        );

        let counts = StatusCounts::from_outcomes(&outcomes);
        self.sink.record(&ReconEvent::RunCompleted {
            run_id,
            matched: counts.matched,
            no_reference: counts.no_reference,
            unresolved: counts.unresolved,
        });

        Ok(Reconciliation {
            rows,
            outcomes,
            summary,
        })
    }
}

/// Runs with default configuration and no event sink.
pub fn reconcile(
    items: &[LineItem],
    references: &[ReferenceRecord],
) -> Result<Reconciliation, ReconError> {
    Reconciler::default().run(items, references)
}
