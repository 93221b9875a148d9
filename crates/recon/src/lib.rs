pub mod aggregate;
pub mod audit;
pub mod cancel;
pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod index;
pub mod propagate;
pub mod resolver;
pub mod summary;

pub use aggregate::{aggregate, AggregatedOrder, Aggregation};
pub use cancel::CancelToken;
pub use classify::{ClassifiedLineItem, VarianceClass, VarianceThresholds};
pub use config::MatchConfig;
pub use engine::{reconcile, Reconciler, Reconciliation};
pub use error::ReconError;
pub use events::{CollectingSink, EventSink, NullSink, ReconEvent, TracingSink};
pub use index::{IndexStats, ReferenceIndex};
pub use propagate::{AnnotatedLineItem, OrderCategory, RowConfidence, RowStatus};
pub use resolver::{
    ClaimSet, Confidence, MatchAttempt, MatchConfidence, MatchOutcome, MatchResolver, MatchStage,
    MatchStatus, UnresolvedReason,
};
pub use summary::{FinancialTotals, ReconSummary, StatusCounts};
