use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

use chrono::{Duration, NaiveDateTime};
use concord_core::{MatchKey, Money, ReferenceRecord};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::aggregate::AggregatedOrder;
use crate::cancel::CancelToken;
use crate::classify::variance_between;
use crate::config::MatchConfig;
use crate::error::ReconError;
use crate::events::{EventSink, ReconEvent};
use crate::index::ReferenceIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    Matched,
    MatchedCrossWindow,
    MatchedByTimestamp,
    MatchedByValue,
    NoReference,
    UnresolvedCollision,
}

impl MatchStatus {
    pub fn is_matched(self) -> bool {
        matches!(
            self,
            MatchStatus::Matched
                | MatchStatus::MatchedCrossWindow
                | MatchStatus::MatchedByTimestamp
                | MatchStatus::MatchedByValue
        )
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MatchStatus::Matched => "MATCHED",
            MatchStatus::MatchedCrossWindow => "MATCHED_CROSS_WINDOW",
            MatchStatus::MatchedByTimestamp => "MATCHED_BY_TIMESTAMP",
            MatchStatus::MatchedByValue => "MATCHED_BY_VALUE",
            MatchStatus::NoReference => "NO_REFERENCE",
            MatchStatus::UnresolvedCollision => "UNRESOLVED_COLLISION",
        };
        f.pad(s)
    }
}

/// How much the pairing itself can be trusted, by the stage that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Confidence {
    High,
    HighCrossWindow,
    MediumTimestamp,
    LowValue,
    Ambiguous,
    NotApplicable,
}

impl From<MatchStatus> for Confidence {
    fn from(status: MatchStatus) -> Self {
        match status {
            MatchStatus::Matched => Confidence::High,
            MatchStatus::MatchedCrossWindow => Confidence::HighCrossWindow,
            MatchStatus::MatchedByTimestamp => Confidence::MediumTimestamp,
            MatchStatus::MatchedByValue => Confidence::LowValue,
            MatchStatus::NoReference => Confidence::NotApplicable,
            MatchStatus::UnresolvedCollision => Confidence::Ambiguous,
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Confidence::High => "High",
            Confidence::HighCrossWindow => "High (Cross-Window)",
            Confidence::MediumTimestamp => "Medium (Timestamp)",
            Confidence::LowValue => "Low (Value)",
            Confidence::Ambiguous => "Ambiguous",
            Confidence::NotApplicable => "N/A",
        };
        f.write_str(s)
    }
}

/// Identity confidence plus the value-agreement review flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MatchConfidence {
    pub level: Confidence,
    pub review: bool,
}

impl fmt::Display for MatchConfidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.review {
            write!(f, "{} - Review", self.level)
        } else {
            write!(f, "{}", self.level)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MatchStage {
    Direct,
    CrossWindow,
    Timestamp,
    Value,
}

impl MatchStage {
    pub fn status(self) -> MatchStatus {
        match self {
            MatchStage::Direct => MatchStatus::Matched,
            MatchStage::CrossWindow => MatchStatus::MatchedCrossWindow,
            MatchStage::Timestamp => MatchStatus::MatchedByTimestamp,
            MatchStage::Value => MatchStatus::MatchedByValue,
        }
    }
}

/// Why a stage could not settle on a single reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum UnresolvedReason {
    NoMatchKey,
    NoCandidates,
    NoOrderTimestamp,
    NoTimestampMatch,
    MultipleTimestampMatches { survivors: usize },
    NoValueMatch { closest_difference: Money },
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchAttempt<'a> {
    Resolved {
        reference: &'a ReferenceRecord,
        stage: MatchStage,
    },
    Unresolved(UnresolvedReason),
}

/// Reference ids already taken during one run. Only the resolver can add to it.
#[derive(Debug, Clone, Default)]
pub struct ClaimSet {
    claimed: HashSet<String>,
}

impl ClaimSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_claimed(&self, reference_id: &str) -> bool {
        self.claimed.contains(reference_id)
    }

    pub fn len(&self) -> usize {
        self.claimed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claimed.is_empty()
    }

    fn claim(&mut self, reference_id: &str) -> bool {
        self.claimed.insert(reference_id.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchOutcome {
    pub order_id: String,
    pub status: MatchStatus,
    pub confidence: MatchConfidence,
    pub matched_reference_id: Option<String>,
    pub reference_value: Option<Money>,
    /// `net_value - reference.value` for matched orders.
    pub variance: Option<Money>,
    pub cross_window: bool,
    /// Last failed stage, for orders that ended unmatched.
    pub unresolved_reason: Option<UnresolvedReason>,
}

impl MatchOutcome {
    pub fn needs_review(&self) -> bool {
        self.confidence.review
    }
}

/// Outcomes in resolution order, and the claims made producing them.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub outcomes: Vec<MatchOutcome>,
    pub claims: ClaimSet,
}

/// Keeps candidates whose `[start, end + buffer]` window holds the order's timestamp.
/// Exactly one survivor resolves the collision.
pub fn resolve_by_timestamp<'a>(
    order_timestamp: Option<NaiveDateTime>,
    candidates: &[&'a ReferenceRecord],
    buffer: Duration,
) -> MatchAttempt<'a> {
    let Some(ts) = order_timestamp else {
        return MatchAttempt::Unresolved(UnresolvedReason::NoOrderTimestamp);
    };

    let survivors: Vec<&'a ReferenceRecord> = candidates
        .iter()
        .copied()
        .filter(|c| match (c.window_start, c.window_end) {
            // A window end too late to extend is treated as open-ended.
            (Some(start), Some(end)) => {
                start <= ts && end.checked_add_signed(buffer).map_or(true, |limit| ts <= limit)
            }
            _ => false,
        })
        .collect();

    match survivors.as_slice() {
        [only] => MatchAttempt::Resolved {
            reference: *only,
            stage: MatchStage::Timestamp,
        },
        [] => MatchAttempt::Unresolved(UnresolvedReason::NoTimestampMatch),
        many => MatchAttempt::Unresolved(UnresolvedReason::MultipleTimestampMatches {
            survivors: many.len(),
        }),
    }
}

/// Picks the candidate whose value is closest to `net_value` (earliest wins a tie) and accepts it
/// when the gap is under the absolute tolerance or under `rel_tolerance` of the candidate's value.
pub fn resolve_by_value<'a>(
    net_value: Money,
    candidates: &[&'a ReferenceRecord],
    abs_tolerance: Decimal,
    rel_tolerance: Decimal,
) -> MatchAttempt<'a> {
    let mut best: Option<(&'a ReferenceRecord, Decimal)> = None;
    for &candidate in candidates {
        let diff = (candidate.value - net_value).abs().as_decimal();
        let closer = best.map_or(true, |(_, best_diff)| diff.cmp(&best_diff) == Ordering::Less);
        if closer {
            best = Some((candidate, diff));
        }
    }

    let Some((reference, diff)) = best else {
        return MatchAttempt::Unresolved(UnresolvedReason::NoCandidates);
    };

    let value = reference.value.as_decimal();
    let within_abs = diff < abs_tolerance;
    let within_rel = value > Decimal::ZERO && diff / value < rel_tolerance;
    if within_abs || within_rel {
        MatchAttempt::Resolved {
            reference,
            stage: MatchStage::Value,
        }
    } else {
        MatchAttempt::Unresolved(UnresolvedReason::NoValueMatch {
            closest_difference: Money::from_decimal(diff),
        })
    }
}

/// Orders earliest first; orders without a timestamp go last; ties break on originating row.
pub fn resolution_order(orders: &[AggregatedOrder]) -> Vec<&AggregatedOrder> {
    let mut sorted: Vec<&AggregatedOrder> = orders.iter().collect();
    sorted.sort_by(|a, b| {
        let by_time = match (a.event_timestamp, b.event_timestamp) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_time.then_with(|| a.first_row_id.cmp(&b.first_row_id))
    });
    sorted
}

/// Assigns at most one reference to each order, never the same reference twice.
pub struct MatchResolver<'i, 'a> {
    index: &'i ReferenceIndex<'a>,
    config: &'i MatchConfig,
}

impl<'i, 'a> MatchResolver<'i, 'a> {
    pub fn new(index: &'i ReferenceIndex<'a>, config: &'i MatchConfig) -> Self {
        Self { index, config }
    }

    fn available(&self, key: &MatchKey, claims: &ClaimSet) -> Vec<&'a ReferenceRecord> {
        self.index
            .candidates_for(key)
            .into_iter()
            .filter(|c| !claims.is_claimed(&c.reference_id))
            .collect()
    }

    /// Runs the fallback chain for one order without claiming anything.
    /// Returns the attempt and whether the previous-day key was used.
    pub fn attempt(&self, order: &AggregatedOrder, claims: &ClaimSet) -> (MatchAttempt<'a>, bool) {
        let Some(key) = order.match_key.as_ref() else {
            return (MatchAttempt::Unresolved(UnresolvedReason::NoMatchKey), false);
        };

        let mut cross_window = false;
        let mut candidates = self.available(key, claims);
        if candidates.is_empty() {
            if let Some(prev) = key.previous_day() {
                candidates = self.available(&prev, claims);
                cross_window = !candidates.is_empty();
            }
        }

        let attempt = match candidates.as_slice() {
            [] => MatchAttempt::Unresolved(UnresolvedReason::NoCandidates),
            [only] => MatchAttempt::Resolved {
                reference: *only,
                stage: if cross_window {
                    MatchStage::CrossWindow
                } else {
                    MatchStage::Direct
                },
            },
            colliding => match resolve_by_timestamp(
                order.event_timestamp,
                colliding,
                self.config.timestamp_buffer(),
            ) {
                resolved @ MatchAttempt::Resolved { .. } => resolved,
                MatchAttempt::Unresolved(_) => resolve_by_value(
                    order.net_value,
                    colliding,
                    self.config.value_abs_tolerance,
                    self.config.value_rel_tolerance,
                ),
            },
        };
        (attempt, cross_window)
    }

    /// Resolves one order and claims the chosen reference.
    pub fn resolve_one(&self, order: &AggregatedOrder, claims: &mut ClaimSet) -> MatchOutcome {
        let (attempt, cross_window) = self.attempt(order, claims);
        match attempt {
            MatchAttempt::Resolved { reference, stage } => {
                claims.claim(&reference.reference_id);
                let status = stage.status();
                let variance = variance_between(order.net_value, reference.value);
                MatchOutcome {
                    order_id: order.order_id.clone(),
                    status,
                    confidence: MatchConfidence {
                        level: status.into(),
                        review: self.exceeds_review_ratio(variance, reference.value),
                    },
                    matched_reference_id: Some(reference.reference_id.clone()),
                    reference_value: Some(reference.value),
                    variance: Some(variance),
                    cross_window,
                    unresolved_reason: None,
                }
            }
            MatchAttempt::Unresolved(reason) => {
                let status = match reason {
                    UnresolvedReason::NoMatchKey | UnresolvedReason::NoCandidates => {
                        MatchStatus::NoReference
                    }
                    _ => MatchStatus::UnresolvedCollision,
                };
                MatchOutcome {
                    order_id: order.order_id.clone(),
                    status,
                    confidence: MatchConfidence {
                        level: status.into(),
                        review: false,
                    },
                    matched_reference_id: None,
                    reference_value: None,
                    variance: None,
                    cross_window,
                    unresolved_reason: Some(reason),
                }
            }
        }
    }

    /// Resolves every order in [`resolution_order`], threading `claims` through the run.
    /// Cancellation is honoured between orders.
    pub fn resolve_all(
        &self,
        orders: &[AggregatedOrder],
        mut claims: ClaimSet,
        sink: &dyn EventSink,
        cancel: Option<&CancelToken>,
    ) -> Result<Resolution, ReconError> {
        let mut outcomes = Vec::with_capacity(orders.len());
        for order in resolution_order(orders) {
            if cancel.is_some_and(CancelToken::is_cancelled) {
                return Err(ReconError::Cancelled);
            }
            let outcome = self.resolve_one(order, &mut claims);
            sink.record(&ReconEvent::OrderResolved {
                order_id: outcome.order_id.clone(),
                status: outcome.status,
                reference_id: outcome.matched_reference_id.clone(),
            });
            if let (true, Some(variance)) = (outcome.needs_review(), outcome.variance) {
                sink.record(&ReconEvent::ReviewFlagged {
                    order_id: outcome.order_id.clone(),
                    variance,
                });
            }
            outcomes.push(outcome);
        }
        Ok(Resolution { outcomes, claims })
    }

    fn exceeds_review_ratio(&self, variance: Money, reference_value: Money) -> bool {
        let limit = reference_value.abs().as_decimal() * self.config.review_variance_ratio;
        variance.abs().as_decimal() > limit
    }
}
