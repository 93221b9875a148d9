//! Read-only diagnostics over a finished run. Nothing here changes an outcome.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use concord_core::{LineItem, MatchKey, Money, ReferenceRecord};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::aggregate::Aggregation;
use crate::resolver::MatchOutcome;

/// Matches whose variance exceeds this percentage of the reference value get a prior-period lookup.
pub const DEFAULT_PRIOR_PERIOD_THRESHOLD_PCT: Decimal = Decimal::from_parts(25, 0, 0, false, 0);

/// A same-date candidate within this fraction of the expected value counts as a better match.
const BETTER_MATCH_RATIO: Decimal = Decimal::from_parts(5, 0, 0, false, 2);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateKey {
    pub key: MatchKey,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CollisionRisk {
    /// Keys shared by more than one reference record, completed or not.
    pub reference_duplicate_keys: Vec<DuplicateKey>,
    /// Keys shared by more than one distinct order.
    pub order_duplicate_keys: Vec<DuplicateKey>,
    /// Rows whose order id is blank or `0`.
    pub zero_order_ids: usize,
}

pub fn collision_risk(
    items: &[LineItem],
    aggregation: &Aggregation,
    references: &[ReferenceRecord],
) -> CollisionRisk {
    CollisionRisk {
        reference_duplicate_keys: duplicates(references.iter().map(|r| &r.match_key)),
        order_duplicate_keys: duplicates(aggregation.orders.iter().filter_map(|o| o.match_key.as_ref())),
        zero_order_ids: items
            .iter()
            .filter(|i| matches!(i.external_order_id.trim(), "" | "0"))
            .count(),
    }
}

fn duplicates<'a>(keys: impl Iterator<Item = &'a MatchKey>) -> Vec<DuplicateKey> {
    let mut counts: BTreeMap<&MatchKey, usize> = BTreeMap::new();
    for key in keys {
        *counts.entry(key).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(key, count)| DuplicateKey {
            key: key.clone(),
            count,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VarianceBin {
    pub label: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VarianceProfile {
    /// Matched outcomes with a non-zero variance.
    pub with_variance: usize,
    pub mean: Option<Money>,
    pub median: Option<Money>,
    /// Distribution of |variance| as a percentage of the reference value.
    pub bins: Vec<VarianceBin>,
    /// Variances against a zero-valued reference, which have no percentage.
    pub zero_reference: usize,
}

const PERCENT_BINS: [(i64, Option<i64>); 5] = [
    (0, Some(1)),
    (1, Some(5)),
    (5, Some(20)),
    (20, Some(50)),
    (50, None),
];

pub fn variance_profile(outcomes: &[MatchOutcome]) -> VarianceProfile {
    let pairs: Vec<(Money, Money)> = outcomes
        .iter()
        .filter_map(|o| Some((o.variance?, o.reference_value?)))
        .filter(|(variance, _)| !variance.is_zero())
        .collect();

    let mut profile = VarianceProfile {
        with_variance: pairs.len(),
        bins: PERCENT_BINS
            .iter()
            .map(|(low, high)| VarianceBin {
                label: match high {
                    Some(high) => format!("{low}-{high}%"),
                    None => format!(">{low}%"),
                },
                count: 0,
            })
            .collect(),
        ..Default::default()
    };
    if pairs.is_empty() {
        return profile;
    }

    let mut values: Vec<Decimal> = pairs.iter().map(|(v, _)| v.as_decimal()).collect();
    let total: Decimal = values.iter().sum();
    profile.mean = Some(Money::from_decimal(total / Decimal::from(values.len())));
    values.sort();
    let mid = values.len() / 2;
    let median = if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / Decimal::TWO
    } else {
        values[mid]
    };
    profile.median = Some(Money::from_decimal(median));

    for (variance, reference) in &pairs {
        let Some(pct) = percent_of(*variance, *reference) else {
            profile.zero_reference += 1;
            continue;
        };
        let slot = PERCENT_BINS.iter().position(|(low, high)| {
            pct >= Decimal::from(*low) && high.map_or(true, |h| pct < Decimal::from(h))
        });
        if let Some(slot) = slot {
            profile.bins[slot].count += 1;
        }
    }
    profile
}

/// |variance| as a percentage of |reference|, or `None` for a zero reference.
fn percent_of(variance: Money, reference: Money) -> Option<Decimal> {
    variance.ratio_of(reference).map(|r| r * Decimal::ONE_HUNDRED)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateRecord {
    pub reference_id: String,
    pub date: NaiveDate,
    pub value: Money,
    pub difference: Money,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriorPeriodVerdict {
    /// The closest record by value sits on a different date than the one matched.
    PriorPeriodFound,
    BetterMatchSameDate,
    NoGoodMatch,
    NoReference,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriorPeriodFinding {
    pub order_id: String,
    pub matched_reference_id: String,
    pub matched_date: Option<NaiveDate>,
    pub expected_value: Money,
    pub variance_pct: Decimal,
    pub closest: Option<CandidateRecord>,
    pub verdict: PriorPeriodVerdict,
}

/// For matches whose variance exceeds `threshold_pct` of the reference value, searches every
/// reference record sharing the order's id suffix and location, on any date, for the one closest
/// to the order's gross value.
///
/// `references` should be the unfiltered record set, so records outside the run's period are seen.
pub fn prior_period_lookup(
    aggregation: &Aggregation,
    outcomes: &[MatchOutcome],
    references: &[ReferenceRecord],
    threshold_pct: Decimal,
) -> Vec<PriorPeriodFinding> {
    let mut by_identity: HashMap<(&str, &str), Vec<&ReferenceRecord>> = HashMap::new();
    for record in references {
        by_identity
            .entry(record.match_key.identity())
            .or_default()
            .push(record);
    }
    let by_id: HashMap<&str, &ReferenceRecord> = references
        .iter()
        .map(|r| (r.reference_id.as_str(), r))
        .collect();

    let mut findings = Vec::new();
    for outcome in outcomes {
        let (Some(reference_id), Some(variance), Some(reference_value)) = (
            outcome.matched_reference_id.as_deref(),
            outcome.variance,
            outcome.reference_value,
        ) else {
            continue;
        };
        let Some(variance_pct) = percent_of(variance, reference_value) else {
            continue;
        };
        if variance_pct <= threshold_pct {
            continue;
        }
        let Some(order) = aggregation.get(&outcome.order_id) else {
            continue;
        };
        let Some(key) = order.match_key.as_ref() else {
            continue;
        };

        let expected = order.gross_value;
        let matched_date = by_id.get(reference_id).map(|r| r.match_key.date);
        let candidates = by_identity.get(&key.identity()).map(Vec::as_slice).unwrap_or(&[]);
        let closest = closest_by_value(candidates, expected);

        let verdict = match &closest {
            None => PriorPeriodVerdict::NoReference,
            Some(best) if Some(best.date) != matched_date => PriorPeriodVerdict::PriorPeriodFound,
            Some(best) if best.difference.as_decimal() < expected.as_decimal() * BETTER_MATCH_RATIO => {
                PriorPeriodVerdict::BetterMatchSameDate
            }
            Some(_) => PriorPeriodVerdict::NoGoodMatch,
        };

        findings.push(PriorPeriodFinding {
            order_id: outcome.order_id.clone(),
            matched_reference_id: reference_id.to_string(),
            matched_date,
            expected_value: expected,
            variance_pct: variance_pct.round_dp(1),
            closest,
            verdict,
        });
    }

    if !findings.is_empty() {
        let prior = findings
            .iter()
            .filter(|f| f.verdict == PriorPeriodVerdict::PriorPeriodFound)
            .count();
        tracing::info!(checked = findings.len(), prior_period = prior, "Prior period lookup complete");
    }
    findings
}

fn closest_by_value(candidates: &[&ReferenceRecord], expected: Money) -> Option<CandidateRecord> {
    let mut best: Option<(&ReferenceRecord, Money)> = None;
    for &candidate in candidates {
        let diff = (candidate.value - expected).abs();
        if best.map_or(true, |(_, best_diff)| diff < best_diff) {
            best = Some((candidate, diff));
        }
    }
    best.map(|(record, difference)| CandidateRecord {
        reference_id: record.reference_id.clone(),
        date: record.match_key.date,
        value: record.value,
        difference,
    })
}
