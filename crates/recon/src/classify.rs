use std::collections::HashMap;
use std::fmt;

use concord_core::Money;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ReconError;
use crate::propagate::{AnnotatedLineItem, OrderCategory};

/// Severity of the gap between an order's net value and its matched reference.
/// Declared from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VarianceClass {
    Exact,
    Rounding,
    Minor,
    Unexplained,
}

impl VarianceClass {
    pub fn label(self) -> &'static str {
        match self {
            VarianceClass::Exact => "Exact Match",
            VarianceClass::Rounding => "Rounding",
            VarianceClass::Minor => "Minor Variance",
            VarianceClass::Unexplained => "Unexplained Variance",
        }
    }
}

impl fmt::Display for VarianceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Upper bounds (exclusive) on |variance| for each class below Unexplained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VarianceThresholds {
    pub exact: Decimal,
    pub rounding: Decimal,
    pub minor: Decimal,
}

impl Default for VarianceThresholds {
    fn default() -> Self {
        Self {
            exact: Decimal::new(2, 2),
            rounding: Decimal::new(10, 2),
            minor: Decimal::new(100, 2),
        }
    }
}

impl VarianceThresholds {
    pub fn validate(&self) -> Result<(), ReconError> {
        if self.exact <= Decimal::ZERO || self.exact >= self.rounding || self.rounding >= self.minor {
            return Err(ReconError::InvalidConfig(format!(
                "variance thresholds must be positive and strictly increasing (got {} / {} / {})",
                self.exact, self.rounding, self.minor
            )));
        }
        Ok(())
    }

    pub fn classify(&self, variance: Money) -> VarianceClass {
        let magnitude = variance.abs().as_decimal();
        if magnitude < self.exact {
            VarianceClass::Exact
        } else if magnitude < self.rounding {
            VarianceClass::Rounding
        } else if magnitude < self.minor {
            VarianceClass::Minor
        } else {
            VarianceClass::Unexplained
        }
    }
}

/// `net - reference`, each side rounded to currency precision first.
pub fn variance_between(net_value: Money, reference_value: Money) -> Money {
    let net = Money::from_decimal(net_value.as_decimal());
    let reference = Money::from_decimal(reference_value.as_decimal());
    Money::from_decimal((net - reference).as_decimal())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedLineItem {
    #[serde(flatten)]
    pub annotated: AnnotatedLineItem,
    pub variance: Money,
    pub variance_class: Option<VarianceClass>,
}

impl ClassifiedLineItem {
    pub fn variance_label(&self) -> &'static str {
        self.variance_class.map(VarianceClass::label).unwrap_or("N/A")
    }
}

/// Attaches a variance and class to every row.
///
/// Matched order rows are measured against their reference; linked rows copy what their parent
/// order got; everything else is zero and unclassified.
pub fn classify_rows(
    rows: Vec<AnnotatedLineItem>,
    thresholds: &VarianceThresholds,
) -> Vec<ClassifiedLineItem> {
    let mut by_order: HashMap<String, (Money, VarianceClass)> = HashMap::new();
    for row in &rows {
        if !row.order_category.is_matched() {
            continue;
        }
        if let Some(reference) = row.reference_value {
            let variance = variance_between(row.net_value, reference);
            by_order
                .entry(row.order_id().to_string())
                .or_insert((variance, thresholds.classify(variance)));
        }
    }

    rows.into_iter()
        .map(|annotated| {
            let parent = match annotated.order_category {
                OrderCategory::Matched
                | OrderCategory::MatchedGrouped
                | OrderCategory::LinkedToOrder => by_order.get(annotated.order_id()).copied(),
                _ => None,
            };
            let (variance, variance_class) = match parent {
                Some((v, class)) => (v, Some(class)),
                None => (Money::zero(), None),
            };
            ClassifiedLineItem {
                annotated,
                variance,
                variance_class,
            }
        })
        .collect()
}
