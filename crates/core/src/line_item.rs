use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::ParseError;
use super::money::Money;

/// Accounting category of a marketplace row, already assigned upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    /// Base order row carrying the order value and commission.
    Order,
    /// Fee-side adjustment (typically a refund for unavailable items). Changes the order's net value.
    FeeAdjustment,
    /// Payment-side adjustment (commission refunds and similar). Never changes the net value.
    PaymentAdjustment,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Order => write!(f, "Order"),
            Category::FeeAdjustment => write!(f, "Fee/Adjustment"),
            Category::PaymentAdjustment => write!(f, "Payment/Adjustment"),
        }
    }
}

impl std::str::FromStr for Category {
    type Err = ParseError;

    /// Accepts the canonical labels and the statement labels the marketplace export uses.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "order" | "order value & commission" => Ok(Category::Order),
            "fee/adjustment" | "fee" | "additional fees" => Ok(Category::FeeAdjustment),
            "payment/adjustment" | "payment" | "additional payments" => {
                Ok(Category::PaymentAdjustment)
            }
            _ => Err(ParseError::UnknownCategory(s.to_string())),
        }
    }
}

/// A monetary cell as it arrived from the normalized table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Amount {
    Value(Money),
    #[default]
    Missing,
    /// Text that could not be read as a number. Counts as zero.
    Unparseable(String),
}

impl Amount {
    /// Blank text is `Missing`; anything else either parses or is kept as `Unparseable`.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
            return Amount::Missing;
        }
        match trimmed.replace(',', "").parse::<Money>() {
            Ok(m) => Amount::Value(m),
            Err(_) => Amount::Unparseable(trimmed.to_string()),
        }
    }

    pub fn value_or_zero(&self) -> Money {
        match self {
            Amount::Value(m) => *m,
            Amount::Missing | Amount::Unparseable(_) => Money::zero(),
        }
    }

    pub fn is_unparseable(&self) -> bool {
        matches!(self, Amount::Unparseable(_))
    }
}

impl From<Money> for Amount {
    fn from(m: Money) -> Self {
        Amount::Value(m)
    }
}

/// Monetary fields of a marketplace row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineAmounts {
    pub order_value: Amount,
    pub discount: Amount,
    pub adjustment: Amount,
    pub commission: Amount,
    pub total_payable: Amount,
}

impl LineAmounts {
    pub fn unparseable_count(&self) -> usize {
        [
            &self.order_value,
            &self.discount,
            &self.adjustment,
            &self.commission,
            &self.total_payable,
        ]
        .iter()
        .filter(|a| a.is_unparseable())
        .count()
    }

    /// Order value plus marketing discount: what the customer order was worth before refunds.
    pub fn gross_order_value(&self) -> Money {
        self.order_value.value_or_zero() + self.discount.value_or_zero()
    }
}

/// One normalized marketplace row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// Position in the source table.
    pub row_id: usize,
    pub external_order_id: String,
    pub category: Category,
    pub location_name: String,
    pub event_timestamp: Option<NaiveDateTime>,
    pub amounts: LineAmounts,
}

impl LineItem {
    pub fn event_date(&self) -> Option<NaiveDate> {
        self.event_timestamp.map(|ts| ts.date())
    }
}

/// Parses the timestamp layouts the normalized tables use.
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, ParseError> {
    const FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ];
    let s = raw.trim().trim_end_matches('Z');
    for fmt in FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(ts);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(date.and_time(chrono::NaiveTime::MIN));
    }
    Err(ParseError::InvalidTimestamp(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_accepts_statement_labels() {
        assert_eq!("Order Value & Commission".parse::<Category>().unwrap(), Category::Order);
        assert_eq!("Additional Fees".parse::<Category>().unwrap(), Category::FeeAdjustment);
        assert_eq!(
            "additional payments".parse::<Category>().unwrap(),
            Category::PaymentAdjustment
        );
        assert_eq!("Fee/Adjustment".parse::<Category>().unwrap(), Category::FeeAdjustment);
    }

    #[test]
    fn category_rejects_unknown() {
        assert_eq!(
            "Exclude".parse::<Category>(),
            Err(ParseError::UnknownCategory("Exclude".to_string()))
        );
    }

    #[test]
    fn category_display_round_trips() {
        for cat in [Category::Order, Category::FeeAdjustment, Category::PaymentAdjustment] {
            assert_eq!(cat.to_string().parse::<Category>().unwrap(), cat);
        }
    }

    #[test]
    fn amount_parse_variants() {
        assert_eq!(Amount::parse("12.34"), Amount::Value(Money::from_cents(1234)));
        assert_eq!(Amount::parse("1,234.50"), Amount::Value(Money::from_cents(123_450)));
        assert_eq!(Amount::parse("  "), Amount::Missing);
        assert_eq!(Amount::parse("NaN"), Amount::Missing);
        assert_eq!(Amount::parse("n/a"), Amount::Unparseable("n/a".to_string()));
    }

    #[test]
    fn unparseable_counts_as_zero() {
        let amounts = LineAmounts {
            order_value: Amount::Value(Money::from_cents(1000)),
            discount: Amount::Unparseable("x".to_string()),
            commission: Amount::Unparseable("y".to_string()),
            ..Default::default()
        };
        assert_eq!(amounts.gross_order_value(), Money::from_cents(1000));
        assert_eq!(amounts.unparseable_count(), 2);
    }

    #[test]
    fn gross_includes_discount() {
        let amounts = LineAmounts {
            order_value: Amount::Value(Money::from_cents(8000)),
            discount: Amount::Value(Money::from_cents(850)),
            ..Default::default()
        };
        assert_eq!(amounts.gross_order_value(), Money::from_cents(8850));
    }

    #[test]
    fn timestamp_formats() {
        let expected = NaiveDate::from_ymd_opt(2025, 10, 27)
            .unwrap()
            .and_hms_opt(0, 9, 20)
            .unwrap();
        assert_eq!(parse_timestamp("2025-10-27 00:09:20").unwrap(), expected);
        assert_eq!(parse_timestamp("2025-10-27T00:09:20Z").unwrap(), expected);
        assert_eq!(
            parse_timestamp("2025-10-27").unwrap().date(),
            NaiveDate::from_ymd_opt(2025, 10, 27).unwrap()
        );
        assert!(parse_timestamp("27/10/2025").is_err());
    }
}
