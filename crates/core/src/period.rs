use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        DateRange { start, end }
    }

    pub fn contains(self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// The accounting period being closed, and the marketplace statement period that feeds it.
/// The two rarely line up: statements run Monday to Sunday, accounting periods run by month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountingPeriod {
    pub accounting: DateRange,
    pub statement: DateRange,
}

impl AccountingPeriod {
    pub fn new(accounting: DateRange, statement: DateRange) -> Self {
        AccountingPeriod { accounting, statement }
    }

    /// Days of the accounting period that fall after the statement end and must be accrued.
    /// `None` when the statement reaches (or passes) the accounting period end.
    pub fn accrual_range(self) -> Option<DateRange> {
        if self.statement.end >= self.accounting.end {
            return None;
        }
        let start = self.statement.end.checked_add_days(Days::new(1))?;
        let start = start.max(self.accounting.start);
        Some(DateRange::new(start, self.accounting.end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn date_range_contains() {
        let range = DateRange::new(d(2025, 11, 1), d(2025, 11, 30));
        assert!(range.contains(d(2025, 11, 15)));
        assert!(range.contains(d(2025, 11, 1))); // inclusive start
        assert!(range.contains(d(2025, 11, 30))); // inclusive end
        assert!(!range.contains(d(2025, 10, 31)));
        assert!(!range.contains(d(2025, 12, 1)));
    }

    #[test]
    fn date_range_display() {
        let range = DateRange::new(d(2025, 11, 1), d(2025, 11, 30));
        assert_eq!(range.to_string(), "2025-11-01 to 2025-11-30");
    }

    #[test]
    fn accrual_covers_days_after_statement_end() {
        let period = AccountingPeriod::new(
            DateRange::new(d(2025, 11, 1), d(2025, 11, 30)),
            DateRange::new(d(2025, 11, 3), d(2025, 11, 23)),
        );
        assert_eq!(
            period.accrual_range(),
            Some(DateRange::new(d(2025, 11, 24), d(2025, 11, 30)))
        );
    }

    #[test]
    fn no_accrual_when_statement_reaches_period_end() {
        let period = AccountingPeriod::new(
            DateRange::new(d(2025, 11, 1), d(2025, 11, 30)),
            DateRange::new(d(2025, 11, 3), d(2025, 11, 30)),
        );
        assert_eq!(period.accrual_range(), None);

        let past = AccountingPeriod::new(
            DateRange::new(d(2025, 11, 1), d(2025, 11, 30)),
            DateRange::new(d(2025, 11, 24), d(2025, 12, 7)),
        );
        assert_eq!(past.accrual_range(), None);
    }
}
