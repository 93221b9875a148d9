use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Composite, intentionally lossy identifier shared by both sides of a reconciliation:
/// the last four characters of the external order id, the location, and the calendar date.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MatchKey {
    pub id_suffix: String,
    pub location: String,
    pub date: NaiveDate,
}

impl MatchKey {
    pub fn new(raw_id: &str, location: &str, date: NaiveDate) -> Self {
        MatchKey {
            id_suffix: normalize_id_suffix(raw_id),
            location: location.trim().to_string(),
            date,
        }
    }

    /// Same key one day earlier, for events recorded either side of midnight.
    pub fn previous_day(&self) -> Option<MatchKey> {
        Some(MatchKey {
            id_suffix: self.id_suffix.clone(),
            location: self.location.clone(),
            date: self.date.checked_sub_days(Days::new(1))?,
        })
    }

    /// The date-free part of the key.
    pub fn identity(&self) -> (&str, &str) {
        (&self.id_suffix, &self.location)
    }
}

impl fmt::Display for MatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.id_suffix, self.location, self.date)
    }
}

/// Last four characters of an external id with leading zeros stripped.
///
/// A trailing `.0` (ids that went through a float column) is dropped first, and a suffix of all
/// zeros collapses to `"0"`. Idempotent, so warehouse ids that are already stored as short
/// suffixes normalize to themselves.
pub fn normalize_id_suffix(raw: &str) -> String {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_suffix(".0").unwrap_or(trimmed);
    let chars: Vec<char> = trimmed.chars().collect();
    let start = chars.len().saturating_sub(4);
    let suffix: String = chars[start..].iter().collect();
    let stripped = suffix.trim_start_matches('0');
    if stripped.is_empty() {
        "0".to_string()
    } else {
        stripped.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn suffix_takes_last_four_characters() {
        assert_eq!(normalize_id_suffix("GB-77121234"), "1234");
        assert_eq!(normalize_id_suffix("1234"), "1234");
    }

    #[test]
    fn suffix_strips_leading_zeros() {
        assert_eq!(normalize_id_suffix("5550660"), "660");
        assert_eq!(normalize_id_suffix("0007"), "7");
        assert_eq!(normalize_id_suffix("120000"), "0");
    }

    #[test]
    fn suffix_keeps_non_digit_characters() {
        assert_eq!(normalize_id_suffix("12345A"), "345A");
        assert_eq!(normalize_id_suffix("GB-0A12"), "A12");
    }

    #[test]
    fn suffix_drops_float_artifact() {
        assert_eq!(normalize_id_suffix("88881234.0"), "1234");
    }

    #[test]
    fn suffix_is_idempotent() {
        for raw in ["8812340", "0660", "12", "0000", "12345A"] {
            let once = normalize_id_suffix(raw);
            assert_eq!(normalize_id_suffix(&once), once);
        }
    }

    #[test]
    fn key_trims_location() {
        let key = MatchKey::new("1234", "  StoreA ", d(2025, 11, 3));
        assert_eq!(key.location, "StoreA");
        assert_eq!(key.to_string(), "1234|StoreA|2025-11-03");
    }

    #[test]
    fn previous_day_crosses_month_boundary() {
        let key = MatchKey::new("1234", "StoreA", d(2025, 11, 1));
        let prev = key.previous_day().unwrap();
        assert_eq!(prev.date, d(2025, 10, 31));
        assert_eq!(prev.identity(), key.identity());
    }
}
