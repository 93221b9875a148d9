use chrono::Duration;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::classify::VarianceThresholds;
use crate::error::ReconError;

/// Tunables for one reconciliation run.
///
/// The defaults were chosen empirically against marketplace statements and are kept for
/// behavioural compatibility. They are not known to be optimal; recalibrate against real data
/// before changing them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Slack added after a reference window's end when checking an order's timestamp.
    pub timestamp_buffer_minutes: i64,
    /// Value resolution accepts the closest candidate below this absolute difference...
    pub value_abs_tolerance: Decimal,
    /// ...or below this fraction of the candidate's value.
    pub value_rel_tolerance: Decimal,
    /// Matches whose |variance| exceeds this fraction of the reference value are flagged for review.
    pub review_variance_ratio: Decimal,
    pub variance: VarianceThresholds,
}

pub const DEFAULT_TIMESTAMP_BUFFER_MINUTES: i64 = 60;
/// One week.
pub const MAX_TIMESTAMP_BUFFER_MINUTES: i64 = 7 * 24 * 60;

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            timestamp_buffer_minutes: DEFAULT_TIMESTAMP_BUFFER_MINUTES,
            value_abs_tolerance: Decimal::new(10, 2),
            value_rel_tolerance: Decimal::new(1, 2),
            review_variance_ratio: Decimal::new(20, 2),
            variance: VarianceThresholds::default(),
        }
    }
}

impl MatchConfig {
    pub fn from_toml(toml_content: &str) -> Result<Self, ReconError> {
        let config: MatchConfig = toml::from_str(toml_content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        if !(0..=MAX_TIMESTAMP_BUFFER_MINUTES).contains(&self.timestamp_buffer_minutes) {
            return Err(ReconError::InvalidConfig(format!(
                "timestamp_buffer_minutes must be between 0 and {MAX_TIMESTAMP_BUFFER_MINUTES} (got {})",
                self.timestamp_buffer_minutes
            )));
        }
        for (name, value) in [
            ("value_abs_tolerance", self.value_abs_tolerance),
            ("value_rel_tolerance", self.value_rel_tolerance),
            ("review_variance_ratio", self.review_variance_ratio),
        ] {
            if value.is_sign_negative() {
                return Err(ReconError::InvalidConfig(format!(
                    "{name} must not be negative (got {value})"
                )));
            }
        }
        self.variance.validate()
    }

    pub fn timestamp_buffer(&self) -> Duration {
        Duration::minutes(
            self.timestamp_buffer_minutes
                .clamp(0, MAX_TIMESTAMP_BUFFER_MINUTES),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_constants() {
        let config = MatchConfig::default();
        assert_eq!(config.timestamp_buffer(), Duration::hours(1));
        assert_eq!(config.value_abs_tolerance, Decimal::new(10, 2));
        assert_eq!(config.value_rel_tolerance, Decimal::new(1, 2));
        assert_eq!(config.review_variance_ratio, Decimal::new(2, 1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_toml_is_all_defaults() {
        assert_eq!(MatchConfig::from_toml("").unwrap(), MatchConfig::default());
    }

    #[test]
    fn toml_overrides_selected_fields() {
        let config = MatchConfig::from_toml(
            r#"
            timestamp_buffer_minutes = 90
            value_abs_tolerance = "0.05"

            [variance]
            minor = "2.00"
            "#,
        )
        .unwrap();
        assert_eq!(config.timestamp_buffer_minutes, 90);
        assert_eq!(config.value_abs_tolerance, Decimal::new(5, 2));
        assert_eq!(config.value_rel_tolerance, Decimal::new(1, 2));
        assert_eq!(config.variance.minor, Decimal::new(200, 2));
        assert_eq!(config.variance.exact, Decimal::new(2, 2));
    }

    #[test]
    fn rejects_negative_buffer() {
        let err = MatchConfig::from_toml("timestamp_buffer_minutes = -5").unwrap_err();
        assert!(matches!(err, ReconError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_buffer_beyond_a_week() {
        assert!(MatchConfig::from_toml("timestamp_buffer_minutes = 10080").is_ok());
        let err = MatchConfig::from_toml("timestamp_buffer_minutes = 1000000000000").unwrap_err();
        assert!(matches!(err, ReconError::InvalidConfig(_)));
    }

    #[test]
    fn buffer_accessor_never_exceeds_cap() {
        let config = MatchConfig {
            timestamp_buffer_minutes: i64::MAX,
            ..MatchConfig::default()
        };
        assert_eq!(config.timestamp_buffer(), Duration::weeks(1));
    }

    #[test]
    fn rejects_negative_tolerance() {
        let err = MatchConfig::from_toml(r#"value_rel_tolerance = "-0.01""#).unwrap_err();
        assert!(matches!(err, ReconError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = MatchConfig::from_toml("timestamp_buffer_minutes = \"soon\"").unwrap_err();
        assert!(matches!(err, ReconError::ConfigParse(_)));
    }
}
