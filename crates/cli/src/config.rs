use std::path::Path;

use anyhow::Context;
use concord_import::{LineItemColumns, ReferenceColumns};
use concord_recon::audit::DEFAULT_PRIOR_PERIOD_THRESHOLD_PCT;
use concord_recon::MatchConfig;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Variance, as a percentage of the reference value, above which a prior-period lookup runs.
    pub prior_period_threshold_pct: Decimal,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            prior_period_threshold_pct: DEFAULT_PRIOR_PERIOD_THRESHOLD_PCT,
        }
    }
}

/// Contents of the `--config` file. Every table is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub matching: MatchConfig,
    pub orders: LineItemColumns,
    pub reference: ReferenceColumns,
    pub audit: AuditConfig,
}

impl AppConfig {
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(content)?;
        config.matching.validate()?;
        Ok(config)
    }

    /// Reads `path`, or returns defaults when no path was given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("parsing config {}", path.display()))
    }
}
