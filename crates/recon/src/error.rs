use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconError {
    #[error("No reference records supplied; nothing to reconcile against")]
    NoReferenceData,
    #[error("Reconciliation cancelled")]
    Cancelled,
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),
}
