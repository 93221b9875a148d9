use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Unknown line-item category: '{0}'")]
    UnknownCategory(String),
    #[error("Invalid timestamp: '{0}'")]
    InvalidTimestamp(String),
}
