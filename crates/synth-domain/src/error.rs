use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    #[error("invalid sequence at position {position}: {reason}")]
    InvalidSequence { position: usize, reason: String },
    #[error("{0}")]
    ValidationError(String),
    #[error("{0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for DomainError {
    fn from(e: serde_json::Error) -> Self { DomainError::SerializationError(e.to_string()) }
}
