//! Error types for Pentarchy.

use thiserror::Error;

/// Result type alias for Pentarchy operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Pentarchy operations.
#[derive(Error, Debug)]
pub enum Error {
    // Validation errors
    #[error("Invalid cost: {0}")]
    InvalidCost(f64),

    #[error("Voter panel is empty")]
    EmptyPanel,

    #[error("Unknown voter: {0}")]
    UnknownVoter(String),

    #[error("Score {0} is outside the allowed range [0, 3]")]
    ScoreOutOfRange(f64),

    #[error("Validation failed: {0}")]
    Validation(String),

    // Proposal errors
    #[error("Proposal not found: {0}")]
    ProposalNotFound(String),

    #[error("Proposal {id} is already {status}")]
    InvalidState { id: String, status: String },

    #[error("Timed out waiting for proposal {0} to resolve")]
    ResolutionTimeout(String),

    // Bus errors
    #[error("Message bus not connected for agent {0}")]
    NotConnected(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request {0} timed out")]
    RequestTimeout(String),

    #[error("Request {0} was dropped before a response arrived")]
    RequestDropped(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    SerializationError(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        Error::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidState {
            id: "p-1".to_string(),
            status: "approved".to_string(),
        };
        assert_eq!(err.to_string(), "Proposal p-1 is already approved");
        assert!(Error::ScoreOutOfRange(4.0).to_string().contains("[0, 3]"));
    }

    #[test]
    fn test_serde_conversion() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: Error = parse.unwrap_err().into();
        assert!(matches!(err, Error::SerializationError(_)));
    }
}
