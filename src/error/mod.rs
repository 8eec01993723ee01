use std::time::Duration;
use thiserror::Error;

/// Result type for breaker operations
pub type Result<T> = std::result::Result<T, BreakerError>;

/// Breaker error types
#[derive(Error, Debug)]
pub enum BreakerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("No fallback succeeded")]
    NoFallback,

    #[error("Fallback failed: {0}")]
    Fallback(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl BreakerError {
    /// Whether the call was abandoned because its deadline elapsed
    pub fn is_timeout(&self) -> bool {
        matches!(self, BreakerError::Timeout(_))
    }

    /// Status code of a rejected response, if the call got that far
    pub fn status(&self) -> Option<u16> {
        match self {
            BreakerError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Response body carried by a rejected outcome
    pub fn body(&self) -> Option<&str> {
        match self {
            BreakerError::Rejected { body, .. } => Some(body),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for BreakerError {
    fn from(e: serde_json::Error) -> Self {
        BreakerError::Serialization(e.to_string())
    }
}
