//! Broker error types

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while mediating a capability request
///
/// None of these ever reach the rendering engine. The controller turns
/// every failure into a denial and only logs the cause.
#[derive(Error, Debug)]
pub enum BrokerError {
    /// Origin is not on the trusted list
    #[error("Untrusted origin: {0}")]
    UntrustedOrigin(String),

    /// Origin could not be parsed
    #[error("Invalid origin: {0}")]
    InvalidOrigin(String),

    /// Content capability has no host permission mapping
    #[error("Unsupported capability: {0}")]
    UnsupportedCapability(String),

    /// No context is able to present the permission prompt
    #[error("Authorization oracle unavailable: {0}")]
    OracleUnavailable(String),

    /// The oracle reported an error while prompting
    #[error("Authorization oracle failed: {0}")]
    OracleFailed(String),

    /// The prompt did not complete within the configured timeout
    #[error("Permission prompt timed out after {0:?}")]
    PromptTimedOut(Duration),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Origin rule pattern failed to compile
    #[error("Invalid origin pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BrokerError {
    /// Create an oracle-unavailable error
    pub fn unavailable(msg: impl Into<String>) -> Self {
        BrokerError::OracleUnavailable(msg.into())
    }

    /// Create an oracle failure
    pub fn oracle_failed(msg: impl Into<String>) -> Self {
        BrokerError::OracleFailed(msg.into())
    }

    /// Whether this error came from the oracle side of the flow
    pub fn is_oracle_error(&self) -> bool {
        matches!(
            self,
            BrokerError::OracleUnavailable(_)
                | BrokerError::OracleFailed(_)
                | BrokerError::PromptTimedOut(_)
        )
    }
}

/// Result type alias for broker operations
pub type BrokerResult<T> = Result<T, BrokerError>;
