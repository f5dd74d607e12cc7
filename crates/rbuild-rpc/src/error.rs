//! Error types for the broker service and client

use std::time::Duration;

use rbuild_build::BuildError;
use thiserror::Error;

/// RPC-specific error types
#[derive(Error, Debug)]
pub enum RpcError {
    /// Error reported by the AMQP client library
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    /// Broker-level failure not tied to the AMQP library
    #[error("Broker error: {reason}")]
    Broker { reason: String },

    /// Request could not be decoded
    #[error("Invalid request payload: {reason}")]
    InvalidPayload { reason: String },

    /// No response arrived in time
    #[error("No response received within {0:?}")]
    Timeout(Duration),

    /// Connection or consumer went away
    #[error("Broker connection closed")]
    ConnectionClosed,

    /// JSON encoding error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Build pipeline error, reported as-is
    #[error(transparent)]
    Build(#[from] BuildError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for RPC operations
pub type Result<T> = std::result::Result<T, RpcError>;

impl RpcError {
    /// Create a broker error
    pub fn broker(reason: impl ToString) -> Self {
        Self::Broker { reason: reason.to_string() }
    }

    /// Create an invalid payload error
    pub fn invalid_payload(reason: impl ToString) -> Self {
        Self::InvalidPayload { reason: reason.to_string() }
    }
}

impl From<rbuild_core::Error> for RpcError {
    fn from(error: rbuild_core::Error) -> Self {
        Self::Build(BuildError::Core(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_error_is_transparent() {
        let err: RpcError = BuildError::CommandFailed {
            argv: vec!["cmake".to_string()],
            exit_code: Some(1),
        }
        .into();
        assert_eq!(err.to_string(), "Command `cmake` failed: exit code 1");
    }

    #[test]
    fn test_core_error_reported_as_build_error() {
        let err: RpcError = rbuild_core::Error::InvalidPlatform { name: "plan9".into() }.into();
        assert!(matches!(err, RpcError::Build(BuildError::Core(_))));
        assert_eq!(err.to_string(), "invalid platform: plan9");
    }
}
