//! Error types for the core library

use thiserror::Error;

/// Core error type for rbuild operations
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Platform is not in the catalog
    #[error("invalid platform: {name}")]
    InvalidPlatform { name: String },

    /// Architecture is not supported by the platform
    #[error("invalid arch: {name} (platform {platform})")]
    InvalidArchitecture { platform: String, name: String },

    /// Build system is not supported
    #[error("invalid build system: {name}")]
    InvalidBuildSystem { name: String },

    /// Job field cannot be used as part of a directory name
    #[error("invalid {field}: {value:?} (allowed: letters, digits, '.', '_', '-', no leading '.')")]
    InvalidName { field: &'static str, value: String },

    /// Package type has no known artifact extension
    #[error("unknown package type: {name}")]
    UnknownPackageType { name: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Parse error
    #[error("Parse error: {message}")]
    ParseError { message: String },

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Result type alias for rbuild operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Add context to an error
    pub fn context<E>(context: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::WithContext { context: context.into(), source: Box::new(source) }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError { message: message.into() }
    }
}
