//! Error types for metadata cache operations
//!
//! Only invalid requests ever reach a caller of `MetadataModel::get`.
//! Provider failures are absorbed by the aggregator and stale writes are
//! dropped by the generation guard, so those variants exist for providers
//! and for logging.

use thiserror::Error;

/// Main error type for metadata cache operations
#[derive(Error, Debug)]
pub enum MetadataError {
    /// A requested property name was not declared by any provider
    #[error("Invalid property name: {name}")]
    InvalidPropertyName { name: String },

    /// Two providers declared the same property name
    #[error("Property {name} is already declared by provider {provider}")]
    DuplicatePropertyName { name: String, provider: String },

    /// Arguments of a call do not fit together
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A provider failed to produce properties
    #[error("Provider {provider} failed: {message}")]
    Provider { provider: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The fetch that would have fulfilled a request went away
    #[error("Metadata request was dropped before it was fulfilled")]
    RequestDropped,

    /// Generic error with context
    #[error("Error: {0}")]
    Other(String),
}

impl MetadataError {
    /// Build a provider failure
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        MetadataError::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for metadata cache operations
pub type Result<T> = std::result::Result<T, MetadataError>;

impl From<String> for MetadataError {
    fn from(s: String) -> Self {
        MetadataError::Other(s)
    }
}

impl From<&str> for MetadataError {
    fn from(s: &str) -> Self {
        MetadataError::Other(s.to_string())
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for MetadataError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        MetadataError::RequestDropped
    }
}
