//! Error types for the fleetdns system
//!
//! The variants follow the failure classes the convergence loop cares about:
//! configuration problems are fatal at startup, everything else is contained
//! within the cycle (or the single action) that produced it.

use thiserror::Error;

/// Result type alias for fleetdns operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the fleetdns system
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid configuration (fatal, startup only)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The health source could not produce a snapshot
    #[error("Health source unavailable: {0}")]
    SourceUnavailable(String),

    /// A domain could not be resolved to a provider zone
    #[error("Zone resolution failed for {domain}: {message}")]
    ZoneResolution {
        /// Domain that failed to resolve
        domain: String,
        /// Error message
        message: String,
    },

    /// Provider-specific error
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Zone or record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Rate limiting errors
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// YAML configuration parse errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Anything else escaping a cycle
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a health source error
    pub fn source_unavailable(msg: impl Into<String>) -> Self {
        Self::SourceUnavailable(msg.into())
    }

    /// Create a zone resolution error
    pub fn zone_resolution(domain: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ZoneResolution {
            domain: domain.into(),
            message: message.into(),
        }
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a rate limit error
    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create an unexpected error
    pub fn unexpected(msg: impl Into<String>) -> Self {
        Self::Unexpected(msg.into())
    }

    /// Whether the error means the target zone or record does not exist
    ///
    /// Used to classify deletes of records that are already gone.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Whether the error is fatal at startup
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Yaml(_))
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Unexpected(err.to_string())
    }
}
