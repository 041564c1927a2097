//! Error types for pipeline operations.
//!
//! This module defines [`DataError`] which covers all error cases that can occur
//! when fetching raw data, persisting snapshots, or loading configuration.

use thiserror::Error;

/// Errors that can occur during pipeline operations.
#[derive(Error, Debug)]
pub enum DataError {
    /// Network-related errors (connection failures, timeouts, etc.).
    #[error("Network error: {0}")]
    Network(String),

    /// Rate limit exceeded by a provider.
    #[error("Rate limited by {provider}: retry after {retry_after:?}")]
    RateLimited {
        /// The provider that rate limited the request.
        provider: String,
        /// Suggested time to wait before retrying.
        retry_after: Option<std::time::Duration>,
    },

    /// The requested symbol was not found.
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    /// The source answered but had nothing for the symbol.
    #[error("Data not available for {symbol}: {what}")]
    DataNotAvailable {
        /// The symbol that was requested.
        symbol: String,
        /// What was requested (statement kind, profile, price history).
        what: String,
    },

    /// Error parsing data from a provider.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Error reading or writing the persistence store.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Invalid or missing configuration. Fatal at startup.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Any other error.
    #[error("{0}")]
    Other(String),
}

impl DataError {
    /// Returns true if the error means a data source could not deliver one
    /// input slice. Such errors degrade that slice to absent.
    #[must_use]
    pub const fn is_source_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Network(_)
                | Self::RateLimited { .. }
                | Self::SymbolNotFound(_)
                | Self::DataNotAvailable { .. }
                | Self::Parse(_)
        )
    }

    /// Returns true if the error came from the persistence store.
    #[must_use]
    pub const fn is_persistence(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }
}

/// Result type alias using [`DataError`].
pub type Result<T> = std::result::Result<T, DataError>;
