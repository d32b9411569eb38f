//! Error types for the Merkle query client.
//!
//! Three layers of errors exist:
//!
//! - [`TransportError`]: what a [`Dialer`](crate::Dialer) or
//!   [`ContractQuerier`](crate::ContractQuerier) reports (gRPC status, transport failure).
//! - [`ConfigError`]: a [`ClientConfig`](crate::ClientConfig) field failed validation.
//! - [`ClientError`]: what callers of [`MerkleQueryClient`](crate::MerkleQueryClient) see.
//!
//! # Error Taxonomy
//!
//! | Variant                                    | Raised when                                   | Surfaces to caller |
//! |--------------------------------------------|-----------------------------------------------|--------------------|
//! | [`ClientError::DialFailed`]                | endpoint unreachable or dial timed out        | logged only        |
//! | [`ClientError::VerifyFailed`]              | channel never ready, or contract probe failed | logged only        |
//! | [`ClientError::ConnectionExhausted`]       | finite retry budget consumed                  | yes                |
//! | [`ClientError::QueryFailed`]               | RPC error or deadline on a ready connection   | yes                |
//! | [`ClientError::DecodeFailed`]              | response body is not the expected JSON shape  | yes                |
//!
//! Dial and verify failures are consumed by the connect loop; the last one is
//! kept as the source of [`ClientError::ConnectionExhausted`].

use std::{sync::Arc, time::Duration};

use thiserror::Error;

/// A shared error type for source chain tracking.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors returned by [`MerkleQueryClient`](crate::MerkleQueryClient).
///
/// # Non-exhaustive
///
/// New variants may be added in minor releases. Downstream match
/// expressions must include a wildcard arm.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// The transport connection to the endpoint could not be opened.
    #[error("failed to dial {endpoint}: {message}")]
    DialFailed {
        /// Endpoint that was dialed.
        endpoint: String,
        /// Description of the failure.
        message: String,
        /// The underlying transport error.
        #[source]
        source: Option<BoxError>,
    },

    /// The channel opened but was not usable: it never reported ready, or
    /// the contract probe failed.
    #[error("connection to {endpoint} failed verification: {message}")]
    VerifyFailed {
        /// Endpoint that was verified.
        endpoint: String,
        /// Description of the failure.
        message: String,
        /// The underlying transport error.
        #[source]
        source: Option<BoxError>,
    },

    /// The configured retry budget was consumed without a verified connection.
    #[error("failed to connect to {endpoint} after {attempts} attempts: {last_error}")]
    ConnectionExhausted {
        /// Endpoint that was dialed.
        endpoint: String,
        /// Number of failed attempts.
        attempts: u32,
        /// The error from the final attempt.
        #[source]
        last_error: Box<ClientError>,
    },

    /// The contract query failed on an established connection.
    #[error("contract query failed: {message}")]
    QueryFailed {
        /// Description of the failure.
        message: String,
        /// The underlying transport error.
        #[source]
        source: Option<BoxError>,
    },

    /// The contract response could not be decoded into the expected shape.
    #[error("failed to decode {expected} response: {source}")]
    DecodeFailed {
        /// Name of the expected response shape.
        expected: &'static str,
        /// The JSON decoding error.
        #[source]
        source: serde_json::Error,
    },

    /// A query was issued on a client without a ready connection.
    #[error("client is not connected")]
    NotConnected,

    /// The connect loop observed its cancellation token.
    #[error("connect cancelled after {attempts} failed attempts")]
    Cancelled {
        /// Number of failed attempts before cancellation.
        attempts: u32,
    },

    /// The client configuration is invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl ClientError {
    /// Creates a new `DialFailed` error.
    #[must_use]
    pub fn dial_failed(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DialFailed { endpoint: endpoint.into(), message: message.into(), source: None }
    }

    /// Creates a new `DialFailed` error with a source error.
    #[must_use]
    pub fn dial_failed_with_source(
        endpoint: impl Into<String>,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::DialFailed {
            endpoint: endpoint.into(),
            message: message.into(),
            source: Some(Arc::new(source)),
        }
    }

    /// Creates a new `VerifyFailed` error.
    #[must_use]
    pub fn verify_failed(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::VerifyFailed { endpoint: endpoint.into(), message: message.into(), source: None }
    }

    /// Creates a new `VerifyFailed` error with a source error.
    #[must_use]
    pub fn verify_failed_with_source(
        endpoint: impl Into<String>,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::VerifyFailed {
            endpoint: endpoint.into(),
            message: message.into(),
            source: Some(Arc::new(source)),
        }
    }

    /// Creates a new `QueryFailed` error.
    #[must_use]
    pub fn query_failed(message: impl Into<String>) -> Self {
        Self::QueryFailed { message: message.into(), source: None }
    }

    /// Creates a new `QueryFailed` error with a source error.
    #[must_use]
    pub fn query_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::QueryFailed { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `DecodeFailed` error.
    #[must_use]
    pub fn decode_failed(expected: &'static str, source: serde_json::Error) -> Self {
        Self::DecodeFailed { expected, source }
    }

    /// Returns `true` for failures the connect loop retries.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::DialFailed { .. } | Self::VerifyFailed { .. })
    }
}

/// A configuration field failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A required string field was empty.
    #[error("{field} cannot be empty")]
    Empty {
        /// Name of the field.
        field: &'static str,
    },

    /// A duration field was zero.
    #[error("{field} must be positive, got {value}")]
    MustBePositive {
        /// Name of the field.
        field: &'static str,
        /// The rejected value.
        value: String,
    },

    /// A field was smaller than the minimum allowed.
    #[error("{field} must be at least {min}, got {value}")]
    BelowMinimum {
        /// Name of the field.
        field: &'static str,
        /// The minimum allowed value.
        min: String,
        /// The rejected value.
        value: String,
    },
}

/// Errors reported by the transport seam.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// The endpoint string is not a valid URI.
    #[error("invalid endpoint '{endpoint}': {message}")]
    InvalidEndpoint {
        /// The endpoint as configured.
        endpoint: String,
        /// Parse failure description.
        message: String,
    },

    /// The underlying connection failed.
    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// The remote returned a gRPC status.
    #[error("gRPC error ({code:?}): {message}", code = .0.code(), message = .0.message())]
    Status(#[from] tonic::Status),

    /// The operation did not finish in time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl TransportError {
    /// Returns the gRPC status code, if the remote produced one.
    #[must_use]
    pub fn code(&self) -> Option<tonic::Code> {
        match self {
            Self::Status(status) => Some(status.code()),
            _ => None,
        }
    }
}
