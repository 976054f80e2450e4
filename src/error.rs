//! Error types for tube-relay
//!
//! This module provides the error handling for the library:
//! - One top-level [`Error`] enum used by every stage of the pipeline
//! - Structured Google API failures ([`Error::Api`]) carrying status and reason so the
//!   retry layer can classify them
//! - Machine-readable error codes for logs and job reports

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for tube-relay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for tube-relay
///
/// Each variant includes enough context to explain the failure in a log line without
/// the caller having to add more.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "source.folder_id")
        key: Option<String>,
    },

    /// No usable access token could be obtained
    ///
    /// Raised when the stored token is missing or expired and there is no refresh token,
    /// or when the token endpoint rejects the refresh grant. Fatal to the whole job.
    #[error("credentials unavailable: {0}")]
    AuthUnavailable(String),

    /// A Google API answered with a non-success status
    #[error("{service} API error {status}: {message}")]
    Api {
        /// Which service produced the error ("drive", "youtube", "oauth")
        service: &'static str,
        /// HTTP status code
        status: u16,
        /// First `errors[].reason` from the error body, if present (e.g. "rateLimitExceeded")
        reason: Option<String>,
        /// Human-readable message from the error body, or the raw body
        message: String,
    },

    /// A service answered successfully but not in the shape the protocol requires
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Transient upload failures kept occurring until the retry budget ran out
    #[error("gave up after {attempts} retry attempts: {last}")]
    RetriesExhausted {
        /// Number of retries performed
        attempts: u32,
        /// The last transient error observed
        last: Box<Error>,
    },

    /// The local file to upload is empty
    #[error("refusing to upload empty file {0}")]
    EmptyUpload(PathBuf),

    /// The transfer was cancelled between chunks
    #[error("transfer cancelled")]
    Cancelled,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build a configuration error for a specific key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// HTTP status of the underlying remote failure, if there was one
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            Error::Network(e) => e.status().map(|s| s.as_u16()),
            Error::RetriesExhausted { last, .. } => last.http_status(),
            _ => None,
        }
    }

    /// Whether the remote service refused the operation for lack of permission
    pub fn is_permission_denied(&self) -> bool {
        self.http_status() == Some(403)
    }

    /// Get the machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::AuthUnavailable(_) => "auth_unavailable",
            Error::Api { status: 403, .. } => "permission_denied",
            Error::Api { status: 404, .. } => "not_found",
            Error::Api { .. } => "api_error",
            Error::Protocol(_) => "protocol_error",
            Error::RetriesExhausted { .. } => "retries_exhausted",
            Error::EmptyUpload(_) => "empty_upload",
            Error::Cancelled => "cancelled",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::Other(_) => "internal_error",
        }
    }
}
