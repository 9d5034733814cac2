//! Error types for primal-health.

use thiserror::Error;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for primal-health operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed input, naming the offending field.
    #[error("invalid {field}: {message}")]
    Validation {
        /// Field that failed validation.
        field: String,
        /// Human-readable reason.
        message: String,
    },

    /// Unknown identifier.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Kind of entity looked up.
        kind: &'static str,
        /// Identifier that was not found.
        id: String,
    },

    /// Caller identity does not match the resource.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Claim status change that would move backwards or leave a terminal state.
    #[error("invalid claim transition from {from} to {to}")]
    InvalidTransition {
        /// Current status.
        from: String,
        /// Requested status.
        to: String,
    },

    /// A payment-gated operation was attempted without a usable proof.
    #[error("payment required: {0}")]
    PaymentRequired(String),

    /// Session token missing, unknown or expired.
    #[error("session error: {0}")]
    Session(String),

    /// Encryption, decryption or signature failure.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Ledger or RPC failure.
    #[error("network error: {0}")]
    Network(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Build a validation error for `field`.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Build a not-found error.
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }
}
