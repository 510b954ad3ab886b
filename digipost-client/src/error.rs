// SPDX-License-Identifier: Apache-2.0
//
// Digipost API client for Rust
//
// https://github.com/digipost/digipost-client-rs

//! Error types for the Digipost client
//!
//! Provides a unified error taxonomy using `thiserror`, independent of the
//! transport layer's own error names.

pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for Digipost client operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration validation failed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network, TLS or timeout failure
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-2xx response not otherwise classified
    #[error("Server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    /// Response signature did not match the canonical string
    #[error("Response signature mismatch: {0}")]
    SignatureMismatch(String),

    /// Response body digest did not match the advertised header
    #[error("Response digest mismatch: {0}")]
    DigestMismatch(String),

    /// Response timestamp outside the accepted skew window
    #[error("Response clock skew: {0}")]
    ClockSkew(String),

    /// Missing required link or malformed caller input
    #[error("Problem with request: {0}")]
    ProblemWithRequest(String),

    /// Operation not legal for the resource's current state
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    /// A 409 fetch revealed a structurally different resource
    #[error("Duplicate message differs from existing resource: {0}")]
    DuplicateDiffers(String),

    /// Duplicate of a message already delivered digitally
    #[error("Message already delivered to Digipost: {0}")]
    AlreadyDeliveredDigital(String),

    /// Duplicate of a message already delivered to print
    #[error("Message already delivered to print: {0}")]
    AlreadyDeliveredPrint(String),

    /// No encryption key reachable for a pre-encrypt document
    #[error("Encryption key not found: {0}")]
    EncryptionKeyNotFound(String),

    /// Document carries no encryption-key link
    #[error("Document cannot be pre-encrypted: {0}")]
    CannotPreencrypt(String),

    /// Recipient is not digital and the message has no print fallback
    #[error("Unknown recipient: {0}")]
    UnknownRecipient(String),

    /// One or more PDF validation rules rejected the document
    #[error("PDF validation failed: {}", .0.join("; "))]
    PdfValidationFailed(Vec<String>),

    /// Print-ready bytes were requested but the source is not PDF
    #[error("Cannot convert content for print: {0}")]
    CannotConvert(String),

    /// CMS envelope construction failed
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Fallback for unclassified failures
    #[error("General error: {0}")]
    General(String),
}

impl Error {
    /// Check if error is a response verification failure.
    ///
    /// These are the only errors that may be downgraded to warnings under
    /// soft failure mode.
    pub fn is_verification_failure(&self) -> bool {
        matches!(
            self,
            Error::SignatureMismatch(_) | Error::DigestMismatch(_) | Error::ClockSkew(_)
        )
    }

    /// Check if error indicates the message already reached a final state
    pub fn is_already_delivered(&self) -> bool {
        matches!(
            self,
            Error::AlreadyDeliveredDigital(_) | Error::AlreadyDeliveredPrint(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
