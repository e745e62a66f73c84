//! Error types for trust validation and key derivation.
//!
//! This module defines every error that can escape the crate: transport
//! failures talking to CRL/OCSP/TSA endpoints, ASN.1 decoding failures,
//! protocol-level rejections, and password failures of the standard
//! security handler. Chain-of-trust problems are not errors; they are
//! accumulated in [`crate::validation::VerificationOutcome`].

use thiserror::Error;

/// Result type alias using [`TrustError`].
pub type Result<T> = std::result::Result<T, TrustError>;

/// Errors that can occur during revocation, timestamp or key operations.
#[derive(Debug, Error)]
pub enum TrustError {
    /// HTTP request failed before a response was received.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Endpoint answered with a non-2xx status.
    #[error("HTTP status {status} from {url}")]
    HttpStatus {
        /// Endpoint URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// The time-stamp authority could not be reached.
    #[error("Failed to reach TSA at {url}: {source}")]
    TsaUnreachable {
        /// TSA URL.
        url: String,
        /// Underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// DER encoding/decoding error.
    #[error("DER error: {0}")]
    Der(#[from] der::Error),

    /// A structure decoded but did not have the expected shape.
    #[error("Decode error: {0}")]
    Decode(String),

    /// URL parsing error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// OCSP responder answered with a status other than `successful`.
    #[error("OCSP response status is {0}")]
    OcspStatus(String),

    /// Certificate has been revoked according to OCSP.
    #[error("Certificate revoked at {revoked_at}{}", reason_suffix(.reason))]
    Revoked {
        /// Revocation time reported by the responder.
        revoked_at: String,
        /// Revocation reason, if given.
        reason: Option<String>,
    },

    /// OCSP responder does not know the certificate.
    #[error("Certificate revocation status is unknown: {0}")]
    UnknownStatus(String),

    /// TSA reported a non-zero PKIFailureInfo.
    #[error("Invalid TSA '{url}' response, code {code}")]
    TsaFailure {
        /// TSA URL.
        url: String,
        /// Numeric PKIFailureInfo value.
        code: u32,
    },

    /// TSA returned no token.
    #[error("TSA '{url}' failed to return time stamp token: {status}")]
    TsaRejected {
        /// TSA URL.
        url: String,
        /// Status string from the response.
        status: String,
    },

    /// Token does not match the request that produced it.
    #[error("Time stamp token does not match request: {0}")]
    TsaMismatch(String),

    /// Signature verification failed.
    #[error("Signature verification failed: {0}")]
    Signature(String),

    /// Signature or digest algorithm is not supported.
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// User password hash did not match.
    #[error("Bad user password")]
    BadUserPassword,

    /// Password matched a hash but the permissions blob failed its integrity check.
    #[error("Bad password: {0}")]
    BadPassword(String),

    /// Encryption dictionary is structurally invalid.
    #[error("Malformed encryption dictionary: {0}")]
    MalformedDictionary(String),

    /// Cipher failure.
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn reason_suffix(reason: &Option<String>) -> String {
    reason
        .as_ref()
        .map(|r| format!(" (reason: {r})"))
        .unwrap_or_default()
}

impl TrustError {
    /// Create an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Create a decode error with the given message.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a signature error with the given message.
    pub fn signature(msg: impl Into<String>) -> Self {
        Self::Signature(msg.into())
    }

    /// Create an unsupported algorithm error.
    pub fn unsupported_algorithm(msg: impl Into<String>) -> Self {
        Self::UnsupportedAlgorithm(msg.into())
    }

    /// Create a cryptographic error with the given message.
    pub fn crypto(msg: impl Into<String>) -> Self {
        Self::Crypto(msg.into())
    }

    /// Create a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a malformed dictionary error.
    pub fn malformed_dictionary(msg: impl Into<String>) -> Self {
        Self::MalformedDictionary(msg.into())
    }

    /// Returns true for connection failures and non-2xx answers.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::HttpStatus { .. } | Self::TsaUnreachable { .. }
        )
    }

    /// Returns true when a responder answered but refused or flagged the request.
    pub fn is_protocol_status(&self) -> bool {
        matches!(
            self,
            Self::OcspStatus(_)
                | Self::Revoked { .. }
                | Self::UnknownStatus(_)
                | Self::TsaFailure { .. }
                | Self::TsaRejected { .. }
        )
    }

    /// Returns true for password failures of the standard security handler.
    pub fn is_password(&self) -> bool {
        matches!(self, Self::BadUserPassword | Self::BadPassword(_))
    }
}
