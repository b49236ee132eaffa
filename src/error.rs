//! use certissue::error::IssueError;

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, IssueError>;

/// Represents errors that can occur while issuing client certificates.
///
/// The first seven variants are the issuance taxonomy: `KeyLoad` is fatal for a
/// whole batch, the others fail a single item (and, under the fail-fast policy,
/// the batch with it). The remaining variants come from configuration and the
/// low-level DER/PEM plumbing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IssueError {
    /// The root CA key or certificate could not be read or decoded.
    #[error("Failed to load CA key material: {0}")]
    KeyLoad(String),

    /// Key generation or CSR construction/signing failed.
    #[error("Failed to generate CSR: {0}")]
    CsrGeneration(String),

    /// The CSR could not be parsed or its self-signature did not verify.
    #[error("Invalid CSR: {0}")]
    CsrInvalid(String),

    /// The requested serial number is not a positive base-10 integer.
    #[error("Invalid serial number: {0}")]
    SerialNumberFormat(String),

    /// The requested expiration could not be parsed as a point in time.
    #[error("Invalid expiration date: {0}")]
    ExpirationFormat(String),

    /// Building or signing the leaf certificate failed.
    #[error("Failed to sign certificate: {0}")]
    CertificateSigning(String),

    /// The issued certificate does not chain to the root.
    #[error("Certificate chain verification failed: {0}")]
    ChainVerification(String),

    /// Invalid or unreadable configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error during data encoding.
    #[error("Failed to encode data: {0}")]
    Encoding(String),

    /// Error during data decoding.
    #[error("Failed to decode data: {0}")]
    Decoding(String),
}

impl From<der::Error> for IssueError {
    /// Converts a `der::Error` into an `IssueError`.
    fn from(err: der::Error) -> Self {
        IssueError::Decoding(err.to_string())
    }
}

impl From<rsa::Error> for IssueError {
    fn from(err: rsa::Error) -> Self {
        IssueError::Encoding(format!("RSA: {err}"))
    }
}

impl From<rsa::pkcs1::Error> for IssueError {
    fn from(err: rsa::pkcs1::Error) -> Self {
        IssueError::Decoding(format!("PKCS#1: {err}"))
    }
}

impl From<pkcs8::Error> for IssueError {
    fn from(err: pkcs8::Error) -> Self {
        IssueError::Decoding(format!("PKCS#8: {err}"))
    }
}

impl From<pkcs8::spki::Error> for IssueError {
    fn from(err: pkcs8::spki::Error) -> Self {
        IssueError::Decoding(format!("SPKI: {err}"))
    }
}

impl From<pem::PemError> for IssueError {
    fn from(err: pem::PemError) -> Self {
        IssueError::Decoding(format!("PEM: {err}"))
    }
}
