//! Error types for CA operations.

use thiserror::Error;

/// Errors raised while loading the root of trust or signing certificates.
#[derive(Error, Debug)]
pub enum CaError {
    /// The CA certificate could not be decoded.
    #[error("certificate parse error: {0}")]
    CertParse(String),

    /// The CA private key could not be decoded or used.
    #[error("private key error: {0}")]
    Key(String),

    /// The certificate signing request is malformed or its signature is invalid.
    #[error("invalid certificate signing request: {0}")]
    InvalidCsr(String),

    /// The requested extended key usages could not be deserialized.
    #[error("unmarshal extended key usages failed: {0}")]
    Usages(String),

    /// Certificate construction or signing failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// IO error while reading key material.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Error reported by the certificate generator.
    #[error("certificate generation error: {0}")]
    Rcgen(#[from] rcgen::Error),
}
