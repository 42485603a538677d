//! Error types for the enrollment gateway.
//!
//! [`SrvError`] covers startup and serving. The per-request taxonomy is
//! [`ParseError`] (never shown to clients), [`AuthError`] (401) and
//! [`SignError`] (500).

use axum::http::StatusCode;
use edgehub_ca::CaError;
use thiserror::Error;

/// Errors that can occur while configuring or running the gateway.
#[derive(Error, Debug)]
pub enum SrvError {
    /// Configuration is invalid or missing required fields.
    #[error("config error: {0}")]
    Config(String),

    /// TLS setup failed.
    #[error("tls error: {0}")]
    Tls(String),

    /// HTTP server failed to bind or serve.
    #[error("server error: {0}")]
    Server(String),

    /// Root of trust could not be loaded or used.
    #[error("ca error: {0}")]
    Ca(#[from] CaError),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A forwarded client certificate could not be decoded.
///
/// Internal only: the request continues as if no certificate was presented.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Header value is not visible ASCII.
    #[error("header is not valid text: {0}")]
    Header(String),

    /// Header value is not valid base64.
    #[error("base64 decode failed: {0}")]
    Base64(String),

    /// Decoded payload looked like PEM but could not be parsed.
    #[error("pem decode failed: {0}")]
    Pem(String),

    /// PEM blocks were present but none was a certificate.
    #[error("no CERTIFICATE block found")]
    NoCertificate,

    /// Selected bytes are not an X.509 certificate.
    #[error("x509 parse failed: {0}")]
    X509(String),
}

/// The requester could not be authenticated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Certificate does not chain to the root of trust for client auth.
    #[error("chain verification failed: {0}")]
    Chain(String),

    /// Certificate subject does not name the claimed node.
    #[error("node name does not match certificate subject")]
    SubjectMismatch,

    /// No `Authorization` header value.
    #[error("token validation failure, token is empty")]
    EmptyToken,

    /// `Authorization` is not `<scheme> <token>`.
    #[error("token validation failure, malformed header")]
    MalformedHeader,

    /// The token verification primitive failed.
    #[error("token validation failure, err: {0}")]
    Token(String),

    /// The token was checked and is not valid.
    #[error("token validation failure, token is invalid")]
    InvalidToken,
}

impl AuthError {
    /// HTTP status reported to the client.
    pub const fn status(&self) -> StatusCode {
        StatusCode::UNAUTHORIZED
    }
}

/// A certificate could not be issued for an authenticated requester.
#[derive(Error, Debug)]
pub enum SignError {
    /// Declared body length exceeds the configured cap.
    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    /// Body could not be read (including exceeding the cap mid-stream).
    #[error("fail to read request body: {0}")]
    Body(String),

    /// Bad usages payload, bad CSR, or CA primitive failure.
    #[error(transparent)]
    Ca(#[from] CaError),
}

impl SignError {
    /// HTTP status reported to the client.
    pub const fn status(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}
