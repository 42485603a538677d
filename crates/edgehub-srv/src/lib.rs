//! edgehub-srv: edge-node enrollment gateway.
//!
//! An edge agent proves who it is and receives a freshly signed, short-lived
//! client certificate in return.
//!
//! # Trust paths
//!
//! Exactly one of two mechanisms authenticates each enrollment request:
//! - **Certificate**: a client certificate from the TLS handshake, or one
//!   forwarded by a trusted TLS-terminating proxy in `X-Forwarded-Client-Cert`.
//!   It must chain to the root of trust and name the claimed node.
//! - **Token**: a bootstrap bearer token signed with the CA key, used when no
//!   certificate is available (first enrollment).
//!
//! # Request pipeline
//!
//! ```text
//! TLS/TCP accept ── ConnectionInfo (peer addr + handshake certificates)
//!        │
//! attach_transport_security ── fresh ConnectionSecurity per request
//!        │
//! normalize_client_cert ── forwarded header -> ConnectionSecurity (never rejects)
//!        │
//! enroll ── TrustVerifier | TokenValidator -> CertificateSigner -> PEM
//! ```
//!
//! Decoding evidence never rejects a request; only the verifiers do.

pub mod config;
pub mod error;
pub mod forwarded;
pub mod handler;
pub mod normalize;
pub mod server;
pub mod signer;
pub mod tls;
pub mod token;
pub mod verify;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenience.
pub use config::ServerConfig;
pub use error::{AuthError, ParseError, SignError, SrvError};
pub use handler::{router, AppState};
pub use normalize::{ConnectionSecurity, PeerCertificate};
pub use tls::ConnectionInfo;

/// Result type for edgehub-srv operations.
pub type Result<T> = std::result::Result<T, SrvError>;
