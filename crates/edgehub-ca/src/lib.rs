//! # edgehub-ca
//!
//! Certificate authority primitives for the edgehub enrollment gateway.
//!
//! ## Architecture
//!
//! ```text
//! RootOfTrust (CA cert + CA key, loaded once at startup, read-only)
//!        │
//!        ├── trust anchor for presented edge client certificates
//!        ├── HMAC secret for bootstrap bearer tokens
//!        └── issuer for CSR-based edge certificates (X509Signer)
//! ```
//!
//! ## Security Model
//!
//! - The root is never mutated after startup, so it is shared as an `Arc`
//!   without locking.
//! - Edge nodes generate their own keys and only send CSRs.
//! - Issued certificates are short-lived and never stored server-side.
//!
//! ## Example
//!
//! ```rust,ignore
//! use edgehub_ca::{RootOfTrust, SigningRequest, X509Signer, CsrSigner, signing_duration};
//!
//! let root = RootOfTrust::load("rootCA.crt", "rootCA.key")?;
//! let request = SigningRequest::new(csr_der, None, signing_duration(365))?;
//! let issued = X509Signer.sign_csr(&request, &root)?;
//! println!("{}", issued.pem());
//! ```

mod error;
mod root;
mod signer;
mod usage;

pub use error::CaError;
pub use root::RootOfTrust;
pub use signer::{signing_duration, CsrSigner, IssuedCertificate, SigningRequest, X509Signer};
pub use usage::{parse_usages, ExtKeyUsage};

/// Result type for CA operations.
pub type Result<T> = std::result::Result<T, CaError>;

/// Validity of a freshly generated root, in days.
pub const ROOT_VALIDITY_DAYS: u32 = 10 * 365;
