//! Bootstrap bearer tokens.
//!
//! Edge nodes without a certificate authenticate with a token minted by the
//! operator. The cryptographic check sits behind [`TokenVerifier`] so the
//! header handling in [`TokenValidator`] is independent of the token format.

use chrono::Utc;
use edgehub_ca::RootOfTrust;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::AuthError;

/// Subject placed in bootstrap tokens.
pub const BOOTSTRAP_SUBJECT: &str = "edgehub-bootstrap";

/// The token primitive failed before reaching a verdict.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct TokenError(String);

/// Cryptographic token verification: `Ok(true)` valid, `Ok(false)` invalid.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str, key: &[u8]) -> Result<bool, TokenError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct BootstrapClaims {
    sub: String,
    iat: i64,
    exp: i64,
}

/// HS256 JWT verification keyed by raw secret bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct JwtVerifier;

impl TokenVerifier for JwtVerifier {
    fn verify(&self, token: &str, key: &[u8]) -> Result<bool, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp"]);

        match decode::<BootstrapClaims>(token, &DecodingKey::from_secret(key), &validation) {
            Ok(_) => Ok(true),
            Err(e) => match e.kind() {
                ErrorKind::InvalidSignature
                | ErrorKind::ExpiredSignature
                | ErrorKind::ImmatureSignature => Ok(false),
                _ => Err(TokenError(e.to_string())),
            },
        }
    }
}

/// Mint a bootstrap token valid for `ttl`.
pub fn issue_token(key: &[u8], ttl: Duration) -> Result<String, TokenError> {
    let ttl = i64::try_from(ttl.as_secs()).map_err(|e| TokenError(e.to_string()))?;
    let now = Utc::now().timestamp();
    let claims = BootstrapClaims {
        sub: BOOTSTRAP_SUBJECT.to_string(),
        iat: now,
        exp: now.saturating_add(ttl),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(key),
    )
    .map_err(|e| TokenError(e.to_string()))
}

/// Validates the `Authorization` header against the CA key.
pub struct TokenValidator {
    root: Arc<RootOfTrust>,
    verifier: Arc<dyn TokenVerifier>,
}

impl TokenValidator {
    pub fn new(root: Arc<RootOfTrust>, verifier: Arc<dyn TokenVerifier>) -> Self {
        Self { root, verifier }
    }

    /// Check a raw `Authorization` header value (`""` when absent).
    pub fn verify(&self, authorization: &str) -> Result<(), AuthError> {
        if authorization.trim().is_empty() {
            return Err(AuthError::EmptyToken);
        }

        let mut parts = authorization.split_whitespace();
        let (Some(_scheme), Some(token), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(AuthError::MalformedHeader);
        };

        match self.verifier.verify(token, self.root.key_der()) {
            Ok(true) => Ok(()),
            Ok(false) => Err(AuthError::InvalidToken),
            Err(e) => Err(AuthError::Token(e.to_string())),
        }
    }
}

impl std::fmt::Debug for TokenValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenValidator")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}
