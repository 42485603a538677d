//! HTTP endpoints: CA discovery and edge certificate enrollment.

use axum::body::{to_bytes, Body, Bytes};
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Router};
use edgehub_ca::{IssuedCertificate, RootOfTrust};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::normalize::{self, ForwardedCertPolicy};
use crate::signer::CertificateSigner;
use crate::token::{JwtVerifier, TokenValidator};
use crate::verify::TrustVerifier;
use crate::{ConnectionSecurity, ServerConfig, SignError};

/// Path of the unauthenticated CA certificate endpoint.
pub const CA_PATH: &str = "/ca.crt";
/// Path of the enrollment endpoint.
pub const EDGE_CERT_PATH: &str = "/edge.crt";

/// Claimed node identity.
pub static NODE_NAME: HeaderName = HeaderName::from_static("node-name");
/// Requested extended key usages (JSON list).
pub static EXT_KEY_USAGES: HeaderName = HeaderName::from_static("ext-key-usages");

const PEM_CONTENT_TYPE: &str = "application/x-pem-file";
const DER_CONTENT_TYPE: &str = "application/octet-stream";

/// Shared, read-only state for every request.
#[derive(Clone)]
pub struct AppState {
    pub root: Arc<RootOfTrust>,
    pub trust: Arc<TrustVerifier>,
    pub tokens: Arc<TokenValidator>,
    pub signer: Arc<CertificateSigner>,
    pub max_body_bytes: usize,
}

impl AppState {
    pub fn new(config: &ServerConfig, root: Arc<RootOfTrust>) -> crate::Result<Self> {
        Ok(Self {
            trust: Arc::new(TrustVerifier::new(&root, config.allow_legacy_subject)?),
            tokens: Arc::new(TokenValidator::new(Arc::clone(&root), Arc::new(JwtVerifier))),
            signer: Arc::new(CertificateSigner::new(
                Arc::clone(&root),
                config.signing_duration(),
            )),
            max_body_bytes: config.max_body_bytes,
            root,
        })
    }
}

/// Which mechanism authenticated an enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPath {
    Certificate,
    Token,
}

impl fmt::Display for AuthPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Certificate => "certificate",
            Self::Token => "token",
        })
    }
}

/// Build the router with the request normalizer in front of every route.
pub fn router(state: AppState, forwarded: ForwardedCertPolicy) -> Router {
    Router::new()
        .route(CA_PATH, get(get_ca))
        .route(EDGE_CERT_PATH, post(enroll))
        .layer(middleware::from_fn_with_state(
            Arc::new(forwarded),
            normalize::normalize_client_cert,
        ))
        .layer(middleware::from_fn(normalize::attach_transport_security))
        .with_state(state)
}

/// `GET /ca.crt`: the CA certificate in DER.
pub async fn get_ca(State(state): State<AppState>) -> Response {
    (
        [(header::CONTENT_TYPE, DER_CONTENT_TYPE)],
        state.root.cert_der().to_vec(),
    )
        .into_response()
}

/// `POST /edge.crt`: authenticate, then sign the CSR in the body.
pub async fn enroll(State(state): State<AppState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let node = header_str(&parts.headers, &NODE_NAME).unwrap_or_default();

    let peer_certificate = parts
        .extensions
        .get::<ConnectionSecurity>()
        .and_then(ConnectionSecurity::peer_certificate);

    let auth_path = if let Some(cert) = peer_certificate {
        if let Err(e) = state.trust.verify(cert, node) {
            let message = format!("failed to verify the certificate for edge node {node}: {e}");
            warn!(node = %node, subject = %cert.subject(), auth_path = %AuthPath::Certificate, error = %e, "enrollment rejected");
            return (e.status(), message).into_response();
        }
        AuthPath::Certificate
    } else {
        let authorization = header_str(&parts.headers, &header::AUTHORIZATION).unwrap_or_default();
        if let Err(e) = state.tokens.verify(authorization) {
            let message = format!("failed to verify the token for edge node {node}: {e}");
            warn!(node = %node, auth_path = %AuthPath::Token, error = %e, "enrollment rejected");
            return (e.status(), message).into_response();
        }
        AuthPath::Token
    };

    let usages = header_str(&parts.headers, &EXT_KEY_USAGES);
    match sign(&state, &parts.headers, body, usages).await {
        Ok(issued) => {
            info!(
                node = %node,
                auth_path = %auth_path,
                subject = %issued.subject,
                serial = %issued.serial,
                not_after = %issued.not_after,
                "issued edge certificate"
            );
            ([(header::CONTENT_TYPE, PEM_CONTENT_TYPE)], issued.pem()).into_response()
        }
        Err(e) => {
            let message = format!("failed to sign certificate for edge node {node}: {e}");
            warn!(node = %node, auth_path = %auth_path, error = %e, "signing failed");
            (e.status(), message).into_response()
        }
    }
}

async fn sign(
    state: &AppState,
    headers: &HeaderMap,
    body: Body,
    usages: Option<&str>,
) -> Result<IssuedCertificate, SignError> {
    let csr = read_bounded(headers, body, state.max_body_bytes).await?;
    state.signer.sign(&csr, usages)
}

/// Read at most `limit` bytes of body.
async fn read_bounded(headers: &HeaderMap, body: Body, limit: usize) -> Result<Bytes, SignError> {
    let declared = header_str(headers, &header::CONTENT_LENGTH).and_then(|v| v.parse::<u64>().ok());
    if declared.is_some_and(|len| len > limit as u64) {
        return Err(SignError::BodyTooLarge { limit });
    }
    to_bytes(body, limit)
        .await
        .map_err(|e| SignError::Body(e.to_string()))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
