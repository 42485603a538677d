//! Per-request connection security context and the request normalizer.
//!
//! Two middleware layers run before routing:
//! 1. [`attach_transport_security`] builds a fresh [`ConnectionSecurity`]
//!    from the TLS handshake of the underlying connection.
//! 2. [`normalize_client_cert`] replaces it with a forwarded certificate
//!    when the forwarded header is present and trusted, or resets it to
//!    empty when that header cannot be decoded.
//!
//! Neither layer rejects a request.

use axum::extract::{ConnectInfo, Request, State};
use axum::http::HeaderName;
use axum::middleware::Next;
use axum::response::Response;
use rustls_pki_types::CertificateDer;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, warn};
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::config::ForwardedCertConfig;
use crate::{forwarded, ConnectionInfo, ParseError, SrvError};

/// An X.509 certificate presented by the peer, live for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerCertificate {
    der: CertificateDer<'static>,
    subject: String,
    serial: String,
    organizations: Vec<String>,
    common_name: Option<String>,
}

impl PeerCertificate {
    /// Parse a DER certificate.
    pub fn from_der(der: impl Into<Vec<u8>>) -> Result<Self, ParseError> {
        let der: Vec<u8> = der.into();

        let (subject, serial, organizations, common_name) = {
            let (rest, cert) =
                X509Certificate::from_der(&der).map_err(|e| ParseError::X509(e.to_string()))?;
            if !rest.is_empty() {
                return Err(ParseError::X509(format!(
                    "{} trailing bytes after certificate",
                    rest.len()
                )));
            }
            let name = cert.subject();
            let organizations = name
                .iter_organization()
                .filter_map(|attr| attr.as_str().ok())
                .map(str::to_owned)
                .collect();
            let common_name = name
                .iter_common_name()
                .next()
                .and_then(|attr| attr.as_str().ok())
                .map(str::to_owned);
            let serial = cert
                .raw_serial()
                .iter()
                .map(|b| format!("{b:02x}"))
                .collect::<String>();
            (name.to_string(), serial, organizations, common_name)
        };

        Ok(Self {
            der: CertificateDer::from(der),
            subject,
            serial,
            organizations,
            common_name,
        })
    }

    /// DER bytes.
    pub fn der(&self) -> &CertificateDer<'static> {
        &self.der
    }

    /// Subject distinguished name.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Serial number (hex).
    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Subject organization values, in order.
    pub fn organizations(&self) -> &[String] {
        &self.organizations
    }

    /// Subject common name.
    pub fn common_name(&self) -> Option<&str> {
        self.common_name.as_deref()
    }
}

/// Trust evidence attached to a single request.
#[derive(Debug, Clone, Default)]
pub struct ConnectionSecurity {
    peer_certificates: Vec<PeerCertificate>,
}

impl ConnectionSecurity {
    /// A context carrying exactly one certificate.
    pub fn with_certificate(certificate: PeerCertificate) -> Self {
        Self {
            peer_certificates: vec![certificate],
        }
    }

    /// Build from the handshake of the underlying connection.
    ///
    /// Only the end-entity certificate is kept.
    pub fn from_transport(info: &ConnectionInfo) -> Self {
        let Some(der) = info.peer_certificates.first() else {
            return Self::default();
        };
        match PeerCertificate::from_der(der.to_vec()) {
            Ok(cert) => Self::with_certificate(cert),
            Err(e) => {
                debug!(peer_addr = %info.peer_addr, error = %e, "unparseable handshake certificate");
                Self::default()
            }
        }
    }

    /// The certificate the handler judges, if any.
    pub fn peer_certificate(&self) -> Option<&PeerCertificate> {
        self.peer_certificates.first()
    }

    /// All peer certificates.
    pub fn peer_certificates(&self) -> &[PeerCertificate] {
        &self.peer_certificates
    }

    pub fn is_empty(&self) -> bool {
        self.peer_certificates.is_empty()
    }
}

/// When a forwarded certificate header may stand in for a TLS handshake.
#[derive(Debug, Clone)]
pub struct ForwardedCertPolicy {
    pub enabled: bool,
    pub header: HeaderName,
    pub trusted_sources: Vec<IpAddr>,
}

impl ForwardedCertPolicy {
    /// Whether a request from `source` may supply the header.
    pub fn accepts(&self, source: Option<IpAddr>) -> bool {
        if !self.enabled {
            return false;
        }
        if self.trusted_sources.is_empty() {
            return true;
        }
        source.is_some_and(|ip| {
            let ip = ip.to_canonical();
            self.trusted_sources
                .iter()
                .any(|trusted| trusted.to_canonical() == ip)
        })
    }
}

impl TryFrom<&ForwardedCertConfig> for ForwardedCertPolicy {
    type Error = SrvError;

    fn try_from(config: &ForwardedCertConfig) -> Result<Self, Self::Error> {
        let header = HeaderName::try_from(config.header.as_str()).map_err(|e| {
            SrvError::Config(format!("invalid forwarded_cert.header '{}': {e}", config.header))
        })?;
        Ok(Self {
            enabled: config.enabled,
            header,
            trusted_sources: config.trusted_sources.clone(),
        })
    }
}

/// Attach a fresh [`ConnectionSecurity`] built from the transport.
pub async fn attach_transport_security(mut request: Request, next: Next) -> Response {
    let security = request
        .extensions()
        .get::<ConnectInfo<ConnectionInfo>>()
        .map(|ConnectInfo(info)| ConnectionSecurity::from_transport(info))
        .unwrap_or_default();
    request.extensions_mut().insert(security);
    next.run(request).await
}

/// Apply the forwarded-certificate header, if any.
pub async fn normalize_client_cert(
    State(policy): State<Arc<ForwardedCertPolicy>>,
    mut request: Request,
    next: Next,
) -> Response {
    apply_forwarded_certificate(&policy, &mut request);
    next.run(request).await
}

/// Strip the forwarded header and fold it into the request's
/// [`ConnectionSecurity`].
///
/// - header absent, or from an untrusted source: context left as is
/// - header decodes: context holds exactly that certificate
/// - header does not decode: context reset to empty
pub fn apply_forwarded_certificate(policy: &ForwardedCertPolicy, request: &mut Request) {
    let Some(value) = request.headers_mut().remove(&policy.header) else {
        return;
    };

    let source = request
        .extensions()
        .get::<ConnectInfo<ConnectionInfo>>()
        .map(|ConnectInfo(info)| info.peer_addr.ip());
    if !policy.accepts(source) {
        warn!(
            source = ?source,
            header = %policy.header,
            "ignoring forwarded client certificate from untrusted source"
        );
        return;
    }

    let extracted = value
        .to_str()
        .map_err(|e| ParseError::Header(e.to_string()))
        .and_then(forwarded::extract);

    let security = match extracted {
        Ok(cert) => {
            debug!(subject = %cert.subject(), serial = %cert.serial(), "using forwarded client certificate");
            ConnectionSecurity::with_certificate(cert)
        }
        Err(e) => {
            warn!(source = ?source, error = %e, "failed to parse forwarded client certificate");
            ConnectionSecurity::default()
        }
    };
    request.extensions_mut().insert(security);
}
