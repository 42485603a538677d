//! TLS termination with optional client certificates.
//!
//! The rustls client verifier trusts only the root of trust and lets clients
//! without a certificate through, since first-time enrollment uses a token.
//! Handshakes run on their own tasks so a stalled client cannot hold up the
//! accept loop.

use axum::extract::connect_info::Connected;
use axum::serve::{IncomingStream, Listener};
use edgehub_ca::RootOfTrust;
use rustls::server::WebPkiClientVerifier;
use rustls::RootCertStore;
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, warn};

use crate::config::TlsConfig;
use crate::SrvError;

/// Validity of a server certificate issued at startup, in days.
pub const SERVER_CERT_VALIDITY_DAYS: u32 = 365;

/// Completed handshakes waiting for axum to pick them up.
const ACCEPT_BACKLOG: usize = 128;

/// Pause after a failed `accept()` (e.g. out of file descriptors).
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// What the transport knows about a connection.
#[derive(Clone, Debug)]
pub struct ConnectionInfo {
    /// The peer socket address.
    pub peer_addr: SocketAddr,
    /// Certificates presented in the TLS handshake, end-entity first.
    pub peer_certificates: Vec<CertificateDer<'static>>,
}

impl Connected<IncomingStream<'_, TcpListener>> for ConnectionInfo {
    fn connect_info(target: IncomingStream<'_, TcpListener>) -> Self {
        Self {
            peer_addr: *target.remote_addr(),
            peer_certificates: Vec::new(),
        }
    }
}

impl Connected<IncomingStream<'_, TlsListener>> for ConnectionInfo {
    fn connect_info(target: IncomingStream<'_, TlsListener>) -> Self {
        let (_, session) = target.io().get_ref();
        Self {
            peer_addr: *target.remote_addr(),
            peer_certificates: session
                .peer_certificates()
                .map(<[CertificateDer<'static>]>::to_vec)
                .unwrap_or_default(),
        }
    }
}

/// Build the rustls server config.
pub fn server_config(tls: &TlsConfig, root: &RootOfTrust) -> crate::Result<rustls::ServerConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let mut roots = RootCertStore::empty();
    roots
        .add(root.cert_der().clone())
        .map_err(|e| SrvError::Tls(format!("CA certificate rejected by rustls: {e}")))?;

    let client_verifier =
        WebPkiClientVerifier::builder_with_provider(Arc::new(roots), Arc::clone(&provider))
            .allow_unauthenticated()
            .build()
            .map_err(|e| SrvError::Tls(format!("client verifier: {e}")))?;

    let (chain, key) = server_identity(tls, root)?;

    let mut config = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| SrvError::Tls(e.to_string()))?
        .with_client_cert_verifier(client_verifier)
        .with_single_cert(chain, key)
        .map_err(|e| SrvError::Tls(format!("server certificate: {e}")))?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(config)
}

/// Load the configured server certificate, or issue one from the CA.
pub fn server_identity(
    tls: &TlsConfig,
    root: &RootOfTrust,
) -> crate::Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)> {
    match (&tls.cert_path, &tls.key_path) {
        (Some(cert_path), Some(key_path)) => {
            let chain = CertificateDer::pem_file_iter(cert_path)
                .and_then(|certs| certs.collect::<Result<Vec<_>, _>>())
                .map_err(|e| SrvError::Tls(format!("{}: {e}", cert_path.display())))?;
            if chain.is_empty() {
                return Err(SrvError::Tls(format!(
                    "{}: no certificates found",
                    cert_path.display()
                )));
            }
            let key = PrivateKeyDer::from_pem_file(key_path)
                .map_err(|e| SrvError::Tls(format!("{}: {e}", key_path.display())))?;
            debug!(cert = %cert_path.display(), "loaded server certificate");
            Ok((chain, key))
        }
        (None, None) => {
            let (cert, key) = root
                .issue_server_certificate(&tls.advertise_addresses, SERVER_CERT_VALIDITY_DAYS)?;
            debug!(sans = ?tls.advertise_addresses, "issued server certificate from CA");
            Ok((
                vec![CertificateDer::from(cert)],
                PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key)),
            ))
        }
        _ => Err(SrvError::Config(
            "tls.cert_path and tls.key_path must be set together".to_string(),
        )),
    }
}

/// An axum listener yielding TLS streams whose handshakes already completed.
pub struct TlsListener {
    local_addr: SocketAddr,
    ready: mpsc::Receiver<(TlsStream<TcpStream>, SocketAddr)>,
    accept_task: JoinHandle<()>,
}

impl TlsListener {
    pub fn new(
        listener: TcpListener,
        acceptor: TlsAcceptor,
        handshake_timeout: Duration,
    ) -> io::Result<Self> {
        let local_addr = listener.local_addr()?;
        let (tx, ready) = mpsc::channel(ACCEPT_BACKLOG);
        let accept_task = tokio::spawn(accept_loop(listener, acceptor, handshake_timeout, tx));
        Ok(Self {
            local_addr,
            ready,
            accept_task,
        })
    }
}

impl Drop for TlsListener {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

impl Listener for TlsListener {
    type Io = TlsStream<TcpStream>;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        match self.ready.recv().await {
            Some(connection) => connection,
            // The accept loop only stops once this receiver is gone.
            None => std::future::pending().await,
        }
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        Ok(self.local_addr)
    }
}

async fn accept_loop(
    listener: TcpListener,
    acceptor: TlsAcceptor,
    handshake_timeout: Duration,
    ready: mpsc::Sender<(TlsStream<TcpStream>, SocketAddr)>,
) {
    loop {
        let (stream, peer_addr) = tokio::select! {
            () = ready.closed() => return,
            accepted = listener.accept() => match accepted {
                Ok(connection) => connection,
                Err(e) => {
                    warn!(error = %e, "TCP accept failed");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    continue;
                }
            },
        };

        let acceptor = acceptor.clone();
        let ready = ready.clone();
        tokio::spawn(async move {
            match tokio::time::timeout(handshake_timeout, acceptor.accept(stream)).await {
                Ok(Ok(tls)) => {
                    let presented = tls
                        .get_ref()
                        .1
                        .peer_certificates()
                        .is_some_and(|certs| !certs.is_empty());
                    debug!(peer_addr = %peer_addr, client_cert = presented, "TLS handshake complete");
                    if ready.send((tls, peer_addr)).await.is_err() {
                        debug!(peer_addr = %peer_addr, "listener closed, dropping connection");
                    }
                }
                Ok(Err(e)) => {
                    debug!(peer_addr = %peer_addr, error = %e, "TLS handshake failed");
                }
                Err(_) => {
                    debug!(peer_addr = %peer_addr, "TLS handshake timed out");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use std::path::PathBuf;
    use x509_parser::prelude::{FromDer, X509Certificate};

    #[test]
    fn test_issued_server_identity() {
        let root = testing::root();
        let (chain, key) = server_identity(&TlsConfig::default(), &root).unwrap();
        assert_eq!(chain.len(), 1);
        assert!(matches!(key, PrivateKeyDer::Pkcs8(_)));

        let (_, cert) = X509Certificate::from_der(chain[0].as_ref()).unwrap();
        assert_eq!(cert.issuer().to_string(), root.subject());
    }

    #[test]
    fn test_server_identity_from_files() {
        let root = testing::root();
        let (cert, key) = root
            .issue_server_certificate(&["gateway.local".to_string()], 1)
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let cert_path = dir.path().join("server.crt");
        let key_path = dir.path().join("server.key");
        std::fs::write(&cert_path, pem::encode(&pem::Pem::new("CERTIFICATE", cert.clone()))).unwrap();
        std::fs::write(&key_path, pem::encode(&pem::Pem::new("PRIVATE KEY", key))).unwrap();

        let tls = TlsConfig {
            cert_path: Some(cert_path),
            key_path: Some(key_path),
            ..TlsConfig::default()
        };
        let (chain, _) = server_identity(&tls, &root).unwrap();
        assert_eq!(chain[0].as_ref(), cert.as_slice());
    }

    #[test]
    fn test_server_identity_requires_both_paths() {
        let root = testing::root();
        let tls = TlsConfig {
            cert_path: Some(PathBuf::from("/tmp/server.crt")),
            ..TlsConfig::default()
        };
        assert!(matches!(server_identity(&tls, &root), Err(SrvError::Config(_))));
    }

    #[test]
    fn test_missing_server_certificate_file() {
        let root = testing::root();
        let tls = TlsConfig {
            cert_path: Some(PathBuf::from("/nonexistent/server.crt")),
            key_path: Some(PathBuf::from("/nonexistent/server.key")),
            ..TlsConfig::default()
        };
        assert!(matches!(server_identity(&tls, &root), Err(SrvError::Tls(_))));
    }

    #[test]
    fn test_server_config_builds() {
        let root = testing::root();
        let config = server_config(&TlsConfig::default(), &root).unwrap();
        assert_eq!(config.alpn_protocols, vec![b"http/1.1".to_vec()]);
    }
}
