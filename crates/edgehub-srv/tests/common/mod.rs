//! Harness for end-to-end tests: a real gateway on a loopback port.

#![allow(dead_code)]

use edgehub_ca::{signing_duration, CsrSigner, ExtKeyUsage, RootOfTrust, SigningRequest, X509Signer};
use edgehub_srv::ServerConfig;
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// A running gateway.
pub struct TestGateway {
    pub root: Arc<RootOfTrust>,
    pub addr: SocketAddr,
    pub tls: bool,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<edgehub_srv::Result<()>>,
}

impl TestGateway {
    pub async fn start(config: ServerConfig) -> Self {
        let root = Arc::new(RootOfTrust::generate("edgehub e2e root").unwrap());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let tls = config.tls.enabled;

        let (tx, rx) = oneshot::channel::<()>();
        let server_root = Arc::clone(&root);
        let handle = tokio::spawn(async move {
            edgehub_srv::server::serve(listener, &config, server_root, async {
                let _ = rx.await;
            })
            .await
        });

        Self {
            root,
            addr,
            tls,
            shutdown: Some(tx),
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        let scheme = if self.tls { "https" } else { "http" };
        format!("{scheme}://127.0.0.1:{}{path}", self.addr.port())
    }

    /// HTTP client trusting the gateway CA, optionally presenting `identity`.
    pub fn client(&self, identity: Option<&NodeIdentity>) -> reqwest::Client {
        let ca = reqwest::Certificate::from_der(self.root.cert_der()).unwrap();
        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .add_root_certificate(ca);
        if let Some(identity) = identity {
            builder = builder.identity(reqwest::Identity::from_pem(identity.pem_bundle().as_bytes()).unwrap());
        }
        builder.build().unwrap()
    }

    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.handle.await.unwrap().unwrap();
    }
}

/// An edge node's key pair and, once enrolled, its certificate.
pub struct NodeIdentity {
    pub key: KeyPair,
    pub cert_pem: String,
}

impl NodeIdentity {
    /// Certificate and key in one PEM bundle.
    pub fn pem_bundle(&self) -> String {
        format!("{}{}", self.cert_pem, self.key.serialize_pem())
    }
}

/// A DER CSR for `system:node:<node>` and the key it was made with.
pub fn node_csr(node: &str) -> (Vec<u8>, KeyPair) {
    let key = KeyPair::generate().unwrap();
    let mut params = CertificateParams::new(Vec::new()).unwrap();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::OrganizationName, "system:nodes");
    dn.push(DnType::CommonName, format!("system:node:{node}"));
    params.distinguished_name = dn;
    let csr = params.serialize_request(&key).unwrap();
    (csr.der().to_vec(), key)
}

/// A client certificate for `node` issued directly by `root`.
pub fn issued_identity(root: &RootOfTrust, node: &str) -> NodeIdentity {
    let (csr, key) = node_csr(node);
    let request = SigningRequest {
        csr,
        usages: vec![ExtKeyUsage::ClientAuth],
        validity: signing_duration(1),
    };
    let issued = X509Signer.sign_csr(&request, root).unwrap();
    NodeIdentity {
        key,
        cert_pem: issued.pem(),
    }
}
