//! Issuing edge certificates for authenticated requesters.

use edgehub_ca::{CsrSigner, IssuedCertificate, RootOfTrust, SigningRequest, X509Signer};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::SignError;

/// Signs CSRs with the root of trust for a fixed validity window.
pub struct CertificateSigner {
    root: Arc<RootOfTrust>,
    primitive: Arc<dyn CsrSigner>,
    validity: Duration,
}

impl CertificateSigner {
    /// Signer backed by [`X509Signer`].
    pub fn new(root: Arc<RootOfTrust>, validity: Duration) -> Self {
        Self::with_primitive(root, Arc::new(X509Signer), validity)
    }

    pub fn with_primitive(
        root: Arc<RootOfTrust>,
        primitive: Arc<dyn CsrSigner>,
        validity: Duration,
    ) -> Self {
        Self {
            root,
            primitive,
            validity,
        }
    }

    pub const fn validity(&self) -> Duration {
        self.validity
    }

    /// Sign `csr` with the usages named in the optional `Ext-Key-Usages` value.
    pub fn sign(&self, csr: &[u8], usages: Option<&str>) -> Result<IssuedCertificate, SignError> {
        debug!(usages = ?usages, csr_len = csr.len(), "received certificate signing request");
        let request = SigningRequest::new(csr, usages, self.validity)?;
        Ok(self.primitive.sign_csr(&request, &self.root)?)
    }
}

impl std::fmt::Debug for CertificateSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateSigner")
            .field("root", &self.root)
            .field("validity", &self.validity)
            .finish_non_exhaustive()
    }
}
