//! Root of trust: the CA certificate and key every request is judged against.

use rcgen::string::Ia5String;
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa,
    Issuer, KeyPair, KeyUsagePurpose, SanType,
};
use rustls_pki_types::CertificateDer;
use std::fmt;
use std::net::IpAddr;
use std::path::Path;
use tracing::debug;
use uuid::Uuid;
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::{CaError, ROOT_VALIDITY_DAYS};

const PEM_MARKER: &[u8] = b"-----BEGIN";

/// The CA certificate and private key, established once at startup.
///
/// Never mutated after construction; share it as `Arc<RootOfTrust>`.
pub struct RootOfTrust {
    cert_der: CertificateDer<'static>,
    key_der: Vec<u8>,
    key_pair: KeyPair,
    subject: String,
}

impl RootOfTrust {
    /// Build from a DER certificate and a PKCS#8 DER private key.
    pub fn from_der(cert_der: Vec<u8>, key_der: Vec<u8>) -> crate::Result<Self> {
        let subject = {
            let (_, cert) = X509Certificate::from_der(&cert_der)
                .map_err(|e| CaError::CertParse(e.to_string()))?;
            cert.subject().to_string()
        };

        let key_pair = KeyPair::try_from(key_der.as_slice())
            .map_err(|e| CaError::Key(format!("expected a PKCS#8 private key: {e}")))?;

        Ok(Self {
            cert_der: CertificateDer::from(cert_der),
            key_der,
            key_pair,
            subject,
        })
    }

    /// Build from PEM-encoded certificate and key.
    pub fn from_pem(cert_pem: &str, key_pem: &str) -> crate::Result<Self> {
        let cert = pem::parse(cert_pem).map_err(|e| CaError::CertParse(e.to_string()))?;
        let key = pem::parse(key_pem).map_err(|e| CaError::Key(e.to_string()))?;
        Self::from_der(cert.into_contents(), key.into_contents())
    }

    /// Load certificate and key files, each either PEM or DER.
    pub fn load(cert_path: impl AsRef<Path>, key_path: impl AsRef<Path>) -> crate::Result<Self> {
        let cert_path = cert_path.as_ref();
        let key_path = key_path.as_ref();

        let cert = read_der(cert_path).map_err(|e| match e {
            CaError::Io(_) => e,
            other => CaError::CertParse(format!("{}: {other}", cert_path.display())),
        })?;
        let key = read_der(key_path).map_err(|e| match e {
            CaError::Io(_) => e,
            other => CaError::Key(format!("{}: {other}", key_path.display())),
        })?;

        let root = Self::from_der(cert, key)?;
        debug!(subject = %root.subject, path = %cert_path.display(), "loaded root of trust");
        Ok(root)
    }

    /// Generate a self-signed root. Intended for development and tests.
    pub fn generate(common_name: &str) -> crate::Result<Self> {
        let key_pair = KeyPair::generate()?;

        let mut params = CertificateParams::new(Vec::new())?;
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, common_name);
        dn.push(DnType::OrganizationName, "edgehub");
        params.distinguished_name = dn;

        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];

        let now = time::OffsetDateTime::now_utc();
        params.not_before = now;
        params.not_after = now + time::Duration::days(i64::from(ROOT_VALIDITY_DAYS));
        params.serial_number = Some(random_serial().into());

        let certificate = params.self_signed(&key_pair)?;
        let key_der = key_pair.serialize_der();

        Self::from_der(certificate.der().to_vec(), key_der)
    }

    /// Issue a TLS server certificate for the gateway itself.
    ///
    /// Returns `(cert_der, pkcs8_key_der)`. IP literals become IP SANs,
    /// everything else a DNS SAN.
    pub fn issue_server_certificate(
        &self,
        sans: &[String],
        validity_days: u32,
    ) -> crate::Result<(Vec<u8>, Vec<u8>)> {
        let server_key = KeyPair::generate()?;

        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(
            DnType::CommonName,
            sans.first().map_or("edgehub", String::as_str),
        );
        dn.push(DnType::OrganizationName, "edgehub");
        params.distinguished_name = dn;

        params.subject_alt_names = sans
            .iter()
            .map(|san| match san.parse::<IpAddr>() {
                Ok(ip) => Ok(SanType::IpAddress(ip)),
                Err(_) => Ia5String::try_from(san.clone())
                    .map(SanType::DnsName)
                    .map_err(|e| CaError::Signing(format!("invalid DNS name '{san}': {e}"))),
            })
            .collect::<crate::Result<Vec<_>>>()?;

        params.is_ca = IsCa::NoCa;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];

        let now = time::OffsetDateTime::now_utc();
        params.not_before = now;
        params.not_after = now + time::Duration::days(i64::from(validity_days));
        params.serial_number = Some(random_serial().into());

        let issuer = Issuer::from_ca_cert_der(&self.cert_der, &self.key_pair)?;
        let cert = params.signed_by(&server_key, &issuer)?;
        Ok((cert.der().to_vec(), server_key.serialize_der()))
    }

    /// DER bytes of the CA certificate.
    pub fn cert_der(&self) -> &CertificateDer<'static> {
        &self.cert_der
    }

    /// PEM encoding of the CA certificate.
    pub fn cert_pem(&self) -> String {
        pem::encode(&pem::Pem::new("CERTIFICATE", self.cert_der.to_vec()))
    }

    /// Raw DER bytes of the CA private key.
    pub fn key_der(&self) -> &[u8] {
        &self.key_der
    }

    /// The CA key pair.
    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }

    /// Subject distinguished name of the CA certificate.
    pub fn subject(&self) -> &str {
        &self.subject
    }
}

impl fmt::Debug for RootOfTrust {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootOfTrust")
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}

/// Random 64-bit serial.
pub(crate) fn random_serial() -> u64 {
    let id = Uuid::new_v4().as_u128();
    // Keep the top bit clear so the DER integer stays positive without padding.
    (id as u64) & (u64::MAX >> 1)
}

fn read_der(path: &Path) -> crate::Result<Vec<u8>> {
    let bytes = std::fs::read(path)?;
    if bytes.windows(PEM_MARKER.len()).any(|w| w == PEM_MARKER) {
        let block = pem::parse(&bytes).map_err(|e| CaError::CertParse(e.to_string()))?;
        Ok(block.into_contents())
    } else {
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_root() {
        let root = RootOfTrust::generate("edgehub test root").unwrap();
        assert!(root.subject().contains("edgehub test root"));
        assert!(root.cert_pem().contains("BEGIN CERTIFICATE"));
        assert!(!root.key_der().is_empty());
    }

    #[test]
    fn test_pem_round_trip() {
        let root = RootOfTrust::generate("round trip").unwrap();
        let key_pem = root.key_pair().serialize_pem();

        let loaded = RootOfTrust::from_pem(&root.cert_pem(), &key_pem).unwrap();
        assert_eq!(loaded.cert_der(), root.cert_der());
        assert_eq!(loaded.key_der(), root.key_der());
        assert_eq!(loaded.subject(), root.subject());
    }

    #[test]
    fn test_load_pem_and_der_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = RootOfTrust::generate("files").unwrap();

        let cert_pem = dir.path().join("rootCA.crt");
        let key_der = dir.path().join("rootCA.key");
        std::fs::write(&cert_pem, root.cert_pem()).unwrap();
        std::fs::write(&key_der, root.key_der()).unwrap();

        let loaded = RootOfTrust::load(&cert_pem, &key_der).unwrap();
        assert_eq!(loaded.cert_der(), root.cert_der());
    }

    #[test]
    fn test_load_missing_file() {
        let err = RootOfTrust::load("/nonexistent/ca.crt", "/nonexistent/ca.key").unwrap_err();
        assert!(matches!(err, CaError::Io(_)));
    }

    #[test]
    fn test_garbage_certificate_rejected() {
        let root = RootOfTrust::generate("garbage").unwrap();
        let err = RootOfTrust::from_der(vec![0x30, 0x01, 0x00], root.key_der().to_vec()).unwrap_err();
        assert!(matches!(err, CaError::CertParse(_)));
    }

    #[test]
    fn test_garbage_key_rejected() {
        let root = RootOfTrust::generate("garbage key").unwrap();
        let err = RootOfTrust::from_der(root.cert_der().to_vec(), vec![1, 2, 3]).unwrap_err();
        assert!(matches!(err, CaError::Key(_)));
    }

    #[test]
    fn test_issue_server_certificate() {
        let root = RootOfTrust::generate("server issuer").unwrap();
        let sans = vec!["localhost".to_string(), "127.0.0.1".to_string()];
        let (cert_der, key_der) = root.issue_server_certificate(&sans, 30).unwrap();

        let (_, cert) = X509Certificate::from_der(&cert_der).unwrap();
        assert_eq!(cert.issuer().to_string(), root.subject());
        let eku = cert.extended_key_usage().unwrap().unwrap();
        assert!(eku.value.server_auth);
        assert!(KeyPair::try_from(key_der.as_slice()).is_ok());
    }
}
