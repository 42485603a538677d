//! CSR signing.
//!
//! [`CsrSigner`] is the opaque "sign a CSR" primitive: CSR bytes, usages and
//! a validity window in, signed certificate out. [`X509Signer`] is the
//! rcgen-backed implementation used in production.

use chrono::{DateTime, Utc};
use rcgen::{CertificateSigningRequestParams, IsCa, Issuer, KeyUsagePurpose};
use rustls_pki_types::CertificateSigningRequestDer;
use std::time::Duration;
use tracing::debug;
use x509_parser::certification_request::X509CertificationRequest;
use x509_parser::prelude::FromDer;

use crate::root::random_serial;
use crate::{parse_usages, CaError, ExtKeyUsage, RootOfTrust};

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Validity of an edge certificate configured in days: `days * 24h`.
pub const fn signing_duration(days: u32) -> Duration {
    Duration::from_secs(days as u64 * SECONDS_PER_DAY)
}

/// A single certificate signing request, consumed once by the signer.
#[derive(Debug, Clone)]
pub struct SigningRequest {
    /// Raw CSR bytes (DER, or PEM `CERTIFICATE REQUEST`).
    pub csr: Vec<u8>,
    /// Extended key usages to place in the certificate.
    pub usages: Vec<ExtKeyUsage>,
    /// How long the certificate stays valid from the moment of signing.
    pub validity: Duration,
}

impl SigningRequest {
    /// Build a request from the body and the optional `Ext-Key-Usages` header.
    pub fn new(
        csr: impl Into<Vec<u8>>,
        usages_header: Option<&str>,
        validity: Duration,
    ) -> crate::Result<Self> {
        Ok(Self {
            csr: csr.into(),
            usages: parse_usages(usages_header)?,
            validity,
        })
    }
}

/// A freshly signed certificate, returned to the caller and not retained.
#[derive(Debug, Clone)]
pub struct IssuedCertificate {
    /// DER bytes of the certificate.
    pub der: Vec<u8>,
    /// Serial number (hex).
    pub serial: String,
    /// Subject taken from the CSR.
    pub subject: String,
    /// Extended key usages granted.
    pub usages: Vec<ExtKeyUsage>,
    /// Not valid before.
    pub not_before: DateTime<Utc>,
    /// Not valid after.
    pub not_after: DateTime<Utc>,
}

impl IssuedCertificate {
    /// PEM encoding (single `CERTIFICATE` block).
    pub fn pem(&self) -> String {
        pem::encode(&pem::Pem::new("CERTIFICATE", self.der.clone()))
    }
}

/// The CA signing primitive.
pub trait CsrSigner: Send + Sync {
    /// Sign `request` with the CA held by `root`.
    fn sign_csr(&self, request: &SigningRequest, root: &RootOfTrust)
        -> crate::Result<IssuedCertificate>;
}

/// Signs CSRs with rcgen.
///
/// The issued certificate keeps the CSR's subject and SANs. Everything else
/// (CA flag, key usages, extended key usages, validity, serial) is decided
/// here, never by the requester.
#[derive(Debug, Clone, Copy, Default)]
pub struct X509Signer;

impl CsrSigner for X509Signer {
    fn sign_csr(
        &self,
        request: &SigningRequest,
        root: &RootOfTrust,
    ) -> crate::Result<IssuedCertificate> {
        let der = csr_der(&request.csr)?;

        let subject = {
            let (_, csr) = X509CertificationRequest::from_der(&der)
                .map_err(|e| CaError::InvalidCsr(format!("failed to parse CSR: {e}")))?;
            csr.verify_signature()
                .map_err(|e| CaError::InvalidCsr(format!("CSR signature verification failed: {e}")))?;
            csr.certification_request_info.subject.to_string()
        };

        let mut csr_params = CertificateSigningRequestParams::from_der(
            &CertificateSigningRequestDer::from(der.as_slice()),
        )
        .map_err(|e| CaError::InvalidCsr(e.to_string()))?;

        let validity = time::Duration::try_from(request.validity)
            .map_err(|e| CaError::Signing(format!("validity out of range: {e}")))?;
        let now = time::OffsetDateTime::now_utc();
        let not_after = now
            .checked_add(validity)
            .ok_or_else(|| CaError::Signing("validity out of range".to_string()))?;
        let serial = random_serial();

        let params = &mut csr_params.params;
        params.is_ca = IsCa::NoCa;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = request.usages.iter().map(|u| u.to_purpose()).collect();
        params.not_before = now;
        params.not_after = not_after;
        params.serial_number = Some(serial.into());

        let issuer = Issuer::from_ca_cert_der(root.cert_der(), root.key_pair())
            .map_err(|e| CaError::Signing(format!("CA certificate unusable as issuer: {e}")))?;
        let certificate = csr_params
            .signed_by(&issuer)
            .map_err(|e| CaError::Signing(e.to_string()))?;

        debug!(
            subject = %subject,
            serial = format_args!("{serial:016x}"),
            usages = ?request.usages,
            "signed certificate request"
        );

        Ok(IssuedCertificate {
            der: certificate.der().to_vec(),
            serial: format!("{serial:016x}"),
            subject,
            usages: request.usages.clone(),
            not_before: to_chrono(now)?,
            not_after: to_chrono(not_after)?,
        })
    }
}

/// Accept DER as-is, unwrap a PEM `CERTIFICATE REQUEST` block.
fn csr_der(raw: &[u8]) -> crate::Result<Vec<u8>> {
    if raw.is_empty() {
        return Err(CaError::InvalidCsr("empty request body".to_string()));
    }
    let start = raw
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(raw.len());
    if !raw[start..].starts_with(b"-----BEGIN") {
        return Ok(raw.to_vec());
    }

    let block = pem::parse(raw).map_err(|e| CaError::InvalidCsr(e.to_string()))?;
    match block.tag() {
        "CERTIFICATE REQUEST" | "NEW CERTIFICATE REQUEST" => Ok(block.into_contents()),
        other => Err(CaError::InvalidCsr(format!("unexpected PEM block '{other}'"))),
    }
}

fn to_chrono(t: time::OffsetDateTime) -> crate::Result<DateTime<Utc>> {
    DateTime::from_timestamp(t.unix_timestamp(), t.nanosecond())
        .ok_or_else(|| CaError::Signing(format!("timestamp {t} out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
    use x509_parser::prelude::X509Certificate;

    fn csr_for(node: &str) -> (Vec<u8>, KeyPair) {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(Vec::new()).unwrap();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::OrganizationName, "system:nodes");
        dn.push(DnType::CommonName, format!("system:node:{node}"));
        params.distinguished_name = dn;
        let csr = params.serialize_request(&key).unwrap();
        (csr.der().to_vec(), key)
    }

    #[test]
    fn test_to_chrono_keeps_instant() {
        let t = time::OffsetDateTime::from_unix_timestamp_nanos(1_700_000_000_123_456_789).unwrap();
        let converted = to_chrono(t).unwrap();
        assert_eq!(converted.timestamp(), 1_700_000_000);
        assert_eq!(converted.timestamp_subsec_nanos(), 123_456_789);
    }

    #[test]
    fn test_signing_duration() {
        assert_eq!(signing_duration(1), Duration::from_secs(86_400));
        assert_eq!(signing_duration(365), Duration::from_secs(365 * 86_400));
        assert_eq!(signing_duration(0), Duration::ZERO);
    }

    #[test]
    fn test_sign_der_csr_defaults() {
        let root = RootOfTrust::generate("signer root").unwrap();
        let (csr, _) = csr_for("edge1");
        let request = SigningRequest::new(csr, None, signing_duration(365)).unwrap();

        let issued = X509Signer.sign_csr(&request, &root).unwrap();
        assert_eq!(issued.usages, vec![ExtKeyUsage::ClientAuth]);
        assert!(issued.subject.contains("system:node:edge1"));
        assert_eq!(
            (issued.not_after - issued.not_before).num_seconds(),
            365 * 86_400
        );

        let (_, cert) = X509Certificate::from_der(&issued.der).unwrap();
        assert_eq!(cert.issuer().to_string(), root.subject());
        assert_eq!(cert.subject().to_string(), issued.subject);
        let eku = cert.extended_key_usage().unwrap().unwrap();
        assert!(eku.value.client_auth);
        assert!(!eku.value.server_auth);
        assert!(!cert.is_ca());
        let span = cert.validity().not_after.timestamp() - cert.validity().not_before.timestamp();
        assert_eq!(span, 365 * 86_400);
    }

    #[test]
    fn test_sign_pem_csr_with_usages() {
        let root = RootOfTrust::generate("pem root").unwrap();
        let key = KeyPair::generate().unwrap();
        let params = CertificateParams::new(vec!["edge2.local".to_string()]).unwrap();
        let csr_pem = params.serialize_request(&key).unwrap().pem().unwrap();

        let request = SigningRequest::new(csr_pem, Some("[1,2]"), signing_duration(1)).unwrap();
        let issued = X509Signer.sign_csr(&request, &root).unwrap();

        let (_, cert) = X509Certificate::from_der(&issued.der).unwrap();
        let eku = cert.extended_key_usage().unwrap().unwrap();
        assert!(eku.value.client_auth);
        assert!(eku.value.server_auth);
        assert!(issued.pem().starts_with("-----BEGIN CERTIFICATE-----"));
    }

    #[test]
    fn test_serials_are_unique() {
        let root = RootOfTrust::generate("serials").unwrap();
        let (csr, _) = csr_for("edge3");
        let request = SigningRequest::new(csr, None, signing_duration(1)).unwrap();

        let a = X509Signer.sign_csr(&request, &root).unwrap();
        let b = X509Signer.sign_csr(&request, &root).unwrap();
        assert_ne!(a.serial, b.serial);
    }

    #[test]
    fn test_bad_usages_rejected_before_signing() {
        let (csr, _) = csr_for("edge4");
        let err = SigningRequest::new(csr, Some("not-json"), signing_duration(1)).unwrap_err();
        assert!(matches!(err, CaError::Usages(_)));
    }

    #[test]
    fn test_garbage_csr_rejected() {
        let root = RootOfTrust::generate("garbage").unwrap();
        let request = SigningRequest::new(b"hello".to_vec(), None, signing_duration(1)).unwrap();
        let err = X509Signer.sign_csr(&request, &root).unwrap_err();
        assert!(matches!(err, CaError::InvalidCsr(_)));
    }

    #[test]
    fn test_empty_csr_rejected() {
        let root = RootOfTrust::generate("empty").unwrap();
        let request = SigningRequest::new(Vec::new(), None, signing_duration(1)).unwrap();
        assert!(matches!(
            X509Signer.sign_csr(&request, &root),
            Err(CaError::InvalidCsr(_))
        ));
    }

    #[test]
    fn test_tampered_csr_rejected() {
        let root = RootOfTrust::generate("tamper").unwrap();
        let (mut csr, _) = csr_for("edge5");
        // Flip a byte inside the subject; the self-signature no longer matches.
        let pos = csr
            .windows(4)
            .position(|w| w == b"edge")
            .unwrap();
        csr[pos] = b'x';

        let request = SigningRequest::new(csr, None, signing_duration(1)).unwrap();
        assert!(matches!(
            X509Signer.sign_csr(&request, &root),
            Err(CaError::InvalidCsr(_))
        ));
    }

    #[test]
    fn test_pem_of_wrong_type_rejected() {
        let root = RootOfTrust::generate("wrong pem").unwrap();
        let request =
            SigningRequest::new(root.cert_pem().into_bytes(), None, signing_duration(1)).unwrap();
        assert!(matches!(
            X509Signer.sign_csr(&request, &root),
            Err(CaError::InvalidCsr(_))
        ));
    }
}
