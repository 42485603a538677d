//! Certificate fixtures shared by unit tests.

use edgehub_ca::{signing_duration, CsrSigner, ExtKeyUsage, RootOfTrust, SigningRequest, X509Signer};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};

use crate::PeerCertificate;

pub fn root() -> RootOfTrust {
    RootOfTrust::generate("edgehub test root").unwrap()
}

/// A DER CSR with the given subject.
pub fn csr(organization: Option<&str>, common_name: &str) -> Vec<u8> {
    let key = KeyPair::generate().unwrap();
    let mut params = CertificateParams::new(Vec::new()).unwrap();
    let mut dn = DistinguishedName::new();
    if let Some(organization) = organization {
        dn.push(DnType::OrganizationName, organization);
    }
    dn.push(DnType::CommonName, common_name);
    params.distinguished_name = dn;
    params.serialize_request(&key).unwrap().der().to_vec()
}

/// A certificate issued by `root` with the given subject and usages.
pub fn certificate(
    root: &RootOfTrust,
    organization: Option<&str>,
    common_name: &str,
    usages: &[ExtKeyUsage],
) -> PeerCertificate {
    let request = SigningRequest {
        csr: csr(organization, common_name),
        usages: usages.to_vec(),
        validity: signing_duration(1),
    };
    let issued = X509Signer.sign_csr(&request, root).unwrap();
    PeerCertificate::from_der(issued.der).unwrap()
}

/// A client-auth certificate for `system:node:<node>`.
pub fn node_certificate(root: &RootOfTrust, node: &str) -> PeerCertificate {
    certificate(
        root,
        Some("system:nodes"),
        &format!("system:node:{node}"),
        &[ExtKeyUsage::ClientAuth],
    )
}
