//! Judging a presented client certificate.
//!
//! The chain must end at the root of trust (and nothing else) with the
//! client-auth purpose, and the subject must name the node making the claim.

use edgehub_ca::RootOfTrust;
use rustls_pki_types::{TrustAnchor, UnixTime};
use webpki::{EndEntityCert, KeyUsage};

use crate::{AuthError, PeerCertificate, SrvError};

/// Organization of certificates issued before per-node subjects.
pub const LEGACY_ORGANIZATION: &str = "KubeEdge";
/// Common name of certificates issued before per-node subjects.
pub const LEGACY_COMMON_NAME: &str = "kubeedge.io";
/// Organization of per-node certificates.
pub const NODES_ORGANIZATION: &str = "system:nodes";
/// Common name prefix of per-node certificates.
pub const NODE_COMMON_NAME_PREFIX: &str = "system:node:";

/// Verifies peer certificates against the root of trust.
#[derive(Debug)]
pub struct TrustVerifier {
    anchors: Vec<TrustAnchor<'static>>,
    allow_legacy_subject: bool,
}

impl TrustVerifier {
    pub fn new(root: &RootOfTrust, allow_legacy_subject: bool) -> crate::Result<Self> {
        let anchor = webpki::anchor_from_trusted_cert(root.cert_der())
            .map_err(|e| SrvError::Tls(format!("CA certificate is not a valid trust anchor: {e}")))?
            .to_owned();
        Ok(Self {
            anchors: vec![anchor],
            allow_legacy_subject,
        })
    }

    /// Check `cert` chains to the CA for client auth and names `claimed_node`.
    pub fn verify(&self, cert: &PeerCertificate, claimed_node: &str) -> Result<(), AuthError> {
        let end_entity =
            EndEntityCert::try_from(cert.der()).map_err(|e| AuthError::Chain(e.to_string()))?;

        end_entity
            .verify_for_usage(
                webpki::ALL_VERIFICATION_ALGS,
                &self.anchors,
                &[],
                UnixTime::now(),
                KeyUsage::client_auth(),
                None,
                None,
            )
            .map_err(|e| AuthError::Chain(e.to_string()))?;

        check_subject(cert, claimed_node, self.allow_legacy_subject)
    }
}

/// Subject naming policy, first match wins.
///
/// Only the first organization value is considered. A certificate without
/// one never matches.
pub fn check_subject(
    cert: &PeerCertificate,
    claimed_node: &str,
    allow_legacy_subject: bool,
) -> Result<(), AuthError> {
    let Some(organization) = cert.organizations().first().map(String::as_str) else {
        return Err(AuthError::SubjectMismatch);
    };
    let common_name = cert.common_name().unwrap_or_default();

    // Legacy certificates predate per-node subjects.
    // TODO: drop once no agent presents a KubeEdge/kubeedge.io certificate.
    if allow_legacy_subject
        && organization == LEGACY_ORGANIZATION
        && common_name == LEGACY_COMMON_NAME
    {
        return Ok(());
    }

    if organization == NODES_ORGANIZATION
        && common_name
            .strip_prefix(NODE_COMMON_NAME_PREFIX)
            .is_some_and(|node| node == claimed_node)
    {
        return Ok(());
    }

    Err(AuthError::SubjectMismatch)
}
