//! Decoding of certificates forwarded by a TLS-terminating proxy.
//!
//! The header value is base64 of either PEM text (possibly several blocks)
//! or raw DER. Pure functions only; trust decisions live in [`crate::verify`].

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::{ParseError, PeerCertificate};

const PEM_MARKER: &str = "-----BEGIN";
const CERTIFICATE_TAG: &str = "CERTIFICATE";

/// Decode a forwarded-certificate header value.
///
/// Returns the first `CERTIFICATE` PEM block, or the whole payload parsed as
/// DER when it contains no PEM at all.
pub fn extract(header_value: &str) -> Result<PeerCertificate, ParseError> {
    let decoded = STANDARD
        .decode(header_value.trim())
        .map_err(|e| ParseError::Base64(e.to_string()))?;

    let der = if contains_pem(&decoded) {
        first_certificate_block(&decoded)?
    } else {
        decoded
    };

    PeerCertificate::from_der(der)
}

fn contains_pem(bytes: &[u8]) -> bool {
    bytes
        .windows(PEM_MARKER.len())
        .any(|w| w == PEM_MARKER.as_bytes())
}

fn first_certificate_block(bytes: &[u8]) -> Result<Vec<u8>, ParseError> {
    let text = std::str::from_utf8(bytes).map_err(|e| ParseError::Pem(e.to_string()))?;

    // Proxies fold, indent or CRLF-terminate the PEM; normalise line by line.
    let mut lines = text.lines().map(str::trim).filter(|line| !line.is_empty());

    // Sections are scanned one at a time so a corrupt block of another type
    // cannot hide the certificate behind it.
    while let Some(line) = lines.next() {
        let Some(tag) = begin_tag(line) else {
            continue;
        };
        let end = format!("-----END {tag}-----");
        let mut section = vec![line];
        for body in lines.by_ref() {
            section.push(body);
            if body == end {
                break;
            }
        }

        if tag == CERTIFICATE_TAG {
            let block =
                pem::parse(section.join("\n")).map_err(|e| ParseError::Pem(e.to_string()))?;
            return Ok(block.into_contents());
        }
    }
    Err(ParseError::NoCertificate)
}

fn begin_tag(line: &str) -> Option<&str> {
    line.strip_prefix("-----BEGIN ")?.strip_suffix("-----")
}
