//! Extended key usages requested for issued certificates.
//!
//! Edge agents send the `Ext-Key-Usages` header as a JSON list. Older agents
//! serialize each usage as its numeric code, newer tooling may send the
//! kebab-case name. Both forms are accepted; the code is what we emit.

use rcgen::ExtendedKeyUsagePurpose;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::CaError;

/// OID arcs for the usages rcgen has no named variant for.
const OID_KP_IPSEC_END_SYSTEM: &[u64] = &[1, 3, 6, 1, 5, 5, 7, 3, 5];
const OID_KP_IPSEC_TUNNEL: &[u64] = &[1, 3, 6, 1, 5, 5, 7, 3, 6];
const OID_KP_IPSEC_USER: &[u64] = &[1, 3, 6, 1, 5, 5, 7, 3, 7];
const OID_MS_SERVER_GATED_CRYPTO: &[u64] = &[1, 3, 6, 1, 4, 1, 311, 10, 3, 3];
const OID_NS_SERVER_GATED_CRYPTO: &[u64] = &[2, 16, 840, 1, 113_730, 4, 1];
const OID_MS_COMMERCIAL_CODE_SIGNING: &[u64] = &[1, 3, 6, 1, 4, 1, 311, 2, 1, 22];
const OID_MS_KERNEL_CODE_SIGNING: &[u64] = &[1, 3, 6, 1, 4, 1, 311, 61, 1, 1];

/// Highest numeric wire code.
const MAX_CODE: u8 = 13;

/// An extended key usage an edge node may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtKeyUsage {
    Any,
    ServerAuth,
    ClientAuth,
    CodeSigning,
    EmailProtection,
    IpsecEndSystem,
    IpsecTunnel,
    IpsecUser,
    TimeStamping,
    OcspSigning,
    MicrosoftServerGatedCrypto,
    NetscapeServerGatedCrypto,
    MicrosoftCommercialCodeSigning,
    MicrosoftKernelCodeSigning,
}

impl ExtKeyUsage {
    /// Numeric wire code.
    pub const fn code(self) -> u8 {
        match self {
            Self::Any => 0,
            Self::ServerAuth => 1,
            Self::ClientAuth => 2,
            Self::CodeSigning => 3,
            Self::EmailProtection => 4,
            Self::IpsecEndSystem => 5,
            Self::IpsecTunnel => 6,
            Self::IpsecUser => 7,
            Self::TimeStamping => 8,
            Self::OcspSigning => 9,
            Self::MicrosoftServerGatedCrypto => 10,
            Self::NetscapeServerGatedCrypto => 11,
            Self::MicrosoftCommercialCodeSigning => 12,
            Self::MicrosoftKernelCodeSigning => 13,
        }
    }

    /// Look up a usage by its numeric wire code.
    pub const fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::Any,
            1 => Self::ServerAuth,
            2 => Self::ClientAuth,
            3 => Self::CodeSigning,
            4 => Self::EmailProtection,
            5 => Self::IpsecEndSystem,
            6 => Self::IpsecTunnel,
            7 => Self::IpsecUser,
            8 => Self::TimeStamping,
            9 => Self::OcspSigning,
            10 => Self::MicrosoftServerGatedCrypto,
            11 => Self::NetscapeServerGatedCrypto,
            12 => Self::MicrosoftCommercialCodeSigning,
            13 => Self::MicrosoftKernelCodeSigning,
            _ => return None,
        })
    }

    /// Kebab-case name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::ServerAuth => "server-auth",
            Self::ClientAuth => "client-auth",
            Self::CodeSigning => "code-signing",
            Self::EmailProtection => "email-protection",
            Self::IpsecEndSystem => "ipsec-end-system",
            Self::IpsecTunnel => "ipsec-tunnel",
            Self::IpsecUser => "ipsec-user",
            Self::TimeStamping => "time-stamping",
            Self::OcspSigning => "ocsp-signing",
            Self::MicrosoftServerGatedCrypto => "microsoft-server-gated-crypto",
            Self::NetscapeServerGatedCrypto => "netscape-server-gated-crypto",
            Self::MicrosoftCommercialCodeSigning => "microsoft-commercial-code-signing",
            Self::MicrosoftKernelCodeSigning => "microsoft-kernel-code-signing",
        }
    }

    /// The rcgen purpose placed in the issued certificate.
    pub fn to_purpose(self) -> ExtendedKeyUsagePurpose {
        match self {
            Self::Any => ExtendedKeyUsagePurpose::Any,
            Self::ServerAuth => ExtendedKeyUsagePurpose::ServerAuth,
            Self::ClientAuth => ExtendedKeyUsagePurpose::ClientAuth,
            Self::CodeSigning => ExtendedKeyUsagePurpose::CodeSigning,
            Self::EmailProtection => ExtendedKeyUsagePurpose::EmailProtection,
            Self::IpsecEndSystem => ExtendedKeyUsagePurpose::Other(OID_KP_IPSEC_END_SYSTEM.to_vec()),
            Self::IpsecTunnel => ExtendedKeyUsagePurpose::Other(OID_KP_IPSEC_TUNNEL.to_vec()),
            Self::IpsecUser => ExtendedKeyUsagePurpose::Other(OID_KP_IPSEC_USER.to_vec()),
            Self::TimeStamping => ExtendedKeyUsagePurpose::TimeStamping,
            Self::OcspSigning => ExtendedKeyUsagePurpose::OcspSigning,
            Self::MicrosoftServerGatedCrypto => {
                ExtendedKeyUsagePurpose::Other(OID_MS_SERVER_GATED_CRYPTO.to_vec())
            }
            Self::NetscapeServerGatedCrypto => {
                ExtendedKeyUsagePurpose::Other(OID_NS_SERVER_GATED_CRYPTO.to_vec())
            }
            Self::MicrosoftCommercialCodeSigning => {
                ExtendedKeyUsagePurpose::Other(OID_MS_COMMERCIAL_CODE_SIGNING.to_vec())
            }
            Self::MicrosoftKernelCodeSigning => {
                ExtendedKeyUsagePurpose::Other(OID_MS_KERNEL_CODE_SIGNING.to_vec())
            }
        }
    }
}

impl fmt::Display for ExtKeyUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ExtKeyUsage {
    type Err = CaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        (0..=MAX_CODE)
            .filter_map(Self::from_code)
            .find(|usage| usage.name() == s)
            .ok_or_else(|| CaError::Usages(format!("unknown extended key usage '{s}'")))
    }
}

impl Serialize for ExtKeyUsage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawUsage {
    Code(u8),
    Name(String),
}

impl<'de> Deserialize<'de> for ExtKeyUsage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match RawUsage::deserialize(deserializer)? {
            RawUsage::Code(code) => Self::from_code(code)
                .ok_or_else(|| de::Error::custom(format!("unknown extended key usage code {code}"))),
            RawUsage::Name(name) => name.parse().map_err(de::Error::custom),
        }
    }
}

/// Parse the optional `Ext-Key-Usages` header value.
///
/// Absent, blank, or an empty list means client-auth only. A value that is
/// present but not a valid usage list is an error, never a silent default.
pub fn parse_usages(header: Option<&str>) -> crate::Result<Vec<ExtKeyUsage>> {
    let Some(raw) = header.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(vec![ExtKeyUsage::ClientAuth]);
    };

    let usages: Vec<ExtKeyUsage> =
        serde_json::from_str(raw).map_err(|e| CaError::Usages(e.to_string()))?;

    if usages.is_empty() {
        return Ok(vec![ExtKeyUsage::ClientAuth]);
    }
    Ok(usages)
}
