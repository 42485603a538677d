//! Server configuration for the enrollment gateway.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::SrvError;

/// Default request body cap for CSR uploads (1 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 1 << 20;

/// Configuration for an edgehub enrollment gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTPS listen address (default: 0.0.0.0:10002).
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Root of trust file locations.
    #[serde(default)]
    pub ca: CaConfig,

    /// TLS termination settings.
    #[serde(default)]
    pub tls: TlsConfig,

    /// Validity of issued edge certificates, in days.
    #[serde(default = "default_signing_days")]
    pub edge_cert_signing_days: u32,

    /// Maximum accepted CSR body size.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// TLS handshake timeout (seconds).
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,

    /// Trust for certificates forwarded by a TLS-terminating proxy.
    #[serde(default)]
    pub forwarded_cert: ForwardedCertConfig,

    /// Accept the legacy `KubeEdge`/`kubeedge.io` subject for any node.
    #[serde(default = "default_true")]
    pub allow_legacy_subject: bool,
}

/// CA certificate and key locations (PEM or DER).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaConfig {
    #[serde(default = "default_ca_cert_path")]
    pub cert_path: PathBuf,

    #[serde(default = "default_ca_key_path")]
    pub key_path: PathBuf,
}

/// TLS termination settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Serve HTTPS. Disable only behind a TLS-terminating proxy.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Server certificate chain (PEM). When unset, one is issued from the CA.
    #[serde(default)]
    pub cert_path: Option<PathBuf>,

    /// Server private key (PEM).
    #[serde(default)]
    pub key_path: Option<PathBuf>,

    /// Names and addresses placed in an issued server certificate.
    #[serde(default = "default_advertise_addresses")]
    pub advertise_addresses: Vec<String>,
}

/// Forwarded client certificate handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardedCertConfig {
    /// Honour the forwarded certificate header at all.
    #[serde(default)]
    pub enabled: bool,

    /// Header carrying the base64 PEM/DER certificate.
    #[serde(default = "default_forwarded_header")]
    pub header: String,

    /// Peers allowed to set the header. Empty means any peer.
    #[serde(default)]
    pub trusted_sources: Vec<IpAddr>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            ca: CaConfig::default(),
            tls: TlsConfig::default(),
            edge_cert_signing_days: default_signing_days(),
            max_body_bytes: default_max_body_bytes(),
            handshake_timeout_secs: default_handshake_timeout(),
            forwarded_cert: ForwardedCertConfig::default(),
            allow_legacy_subject: true,
        }
    }
}

impl Default for CaConfig {
    fn default() -> Self {
        Self {
            cert_path: default_ca_cert_path(),
            key_path: default_ca_key_path(),
        }
    }
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cert_path: None,
            key_path: None,
            advertise_addresses: default_advertise_addresses(),
        }
    }
}

impl Default for ForwardedCertConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            header: default_forwarded_header(),
            trusted_sources: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content).map_err(|e| SrvError::Config(e.to_string()))
        } else {
            Ok(Self::default())
        }
    }

    /// Reject values the gateway cannot run with.
    pub fn validate(&self) -> crate::Result<()> {
        if self.edge_cert_signing_days == 0 {
            return Err(SrvError::Config(
                "edge_cert_signing_days must be greater than 0".to_string(),
            ));
        }
        if self.max_body_bytes == 0 {
            return Err(SrvError::Config(
                "max_body_bytes must be greater than 0".to_string(),
            ));
        }
        if self.handshake_timeout_secs == 0 {
            return Err(SrvError::Config(
                "handshake_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.tls.cert_path.is_some() != self.tls.key_path.is_some() {
            return Err(SrvError::Config(
                "tls.cert_path and tls.key_path must be set together".to_string(),
            ));
        }
        if self.tls.enabled && self.tls.cert_path.is_none() && self.tls.advertise_addresses.is_empty()
        {
            return Err(SrvError::Config(
                "tls.advertise_addresses is empty and no server certificate is configured"
                    .to_string(),
            ));
        }
        axum::http::HeaderName::try_from(self.forwarded_cert.header.as_str()).map_err(|e| {
            SrvError::Config(format!(
                "invalid forwarded_cert.header '{}': {e}",
                self.forwarded_cert.header
            ))
        })?;
        Ok(())
    }

    /// Validity of issued edge certificates.
    pub const fn signing_duration(&self) -> Duration {
        edgehub_ca::signing_duration(self.edge_cert_signing_days)
    }

    /// TLS handshake timeout.
    pub const fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}

// Default value functions for serde.
fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 10002))
}

const fn default_signing_days() -> u32 {
    365
}

const fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

const fn default_handshake_timeout() -> u64 {
    10
}

const fn default_true() -> bool {
    true
}

fn default_ca_cert_path() -> PathBuf {
    PathBuf::from("/etc/edgehub/ca/rootCA.crt")
}

fn default_ca_key_path() -> PathBuf {
    PathBuf::from("/etc/edgehub/ca/rootCA.key")
}

fn default_advertise_addresses() -> Vec<String> {
    vec![String::from("localhost"), String::from("127.0.0.1")]
}

fn default_forwarded_header() -> String {
    String::from("X-Forwarded-Client-Cert")
}
