//! Command implementations.

pub mod serve;
pub mod token;

use anyhow::{Context as _, Result};
use edgehub_ca::RootOfTrust;
use edgehub_srv::ServerConfig;
use std::path::PathBuf;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Loaded (or default) server configuration
    pub config: ServerConfig,

    /// Where the configuration was looked up
    pub config_path: PathBuf,

    /// Verbose output
    pub verbose: bool,
}

impl Context {
    /// Load the CA certificate and key named by the configuration.
    pub fn load_root(&self) -> Result<RootOfTrust> {
        let ca = &self.config.ca;
        RootOfTrust::load(&ca.cert_path, &ca.key_path).with_context(|| {
            format!(
                "failed to load root of trust ({}, {})\n\n\
                 Set ca.cert_path and ca.key_path in {}",
                ca.cert_path.display(),
                ca.key_path.display(),
                self.config_path.display()
            )
        })
    }
}
