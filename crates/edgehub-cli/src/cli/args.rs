//! Command-line argument definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/edgehub/edgehub.toml";

/// Edge-node enrollment gateway
///
/// Authenticates edge agents by client certificate or bootstrap token and
/// issues them short-lived client certificates.
#[derive(Parser, Debug)]
#[command(name = "edgehub")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file (TOML). Defaults apply when it does not exist.
    #[arg(short, long, env = "EDGEHUB_CONFIG", global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Increase verbosity
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the enrollment gateway
    Serve(ServeArgs),

    /// Print a bootstrap token for first-time enrollment
    Token(TokenArgs),
}

// ============================================================================
// Serve command
// ============================================================================

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Listen address, overriding the config file
    #[arg(short, long, env = "EDGEHUB_LISTEN")]
    pub listen: Option<SocketAddr>,
}

// ============================================================================
// Token command
// ============================================================================

#[derive(Args, Debug)]
pub struct TokenArgs {
    /// Token lifetime in hours
    #[arg(long, default_value = "12", value_parser = clap::value_parser!(u64).range(1..))]
    pub ttl_hours: u64,
}
