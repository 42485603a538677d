//! # edgehub-cli
//!
//! Command-line interface for the edgehub enrollment gateway.
//!
//! ## Commands
//!
//! - **serve**: load the root of trust and run the gateway until Ctrl-C/SIGTERM
//! - **token**: mint a bootstrap bearer token for first-time enrollment

pub mod cli;

pub use cli::run;
