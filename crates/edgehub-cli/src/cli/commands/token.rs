//! `edgehub token` - Print a bootstrap token.

use anyhow::{Context as _, Result};
use colored::Colorize;
use std::time::Duration;

use super::Context;
use crate::cli::args::TokenArgs;

const SECONDS_PER_HOUR: u64 = 3600;

pub fn execute(ctx: &Context, args: &TokenArgs) -> Result<()> {
    let root = ctx.load_root()?;
    let ttl = Duration::from_secs(args.ttl_hours.saturating_mul(SECONDS_PER_HOUR));

    let token = edgehub_srv::token::issue_token(root.key_der(), ttl)
        .context("failed to issue bootstrap token")?;

    // Token on stdout, commentary on stderr.
    println!("{token}");
    if ctx.verbose {
        eprintln!(
            "{} valid for {}h, signed by {}",
            "bootstrap token".green().bold(),
            args.ttl_hours,
            root.subject().cyan()
        );
    }
    Ok(())
}
