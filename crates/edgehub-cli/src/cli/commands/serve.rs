//! `edgehub serve` - Run the enrollment gateway.

use anyhow::{Context as _, Result};
use std::sync::Arc;
use tracing::info;

use super::Context;
use crate::cli::args::ServeArgs;

pub async fn execute(ctx: Context, args: ServeArgs) -> Result<()> {
    let mut config = ctx.config.clone();
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    config.validate().context("invalid configuration")?;

    let root = Arc::new(ctx.load_root()?);
    info!(
        config = %ctx.config_path.display(),
        ca = %root.subject(),
        listen = %config.listen,
        tls = config.tls.enabled,
        "starting edgehub"
    );

    edgehub_srv::server::run(&config, root)
        .await
        .context("enrollment gateway failed")
}
