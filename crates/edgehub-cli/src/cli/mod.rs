//! CLI argument parsing and command dispatch.

pub mod args;
pub mod commands;

use anyhow::{Context as _, Result};
use args::{Cli, Commands};
use clap::Parser;
use edgehub_srv::ServerConfig;
use tracing_subscriber::EnvFilter;

/// Run the CLI application.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    if cli.no_color {
        colored::control::set_override(false);
    }

    let config = ServerConfig::load(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;

    let ctx = commands::Context {
        config,
        config_path: cli.config,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Serve(args) => commands::serve::execute(ctx, args).await,
        Commands::Token(args) => commands::token::execute(&ctx, &args),
    }
}

/// Logs go to stderr so command output on stdout stays scriptable.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}
