//! Strata - command-line client for S3-compatible storage

use clap::Parser;
use strata_cli::{interactive_context, run, CliConfig, Command};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(about = "Command-line client for S3-compatible object storage")]
#[command(version)]
struct Args {
    #[command(flatten)]
    config: CliConfig,

    /// Enable debug logging
    #[arg(short, long, env = "STRATA_DEBUG")]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| format!("strata_client={0},strata_cli={0}", log_level).into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::debug!(config = ?args.config, "Resolved configuration");

    let client = args.config.build_client()?;
    let ctx = interactive_context();

    run(args.command, &client, &ctx).await
}
