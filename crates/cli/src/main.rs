mod cli;
mod commands;

use anyhow::{Context, Result};
use clap::Parser;

use marshal_core::config::load_dotenv;
use marshal_core::Config;

use crate::cli::CliArgs;

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();

    // Logs go to stderr so JSON output stays pipeable.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();

    let mut config = Config::for_profile(args.profile.as_deref().unwrap_or(""));
    if let Some(ref path) = args.table {
        config.routing.table_path = Some(path.clone());
    }
    config.validate().context("invalid configuration")?;
    config.log_summary();

    commands::run(args, config).await
}
