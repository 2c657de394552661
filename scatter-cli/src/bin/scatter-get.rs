//! Offline read tool: print the stored view for request identifiers.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use scatter::Config;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "scatter-get", about = "Fetch stored fan-out results by request id")]
struct Args {
    /// Configuration file.
    #[arg(short, long, default_value = "scatter_config.json")]
    config: PathBuf,

    /// Override store_type when non-empty.
    #[arg(long, default_value = "")]
    storetype: String,

    /// Request identifiers to look up.
    #[arg(required = true)]
    ids: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "scatter-get failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = Config::load(&args.config)
        .with_context(|| format!("failed to load config {}", args.config.display()))?;
    if !args.storetype.is_empty() {
        info!(from = %config.store_type, to = %args.storetype, "store_type overridden");
        config.store_type = args.storetype;
    }

    let storage = scatter_cli::default_registry()
        .build(&config.storage(), &config.endpoint_names())
        .context("failed to construct storage")?;

    // Per-id failures are reported, not fatal: the rest of the batch still
    // prints.
    for id in &args.ids {
        match storage.get_response(id).await {
            Ok(view) => println!("{id}: {}", serde_json::to_string_pretty(&view)?),
            Err(err) => eprintln!("{id}: failed: {err}"),
        }
    }
    Ok(())
}
