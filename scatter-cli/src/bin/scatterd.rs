//! The broker daemon: load config, serve until SIGINT, drain, exit.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use scatter::{Broker, Config};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "scatterd", about = "Fan-out HTTP broker")]
struct Args {
    /// Configuration file.
    #[arg(short, long, default_value = "scatter_config.json")]
    config: PathBuf,

    /// Print statistics every N seconds; 0 disables the monitor.
    #[arg(long, default_value_t = 0)]
    monitor: u64,

    /// Override worker_num when positive.
    #[arg(long, default_value_t = 0)]
    worker: i32,

    /// Override max_handlers when positive.
    #[arg(long, default_value_t = 0)]
    handler: i32,

    /// Override store_type when non-empty.
    #[arg(long, default_value = "")]
    storetype: String,
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
            error!(error = %err, "scatterd failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = Config::load(&args.config)
        .with_context(|| format!("failed to load config {}", args.config.display()))?;
    if args.worker > 0 {
        info!(from = config.worker_num, to = args.worker, "worker_num overridden");
        config.worker_num = args.worker;
    }
    if args.handler > 0 {
        info!(from = config.max_handlers, to = args.handler, "max_handlers overridden");
        config.max_handlers = args.handler;
    }
    if !args.storetype.is_empty() {
        info!(from = %config.store_type, to = %args.storetype, "store_type overridden");
        config.store_type = args.storetype;
    }

    let storage = scatter_cli::default_registry()
        .build(&config.storage(), &config.endpoint_names())
        .context("failed to construct storage")?;
    let broker = Broker::new(config, storage)?;

    let token = CancellationToken::new();
    tokio::spawn({
        let token = token.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                token.cancel();
            }
        }
    });

    if args.monitor > 0 {
        tokio::spawn(scatter::monitor::run(
            broker.clone(),
            Duration::from_secs(args.monitor),
            token.clone(),
        ));
    }

    broker.serve(token).await?;
    Ok(())
}
