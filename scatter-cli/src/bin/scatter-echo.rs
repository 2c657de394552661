//! Echo server fleet: N servers on consecutive ports, useful as fan-out
//! targets during development and load tests.

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Context;
use axum::Router;
use axum::extract::{Request, State};
use axum::response::IntoResponse;
use clap::Parser;
use http::header::CONTENT_TYPE;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "scatter-echo", about = "Fleet of echo servers for broker testing")]
struct Args {
    /// Port of the first server; server n listens on start_port + n.
    #[arg(long, default_value_t = 10001)]
    start_port: u16,

    /// Number of servers to run.
    #[arg(long, default_value_t = 6)]
    count: u16,
}

#[derive(Clone)]
struct EchoState {
    id: u16,
    serial: Arc<AtomicU64>,
}

/// Replies `dst_id=<n> serial=<m>`. A `sleep.<n>=<duration>` query
/// parameter delays the reply, which is how broker timeouts are exercised
/// by hand.
async fn echo(State(state): State<EchoState>, request: Request) -> impl IntoResponse {
    info!(id = state.id, uri = %request.uri(), "receive");
    let query = request.uri().query().unwrap_or("");
    let sleep_prefix = format!("sleep.{}=", state.id);
    if let Some(value) = query
        .split('&')
        .find_map(|pair| pair.strip_prefix(sleep_prefix.as_str()))
    {
        match humantime::parse_duration(value) {
            Ok(delay) => tokio::time::sleep(delay).await,
            Err(err) => warn!(id = state.id, error = %err, "invalid sleep"),
        }
    }

    let serial = state.serial.fetch_add(1, Ordering::Relaxed) + 1;
    (
        [(CONTENT_TYPE, "text/plain; charset=utf-8")],
        format!("dst_id={} serial={}\n", state.id, serial),
    )
}

async fn serve_one(id: u16, port: u16, token: CancellationToken) -> anyhow::Result<()> {
    let state = EchoState {
        id,
        serial: Arc::new(AtomicU64::new(0)),
    };
    let app = Router::new().fallback(echo).with_state(state);
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind port {port}"))?;
    info!(id, port, "echo server running");
    axum::serve(listener, app)
        .with_graceful_shutdown(token.cancelled_owned())
        .await?;
    info!(id, "echo server closed");
    Ok(())
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
            error!(error = %err, "scatter-echo failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    if args.count == 0 {
        anyhow::bail!("no servers to start");
    }

    let token = CancellationToken::new();
    tokio::spawn({
        let token = token.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                token.cancel();
            }
        }
    });

    let mut servers = Vec::with_capacity(usize::from(args.count));
    for n in 0..args.count {
        servers.push(tokio::spawn(serve_one(
            n,
            args.start_port + n,
            token.clone(),
        )));
    }
    for server in servers {
        server.await??;
    }
    Ok(())
}
