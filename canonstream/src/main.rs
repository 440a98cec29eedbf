// Copyright 2026 The Canonstream Project
// SPDX-License-Identifier: Apache-2.0

use canonstream::config::{self, ConfigSource};
use canonstream::engine;
use canonstream::proxy;
use clap::Parser;

use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "canonstream",
    about = "Normalizes LLM streaming responses into one canonical SSE stream"
)]
struct Cli {
    /// Path to the canonstream.yaml config file
    #[arg(long, default_value = "canonstream.yaml", env = "CANONSTREAM_CONFIG")]
    config: String,

    /// Port to listen on
    #[arg(long, default_value_t = 9810, env = "CANONSTREAM_PORT")]
    port: u16,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .json()
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let addr = SocketAddr::from(([127, 0, 0, 1], cli.port));
    tracing::info!(%addr, "canonstream starting");

    let source = config::FileSource {
        path: std::path::PathBuf::from(cli.config),
    };
    let config = match config::load_config(&source) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            tracing::error!(source = %source.describe(), "failed to load config: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        source = %source.describe(),
        version = %config.version,
        default_mode = config.default_mode.as_str(),
        upstream = %config.upstream.url,
        config_hash = %config.config_hash,
        "config loaded"
    );

    let default_mode = config.default_mode;
    let upstream: Arc<dyn proxy::UpstreamClient> = Arc::new(engine::build_relay_client(config));

    let app = proxy::build_router(upstream, default_mode);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(%addr, "failed to bind: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(%addr, "canonstream listening");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("server error: {e}");
        std::process::exit(1);
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to install ctrl-c handler: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
