//! Application gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────────────┐
//!                    │                      APP GATEWAY                          │
//!   Client Request   │  ┌──────────┐   ┌────────────────┐   ┌────────────────┐  │
//!   ─────────────────┼─▶│   http   │──▶│    handler     │──▶│    forward     │  │
//!                    │  │ (axum)   │   │ factory/shared │   │ codec + stream │  │
//!                    │  └──────────┘   └────────────────┘   └───────┬────────┘  │
//!                    │                                              │           │
//!                    │                      ┌───────────────────────▼────────┐  │
//!                    │                      │ pool (fair, bounded, per       │  │
//!                    │                      │ endpoint) + load_balancer      │  │
//!                    │                      └───────────────────────┬────────┘  │
//!   Client Response  │                                              │           │      App
//!   ◀────────────────┼──────────────── streamed body ◀─── backend::connection ◀─┼──── Server
//!                    │                                                          │
//!                    │  config · observability · resilience · lifecycle         │
//!                    └──────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use app_gateway::config::loader::load_config;
use app_gateway::config::GatewayConfig;
use app_gateway::handler::GatewayHandlerFactory;
use app_gateway::http::HttpServer;
use app_gateway::lifecycle::{wait_for_signal, Shutdown};
use app_gateway::observability::{logging, metrics};

/// Forward HTTP requests to application servers over pooled connections.
#[derive(Debug, Parser)]
#[command(name = "app-gateway", version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "PATH", default_value = "gateway.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("app-gateway: {}: {}", cli.config.display(), e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::init_logging(&config.observability) {
        eprintln!("app-gateway: failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match run(config).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Gateway failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: GatewayConfig) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        endpoints = config.backends.len(),
        request_timeout_secs = config.timeouts.request_secs,
        "app-gateway starting"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let factory = Arc::new(GatewayHandlerFactory::new(&config).await?);

    let shutdown = Shutdown::new();
    let reaper = factory.pool().spawn_reaper(shutdown.subscribe());

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(config, Arc::clone(&factory));
    let mut server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    let served = tokio::select! {
        _ = wait_for_signal() => {
            shutdown.trigger();
            (&mut server_task).await
        }
        result = &mut server_task => result,
    };

    shutdown.trigger();
    if let Err(e) = reaper.await {
        tracing::warn!(error = %e, "Idle reaper ended abnormally");
    }
    factory.shutdown();

    served??;
    Ok(())
}
