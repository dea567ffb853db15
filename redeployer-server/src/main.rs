//! Redeployer
//!
//! A webhook receiver that authenticates deploy requests and replaces a
//! running container with a new image version.
//!
//! Architecture:
//! - Configuration: YAML file validated once at startup
//! - API: health and redeploy endpoints with request id and token middleware
//! - Service: the detached pull/teardown/execute/cleanup workflow
//! - Container: runtime CLI adapter behind a narrow trait

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod api;
pub mod config;
pub mod container;
pub mod context;
pub mod service;

use crate::api::AppState;
use crate::config::{DEFAULT_CONFIG_PATH, ServiceConfig};
use crate::container::CliContainerControl;
use crate::service::Redeployer;

#[derive(Parser)]
#[command(name = "redeployer")]
#[command(about = "Webhook service that redeploys containers", long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(long, env = "REDEPLOYER_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Port to expose webhooks on
    #[arg(long, env = "REDEPLOYER_PORT", default_value_t = 9000)]
    port: u16,

    /// Address to bind to
    #[arg(long, env = "REDEPLOYER_BIND", default_value = "0.0.0.0")]
    bind: IpAddr,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    "redeployer=debug,redeployer_core=debug,tower_http=debug".into()
                }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!("Loading configuration from {}", args.config.display());
    let config = ServiceConfig::load(&args.config).context("Failed to load configuration")?;
    info!(
        "Loaded {} target(s), runtime: {}",
        config.targets.len(),
        config.runtime
    );

    let control =
        CliContainerControl::new(config.runtime.clone()).with_timeout(config.command_timeout);
    if let Err(e) = control.check_available().await {
        warn!("Container runtime {} is not available yet: {}", config.runtime, e);
    }

    let redeployer = Redeployer::new(Arc::new(control), &config.targets);
    let app = api::create_router(AppState::new(config, redeployer));

    let addr = SocketAddr::new(args.bind, args.port);
    info!("Starting redeployer service on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Service failed")?;

    info!("Redeployer stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
