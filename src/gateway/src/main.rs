//! click-dispatch-gateway — campaign click-dispatch and attribution
//! gateway for mobile-install advertising.
//!
//! Entry point: loads configuration, wires the request-handling pipeline,
//! and starts the HTTP and metrics listeners.

use clap::Parser;
use gateway_api::{AppState, GatewayApiServer};
use gateway_core::GatewayConfig;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "gateway")]
#[command(about = "Campaign click-dispatch and attribution gateway")]
#[command(version)]
struct Cli {
    /// HTTP port (overrides config)
    #[arg(long, env = "GATEWAY__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Metrics port (overrides config)
    #[arg(long, env = "GATEWAY__METRICS__PORT")]
    metrics_port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gateway=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    let mut config = GatewayConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "failed to load config, using defaults");
        GatewayConfig::default()
    });

    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }
    if let Some(port) = cli.metrics_port {
        config.metrics.port = port;
    }

    info!(
        service = %config.service_name,
        http_port = config.api.http_port,
        metrics_port = config.metrics.port,
        "configuration loaded"
    );

    let state = AppState::new(config.clone())?;
    let server = GatewayApiServer::new(config, state);

    if let Err(e) = server.start_metrics().await {
        error!(error = %e, "failed to start metrics exporter");
    }

    info!("click-dispatch-gateway is ready to serve traffic");

    server.start_http().await?;
    server.shutdown_executor().await;

    info!("shutdown complete");
    Ok(())
}
