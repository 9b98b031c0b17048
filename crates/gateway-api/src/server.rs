//! HTTP and metrics server composition, following the teacher's
//! `ApiServer`: one router merged from route groups, layered with
//! compression/CORS/trace middleware, plus a separate Prometheus listener.

use crate::handlers;
use crate::state::AppState;
use axum::routing::get;
use axum::Router;
use gateway_core::GatewayConfig;
use std::net::SocketAddr;
use std::time::Duration;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub struct GatewayApiServer {
    config: GatewayConfig,
    state: AppState,
}

impl GatewayApiServer {
    pub fn new(config: GatewayConfig, state: AppState) -> Self {
        Self { config, state }
    }

    fn router(&self) -> Router {
        Router::new()
            .route("/", get(handlers::index))
            .route("/emergency", get(handlers::emergency).post(handlers::emergency))
            .route("/conversion", get(handlers::conversion).post(handlers::conversion))
            .route("/{*path}", get(handlers::landing_asset))
            .with_state(self.state.clone())
            .layer(CompressionLayer::new())
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
    }

    pub async fn start_http(&self) -> anyhow::Result<()> {
        let app = self.router();
        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.api.http_port);
        info!(addr = %addr, "starting http server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }

    pub async fn start_metrics(&self) -> anyhow::Result<()> {
        let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
        let handle = builder
            .with_http_listener(SocketAddr::new(
                self.config.api.host.parse()?,
                self.config.metrics.port,
            ))
            .install_recorder()?;

        info!(port = self.config.metrics.port, "metrics exporter started");
        std::mem::forget(handle);
        Ok(())
    }

    /// Drains the background executor after the listener has stopped
    /// accepting connections, bounded by the configured deadline.
    pub async fn shutdown_executor(&self) {
        let deadline = Duration::from_millis(self.config.executor.shutdown_deadline_ms);
        self.state.executor.shutdown(deadline).await;
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
