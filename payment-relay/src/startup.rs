//! Application startup and lifecycle management.

use crate::config::Config;
use crate::handlers;
use crate::services::{init_metrics, Database, GatewayClient};
use axum::middleware::from_fn;
use axum::{
    routing::{get, post},
    Router,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::tracing::request_id_middleware;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state: the connection pool and the gateway client
/// with its precomputed credential. Both are read-only after startup.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub gateway: GatewayClient,
    pub config: Config,
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: Config) -> Result<Self, AppError> {
        init_metrics();

        let db = Database::new(
            config.database.url.expose_secret(),
            config.database.max_connections,
            config.database.min_connections,
        )
        .await?;

        db.run_migrations().await?;

        let gateway = GatewayClient::new(&config.gateway).map_err(|e| {
            tracing::error!("Failed to build gateway client: {}", e);
            AppError::ConfigError(anyhow::anyhow!("gateway client: {}", e))
        })?;

        let state = AppState {
            db,
            gateway,
            config: config.clone(),
        };

        // Port 0 binds a random port for tests.
        let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
            .parse()
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("invalid listen address: {}", e)))?;
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Payment relay listening on port {}", port);

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get the application state.
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    pub fn router(state: AppState) -> Router {
        Router::new()
            .route("/health", get(handlers::health_check))
            .route("/ready", get(handlers::readiness_check))
            .route("/metrics", get(handlers::metrics_endpoint))
            .route("/confirm", post(handlers::payments::confirm))
            .route("/verifyPayment", post(handlers::payments::verify))
            .route("/cancel", post(handlers::payments::cancel))
            .route("/cancelPayment", post(handlers::payments::cancel))
            .route("/getPurchaseList", get(handlers::payments::purchase_list))
            .layer(from_fn(metrics_middleware))
            .layer(from_fn(request_id_middleware))
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                    let request_id = request
                        .headers()
                        .get("x-request-id")
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or("-");

                    tracing::info_span!(
                        "http_request",
                        request_id = %request_id,
                        method = %request.method(),
                        uri = %request.uri(),
                    )
                }),
            )
            .with_state(state)
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = Self::router(self.state);
        axum::serve(self.listener, router).await
    }
}
