//! Application startup and lifecycle management.

use crate::config::EtransferConfig;
use crate::handlers;
use crate::matching::MatchEngine;
use crate::services::{get_metrics, init_metrics, Database, PgAuditSink};
use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use platform_core::error::AppError;
use platform_core::middleware::{metrics_middleware, request_id_middleware};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: EtransferConfig,
    pub db: Arc<Database>,
    pub engine: Arc<MatchEngine>,
}

/// Health check endpoint for Docker/K8s liveness probes.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => {
            tracing::debug!("Health check passed");
            (
                StatusCode::OK,
                Json(json!({
                    "status": "ok",
                    "service": "etransfer-service",
                    "version": env!("CARGO_PKG_VERSION")
                })),
            )
        }
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed - database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "service": "etransfer-service",
                    "error": e.to_string()
                })),
            )
        }
    }
}

/// Readiness check endpoint for K8s readiness probes.
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Metrics endpoint for Prometheus scraping.
async fn metrics_handler() -> impl IntoResponse {
    let metrics = get_metrics();
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        metrics,
    )
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: EtransferConfig) -> Result<Self, AppError> {
        Self::build_internal(config, true).await
    }

    /// Build the application without running migrations.
    /// Use this in tests when migrations are already applied by the harness.
    pub async fn build_without_migrations(config: EtransferConfig) -> Result<Self, AppError> {
        Self::build_internal(config, false).await
    }

    async fn build_internal(
        config: EtransferConfig,
        run_migrations: bool,
    ) -> Result<Self, AppError> {
        init_metrics();

        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            e
        })?;

        if run_migrations {
            db.run_migrations().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to run migrations");
                e
            })?;
        }

        let db = Arc::new(db);
        let audit = Arc::new(PgAuditSink::new(db.pool().clone()));
        let engine = Arc::new(MatchEngine::new(db.clone(), audit));

        let state = AppState {
            config: config.clone(),
            db,
            engine,
        };

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, "etransfer-service listener bound");

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

    /// Get a reference to the database.
    pub fn db(&self) -> &Database {
        &self.state.db
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = Router::new()
            .route("/health", get(health_check))
            .route("/ready", get(readiness_check))
            .route("/metrics", get(metrics_handler))
            .route("/transfers/match", post(handlers::transfers::match_transfer))
            .route("/payments", get(handlers::payments::list_payments))
            .route("/payments/:id", get(handlers::payments::get_payment))
            .layer(TraceLayer::new_for_http())
            .layer(middleware::from_fn(metrics_middleware))
            .layer(middleware::from_fn(request_id_middleware))
            .with_state(self.state);

        tracing::info!(
            service = "etransfer-service",
            version = env!("CARGO_PKG_VERSION"),
            port = self.port,
            "Service ready to accept connections"
        );

        axum::serve(self.listener, router).await
    }
}
