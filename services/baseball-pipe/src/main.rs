//! Baseball Pipe
//!
//! Single-binary service that:
//! 1. Logs an MLB.TV account in and keeps its bearer token fresh
//! 2. Negotiates playback sessions per `(gamePk, mediaId)`
//! 3. Serves HLS playlists with ad breaks removed and URIs pointed back here
//! 4. Passes media segments through from the CDN

mod config;
mod error;
mod metrics;
mod routes;
mod schedule;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use mlbtv_auth::{Authenticator, Credentials};
use mlbtv_stream::{NegotiatorConfig, StreamNegotiator};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::routes::{PipeState, ServiceMetrics};
use crate::schedule::ScheduleClient;

/// How long in-flight requests get to finish after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared state for the service endpoints
#[derive(Clone)]
struct AppState {
    pipe: PipeState,
    prometheus: PrometheusHandle,
}

/// Build the axum router: service endpoints plus the stream routes, all
/// behind a concurrency limit of `max_connections`.
fn build_router(state: AppState, max_connections: usize) -> Router {
    let pipe = state.pipe.clone();
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
        .merge(routes::router(pipe))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting baseball-pipe");

    // Install before anything emits metrics
    let prometheus_handle =
        metrics::install_recorder().context("failed to install Prometheus recorder")?;

    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        public_url = config.server.public_url.as_deref().unwrap_or("(from Host header)"),
        username = %config.account.username,
        max_sessions = config.cache.max_sessions,
        "configuration loaded"
    );

    let password = config
        .account
        .password
        .clone()
        .context("account password missing after config load")?;
    let authenticator = Authenticator::new(Credentials::new(
        config.account.username.clone(),
        password,
    ))
    .with_timeouts(config.upstream.timeout(), config.upstream.connect_timeout());

    let negotiator = StreamNegotiator::new(
        Arc::new(authenticator),
        NegotiatorConfig {
            request_timeout: config.upstream.timeout(),
            connect_timeout: config.upstream.connect_timeout(),
            max_sessions: config.cache.max_sessions,
            session_ttl: config.cache.session_ttl(),
            ..NegotiatorConfig::default()
        },
    )
    .context("failed to build stream negotiator")?;

    let schedule = ScheduleClient::new(config.upstream.timeout(), config.upstream.connect_timeout())
        .context("failed to build schedule client")?;

    let service_metrics = ServiceMetrics::new();
    let app_state = AppState {
        pipe: PipeState {
            negotiator: Arc::new(negotiator),
            schedule: Arc::new(schedule),
            public_url: config.server.public_url.clone(),
            metrics: service_metrics.clone(),
        },
        prometheus: prometheus_handle,
    };

    let app = build_router(app_state, config.server.max_connections);

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting requests");

    // The drain timer starts at signal receipt, not at server start: the
    // server is told to drain, then the drain races DRAIN_TIMEOUT.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            let remaining = service_metrics.in_flight.load(Ordering::Relaxed);
            warn!(
                remaining,
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    info!("shutdown complete");
    Ok(())
}

/// Liveness plus a few counters. Always 200: the pipe logs in lazily, so
/// there is no upstream state worth failing a health check on.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let metrics = &state.pipe.metrics;
    let body = serde_json::json!({
        "status": "healthy",
        "uptime_seconds": metrics.started_at.elapsed().as_secs(),
        "requests_served": metrics.requests_total.load(Ordering::Relaxed),
        "errors_total": metrics.errors_total.load(Ordering::Relaxed),
        "cached_sessions": state.pipe.negotiator.cached_sessions(),
        "negotiations": state.pipe.negotiator.negotiations(),
    });

    (
        axum::http::StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus text exposition.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Wait for SIGTERM or SIGINT. A handler that cannot be installed is logged
/// and never fires; the other signal still works.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
