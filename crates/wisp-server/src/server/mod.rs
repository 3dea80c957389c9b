use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::State,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{error, info, warn, Level};
use wisp_relay::Relay;

use crate::config::ServerConfig;

mod websocket;

/// Server application state
pub struct AppState {
    /// The relay core shared by every connection
    pub relay: Relay,
    /// Largest accepted WebSocket message in bytes
    pub max_frame_bytes: usize,
    /// Cancelled when the process is shutting down
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Bundle the relay with transport settings.
    pub fn new(relay: Relay, max_frame_bytes: usize, shutdown: CancellationToken) -> Self {
        Self {
            relay,
            max_frame_bytes,
            shutdown,
        }
    }
}

/// Bind the configured address and run until Ctrl-C or SIGTERM.
pub async fn start(config: ServerConfig) -> Result<()> {
    let listener = TcpListener::bind(config.socket_addr()).await?;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    serve(listener, &config, shutdown).await
}

/// Serve HTTP and WebSocket traffic on `listener` until `shutdown` is cancelled.
///
/// Also runs the liveness sweeper for the lifetime of the server.
pub async fn serve(
    listener: TcpListener,
    config: &ServerConfig,
    shutdown: CancellationToken,
) -> Result<()> {
    let relay = Relay::new(config.relay_config());
    let sweeper = relay.sweeper().spawn(shutdown.clone());

    let state = Arc::new(AppState::new(
        relay,
        config.max_frame_bytes,
        shutdown.clone(),
    ));
    let app = create_router(state, &config.cors_origins);

    let addr = listener.local_addr()?;
    info!("Relay server running on {} (WS supported)", addr);

    let stop = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            stop.cancelled().await;
            info!("HTTP server received shutdown signal, draining connections");
        })
        .await?;

    // The sweeper watches the same token
    shutdown.cancel();
    if let Err(e) = sweeper.await {
        warn!(error = %e, "Sweeper task ended abnormally");
    }

    info!("Graceful shutdown complete");
    Ok(())
}

/// Create the Axum router with all routes and middleware
pub fn create_router(state: Arc<AppState>, cors_origins: &[String]) -> Router {
    let websocket_router = websocket::router(state.clone());

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/v1/stats", get(stats_handler))
        .with_state(state)
        .merge(websocket_router)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CompressionLayer::new())
        .layer(configure_cors(cors_origins))
}

/// Configure CORS layer.
///
/// With an explicit origin list only those origins are allowed. Otherwise
/// falls back to permissive CORS.
fn configure_cors(origins: &[String]) -> CorsLayer {
    use tower_http::cors::AllowOrigin;

    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    let allowed: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    if allowed.is_empty() {
        warn!("WISP_CORS_ORIGINS set but no valid origins parsed, falling back to permissive CORS");
        CorsLayer::permissive()
    } else {
        info!(origins = ?allowed, "Configured CORS with explicit allowed origins");
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any)
    }
}

/// Simple health check endpoint (for load balancers)
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.relay.health())
}

/// Relay counters (for monitoring)
async fn stats_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "service": "wisp-server",
        "version": env!("CARGO_PKG_VERSION"),
        "connectedClients": state.relay.registry().size(),
        "stats": state.relay.stats(),
    }))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to register SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C, initiating graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}
