/// HTTP server, background tasks and shutdown handling
use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    Router,
    http::Method,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use crate::{app_state::AppState, handlers};

/// Start WebTransport server in a separate task
pub fn start_webtransport_service(state: AppState) {
    let webtransport_addr = SocketAddr::from(([0, 0, 0, 0], state.config.webtransport_port));
    tokio::spawn(handlers::webtransport::start_webtransport_server(webtransport_addr, state));
}

/// Periodically drop expired sessions that no longer have a process
pub fn start_expiry_reaper(state: AppState) {
    let period = Duration::from_millis(state.config.expiry_check_interval.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    state.session_service.cleanup_expired_sessions().await;
                }
            }
        }
        info!("Expiry reaper stopped");
    });
}

/// Build the application router with routes
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/", get(|| async { "Web Terminal - Rust Backend" }))
        .route("/health", get(handlers::rest::health_check))
        .route("/ws/:session_id", get(handlers::websocket::websocket_handler))
        .nest("/api", api_routes())
        .layer(cors)
        .with_state(state)
}

/// Build API routes for session management
fn api_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/sessions",
            post(handlers::rest::create_session).get(handlers::rest::list_sessions),
        )
        .route(
            "/sessions/:session_id",
            get(handlers::rest::get_session).delete(handlers::rest::terminate_session),
        )
        .route("/sessions/:session_id/resize", post(handlers::rest::resize_session))
}

/// Resolves on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C signal, initiating graceful shutdown...");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received SIGTERM signal, initiating graceful shutdown...");
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Run the HTTP server until a shutdown signal, then cancel every stream
pub async fn run_server_with_graceful_shutdown(router: Router, state: AppState) -> Result<(), std::io::Error> {
    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.http_port));
    let webtransport_addr = SocketAddr::from(([0, 0, 0, 0], state.config.webtransport_port));

    let listener = TcpListener::bind(addr).await?;

    info!("Server running on http://{}", addr);
    info!("WebSocket server available at ws://{}/ws/<session id>", addr);
    info!(
        "WebTransport server available at https://{}/webtransport/<session id>",
        webtransport_addr
    );

    let shutdown = state.shutdown.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = shutdown_signal() => {},
                _ = shutdown.cancelled() => {},
            }
            // Upgraded sockets are not tracked by axum; end them explicitly
            shutdown.cancel();
        })
        .await?;

    state.shutdown.cancel();
    info!("Server shutdown complete");
    Ok(())
}
