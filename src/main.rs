/// Main entry point for the web terminal backend
mod api;
mod app_state;
mod config;
mod handlers;
mod protocol;
mod pty;
mod server;
mod service;

use std::path::PathBuf;

use anyhow::Context;
use tracing::info;

use crate::app_state::AppState;
use crate::config::{ConfigLoader, init_logging};
use crate::server::{
    build_router, run_server_with_graceful_shutdown, start_expiry_reaper, start_webtransport_service,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional
    let _ = dotenvy::dotenv();

    // First argument, if any, is the configuration file
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = ConfigLoader::new()
        .load_config(config_path.as_deref())
        .context("Failed to load configuration")?;

    let _log_guard = init_logging(&config.logging);
    info!(
        "Starting web terminal (shell: {}, backend: {:?})",
        config.default_shell_type, config.pty_backend
    );

    let app_state = AppState::new(config);

    start_webtransport_service(app_state.clone());
    start_expiry_reaper(app_state.clone());

    let app = build_router(app_state.clone());
    run_server_with_graceful_shutdown(app, app_state)
        .await
        .context("HTTP server failed")?;
    Ok(())
}
