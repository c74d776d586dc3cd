use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{debug, error, info, warn};
use wtransport::endpoint::IncomingSession;
use wtransport::{Endpoint, Identity, ServerConfig};

use crate::app_state::AppState;
use crate::protocol::WebTransportConnection;

/// Path prefix clients use: `/webtransport/<session id>`
const PATH_PREFIX: &str = "/webtransport/";

/// WebTransport server implementation
pub async fn start_webtransport_server(addr: SocketAddr, state: AppState) {
    if let Err(e) = run_webtransport_server(addr, state).await {
        error!("WebTransport server error: {}", e);
    }
    info!("WebTransport server shutdown complete");
}

/// Run the actual WebTransport server until the shutdown token fires
async fn run_webtransport_server(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    info!("Configuring WebTransport server on {}", addr);

    let identity = Identity::self_signed(["localhost", "127.0.0.1", "::1"])?;
    let config = ServerConfig::builder()
        .with_bind_address(addr)
        .with_identity(identity)
        .build();
    let endpoint = Endpoint::server(config)?;

    info!("WebTransport server listening on {}", addr);

    loop {
        tokio::select! {
            biased;

            _ = state.shutdown.cancelled() => {
                info!("WebTransport server received shutdown signal");
                break;
            }

            incoming = endpoint.accept() => {
                let state = state.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_incoming_session(incoming, state).await {
                        warn!("WebTransport session failed: {}", e);
                    }
                });
            }
        }
    }

    Ok(())
}

/// Session id from a request path such as `/webtransport/abc`
pub fn session_id_from_path(path: &str) -> Option<&str> {
    let path = path.split('?').next().unwrap_or_default();
    path.strip_prefix(PATH_PREFIX)
        .map(|rest| rest.trim_end_matches('/'))
        .filter(|id| !id.is_empty() && !id.contains('/'))
}

/// Handle one incoming WebTransport session
async fn handle_incoming_session(incoming: IncomingSession, state: AppState) -> anyhow::Result<()> {
    let request = incoming.await?;
    let Some(session_id) = session_id_from_path(request.path()).map(str::to_string) else {
        debug!("Rejecting WebTransport request for {}", request.path());
        request.not_found().await;
        return Ok(());
    };

    let connection = request.accept().await?;
    let connection_id = uuid::Uuid::new_v4().to_string();
    info!("WebTransport connection {} for session {}", connection_id, session_id);

    let connection = WebTransportConnection::accept(connection_id, connection).await?;
    let outcome = state.session_handler.run(&session_id, Arc::new(connection)).await;
    info!(
        "WebTransport stream for session {} finished: {:?}",
        outcome.session_id, outcome.trigger
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_session_id() {
        assert_eq!(session_id_from_path("/webtransport/abc"), Some("abc"));
        assert_eq!(session_id_from_path("/webtransport/abc/"), Some("abc"));
        assert_eq!(session_id_from_path("/webtransport/abc?x=1"), Some("abc"));
        assert_eq!(session_id_from_path("/webtransport/"), None);
        assert_eq!(session_id_from_path("/webtransport/a/b"), None);
        assert_eq!(session_id_from_path("/ws/abc"), None);
    }
}
