/// WebSocket connection implementation for TerminalConnection trait
use std::borrow::Cow;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::extract::ws::Message::{Binary, Close, Ping, Pong, Text};
use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tracing::{debug, error, trace};

use crate::protocol::{ConnectionError, ConnectionResult, ConnectionType, TerminalConnection};

/// WebSocket connection implementation that implements TerminalConnection trait
pub struct WebSocketConnection {
    id: String,
    sender: Mutex<SplitSink<WebSocket, Message>>,
    receiver: Mutex<SplitStream<WebSocket>>,
    closed: AtomicBool,
}

impl WebSocketConnection {
    pub fn new(id: String, socket: WebSocket) -> Self {
        let (sender, receiver) = socket.split();
        Self {
            id,
            sender: Mutex::new(sender),
            receiver: Mutex::new(receiver),
            closed: AtomicBool::new(false),
        }
    }
}

impl Debug for WebSocketConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketConnection")
            .field("id", &self.id)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

#[async_trait::async_trait]
impl TerminalConnection for WebSocketConnection {
    async fn send_text(&self, message: &str) -> ConnectionResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ConnectionError::ConnectionClosed);
        }
        self.sender
            .lock()
            .await
            .send(Text(message.to_string()))
            .await
            .map_err(|e| ConnectionError::WebSocket(e.to_string()))
    }

    async fn receive(&self) -> Option<ConnectionResult<String>> {
        let mut receiver = self.receiver.lock().await;
        loop {
            match receiver.next().await {
                Some(Ok(Text(text))) => {
                    trace!("WebSocket {} received text message, length: {}", self.id, text.len());
                    return Some(Ok(text));
                }
                Some(Ok(Binary(bin))) => {
                    debug!("WebSocket {} received binary message, length: {}", self.id, bin.len());
                    return Some(Ok(String::from_utf8_lossy(&bin).into_owned()));
                }
                // axum answers pings itself
                Some(Ok(Ping(_))) | Some(Ok(Pong(_))) => continue,
                Some(Ok(Close(frame))) => {
                    debug!("WebSocket {} received close message: {:?}", self.id, frame);
                    return None;
                }
                Some(Err(e)) => {
                    error!("WebSocket {} receive error: {}", self.id, e);
                    return Some(Err(ConnectionError::WebSocket(e.to_string())));
                }
                None => {
                    debug!("WebSocket {} connection closed", self.id);
                    return None;
                }
            }
        }
    }

    async fn close(&self, reason: Option<&str>) -> ConnectionResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let frame = CloseFrame {
            code: close_code::NORMAL,
            reason: Cow::Owned(reason.unwrap_or_default().to_string()),
        };

        let mut sender = self.sender.lock().await;
        let sent = sender
            .send(Close(Some(frame)))
            .await
            .map_err(|e| ConnectionError::WebSocket(e.to_string()));
        let _ = sender.close().await;
        sent
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn connection_type(&self) -> ConnectionType {
        ConnectionType::WebSocket
    }
}
