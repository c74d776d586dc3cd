/// WebTransport connection implementation for TerminalConnection trait
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;
use tracing::{debug, info};
use wtransport::{Connection, RecvStream, SendStream, VarInt};

use crate::protocol::text_codec::Utf8ChunkDecoder;
use crate::protocol::{ConnectionError, ConnectionResult, ConnectionType, TerminalConnection};

const READ_CHUNK_SIZE: usize = 4096;

struct Inbound {
    stream: RecvStream,
    decoder: Utf8ChunkDecoder,
}

/// WebTransport connection over the first bidirectional stream the client opens
pub struct WebTransportConnection {
    id: String,
    connection: Connection,
    send: Mutex<SendStream>,
    recv: Mutex<Inbound>,
    closed: AtomicBool,
}

impl WebTransportConnection {
    /// Wait for the client's bidirectional stream and wrap the session
    pub async fn accept(id: String, connection: Connection) -> ConnectionResult<Self> {
        let (send, recv) = connection
            .accept_bi()
            .await
            .map_err(|e| ConnectionError::WebTransport(e.to_string()))?;
        info!("WebTransport {} opened bidirectional stream", id);

        Ok(Self {
            id,
            connection,
            send: Mutex::new(send),
            recv: Mutex::new(Inbound {
                stream: recv,
                decoder: Utf8ChunkDecoder::new(),
            }),
            closed: AtomicBool::new(false),
        })
    }
}

impl Debug for WebTransportConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebTransportConnection")
            .field("id", &self.id)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

#[async_trait::async_trait]
impl TerminalConnection for WebTransportConnection {
    async fn send_text(&self, message: &str) -> ConnectionResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ConnectionError::ConnectionClosed);
        }
        self.send
            .lock()
            .await
            .write_all(message.as_bytes())
            .await
            .map_err(|e| ConnectionError::WebTransport(e.to_string()))
    }

    async fn receive(&self) -> Option<ConnectionResult<String>> {
        let mut inbound = self.recv.lock().await;
        let Inbound { stream, decoder } = &mut *inbound;
        let mut buf = [0u8; READ_CHUNK_SIZE];
        loop {
            match stream.read(&mut buf).await {
                Ok(Some(n)) => {
                    let text = decoder.decode(&buf[..n]);
                    if !text.is_empty() {
                        return Some(Ok(text));
                    }
                }
                Ok(None) => {
                    debug!("WebTransport {} stream finished", self.id);
                    let rest = decoder.finish();
                    return (!rest.is_empty()).then_some(Ok(rest));
                }
                Err(e) => return Some(Err(ConnectionError::WebTransport(e.to_string()))),
            }
        }
    }

    async fn close(&self, reason: Option<&str>) -> ConnectionResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let finished = self
            .send
            .lock()
            .await
            .finish()
            .await
            .map_err(|e| ConnectionError::WebTransport(e.to_string()));
        self.connection
            .close(VarInt::from_u32(0), reason.unwrap_or_default().as_bytes());
        finished
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn connection_type(&self) -> ConnectionType {
        ConnectionType::WebTransport
    }
}
