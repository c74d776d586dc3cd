/// In-process connection driven by tests
use std::fmt::Debug;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};

use crate::protocol::{ConnectionError, ConnectionResult, ConnectionType, TerminalConnection};

pub struct MockConnection {
    id: String,
    inbound: Mutex<mpsc::UnboundedReceiver<ConnectionResult<String>>>,
    sent: StdMutex<Vec<String>>,
    close_reasons: StdMutex<Vec<Option<String>>>,
    close_calls: AtomicUsize,
    fail_sends: AtomicBool,
    stall_close: AtomicBool,
}

/// Client side of a [`MockConnection`]
pub struct MockClient {
    tx: Option<mpsc::UnboundedSender<ConnectionResult<String>>>,
}

impl MockClient {
    pub fn send(&self, text: &str) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(Ok(text.to_string()));
        }
    }

    /// Deliver a receive error, as a broken transport would
    pub fn fail(&self, error: ConnectionError) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(Err(error));
        }
    }

    /// End the inbound stream like a closed socket
    pub fn disconnect(&mut self) {
        self.tx.take();
    }
}

pub fn mock_pair(id: &str) -> (std::sync::Arc<MockConnection>, MockClient) {
    let (tx, rx) = mpsc::unbounded_channel();
    let connection = MockConnection {
        id: id.to_string(),
        inbound: Mutex::new(rx),
        sent: StdMutex::new(Vec::new()),
        close_reasons: StdMutex::new(Vec::new()),
        close_calls: AtomicUsize::new(0),
        fail_sends: AtomicBool::new(false),
        stall_close: AtomicBool::new(false),
    };
    (std::sync::Arc::new(connection), MockClient { tx: Some(tx) })
}

impl MockConnection {
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn output(&self) -> String {
        self.sent().concat()
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn close_reasons(&self) -> Vec<Option<String>> {
        self.close_reasons.lock().unwrap().clone()
    }

    pub fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    /// Make `close` hang forever, like a peer that stopped reading
    pub fn stall_close(&self) {
        self.stall_close.store(true, Ordering::SeqCst);
    }

    /// Poll the sent messages until `needle` shows up
    pub async fn wait_for_output(&self, needle: &str, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.output().contains(needle) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.output().contains(needle)
    }
}

impl Debug for MockConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockConnection").field("id", &self.id).finish()
    }
}

#[async_trait::async_trait]
impl TerminalConnection for MockConnection {
    async fn send_text(&self, message: &str) -> ConnectionResult<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ConnectionError::ConnectionClosed);
        }
        self.sent.lock().unwrap().push(message.to_string());
        Ok(())
    }

    async fn receive(&self) -> Option<ConnectionResult<String>> {
        self.inbound.lock().await.recv().await
    }

    async fn close(&self, reason: Option<&str>) -> ConnectionResult<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.close_reasons
            .lock()
            .unwrap()
            .push(reason.map(str::to_string));
        if self.stall_close.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn connection_type(&self) -> ConnectionType {
        ConnectionType::WebSocket
    }
}
