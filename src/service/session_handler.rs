/// Terminal session handler: pumps one connection against one process
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::select;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::protocol::{TerminalConnection, Utf8ChunkDecoder};
use crate::pty::AsyncPty;
use crate::service::{ProcessManager, SessionService};

/// Capacity of each direction's queue, in chunks
pub const QUEUE_CAPACITY: usize = 1024;

/// Bytes requested per process read
const READ_BUFFER_SIZE: usize = 4096;

/// How long queued output may take to reach the client after the process exits
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// How long a cancelled pump gets to finish before it is aborted
const PUMP_JOIN_TIMEOUT: Duration = Duration::from_millis(200);

/// Upper bound for closing the connection; a stalled peer must not block teardown
const CLOSE_TIMEOUT: Duration = Duration::from_millis(500);

/// Longest gap between activity records while the client is sending input
const ACTIVITY_TOUCH_INTERVAL: Duration = Duration::from_secs(30);

/// Lifecycle of one communication session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultiplexerState {
    Starting,
    Running,
    Closing,
    Closed,
}

/// What ended the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndTrigger {
    SessionNotFound,
    SpawnFailed,
    /// The client closed the stream
    ClientClosed,
    /// The process output reached end of file
    ProcessExited,
    /// Sending or receiving on the connection failed
    TransportFailure,
    /// Server shutdown
    Shutdown,
}

impl EndTrigger {
    /// Close reason sent to the client
    pub fn reason(&self) -> &'static str {
        match self {
            EndTrigger::SessionNotFound => "Session not found",
            EndTrigger::SpawnFailed => "Failed to start terminal process",
            EndTrigger::ClientClosed => "Client closed connection",
            EndTrigger::ProcessExited => "Terminal process exited",
            EndTrigger::TransportFailure => "Transport failure",
            EndTrigger::Shutdown => "Server shutting down",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub session_id: String,
    pub trigger: EndTrigger,
    pub final_state: MultiplexerState,
    pub queues_closed: bool,
}

enum FirstDone {
    Receive(Result<Option<EndTrigger>, JoinError>),
    Read(Result<Option<EndTrigger>, JoinError>),
}

pub struct SessionHandler {
    session_service: Arc<SessionService>,
    process_manager: Arc<ProcessManager>,
    shutdown: CancellationToken,
}

impl SessionHandler {
    pub fn new(
        session_service: Arc<SessionService>,
        process_manager: Arc<ProcessManager>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            session_service,
            process_manager,
            shutdown,
        }
    }

    /// Drive `connection` against the session's process until either side ends,
    /// then tear everything down.
    pub async fn run(&self, session_id: &str, connection: Arc<dyn TerminalConnection>) -> SessionOutcome {
        let mut state = MultiplexerState::Starting;
        info!(
            "New terminal connection {} for session {} (Type: {:?})",
            connection.id(),
            session_id,
            connection.connection_type()
        );

        let session = match self.session_service.get_session_by_id(session_id).await {
            Ok(session) => session,
            Err(e) => {
                warn!("Rejecting connection {}: {}", connection.id(), e);
                let reason = format!("{}: {}", EndTrigger::SessionNotFound.reason(), session_id);
                close_connection(connection.as_ref(), &reason).await;
                return closed(session_id, EndTrigger::SessionNotFound, &mut state);
            }
        };

        let process = match self
            .process_manager
            .get_or_create_process(
                session.id(),
                Some(session.working_directory()),
                Some(session.shell_type()),
                Some(session.terminal_size()),
            )
            .await
        {
            Ok(process) => process,
            Err(e) => {
                error!("Failed to create process for session {}: {}", session_id, e);
                if let Err(send_error) = connection
                    .send_text(&format!("Error: Failed to create terminal session: {}\r\n", e))
                    .await
                {
                    debug!("Could not report spawn failure to {}: {}", connection.id(), send_error);
                }
                close_connection(connection.as_ref(), EndTrigger::SpawnFailed.reason()).await;
                return closed(session_id, EndTrigger::SpawnFailed, &mut state);
            }
        };

        transition(session_id, &mut state, MultiplexerState::Running);
        let scope = self.shutdown.child_token();
        let send_failed = Arc::new(AtomicBool::new(false));
        let (inbound_tx, inbound_rx) = mpsc::channel::<String>(QUEUE_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::channel::<String>(QUEUE_CAPACITY);
        let queues = [inbound_tx.downgrade(), outbound_tx.downgrade()];

        let mut pump_receive = tokio::spawn(receive_from_client(
            session_id.to_string(),
            Arc::clone(&self.session_service),
            Arc::clone(&connection),
            inbound_tx,
            scope.clone(),
        ));
        let pump_write = tokio::spawn(write_to_process(
            session_id.to_string(),
            Arc::clone(&process),
            inbound_rx,
            scope.clone(),
        ));
        let mut pump_read = tokio::spawn(read_from_process(
            session_id.to_string(),
            Arc::clone(&process),
            outbound_tx,
            scope.clone(),
        ));
        let mut pump_send = tokio::spawn(send_to_client(
            session_id.to_string(),
            Arc::clone(&connection),
            outbound_rx,
            scope.clone(),
            Arc::clone(&send_failed),
        ));

        // Whichever of the two source pumps ends first ends the session
        let first = select! {
            result = &mut pump_receive => FirstDone::Receive(result),
            result = &mut pump_read => FirstDone::Read(result),
        };
        let (result, remaining) = match first {
            FirstDone::Receive(result) => (result, pump_read),
            FirstDone::Read(result) => (result, pump_receive),
        };
        let trigger = match result {
            Ok(Some(trigger)) => trigger,
            Ok(None) if send_failed.load(Ordering::SeqCst) => EndTrigger::TransportFailure,
            Ok(None) => EndTrigger::Shutdown,
            Err(e) => {
                error!("Pump for session {} failed: {}", session_id, e);
                EndTrigger::TransportFailure
            }
        };
        info!("Session {} ending: {:?}", session_id, trigger);

        transition(session_id, &mut state, MultiplexerState::Closing);
        if trigger == EndTrigger::ProcessExited {
            // The read pump is done, so the send pump ends once the queue is empty
            let drained = select! {
                _ = &mut pump_send => true,
                _ = scope.cancelled() => false,
                _ = tokio::time::sleep(DRAIN_TIMEOUT) => false,
            };
            if !drained {
                debug!("Output of session {} not fully delivered", session_id);
            }
        }
        scope.cancel();

        close_connection(connection.as_ref(), trigger.reason()).await;

        join_pump("receive/read", session_id, remaining).await;
        join_pump("write", session_id, pump_write).await;
        if !pump_send.is_finished() {
            join_pump("send", session_id, pump_send).await;
        }
        let queues_closed = queues
            .iter()
            .all(|queue| queue.upgrade().is_none_or(|tx| tx.is_closed()));

        if !self.process_manager.terminate_process(session_id).await {
            process.terminate().await;
        }

        match trigger {
            EndTrigger::ProcessExited => self.session_service.terminate_quietly(session_id).await,
            _ => {
                // Keep the session for reconnects; the disconnect counts as activity
                if let Err(e) = self.session_service.get_session_by_id(session_id).await {
                    warn!("Could not record disconnect of session {}: {}", session_id, e);
                }
            }
        }

        transition(session_id, &mut state, MultiplexerState::Closed);
        info!("Terminal session {} closed", session_id);
        SessionOutcome {
            session_id: session_id.to_string(),
            trigger,
            final_state: state,
            queues_closed,
        }
    }
}

fn transition(session_id: &str, state: &mut MultiplexerState, next: MultiplexerState) {
    debug!("Session {}: {:?} -> {:?}", session_id, state, next);
    *state = next;
}

fn closed(session_id: &str, trigger: EndTrigger, state: &mut MultiplexerState) -> SessionOutcome {
    transition(session_id, state, MultiplexerState::Closed);
    SessionOutcome {
        session_id: session_id.to_string(),
        trigger,
        final_state: *state,
        queues_closed: true,
    }
}

async fn close_connection(connection: &dyn TerminalConnection, reason: &str) {
    match tokio::time::timeout(CLOSE_TIMEOUT, connection.close(Some(reason))).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("Closing connection {} failed: {}", connection.id(), e),
        Err(_) => warn!("Closing connection {} timed out, giving up", connection.id()),
    }
}

async fn join_pump<T>(name: &str, session_id: &str, mut handle: JoinHandle<T>) {
    if tokio::time::timeout(PUMP_JOIN_TIMEOUT, &mut handle).await.is_err() {
        warn!("{} pump of session {} did not stop, aborting", name, session_id);
        handle.abort();
        let _ = handle.await;
    }
}

/// Pump 1: connection -> inbound queue
async fn receive_from_client(
    session_id: String,
    session_service: Arc<SessionService>,
    connection: Arc<dyn TerminalConnection>,
    inbound: mpsc::Sender<String>,
    scope: CancellationToken,
) -> Option<EndTrigger> {
    let touch_every = (session_service.session_timeout() / 4).min(ACTIVITY_TOUCH_INTERVAL);
    let mut last_touch = Instant::now();
    loop {
        let received = select! {
            _ = scope.cancelled() => return None,
            received = connection.receive() => received,
        };
        match received {
            Some(Ok(text)) => {
                debug!("Received {} bytes from client for session {}", text.len(), session_id);
                if last_touch.elapsed() >= touch_every {
                    last_touch = Instant::now();
                    if let Err(e) = session_service.get_session_by_id(&session_id).await {
                        debug!("Activity of session {} not recorded: {}", session_id, e);
                    }
                }
                select! {
                    _ = scope.cancelled() => return None,
                    queued = inbound.send(text) => if queued.is_err() {
                        return None;
                    },
                }
            }
            Some(Err(e)) => {
                warn!("Connection error for session {}: {}", session_id, e);
                return Some(EndTrigger::TransportFailure);
            }
            None => {
                info!("Connection closed by client for session {}", session_id);
                return Some(EndTrigger::ClientClosed);
            }
        }
    }
}

/// Pump 2: inbound queue -> process
async fn write_to_process(
    session_id: String,
    process: Arc<dyn AsyncPty>,
    mut inbound: mpsc::Receiver<String>,
    scope: CancellationToken,
) {
    loop {
        let chunk = select! {
            _ = scope.cancelled() => break,
            chunk = inbound.recv() => chunk,
        };
        let Some(chunk) = chunk else { break };
        // The process may still be draining output, so a failed write does not end the session
        if !process.write(chunk.as_bytes()).await {
            warn!("Dropped {} bytes of input for session {}", chunk.len(), session_id);
        }
    }
    inbound.close();
}

/// Pump 3: process -> outbound queue
async fn read_from_process(
    session_id: String,
    process: Arc<dyn AsyncPty>,
    outbound: mpsc::Sender<String>,
    scope: CancellationToken,
) -> Option<EndTrigger> {
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    let mut decoder = Utf8ChunkDecoder::new();
    loop {
        let read = select! {
            _ = scope.cancelled() => return None,
            read = process.read_output(&mut buffer) => read,
        };
        let text = match read {
            Ok(Some(0)) => continue,
            Ok(Some(n)) => decoder.decode(&buffer[..n]),
            Ok(None) => {
                info!("Process output ended for session {}", session_id);
                let rest = decoder.finish();
                if !rest.is_empty() {
                    enqueue(&outbound, rest, &scope).await;
                }
                return Some(EndTrigger::ProcessExited);
            }
            Err(e) => {
                error!("Error reading from process for session {}: {}", session_id, e);
                return Some(EndTrigger::ProcessExited);
            }
        };
        if !text.is_empty() && !enqueue(&outbound, text, &scope).await {
            return None;
        }
    }
}

async fn enqueue(queue: &mpsc::Sender<String>, text: String, scope: &CancellationToken) -> bool {
    select! {
        _ = scope.cancelled() => false,
        queued = queue.send(text) => queued.is_ok(),
    }
}

/// Pump 4: outbound queue -> connection
async fn send_to_client(
    session_id: String,
    connection: Arc<dyn TerminalConnection>,
    mut outbound: mpsc::Receiver<String>,
    scope: CancellationToken,
    send_failed: Arc<AtomicBool>,
) {
    loop {
        let chunk = select! {
            _ = scope.cancelled() => break,
            chunk = outbound.recv() => chunk,
        };
        let Some(chunk) = chunk else { break };
        let sent = select! {
            _ = scope.cancelled() => break,
            sent = connection.send_text(&chunk) => sent,
        };
        if let Err(e) = sent {
            warn!("Failed to send output to client for session {}: {}", session_id, e);
            send_failed.store(true, Ordering::SeqCst);
            scope.cancel();
            break;
        }
    }
    outbound.close();
}
