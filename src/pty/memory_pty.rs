/// Memory-based terminal for development and tests
///
/// Input is echoed back as output. Completing a line that reads `exit` ends the
/// output stream the way a shell exit would, and Ctrl-C prints `^C`.
use async_trait::async_trait;
use std::io;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tracing::debug;

use crate::config::TerminalSize;
use crate::pty::output_buffer::{OutputBuffer, output_channel};
use crate::pty::pty_trait::{AsyncPty, INTERRUPT_BYTE, PtyConfig, PtyError, PtyFactory};

pub struct MemoryPty {
    session_id: String,
    config: PtyConfig,
    data_tx: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
    output: AsyncMutex<OutputBuffer>,
    line: Mutex<String>,
    resizes: Mutex<Vec<TerminalSize>>,
    terminated: AtomicBool,
    exited: AtomicBool,
}

impl MemoryPty {
    pub fn new(session_id: &str, config: &PtyConfig) -> Self {
        let (data_tx, output) = output_channel();
        Self {
            session_id: session_id.to_string(),
            config: config.clone(),
            data_tx: Mutex::new(Some(data_tx)),
            output: AsyncMutex::new(output),
            line: Mutex::new(String::new()),
            resizes: Mutex::new(vec![config.size]),
            terminated: AtomicBool::new(false),
            exited: AtomicBool::new(false),
        }
    }

    /// Configuration the process was started with
    #[cfg(test)]
    pub fn config(&self) -> &PtyConfig {
        &self.config
    }

    /// Value of an environment variable passed at start
    #[cfg(test)]
    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.config
            .env
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| v.to_str())
    }

    /// Every size the terminal has had, the initial one first
    #[cfg(test)]
    pub fn size_history(&self) -> Vec<TerminalSize> {
        self.resizes
            .lock()
            .map(|sizes| sizes.clone())
            .unwrap_or_default()
    }

    fn sender(&self) -> Option<mpsc::Sender<Vec<u8>>> {
        self.data_tx.lock().ok().and_then(|tx| tx.clone())
    }

    fn close_output(&self) {
        if let Ok(mut tx) = self.data_tx.lock() {
            tx.take();
        }
    }

    /// Build the echo for `data`, reporting whether an `exit` line completed
    fn process_input(&self, data: &[u8]) -> (Vec<u8>, bool) {
        let mut echo = Vec::with_capacity(data.len());
        let mut exit_requested = false;
        let Ok(mut line) = self.line.lock() else {
            return (data.to_vec(), false);
        };

        for ch in String::from_utf8_lossy(data).chars() {
            match ch {
                '\r' | '\n' => {
                    echo.extend_from_slice(b"\r\n");
                    if line.trim() == "exit" {
                        exit_requested = true;
                    }
                    line.clear();
                }
                c if c as u32 == INTERRUPT_BYTE as u32 => {
                    echo.extend_from_slice(b"^C\r\n");
                    line.clear();
                }
                c => {
                    line.push(c);
                    let mut encoded = [0u8; 4];
                    echo.extend_from_slice(c.encode_utf8(&mut encoded).as_bytes());
                }
            }
        }
        (echo, exit_requested)
    }
}

#[async_trait]
impl AsyncPty for MemoryPty {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn read_output(&self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        let mut output = self.output.lock().await;
        Ok(output.read(buf).await)
    }

    async fn write_input(&self, data: &[u8]) -> io::Result<()> {
        let Some(tx) = self.sender().filter(|_| self.is_alive()) else {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "memory pty is not alive"));
        };

        let (echo, exit_requested) = self.process_input(data);
        if tx.send(echo).await.is_err() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "memory pty output closed"));
        }
        if exit_requested {
            debug!("Memory PTY for session {} exiting", self.session_id);
            self.exited.store(true, Ordering::SeqCst);
            self.close_output();
        }
        Ok(())
    }

    async fn resize(&self, size: TerminalSize) -> Result<(), PtyError> {
        if !self.is_alive() {
            return Ok(());
        }
        if let Ok(mut sizes) = self.resizes.lock() {
            sizes.push(size);
        }
        Ok(())
    }

    async fn terminate(&self) {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(
            "Memory PTY for session {} ({}) terminated",
            self.session_id, self.config.command
        );
        self.close_output();
    }

    fn is_alive(&self) -> bool {
        !self.terminated.load(Ordering::SeqCst) && !self.exited.load(Ordering::SeqCst)
    }

    fn pid(&self) -> Option<u32> {
        None
    }
}

/// Memory PTY factory for creating MemoryPty instances
#[derive(Default)]
pub struct MemoryPtyFactory;

#[async_trait]
impl PtyFactory for MemoryPtyFactory {
    async fn create(&self, session_id: &str, config: &PtyConfig) -> Result<Box<dyn AsyncPty>, PtyError> {
        Ok(Box::new(MemoryPty::new(session_id, config)))
    }

    fn name(&self) -> &'static str {
        "memory-pty"
    }
}
