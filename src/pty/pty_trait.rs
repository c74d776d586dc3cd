use async_trait::async_trait;
use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tracing::warn;

use crate::config::TerminalSize;

/// Control byte written by [`AsyncPty::interrupt`] (Ctrl-C)
pub const INTERRUPT_BYTE: u8 = 0x03;

// ================ 配置与错误类型 ================

#[derive(Debug, Clone)]
pub struct PtyConfig {
    pub command: String,
    pub args: Vec<String>,
    pub size: TerminalSize,
    /// Full environment of the process; later entries win
    pub env: Vec<(OsString, OsString)>,
    pub cwd: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum PtyError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Process spawn failed: {0}")]
    SpawnFailed(String),
    #[error("No shell configured for type: {0}")]
    ShellNotConfigured(String),
    #[error("Resize failed: {0}")]
    ResizeFailed(String),
    #[error("Background task error: {0}")]
    BackgroundTask(String),
}

impl From<tokio::task::JoinError> for PtyError {
    fn from(error: tokio::task::JoinError) -> Self {
        PtyError::BackgroundTask(error.to_string())
    }
}

// ================ 核心Trait定义 ================

/// One running shell bound to a session.
///
/// Implementations use interior mutability: the read pump and the write pump of
/// a session hold the same `Arc<dyn AsyncPty>` and run concurrently.
#[async_trait]
pub trait AsyncPty: Send + Sync {
    /// Session this process belongs to
    fn session_id(&self) -> &str;

    /// Read raw output into `buf`.
    ///
    /// `Ok(Some(0))` means nothing was available and the caller should read
    /// again; `Ok(None)` means the output stream reached end of file.
    async fn read_output(&self, buf: &mut [u8]) -> io::Result<Option<usize>>;

    /// Write raw bytes to the terminal input
    async fn write_input(&self, data: &[u8]) -> io::Result<()>;

    /// Change the terminal window size; no-op once terminated
    async fn resize(&self, size: TerminalSize) -> Result<(), PtyError>;

    /// Stop the process. Idempotent; the process reports dead afterwards even
    /// if the OS process has not exited yet.
    async fn terminate(&self);

    /// False once terminated or once the process exited on its own
    fn is_alive(&self) -> bool;

    /// OS process id, when the backend has one
    fn pid(&self) -> Option<u32>;

    /// Write to the terminal, reporting failure instead of raising it
    async fn write(&self, data: &[u8]) -> bool {
        if !self.is_alive() {
            return false;
        }
        match self.write_input(data).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Write to process for session {} failed: {}", self.session_id(), e);
                false
            }
        }
    }

    /// Send Ctrl-C to the foreground job
    async fn interrupt(&self) -> bool {
        self.write(&[INTERRUPT_BYTE]).await
    }
}

/// PTY工厂Trait
#[async_trait]
pub trait PtyFactory: Send + Sync {
    /// Start a process for `session_id`. The returned process is already running.
    async fn create(&self, session_id: &str, config: &PtyConfig) -> Result<Box<dyn AsyncPty>, PtyError>;

    /// 工厂名称
    fn name(&self) -> &'static str;
}
