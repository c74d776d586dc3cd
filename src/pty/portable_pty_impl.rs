use crate::config::TerminalSize;
use crate::pty::output_buffer::{OutputBuffer, output_channel};
use crate::pty::pty_trait::{AsyncPty, PtyConfig, PtyError, PtyFactory};
use async_trait::async_trait;
use portable_pty::{Child, CommandBuilder, MasterPty, PtySize};
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio::task::spawn_blocking;
use tracing::{debug, info, trace, warn};

/// Bytes requested per blocking read of the PTY master
const READ_CHUNK_SIZE: usize = 4096;

/// How long terminate waits for the child to exit after killing it
const TERMINATE_GRACE: Duration = Duration::from_millis(100);

fn pty_size(size: TerminalSize) -> PtySize {
    PtySize {
        rows: size.rows(),
        cols: size.columns(),
        pixel_width: 0,
        pixel_height: 0,
    }
}

fn poisoned(what: &str) -> io::Error {
    io::Error::other(format!("{} lock poisoned", what))
}

/// 基于 portable-pty 库的异步 PTY 实现
///
/// Blocking reads run on a dedicated thread that feeds a bounded channel;
/// writes, resizes and kills hop onto the blocking pool.
pub struct PortablePty {
    session_id: String,
    master: Arc<Mutex<Box<dyn MasterPty + Send>>>,
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
    child: Arc<Mutex<Box<dyn Child + Send + Sync>>>,
    pid: Option<u32>,
    terminated: AtomicBool,
    exited: Arc<AtomicBool>,
    output: AsyncMutex<OutputBuffer>,
}

impl PortablePty {
    /// Open a PTY pair and start the command on its slave side. Blocking.
    pub fn spawn(session_id: String, config: &PtyConfig) -> Result<Self, PtyError> {
        info!(
            "PortablePty: Creating PTY for session {} with command: {:?}, args: {:?}",
            session_id, config.command, config.args
        );

        let pty_system = portable_pty::native_pty_system();
        let pair = pty_system
            .openpty(pty_size(config.size))
            .map_err(|e| PtyError::SpawnFailed(format!("openpty failed: {}", e)))?;

        let mut cmd = CommandBuilder::new(&config.command);
        cmd.args(&config.args);
        for (key, value) in &config.env {
            cmd.env(key, value);
        }
        if let Some(cwd) = &config.cwd {
            cmd.cwd(cwd);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| PtyError::SpawnFailed(format!("{}: {}", config.command, e)))?;
        // The child holds its own copy; keeping ours would hide EOF after exit.
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| PtyError::SpawnFailed(e.to_string()))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| PtyError::SpawnFailed(e.to_string()))?;

        let pid = child.process_id();
        let exited = Arc::new(AtomicBool::new(false));
        let (data_tx, output) = output_channel();

        let reader_session = session_id.clone();
        let reader_exited = Arc::clone(&exited);
        std::thread::Builder::new()
            .name(format!("pty-reader-{}", session_id))
            .spawn(move || pump_output(reader_session, reader, data_tx, reader_exited))?;

        Ok(Self {
            session_id,
            master: Arc::new(Mutex::new(pair.master)),
            writer: Arc::new(Mutex::new(writer)),
            child: Arc::new(Mutex::new(child)),
            pid,
            terminated: AtomicBool::new(false),
            exited,
            output: AsyncMutex::new(output),
        })
    }
}

/// Blocking read loop; ends on EOF, read error, or when nobody listens anymore
fn pump_output(
    session_id: String,
    mut reader: Box<dyn Read + Send>,
    data_tx: mpsc::Sender<Vec<u8>>,
    exited: Arc<AtomicBool>,
) {
    let mut buffer = vec![0u8; READ_CHUNK_SIZE];
    loop {
        match reader.read(&mut buffer) {
            Ok(0) => {
                debug!("PTY EOF reached for session {}", session_id);
                break;
            }
            Ok(n) => {
                trace!("PTY background reader: read {} bytes", n);
                if data_tx.blocking_send(buffer[..n].to_vec()).is_err() {
                    debug!("PTY background reader for session {}: receiver dropped", session_id);
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                // Linux reports EIO on the master once the slave side is gone
                debug!("PTY read for session {} ended: {}", session_id, e);
                break;
            }
        }
    }
    exited.store(true, Ordering::SeqCst);
}

#[async_trait]
impl AsyncPty for PortablePty {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn read_output(&self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        let mut output = self.output.lock().await;
        Ok(output.read(buf).await)
    }

    async fn write_input(&self, data: &[u8]) -> io::Result<()> {
        let writer = Arc::clone(&self.writer);
        let data = data.to_vec();
        spawn_blocking(move || {
            let mut writer = writer.lock().map_err(|_| poisoned("writer"))?;
            writer.write_all(&data)?;
            writer.flush()
        })
        .await
        .map_err(io::Error::other)?
    }

    async fn resize(&self, size: TerminalSize) -> Result<(), PtyError> {
        if !self.is_alive() {
            debug!("Ignoring resize of terminated PTY for session {}", self.session_id);
            return Ok(());
        }
        info!("PortablePty: Resizing PTY for session {} to {}", self.session_id, size);

        let master = Arc::clone(&self.master);
        spawn_blocking(move || {
            let master = master
                .lock()
                .map_err(|_| PtyError::ResizeFailed("master lock poisoned".to_string()))?;
            master
                .resize(pty_size(size))
                .map_err(|e| PtyError::ResizeFailed(e.to_string()))
        })
        .await?
    }

    async fn terminate(&self) {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("PortablePty: Terminating process for session {}", self.session_id);

        let child = Arc::clone(&self.child);
        let outcome = spawn_blocking(move || -> io::Result<bool> {
            let mut child = child.lock().map_err(|_| poisoned("child"))?;
            if child.try_wait()?.is_some() {
                return Ok(true);
            }
            child.kill()?;
            let deadline = Instant::now() + TERMINATE_GRACE;
            while Instant::now() < deadline {
                if child.try_wait()?.is_some() {
                    return Ok(true);
                }
                std::thread::sleep(Duration::from_millis(10));
            }
            Ok(false)
        })
        .await;

        match outcome {
            Ok(Ok(true)) => debug!("Process for session {} exited", self.session_id),
            Ok(Ok(false)) => warn!(
                "Process for session {} still running {:?} after kill",
                self.session_id, TERMINATE_GRACE
            ),
            Ok(Err(e)) => warn!("Failed to kill process for session {}: {}", self.session_id, e),
            Err(e) => warn!("Kill task for session {} failed: {}", self.session_id, e),
        }
    }

    fn is_alive(&self) -> bool {
        !self.terminated.load(Ordering::SeqCst) && !self.exited.load(Ordering::SeqCst)
    }

    fn pid(&self) -> Option<u32> {
        self.pid
    }
}

impl Drop for PortablePty {
    fn drop(&mut self) {
        if self.terminated.load(Ordering::SeqCst) {
            return;
        }
        if let Ok(mut child) = self.child.lock() {
            if matches!(child.try_wait(), Ok(None)) {
                let _ = child.kill();
            }
        }
    }
}

// ================ 工厂实现 ================

/// 基于 portable-pty 的 PTY 工厂
#[derive(Default)]
pub struct PortablePtyFactory;

#[async_trait]
impl PtyFactory for PortablePtyFactory {
    async fn create(&self, session_id: &str, config: &PtyConfig) -> Result<Box<dyn AsyncPty>, PtyError> {
        // openpty and fork/exec block, keep them off the async workers
        let config = config.clone();
        let session_id = session_id.to_string();
        let pty = spawn_blocking(move || PortablePty::spawn(session_id, &config)).await??;
        Ok(Box::new(pty))
    }

    fn name(&self) -> &'static str {
        "portable-pty"
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn config(command: &str, args: &[&str]) -> PtyConfig {
        PtyConfig {
            command: command.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            size: TerminalSize::default(),
            env: std::env::vars_os().collect(),
            cwd: None,
        }
    }

    #[tokio::test]
    async fn runs_command_and_reaches_eof() {
        let factory = PortablePtyFactory;
        let pty = factory
            .create("s1", &config("sh", &["-c", "printf ready"]))
            .await
            .unwrap();

        let mut buf = [0u8; 256];
        let mut collected = Vec::new();
        while let Some(n) = pty.read_output(&mut buf).await.unwrap() {
            collected.extend_from_slice(&buf[..n]);
        }
        assert!(String::from_utf8_lossy(&collected).contains("ready"));
        assert!(!pty.is_alive());
    }

    #[tokio::test]
    async fn terminate_is_idempotent() {
        let pty = PortablePtyFactory
            .create("s2", &config("sh", &[]))
            .await
            .unwrap();
        assert!(pty.is_alive());

        pty.terminate().await;
        assert!(!pty.is_alive());
        pty.terminate().await;
        assert!(!pty.is_alive());
        assert!(!pty.write(b"echo late\n").await);
    }

    #[tokio::test]
    async fn spawn_failure_is_reported() {
        let result = PortablePtyFactory
            .create("s3", &config("/definitely/not/a/shell", &[]))
            .await;
        assert!(matches!(result, Err(PtyError::SpawnFailed(_))));
    }
}
