use crate::config::TerminalSize;
use crate::pty::output_buffer::{OutputBuffer, output_channel};
use crate::pty::pty_trait::{AsyncPty, PtyConfig, PtyError, PtyFactory};
use async_trait::async_trait;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, warn};

const READ_CHUNK_SIZE: usize = 4096;
const TERMINATE_GRACE: Duration = Duration::from_millis(100);

/// 基于 tokio-process 的终端实现
/// 使用标准的进程 I/O，不依赖 PTY API；stdout 与 stderr 合并输出，窗口大小只做记录
pub struct TokioProcessPty {
    session_id: String,
    child: Mutex<Child>,
    stdin: Mutex<ChildStdin>,
    pid: Option<u32>,
    size: std::sync::Mutex<TerminalSize>,
    terminated: AtomicBool,
    exited: Arc<AtomicBool>,
    output: Mutex<OutputBuffer>,
}

impl TokioProcessPty {
    pub fn spawn(session_id: String, config: &PtyConfig) -> Result<Self, PtyError> {
        info!(
            "TokioProcessPty: Creating process for session {} with command: {:?}, args: {:?}",
            session_id, config.command, config.args
        );

        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .env_clear()
            .envs(config.env.iter().map(|(k, v)| (k.as_os_str(), v.as_os_str())))
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &config.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn().map_err(|e| {
            error!("TokioProcessPty: Failed to spawn process: {}", e);
            PtyError::SpawnFailed(format!("{}: {}", config.command, e))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| PtyError::SpawnFailed("Failed to get stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PtyError::SpawnFailed("Failed to get stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| PtyError::SpawnFailed("Failed to get stderr".to_string()))?;

        let (data_tx, output) = output_channel();
        let exited = Arc::new(AtomicBool::new(false));

        // The channel closes once both pipe readers are done
        tokio::spawn(forward_pipe(stdout, data_tx.clone()));
        tokio::spawn(forward_pipe(stderr, data_tx));

        Ok(Self {
            session_id,
            pid: child.id(),
            child: Mutex::new(child),
            stdin: Mutex::new(stdin),
            size: std::sync::Mutex::new(config.size),
            terminated: AtomicBool::new(false),
            exited,
            output: Mutex::new(output),
        })
    }

    /// Last size requested through `resize`
    #[cfg(test)]
    pub fn size(&self) -> TerminalSize {
        self.size.lock().map(|size| *size).unwrap_or_default()
    }
}

async fn forward_pipe(mut pipe: impl AsyncRead + Unpin, data_tx: mpsc::Sender<Vec<u8>>) {
    let mut buffer = vec![0u8; READ_CHUNK_SIZE];
    loop {
        match pipe.read(&mut buffer).await {
            Ok(0) => break,
            Ok(n) => {
                if data_tx.send(buffer[..n].to_vec()).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!("TokioProcessPty: pipe read ended: {}", e);
                break;
            }
        }
    }
}

#[async_trait]
impl AsyncPty for TokioProcessPty {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn read_output(&self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        let mut output = self.output.lock().await;
        let read = output.read(buf).await;
        if read.is_none() {
            self.exited.store(true, Ordering::SeqCst);
        }
        Ok(read)
    }

    async fn write_input(&self, data: &[u8]) -> io::Result<()> {
        let mut stdin = self.stdin.lock().await;
        stdin.write_all(data).await?;
        stdin.flush().await
    }

    async fn resize(&self, size: TerminalSize) -> Result<(), PtyError> {
        if !self.is_alive() {
            return Ok(());
        }
        debug!("TokioProcessPty: recording size {} for session {}", size, self.session_id);
        if let Ok(mut current) = self.size.lock() {
            *current = size;
        }
        Ok(())
    }

    async fn terminate(&self) {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("TokioProcessPty: Terminating process for session {}", self.session_id);

        let mut child = self.child.lock().await;
        match child.try_wait() {
            Ok(Some(_)) => return,
            Ok(None) => {}
            Err(e) => warn!("Failed to poll process for session {}: {}", self.session_id, e),
        }
        if let Err(e) = child.start_kill() {
            warn!("Failed to kill process for session {}: {}", self.session_id, e);
            return;
        }
        if tokio::time::timeout(TERMINATE_GRACE, child.wait()).await.is_err() {
            warn!(
                "Process for session {} still running {:?} after kill",
                self.session_id, TERMINATE_GRACE
            );
        }
    }

    fn is_alive(&self) -> bool {
        !self.terminated.load(Ordering::SeqCst) && !self.exited.load(Ordering::SeqCst)
    }

    fn pid(&self) -> Option<u32> {
        self.pid
    }
}

/// Factory for the pipe based process backend
#[derive(Default)]
pub struct TokioProcessPtyFactory;

#[async_trait]
impl PtyFactory for TokioProcessPtyFactory {
    async fn create(&self, session_id: &str, config: &PtyConfig) -> Result<Box<dyn AsyncPty>, PtyError> {
        let pty = TokioProcessPty::spawn(session_id.to_string(), config)?;
        Ok(Box::new(pty))
    }

    fn name(&self) -> &'static str {
        "tokio-process"
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn config(args: &[&str]) -> PtyConfig {
        PtyConfig {
            command: "sh".to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            size: TerminalSize::default(),
            env: std::env::vars_os().collect(),
            cwd: None,
        }
    }

    #[tokio::test]
    async fn echoes_through_pipes() {
        let pty = TokioProcessPty::spawn("p1".to_string(), &config(&[])).unwrap();
        assert!(pty.write(b"echo piped; exit\n").await);

        let mut buf = [0u8; 128];
        let mut collected = Vec::new();
        while let Some(n) = pty.read_output(&mut buf).await.unwrap() {
            collected.extend_from_slice(&buf[..n]);
        }
        assert_eq!(String::from_utf8_lossy(&collected).trim(), "piped");
        assert!(!pty.is_alive());
    }

    #[tokio::test]
    async fn resize_is_recorded_and_ignored_after_terminate() {
        let pty = TokioProcessPty::spawn("p2".to_string(), &config(&[])).unwrap();
        let bigger = TerminalSize::new(120, 40).unwrap();
        pty.resize(bigger).await.unwrap();
        assert_eq!(pty.size(), bigger);

        pty.terminate().await;
        pty.terminate().await;
        assert!(!pty.is_alive());

        pty.resize(TerminalSize::new(10, 10).unwrap()).await.unwrap();
        assert_eq!(pty.size(), bigger);
        assert!(!pty.interrupt().await);
    }
}
