/// Index of running processes by session id
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::TerminalSize;
use crate::pty::{AsyncPty, PtyError};
use crate::service::ProcessFactory;

/// Owns at most one process per session id
pub struct ProcessManager {
    factory: ProcessFactory,
    processes: Mutex<HashMap<String, Arc<dyn AsyncPty>>>,
}

impl ProcessManager {
    pub fn new(factory: ProcessFactory) -> Self {
        Self {
            factory,
            processes: Mutex::new(HashMap::new()),
        }
    }

    /// Start a process and index it, terminating whatever was indexed before
    pub async fn create_process(
        &self,
        session_id: &str,
        working_directory: Option<&str>,
        shell_type: Option<&str>,
        size: Option<TerminalSize>,
    ) -> Result<Arc<dyn AsyncPty>, PtyError> {
        let process: Arc<dyn AsyncPty> = Arc::from(
            self.factory
                .create_process(session_id, working_directory, shell_type, size)
                .await?,
        );

        let previous = {
            let mut processes = self.processes.lock().await;
            processes.insert(session_id.to_string(), Arc::clone(&process))
        };
        if let Some(previous) = previous {
            warn!("Replacing existing process for session {}", session_id);
            previous.terminate().await;
        }

        info!("Process created for session {} (pid {:?})", session_id, process.pid());
        Ok(process)
    }

    /// Return the live process for the session, starting one if there is none
    pub async fn get_or_create_process(
        &self,
        session_id: &str,
        working_directory: Option<&str>,
        shell_type: Option<&str>,
        size: Option<TerminalSize>,
    ) -> Result<Arc<dyn AsyncPty>, PtyError> {
        if let Some(existing) = self.get_process(session_id).await.filter(|p| p.is_alive()) {
            debug!("Reusing process for session {}", session_id);
            return Ok(existing);
        }

        // Spawning blocks for a while, so the map is not locked meanwhile
        let created: Arc<dyn AsyncPty> = Arc::from(
            self.factory
                .create_process(session_id, working_directory, shell_type, size)
                .await?,
        );

        let (winner, loser) = {
            let mut processes = self.processes.lock().await;
            match processes.get(session_id) {
                Some(existing) if existing.is_alive() => (Arc::clone(existing), Some(created)),
                _ => {
                    let stale = processes.insert(session_id.to_string(), Arc::clone(&created));
                    (created, stale)
                }
            }
        };
        if let Some(loser) = loser {
            debug!("Discarding surplus process for session {}", session_id);
            loser.terminate().await;
        }
        Ok(winner)
    }

    pub async fn get_process(&self, session_id: &str) -> Option<Arc<dyn AsyncPty>> {
        let processes = self.processes.lock().await;
        processes.get(session_id).cloned()
    }

    /// True when an indexed process for the session is still running
    pub async fn has_live_process(&self, session_id: &str) -> bool {
        self.get_process(session_id)
            .await
            .is_some_and(|process| process.is_alive())
    }

    pub async fn resize_process(&self, session_id: &str, size: TerminalSize) -> bool {
        let Some(process) = self.get_process(session_id).await else {
            return false;
        };
        match process.resize(size).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to resize process for session {}: {}", session_id, e);
                false
            }
        }
    }

    /// Terminate and unindex the session's process
    pub async fn terminate_process(&self, session_id: &str) -> bool {
        let removed = {
            let mut processes = self.processes.lock().await;
            processes.remove(session_id)
        };
        match removed {
            Some(process) => {
                process.terminate().await;
                info!("Process for session {} terminated", session_id);
                true
            }
            None => false,
        }
    }

    pub async fn interrupt_process(&self, session_id: &str) -> bool {
        match self.get_process(session_id).await {
            Some(process) => process.interrupt().await,
            None => false,
        }
    }

    pub async fn write_to_process(&self, session_id: &str, data: &[u8]) -> bool {
        match self.get_process(session_id).await {
            Some(process) => process.write(data).await,
            None => false,
        }
    }

    pub async fn process_count(&self) -> usize {
        let processes = self.processes.lock().await;
        processes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TerminalConfig;
    use crate::pty::MemoryPtyFactory;

    fn manager() -> ProcessManager {
        let mut config = TerminalConfig::default();
        config.default_shell_type = "sh".to_string();
        ProcessManager::new(ProcessFactory::new(Arc::new(config), Arc::new(MemoryPtyFactory)))
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let manager = manager();
        let first = manager.get_or_create_process("s1", None, None, None).await.unwrap();
        let second = manager.get_or_create_process("s1", None, None, None).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(manager.process_count().await, 1);
    }

    #[tokio::test]
    async fn concurrent_get_or_create_keeps_one_process() {
        let manager = Arc::new(manager());
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move {
                    manager.get_or_create_process("s1", None, None, None).await.unwrap()
                })
            })
            .collect();

        let mut processes = Vec::new();
        for task in tasks {
            processes.push(task.await.unwrap());
        }
        assert_eq!(manager.process_count().await, 1);
        let indexed = manager.get_process("s1").await.unwrap();
        assert!(indexed.is_alive());
        for process in &processes {
            assert!(Arc::ptr_eq(process, &indexed));
        }
    }

    #[tokio::test]
    async fn create_process_terminates_the_previous_one() {
        let manager = manager();
        let old = manager.create_process("s1", None, None, None).await.unwrap();
        let new = manager.create_process("s1", None, None, None).await.unwrap();
        assert!(!old.is_alive());
        assert!(new.is_alive());
        assert_eq!(manager.process_count().await, 1);
    }

    #[tokio::test]
    async fn dead_process_is_replaced() {
        let manager = manager();
        let old = manager.get_or_create_process("s1", None, None, None).await.unwrap();
        old.terminate().await;
        let new = manager.get_or_create_process("s1", None, None, None).await.unwrap();
        assert!(!Arc::ptr_eq(&old, &new));
        assert!(new.is_alive());
    }

    #[tokio::test]
    async fn operations_on_missing_process_return_false() {
        let manager = manager();
        assert!(!manager.resize_process("none", TerminalSize::default()).await);
        assert!(!manager.terminate_process("none").await);
        assert!(!manager.interrupt_process("none").await);
        assert!(!manager.write_to_process("none", b"ls\n").await);
        assert!(!manager.has_live_process("none").await);
    }

    #[tokio::test]
    async fn terminate_removes_entry() {
        let manager = manager();
        let process = manager.create_process("s1", None, None, None).await.unwrap();
        assert!(manager.write_to_process("s1", b"echo\n").await);
        assert!(manager.interrupt_process("s1").await);
        assert!(manager.resize_process("s1", TerminalSize::new(40, 12).unwrap()).await);

        assert!(manager.terminate_process("s1").await);
        assert!(!process.is_alive());
        assert!(manager.get_process("s1").await.is_none());
        assert!(!manager.terminate_process("s1").await);
    }
}
