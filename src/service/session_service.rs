/// Session use cases: create, look up, list, resize, terminate
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::app_state::{SessionRepository, TerminalSession, now_millis};
use crate::config::TerminalSize;
use crate::service::{CreateSessionParams, ProcessManager, ServiceError, ServiceResult, SessionFactory};

pub struct SessionService {
    repository: Arc<dyn SessionRepository>,
    factory: SessionFactory,
    process_manager: Arc<ProcessManager>,
    session_timeout: u64,
}

fn require_non_blank(name: &str, value: Option<&str>) -> ServiceResult<()> {
    match value {
        Some(v) if v.trim().is_empty() => Err(ServiceError::InvalidParameter(format!(
            "{} must not be blank",
            name
        ))),
        _ => Ok(()),
    }
}

impl SessionService {
    pub fn new(
        repository: Arc<dyn SessionRepository>,
        factory: SessionFactory,
        process_manager: Arc<ProcessManager>,
    ) -> Self {
        let session_timeout = factory.session_timeout();
        Self {
            repository,
            factory,
            process_manager,
            session_timeout,
        }
    }

    /// Build and store a new session. No process is started here.
    pub async fn create_session(&self, params: CreateSessionParams) -> ServiceResult<TerminalSession> {
        if params.user_id.trim().is_empty() {
            return Err(ServiceError::InvalidParameter("userId is required".to_string()));
        }
        require_non_blank("workingDirectory", params.working_directory.as_deref())?;
        require_non_blank("shellType", params.shell_type.as_deref())?;

        let session = self.factory.create_session(params, now_millis());
        self.repository.save(session.clone()).await;
        info!(
            "Session {} created for user {} ({}, {})",
            session.id(),
            session.user_id(),
            session.shell_type(),
            session.terminal_size()
        );
        Ok(session)
    }

    /// Load a session and record the access as activity
    pub async fn get_session_by_id(&self, id: &str) -> ServiceResult<TerminalSession> {
        let timeout = self.session_timeout;
        let now = now_millis();
        self.repository
            .modify(id, Box::new(move |session: &mut TerminalSession| session.touch(now, timeout)))
            .await
            .ok_or_else(|| ServiceError::NotFound(id.to_string()))
    }

    /// Every stored session that has not expired
    pub async fn list_all(&self) -> Vec<TerminalSession> {
        let now = now_millis();
        self.repository
            .find_all()
            .await
            .into_iter()
            .filter(|session| !session.is_expired_at(now))
            .collect()
    }

    pub async fn list_by_user(&self, user_id: &str) -> Vec<TerminalSession> {
        let now = now_millis();
        self.repository
            .find_by_user_id(user_id)
            .await
            .into_iter()
            .filter(|session| !session.is_expired_at(now))
            .collect()
    }

    /// Resize the running process first, then the stored session
    pub async fn resize_terminal(&self, id: &str, columns: i64, rows: i64) -> ServiceResult<TerminalSession> {
        let size = TerminalSize::from_dimensions(columns, rows)
            .map_err(|e| ServiceError::InvalidParameter(e.to_string()))?;
        if self.repository.find_by_id(id).await.is_none() {
            return Err(ServiceError::NotFound(id.to_string()));
        }

        if !self.process_manager.resize_process(id, size).await {
            debug!("No running process resized for session {}", id);
        }

        let now = now_millis();
        let session = self
            .repository
            .modify(id, Box::new(move |session: &mut TerminalSession| session.resize(size, now)))
            .await
            .ok_or_else(|| ServiceError::NotFound(id.to_string()))?;
        info!("Session {} resized to {}", id, size);
        Ok(session)
    }

    /// Mark the session TERMINATED and remove it from storage.
    ///
    /// The process is left alone; callers that need it gone go through the
    /// process manager as well.
    pub async fn terminate_session(&self, id: &str) -> ServiceResult<TerminalSession> {
        let now = now_millis();
        let terminated = self
            .repository
            .modify(id, Box::new(move |session: &mut TerminalSession| {
                session.terminate(now);
            }))
            .await
            .ok_or_else(|| ServiceError::NotFound(id.to_string()))?;
        self.repository.delete(id).await;
        info!("Session {} terminated", id);
        Ok(terminated)
    }

    /// Remove expired sessions that no longer have a running process.
    /// Returns how many were removed.
    pub async fn cleanup_expired_sessions(&self) -> usize {
        let now = now_millis();
        let mut removed = 0;
        for session in self.repository.find_all().await {
            if !session.is_expired_at(now) {
                continue;
            }
            if self.process_manager.has_live_process(session.id()).await {
                debug!("Expired session {} still has a running process", session.id());
                continue;
            }
            if self.repository.delete(session.id()).await.is_some() {
                removed += 1;
            }
        }
        if removed > 0 {
            info!("Removed {} expired sessions", removed);
        }
        removed
    }

    /// Idle time after which a session expires
    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout)
    }

    pub async fn session_count(&self) -> usize {
        self.repository.count().await
    }

    #[cfg(test)]
    pub fn repository(&self) -> &Arc<dyn SessionRepository> {
        &self.repository
    }

    /// Log-only helper for paths that cannot report an error
    pub(crate) async fn terminate_quietly(&self, id: &str) {
        if let Err(e) = self.terminate_session(id).await {
            warn!("Could not terminate session {}: {}", id, e);
        }
    }
}
