/// Terminal session aggregate
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::config::TerminalSize;

/// Milliseconds since the UNIX epoch
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

/// Terminal session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    /// Session is usable; a process may or may not be running for it
    Active,
    /// Session has been terminated. Final.
    Terminated,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "ACTIVE",
            SessionStatus::Terminated => "TERMINATED",
        }
    }
}

/// Resolved creation parameters
#[derive(Debug, Clone, PartialEq)]
pub struct NewSession {
    pub user_id: String,
    pub title: Option<String>,
    pub working_directory: String,
    pub shell_type: String,
    pub terminal_size: TerminalSize,
}

/// Terminal session structure
///
/// Fields are private so every change goes through a transition method that
/// keeps the timestamps consistent. Repositories hand out clones.
#[derive(Debug, Clone, PartialEq)]
pub struct TerminalSession {
    id: String,
    user_id: String,
    title: Option<String>,
    working_directory: String,
    shell_type: String,
    status: SessionStatus,
    terminal_size: TerminalSize,
    created_at: u64,
    updated_at: u64,
    last_active_time: u64,
    expired_at: Option<u64>,
}

impl TerminalSession {
    /// Build an active session that expires `timeout_ms` after `now`
    pub fn create(id: String, params: NewSession, now: u64, timeout_ms: u64) -> Self {
        Self {
            id,
            user_id: params.user_id,
            title: params.title,
            working_directory: params.working_directory,
            shell_type: params.shell_type,
            status: SessionStatus::Active,
            terminal_size: params.terminal_size,
            created_at: now,
            updated_at: now,
            last_active_time: now,
            expired_at: Some(now.saturating_add(timeout_ms)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn working_directory(&self) -> &str {
        &self.working_directory
    }

    pub fn shell_type(&self) -> &str {
        &self.shell_type
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn terminal_size(&self) -> TerminalSize {
        self.terminal_size
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn updated_at(&self) -> u64 {
        self.updated_at
    }

    pub fn last_active_time(&self) -> u64 {
        self.last_active_time
    }

    pub fn expired_at(&self) -> Option<u64> {
        self.expired_at
    }

    /// Record activity and push the expiry out to `now + timeout_ms`
    pub fn touch(&mut self, now: u64, timeout_ms: u64) {
        self.last_active_time = now;
        self.updated_at = now;
        self.expired_at = Some(now.saturating_add(timeout_ms));
    }

    /// Replace the terminal size
    pub fn resize(&mut self, size: TerminalSize, now: u64) {
        self.terminal_size = size;
        self.updated_at = now;
    }

    /// ACTIVE -> TERMINATED. Returns false if the session was already terminated.
    pub fn terminate(&mut self, now: u64) -> bool {
        if self.status == SessionStatus::Terminated {
            return false;
        }
        self.status = SessionStatus::Terminated;
        self.updated_at = now;
        true
    }

    pub fn is_expired_at(&self, now: u64) -> bool {
        self.expired_at.is_some_and(|expired_at| now >= expired_at)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(now: u64) -> TerminalSession {
        TerminalSession::create(
            "s1".to_string(),
            NewSession {
                user_id: "u1".to_string(),
                title: Some("build".to_string()),
                working_directory: "/tmp".to_string(),
                shell_type: "bash".to_string(),
                terminal_size: TerminalSize::default(),
            },
            now,
            1_000,
        )
    }

    #[test]
    fn create_sets_timestamps_and_expiry() {
        let session = session(5_000);
        assert_eq!(session.status(), SessionStatus::Active);
        assert_eq!(session.created_at(), 5_000);
        assert_eq!(session.updated_at(), 5_000);
        assert_eq!(session.last_active_time(), 5_000);
        assert_eq!(session.expired_at(), Some(6_000));
        assert!(session.expired_at().unwrap() > session.created_at());
    }

    #[test]
    fn touch_recomputes_expiry() {
        let mut session = session(5_000);
        session.touch(5_500, 1_000);
        assert_eq!(session.last_active_time(), 5_500);
        assert_eq!(session.updated_at(), 5_500);
        assert_eq!(session.expired_at(), Some(6_500));
        assert!(!session.is_expired_at(6_499));
        assert!(session.is_expired_at(6_500));
    }

    #[test]
    fn resize_replaces_size_and_updates_timestamp() {
        let mut session = session(5_000);
        let size = TerminalSize::new(40, 12).unwrap();
        session.resize(size, 5_100);
        assert_eq!(session.terminal_size(), size);
        assert_eq!(session.updated_at(), 5_100);
        assert_eq!(session.last_active_time(), 5_000);
    }

    #[test]
    fn terminate_is_one_way() {
        let mut session = session(5_000);
        assert!(session.terminate(5_200));
        assert_eq!(session.status(), SessionStatus::Terminated);
        assert!(!session.terminate(5_300));
        assert_eq!(session.updated_at(), 5_200);
        assert_eq!(session.status().as_str(), "TERMINATED");
    }
}
