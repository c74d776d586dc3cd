/// Builds session aggregates from creation requests
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::app_state::{NewSession, TerminalSession};
use crate::config::{TerminalConfig, TerminalSize};
use crate::service::resolve::resolve_shell;

/// Session creation request after transport decoding
#[derive(Debug, Clone, Default)]
pub struct CreateSessionParams {
    pub user_id: String,
    pub title: Option<String>,
    pub working_directory: Option<String>,
    pub shell_type: Option<String>,
    pub terminal_size: Option<TerminalSize>,
}

pub struct SessionFactory {
    config: Arc<TerminalConfig>,
}

impl SessionFactory {
    pub fn new(config: Arc<TerminalConfig>) -> Self {
        Self { config }
    }

    /// Inactivity window applied on creation and on every touch, in milliseconds
    pub fn session_timeout(&self) -> u64 {
        self.config.session_timeout
    }

    /// Resolve the effective shell, directory and size and build an ACTIVE
    /// session created at `now`. Nothing is stored and no process is started.
    pub fn create_session(&self, params: CreateSessionParams, now: u64) -> TerminalSession {
        let resolved = resolve_shell(
            &self.config,
            params.shell_type.as_deref(),
            params.working_directory.as_deref(),
            params.terminal_size,
        );
        let id = Uuid::new_v4().to_string();
        debug!(
            "Creating session {} for user {}: shell={}, cwd={}, size={}",
            id, params.user_id, resolved.shell_type, resolved.working_directory, resolved.size
        );

        TerminalSession::create(
            id,
            NewSession {
                user_id: params.user_id,
                title: params.title,
                working_directory: resolved.working_directory,
                shell_type: resolved.shell_type,
                terminal_size: resolved.size,
            },
            now,
            self.config.session_timeout,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_state::SessionStatus;
    use crate::config::ShellConfig;

    fn factory(shell_dir: Option<&str>) -> SessionFactory {
        let mut config = TerminalConfig::default();
        config.default_shell_type = "bash".to_string();
        config.default_size = TerminalSize::new(80, 24).unwrap();
        config.session_timeout = 60_000;
        config.shells.insert(
            "bash".to_string(),
            ShellConfig {
                command: vec!["bash".to_string()],
                working_directory: shell_dir.map(str::to_string),
                environment: Default::default(),
                size: None,
            },
        );
        SessionFactory::new(Arc::new(config))
    }

    #[test]
    fn explicit_size_is_kept() {
        let session = factory(None).create_session(
            CreateSessionParams {
                user_id: "u1".to_string(),
                terminal_size: Some(TerminalSize::new(100, 30).unwrap()),
                ..Default::default()
            },
            1_000,
        );
        assert_eq!(session.status(), SessionStatus::Active);
        assert_eq!(session.terminal_size(), TerminalSize::new(100, 30).unwrap());
        assert_eq!(session.user_id(), "u1");
        assert_eq!(session.expired_at(), Some(61_000));
        assert!(session.expired_at().unwrap() > session.created_at());
    }

    #[test]
    fn falls_back_to_shell_directory_and_default_size() {
        let session = factory(Some("/home/x")).create_session(
            CreateSessionParams {
                user_id: "u1".to_string(),
                ..Default::default()
            },
            1_000,
        );
        assert_eq!(session.shell_type(), "bash");
        assert_eq!(session.working_directory(), "/home/x");
        assert_eq!(session.terminal_size(), TerminalSize::new(80, 24).unwrap());
    }

    #[test]
    fn ids_are_unique() {
        let factory = factory(None);
        let params = CreateSessionParams {
            user_id: "u1".to_string(),
            ..Default::default()
        };
        let a = factory.create_session(params.clone(), 1);
        let b = factory.create_session(params, 1);
        assert_ne!(a.id(), b.id());
    }
}
